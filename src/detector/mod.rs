//! Defect detection over a polygon feature set (`spec.md` §4.1).
//!
//! Deterministic: identical inputs produce identical errors in the same
//! order. Pairwise checks use an R-tree spatial index over feature
//! bounding boxes and the strict `j > i` ordering rule to avoid reporting
//! each pair twice.

use geo::{Buffer, Intersects, Polygon};
use rstar::{RTree, RTreeObject, AABB};

use crate::core::config::GeometryConfig;
use crate::geometry;
use crate::model::{DetectedError, ErrorKind, ErrorProperties, Feature, OverlapClass, RoadSegment, Severity};

/// Spatial-index entry: a feature's bounding box plus its position in the
/// input slice.
struct IndexedFeature {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn to_aabb(rect: geo::Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    )
}

/// Run the full detector catalog over a feature set and optional
/// roads/boundary layers, returning errors in the catalog-then-ID order
/// mandated by `spec.md` §4.1.
#[must_use]
pub fn detect(
    features: &[Feature],
    roads: &[RoadSegment],
    boundary: Option<&Polygon<f64>>,
    config: &GeometryConfig,
) -> Vec<DetectedError> {
    let mut raw = Vec::new();

    detect_invalid_and_empty(features, &mut raw);
    detect_pairwise(features, config, &mut raw);
    detect_roads(features, roads, config, &mut raw);
    detect_boundary(features, boundary, config, &mut raw);
    detect_area_and_shape(features, config, &mut raw);

    raw.sort_by(|a, b| {
        a.kind
            .emission_rank()
            .cmp(&b.kind.emission_rank())
            .then_with(|| a.affected_features.cmp(&b.affected_features))
    });

    for (i, err) in raw.iter_mut().enumerate() {
        err.error_id = format!("err-{i:06}");
    }
    raw
}

fn detect_invalid_and_empty(features: &[Feature], out: &mut Vec<DetectedError>) {
    for f in features {
        if geometry::is_empty(&f.geometry) {
            out.push(DetectedError {
                error_id: String::new(),
                kind: ErrorKind::EmptyGeometry,
                severity: Severity::High,
                witness: f.geometry.clone(),
                affected_features: vec![f.id.clone()],
                properties: ErrorProperties::default(),
                provenance: "empty_geometry",
            });
        } else if !geometry::is_valid(&f.geometry) {
            out.push(DetectedError {
                error_id: String::new(),
                kind: ErrorKind::InvalidGeometry,
                severity: Severity::High,
                witness: f.geometry.clone(),
                affected_features: vec![f.id.clone()],
                properties: ErrorProperties::default(),
                provenance: "invalid_geometry",
            });
        }
    }
}

fn build_index(features: &[Feature]) -> RTree<IndexedFeature> {
    let entries = features
        .iter()
        .enumerate()
        .filter_map(|(index, f)| {
            geometry::bounding_rect(&f.geometry).map(|r| IndexedFeature {
                index,
                envelope: to_aabb(r),
            })
        })
        .collect();
    RTree::bulk_load(entries)
}

fn overlap_class(ratio: f64, inter_area: f64, config: &GeometryConfig) -> OverlapClass {
    if ratio >= config.duplicate_ratio_min {
        OverlapClass::Duplicate
    } else if inter_area < config.sliver_max_area_m2 {
        OverlapClass::Sliver
    } else {
        OverlapClass::Partial
    }
}

fn detect_pairwise(features: &[Feature], config: &GeometryConfig, out: &mut Vec<DetectedError>) {
    let tree = build_index(features);
    for (i, a) in features.iter().enumerate() {
        let Some(rect_a) = geometry::bounding_rect(&a.geometry) else {
            continue;
        };
        let candidates = tree.locate_in_envelope_intersecting(to_aabb(rect_a));
        for candidate in candidates {
            let j = candidate.index;
            if j <= i {
                continue;
            }
            let b = &features[j];

            let normalized_equal = geometry::canonical_hash(&a.geometry) == geometry::canonical_hash(&b.geometry);
            let Some(inter) = geometry::intersection(&a.geometry, &b.geometry) else {
                continue;
            };
            let inter_area = geometry::area_m2(&inter);
            if inter_area <= 0.0 && !normalized_equal {
                continue;
            }

            let area_a = geometry::area_m2(&a.geometry);
            let area_b = geometry::area_m2(&b.geometry);
            let min_area = area_a.min(area_b);
            let ratio = if min_area > 0.0 { inter_area / min_area } else { 1.0 };

            let (kind, witness) = if normalized_equal || ratio >= config.duplicate_ratio_min {
                (ErrorKind::DuplicateGeometry, inter.clone())
            } else {
                (ErrorKind::BuildingOverlap, inter.clone())
            };

            out.push(DetectedError {
                error_id: String::new(),
                kind,
                severity: Severity::Medium,
                witness,
                affected_features: sorted_pair(&a.id, &b.id),
                properties: ErrorProperties {
                    overlap_ratio: Some(ratio),
                    inter_area_m2: Some(inter_area),
                    overlap_class: Some(overlap_class(ratio, inter_area, config)),
                    area_m2: None,
                    compactness: None,
                },
                provenance: "pairwise_overlap",
            });
        }
    }
}

fn sorted_pair(a: &str, b: &str) -> Vec<String> {
    if a <= b {
        vec![a.to_string(), b.to_string()]
    } else {
        vec![b.to_string(), a.to_string()]
    }
}

fn detect_roads(
    features: &[Feature],
    roads: &[RoadSegment],
    config: &GeometryConfig,
    out: &mut Vec<DetectedError>,
) {
    if roads.is_empty() {
        return;
    }
    for f in features {
        for road in roads {
            let buffered = road.geometry.buffer(road.buffer_m);
            let buffered_geom = geo::Geometry::MultiPolygon(buffered);
            if !buffered_geom.intersects(&f.geometry) {
                let dist = geometry::distance(&f.geometry, &geo::Geometry::LineString(road.geometry.clone()));
                if dist < config.road_snap_distance_m {
                    out.push(DetectedError {
                        error_id: String::new(),
                        kind: ErrorKind::RoadSetback,
                        severity: Severity::Medium,
                        witness: f.geometry.clone(),
                        affected_features: vec![f.id.clone()],
                        properties: ErrorProperties::default(),
                        provenance: "road_setback",
                    });
                }
                continue;
            }

            let Some(inter) = geometry::intersection(&f.geometry, &buffered_geom) else {
                continue;
            };
            out.push(DetectedError {
                error_id: String::new(),
                kind: ErrorKind::BuildingOnRoad,
                severity: Severity::High,
                witness: inter.clone(),
                affected_features: vec![f.id.clone()],
                properties: ErrorProperties {
                    inter_area_m2: Some(geometry::area_m2(&inter)),
                    ..ErrorProperties::default()
                },
                provenance: "building_on_road",
            });
        }
    }
}

fn detect_boundary(
    features: &[Feature],
    boundary: Option<&Polygon<f64>>,
    _config: &GeometryConfig,
    out: &mut Vec<DetectedError>,
) {
    let Some(boundary) = boundary else {
        return;
    };
    let boundary_geom = geo::Geometry::Polygon(boundary.clone());
    for f in features {
        let area = geometry::area_m2(&f.geometry);
        let Some(inter) = geometry::intersection(&f.geometry, &boundary_geom) else {
            continue;
        };
        let inter_area = geometry::area_m2(&inter);

        if inter_area <= 0.0 {
            out.push(DetectedError {
                error_id: String::new(),
                kind: ErrorKind::OutsideBoundary,
                severity: Severity::Medium,
                witness: f.geometry.clone(),
                affected_features: vec![f.id.clone()],
                properties: ErrorProperties::default(),
                provenance: "outside_boundary",
            });
        } else if inter_area < area * (1.0 - 1e-9) {
            out.push(DetectedError {
                error_id: String::new(),
                kind: ErrorKind::BuildingBoundaryOverlap,
                severity: Severity::Medium,
                witness: f.geometry.clone(),
                affected_features: vec![f.id.clone()],
                properties: ErrorProperties {
                    area_m2: Some(area),
                    inter_area_m2: Some(inter_area),
                    ..ErrorProperties::default()
                },
                provenance: "building_boundary_overlap",
            });
        }
    }
}

fn detect_area_and_shape(features: &[Feature], config: &GeometryConfig, out: &mut Vec<DetectedError>) {
    for f in features {
        let area = geometry::area_m2(&f.geometry);
        if area < config.min_building_area_m2 || area > config.max_building_area_m2 {
            out.push(DetectedError {
                error_id: String::new(),
                kind: ErrorKind::UnreasonableArea,
                severity: Severity::Low,
                witness: f.geometry.clone(),
                affected_features: vec![f.id.clone()],
                properties: ErrorProperties {
                    area_m2: Some(area),
                    ..ErrorProperties::default()
                },
                provenance: "unreasonable_area",
            });
        }

        if let geo::Geometry::Polygon(poly) = &f.geometry {
            let q = geometry::compactness(poly);
            if q < config.min_compactness {
                out.push(DetectedError {
                    error_id: String::new(),
                    kind: ErrorKind::LowCompactness,
                    severity: Severity::Low,
                    witness: f.geometry.clone(),
                    affected_features: vec![f.id.clone()],
                    properties: ErrorProperties {
                        compactness: Some(q),
                        ..ErrorProperties::default()
                    },
                    provenance: "low_compactness",
                });
            }
        }
    }
}
