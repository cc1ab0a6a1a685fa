//! WKT-based ingestion of features, roads, and an area-of-interest
//! boundary (`spec.md` §6 "Feature" input contract).

use serde::{Deserialize, Serialize};
use wkt::TryFromWkt;

use crate::core::errors::{GeoFixError, Result};
use crate::model::{Feature, FeatureMetadata, RoadSegment};

/// One feature as received at the ingestion boundary: geometry as WKT
/// text rather than a parsed `geo` type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDoc {
    pub id: String,
    pub wkt: String,
    #[serde(default)]
    pub metadata: FeatureMetadata,
}

/// One road centerline as received at the ingestion boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadDoc {
    pub id: String,
    pub wkt: String,
    pub buffer_m: f64,
}

/// A full input document: features plus optional roads and boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputDoc {
    pub features: Vec<FeatureDoc>,
    #[serde(default)]
    pub roads: Vec<RoadDoc>,
    #[serde(default)]
    pub boundary_wkt: Option<String>,
}

/// Parsed ingestion result, ready for the detector/pipeline.
#[derive(Debug)]
pub struct Ingested {
    pub features: Vec<Feature>,
    pub roads: Vec<RoadSegment>,
    pub boundary: Option<geo::Polygon<f64>>,
}

/// Parse an `InputDoc`, enforcing `spec.md` §3's ingestion invariants:
/// feature IDs are unique, and every feature's geometry is non-null.
pub fn ingest(doc: &InputDoc) -> Result<Ingested> {
    let mut seen = std::collections::HashSet::with_capacity(doc.features.len());
    let mut features = Vec::with_capacity(doc.features.len());

    for f in &doc.features {
        if !seen.insert(f.id.clone()) {
            return Err(GeoFixError::DuplicateFeatureId {
                feature_id: f.id.clone(),
            });
        }
        let geometry = geo::Geometry::<f64>::try_from_wkt_str(&f.wkt).map_err(|source| {
            GeoFixError::InvalidGeometry {
                feature_id: f.id.clone(),
                details: source.to_string(),
            }
        })?;
        if crate::geometry::is_empty(&geometry) {
            return Err(GeoFixError::InvalidGeometry {
                feature_id: f.id.clone(),
                details: "geometry is empty at ingestion".to_string(),
            });
        }
        features.push(Feature {
            id: f.id.clone(),
            geometry,
            metadata: f.metadata.clone(),
        });
    }

    let mut roads = Vec::with_capacity(doc.roads.len());
    for r in &doc.roads {
        let geometry = geo::LineString::<f64>::try_from_wkt_str(&r.wkt).map_err(|source| {
            GeoFixError::InvalidGeometry {
                feature_id: r.id.clone(),
                details: source.to_string(),
            }
        })?;
        roads.push(RoadSegment {
            id: r.id.clone(),
            geometry,
            buffer_m: r.buffer_m,
        });
    }

    let boundary = doc
        .boundary_wkt
        .as_ref()
        .map(|wkt| {
            geo::Polygon::<f64>::try_from_wkt_str(wkt).map_err(|source| GeoFixError::InvalidGeometry {
                feature_id: "boundary".to_string(),
                details: source.to_string(),
            })
        })
        .transpose()?;

    Ok(Ingested {
        features,
        roads,
        boundary,
    })
}
