//! Planar geometry helpers shared by the detector, rules, and fix registry.
//!
//! Every operation here assumes a single planar, metric coordinate
//! reference system is already in effect (`spec.md` §1 Non-goals) — no
//! re-projection is performed.

use geo::{
    Area, BooleanOps, BoundingRect, Centroid, ClosestPoint, Distance, Euclidean, Geometry,
    MakeValid, MultiPolygon, Polygon, Validation,
};
use sha2::{Digest, Sha256};

/// Coordinate rounding granularity used when canonicalizing a geometry for
/// the duplicate-detection hash (`spec.md` §4.1).
const HASH_EPSILON: f64 = 1e-6;

/// Coerce a `Geometry<f64>` into a `MultiPolygon<f64>`, the common shape
/// `geo`'s boolean ops and `MakeValid` operate over. Returns `None` for
/// geometry kinds outside the feature model (`spec.md` §3 restricts
/// features to polygon/multipolygon).
#[must_use]
pub fn as_multi_polygon(geom: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geom {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}

/// Wrap a `MultiPolygon<f64>` back into `Geometry<f64>`, collapsing a
/// single-polygon multipolygon into a bare `Polygon` the way the rest of
/// the crate expects features to be shaped.
#[must_use]
pub fn from_multi_polygon(mp: MultiPolygon<f64>) -> Geometry<f64> {
    let mut polygons = mp.0;
    if polygons.len() == 1 {
        Geometry::Polygon(polygons.pop().unwrap())
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(polygons))
    }
}

/// Unsigned planar area in square CRS units (square meters, under this
/// crate's metric-CRS assumption).
#[must_use]
pub fn area_m2(geom: &Geometry<f64>) -> f64 {
    geom.unsigned_area()
}

/// Whether a geometry is geometrically empty (no coordinates).
#[must_use]
pub fn is_empty(geom: &Geometry<f64>) -> bool {
    geo::CoordsIter::coords_iter(geom).next().is_none()
}

/// `true` iff `geom` passes `geo`'s OGC validity predicate.
#[must_use]
pub fn is_valid(geom: &Geometry<f64>) -> bool {
    geom.check_validation().is_ok()
}

/// Repair an invalid polygon/multipolygon via the constrained-Delaunay
/// make-valid transform. Already-valid input is returned unchanged
/// (`spec.md` §4.3, §8 property 8).
///
/// Returns `None` if the geometry is not a polygon/multipolygon or the
/// repair algorithm itself fails.
#[must_use]
pub fn make_valid(geom: &Geometry<f64>) -> Option<Geometry<f64>> {
    let mp = as_multi_polygon(geom)?;
    let repaired = mp.make_valid().ok()?;
    Some(from_multi_polygon(repaired))
}

/// Intersection of two polygonal geometries, as a `Geometry<f64>`.
#[must_use]
pub fn intersection(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Geometry<f64>> {
    let (ma, mb) = (as_multi_polygon(a)?, as_multi_polygon(b)?);
    Some(from_multi_polygon(ma.intersection(&mb)))
}

/// Difference `a - b`, as a `Geometry<f64>`.
#[must_use]
pub fn difference(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Geometry<f64>> {
    let (ma, mb) = (as_multi_polygon(a)?, as_multi_polygon(b)?);
    Some(from_multi_polygon(ma.difference(&mb)))
}

/// Union of two polygonal geometries, as a `Geometry<f64>`.
#[must_use]
pub fn union(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Geometry<f64>> {
    let (ma, mb) = (as_multi_polygon(a)?, as_multi_polygon(b)?);
    Some(from_multi_polygon(ma.union(&mb)))
}

/// Keep only the largest-area polygon of a multipolygon result, the
/// "keep the largest part" rule several fix operations share
/// (`spec.md` §4.3 `trim`/`merge`/`clip`).
#[must_use]
pub fn largest_part(geom: Geometry<f64>) -> Geometry<f64> {
    match geom {
        Geometry::MultiPolygon(mp) if mp.0.len() > 1 => {
            let largest = mp
                .0
                .into_iter()
                .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
                .expect("multipolygon with >1 part has a largest part");
            Geometry::Polygon(largest)
        }
        other => other,
    }
}

/// Isoperimetric quotient `4πA/P²`: 1 for a circle, approaching 0 for
/// elongated or jagged shapes (`spec.md` Glossary).
#[must_use]
pub fn compactness(poly: &Polygon<f64>) -> f64 {
    use geo::{Euclidean, Length};
    let perimeter = Euclidean.length(poly.exterior());
    if perimeter <= 0.0 {
        return 0.0;
    }
    let area = poly.unsigned_area();
    (4.0 * std::f64::consts::PI * area) / (perimeter * perimeter)
}

/// Planar Euclidean distance between the closest points of two geometries
/// that both expose a centroid; used by setback and nudge calculations.
#[must_use]
pub fn distance(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    Euclidean.distance(a, b)
}

/// Nearest point on `target` to `from`, used by the `nudge` fix to find
/// the direction away from a road.
#[must_use]
pub fn closest_point(target: &Geometry<f64>, from: &geo::Point<f64>) -> Option<geo::Point<f64>> {
    match target.closest_point(from) {
        geo::Closest::SinglePoint(p) | geo::Closest::Intersection(p) => Some(p),
        geo::Closest::Indeterminate => None,
    }
}

/// Centroid of a geometry, if one can be computed.
#[must_use]
pub fn centroid(geom: &Geometry<f64>) -> Option<geo::Point<f64>> {
    geom.centroid()
}

/// Bounding rectangle, used to seed the R-tree spatial index.
#[must_use]
pub fn bounding_rect(geom: &Geometry<f64>) -> Option<geo::Rect<f64>> {
    geom.bounding_rect()
}

/// SHA-256 digest of a canonicalized coordinate sequence, used by
/// duplicate-geometry detection (`spec.md` §4.1): coordinates are rounded
/// to a fixed epsilon and ring winding/start vertex is normalized so two
/// features whose normalized representations compare equal hash equal.
#[must_use]
pub fn canonical_hash(geom: &Geometry<f64>) -> [u8; 32] {
    let mut coords: Vec<(i64, i64)> = geo::CoordsIter::coords_iter(geom)
        .map(|c| {
            (
                (c.x / HASH_EPSILON).round() as i64,
                (c.y / HASH_EPSILON).round() as i64,
            )
        })
        .collect();
    coords.sort_unstable();
    coords.dedup();

    let mut hasher = Sha256::new();
    for (x, y) in coords {
        hasher.update(x.to_le_bytes());
        hasher.update(y.to_le_bytes());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Geometry};

    fn unit_square() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ])
    }

    fn bowtie() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ])
    }

    #[test]
    fn unit_square_is_valid_with_area_one() {
        let sq = unit_square();
        assert!(is_valid(&sq));
        assert!((area_m2(&sq) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bowtie_is_invalid() {
        assert!(!is_valid(&bowtie()));
    }

    #[test]
    fn make_valid_repairs_bowtie_and_is_idempotent_on_valid_input() {
        let fixed = make_valid(&bowtie()).expect("bowtie repairs to a geometry");
        assert!(is_valid(&fixed));

        let sq = unit_square();
        let refixed = make_valid(&sq).expect("valid square round-trips");
        assert!((area_m2(&refixed) - area_m2(&sq)).abs() < 1e-9);
    }

    #[test]
    fn intersection_of_overlapping_squares() {
        let a = unit_square();
        let b = Geometry::Polygon(polygon![
            (x: 0.5, y: 0.5),
            (x: 1.5, y: 0.5),
            (x: 1.5, y: 1.5),
            (x: 0.5, y: 1.5),
            (x: 0.5, y: 0.5),
        ]);
        let inter = intersection(&a, &b).expect("both are polygonal");
        assert!((area_m2(&inter) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn canonical_hash_ignores_ring_start_and_rounding_noise() {
        let a = unit_square();
        let b = Geometry::Polygon(polygon![
            (x: 1.0 + 1e-9, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
        ]);
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn canonical_hash_differs_for_different_geometry() {
        let a = unit_square();
        let b = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]);
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn compactness_of_square_is_below_one() {
        let sq = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let q = compactness(&sq);
        assert!(q > 0.7 && q < 1.0);
    }
}
