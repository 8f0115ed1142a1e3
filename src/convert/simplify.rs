use geo::{Simplify, SimplifyVwPreserve};
use serde::Deserialize;

use crate::geofile::feature::FeatureCollection;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimplifyAlgorithm {
    /// Ramer-Douglas-Peucker. Removed vertices lie within `tolerance` of the result.
    #[default]
    DouglasPeucker,
    /// Topology preserving Visvalingam-Whyatt. `tolerance` is a triangle area.
    VisvalingamPreserve,
}

fn simplify_with<G>(geometry: &G, algorithm: SimplifyAlgorithm, tolerance: f64) -> G
where
    G: Simplify<f64> + SimplifyVwPreserve<f64>,
{
    match algorithm {
        SimplifyAlgorithm::DouglasPeucker => geometry.simplify(&tolerance),
        SimplifyAlgorithm::VisvalingamPreserve => geometry.simplify_vw_preserve(&tolerance),
    }
}

/// Simplify a geometry in place. Points are left as they are.
pub fn simplify_geometry(geometry: &mut geo::Geometry, algorithm: SimplifyAlgorithm, tolerance: f64) {
    match geometry {
        geo::Geometry::LineString(line) => *line = simplify_with(line, algorithm, tolerance),
        geo::Geometry::MultiLineString(lines) => {
            *lines = simplify_with(lines, algorithm, tolerance)
        }
        geo::Geometry::Polygon(polygon) => *polygon = simplify_with(polygon, algorithm, tolerance),
        geo::Geometry::MultiPolygon(polygons) => {
            *polygons = simplify_with(polygons, algorithm, tolerance)
        }
        geo::Geometry::GeometryCollection(collection) => {
            for geometry in collection.0.iter_mut() {
                simplify_geometry(geometry, algorithm, tolerance);
            }
        }
        geo::Geometry::Point(_)
        | geo::Geometry::MultiPoint(_)
        | geo::Geometry::Line(_)
        | geo::Geometry::Rect(_)
        | geo::Geometry::Triangle(_) => {}
    }
}

pub fn simplify_features(
    collection: &mut FeatureCollection,
    algorithm: SimplifyAlgorithm,
    tolerance: f64,
) {
    for geometry in collection.geometries_mut() {
        simplify_geometry(geometry, algorithm, tolerance);
    }
}
