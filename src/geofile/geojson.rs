use std::{fs, io, path::Path};

use super::feature::FeatureCollection;

fn to_geojson_feature(feature: &super::feature::Feature) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
        id: None,
        properties: Some(feature.attributes.clone()),
        foreign_members: None,
    }
}

/// Serialize the collection as a GeoJSON FeatureCollection.
/// `name` is written as a foreign member, the way GDAL names the layer.
pub fn features_to_geojson(collection: &FeatureCollection, name: &str) -> geojson::GeoJson {
    let mut foreign_members = geojson::JsonObject::new();
    foreign_members.insert(
        "name".to_string(),
        serde_json::Value::String(name.to_string()),
    );
    let feature_collection = geojson::FeatureCollection {
        bbox: None,
        features: collection.features.iter().map(to_geojson_feature).collect(),
        foreign_members: Some(foreign_members),
    };
    geojson::GeoJson::from(feature_collection)
}

pub fn write_features_to_geojson(
    collection: &FeatureCollection,
    name: &str,
    output_filepath: &Path,
) -> io::Result<()> {
    let geojson_contents = features_to_geojson(collection, name);
    fs::write(output_filepath, geojson_contents.to_string())
}
