use crate::crs::crs_utils::Crs;

/// Attribute name to value mapping of a single feature.
pub type Attributes = geojson::JsonObject;

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// `None` for shapefile null shapes.
    pub geometry: Option<geo::Geometry>,
    pub attributes: Attributes,
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self {
            geometry: Some(value),
            attributes: Attributes::new(),
        }
    }
}

/// All features of one geofile together with its attribute table header and CRS.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    /// Field names in attribute table order.
    pub field_names: Vec<String>,
    pub crs: Option<Crs>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn geometries_mut(&mut self) -> impl Iterator<Item = &mut geo::Geometry> {
        self.features
            .iter_mut()
            .filter_map(|feature| feature.geometry.as_mut())
    }
}
