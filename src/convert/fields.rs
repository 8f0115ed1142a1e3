use serde::Deserialize;

use crate::geofile::feature::FeatureCollection;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldRename {
    pub source: String,
    pub target: String,
}

/// Fields to keep, in output order, and what to call them.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldMapping(pub Vec<FieldRename>);

impl FieldMapping {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(source, target)| FieldRename {
                    source: source.to_string(),
                    target: target.to_string(),
                })
                .collect(),
        )
    }
}

impl Default for FieldMapping {
    /// Line name and operating company of the N02 railway data.
    fn default() -> Self {
        FieldMapping::new(&[("N02_003", "line_name"), ("N02_004", "company")])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    /// Keep only the mapped fields, renamed.
    Rename(Vec<FieldRename>),
    /// Keep every field unchanged.
    KeepAll,
}

/// Decide which attributes survive, given the field names of a file.
///
/// The mapping applies only when every source field is present. A partial match, or an empty
/// mapping, keeps all fields unchanged.
pub fn select_and_rename_fields(fields: &[String], mapping: &FieldMapping) -> FieldSelection {
    let all_present = mapping
        .0
        .iter()
        .all(|rename| fields.iter().any(|field| field == &rename.source));
    if mapping.0.is_empty() || !all_present {
        return FieldSelection::KeepAll;
    }
    FieldSelection::Rename(mapping.0.clone())
}

/// Apply a selection to every feature and to the field list.
pub fn apply_field_selection(collection: &mut FeatureCollection, selection: &FieldSelection) {
    let renames = match selection {
        FieldSelection::KeepAll => return,
        FieldSelection::Rename(renames) => renames,
    };
    for feature in collection.features.iter_mut() {
        let mut attributes = std::mem::take(&mut feature.attributes);
        feature.attributes = renames
            .iter()
            .map(|rename| {
                let value = attributes
                    .remove(&rename.source)
                    .unwrap_or(serde_json::Value::Null);
                (rename.target.clone(), value)
            })
            .collect();
    }
    collection.field_names = renames.iter().map(|rename| rename.target.clone()).collect();
}
