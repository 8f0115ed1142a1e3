use std::{fmt, str::FromStr};

use anyhow::anyhow;
use proj::Transform;

use crate::geofile::feature::FeatureCollection;

pub type EpsgCode = u32;

pub const WGS84_EPSG_CODE: EpsgCode = 4326;

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}

/// A coordinate reference system, normalized to its EPSG code whenever one can be identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    Epsg(EpsgCode),
    /// Any other definition PROJ accepts, typically the WKT of a `.prj` file.
    Definition(String),
}

impl Crs {
    pub fn wgs84() -> Self {
        Crs::Epsg(WGS84_EPSG_CODE)
    }

    /// Parse an `EPSG:<code>` string or a WKT definition.
    ///
    /// WKT is reduced to an EPSG code when it carries a top level `AUTHORITY["EPSG", ...]` /
    /// `ID["EPSG", ...]` node, or when it is an ESRI style geographic CRS with a well known name.
    pub fn parse(definition: &str) -> Self {
        let definition = definition.trim();
        if let Some(code) = parse_authority_string(definition) {
            return Crs::Epsg(code);
        }
        match top_level_authority_code(definition).or_else(|| well_known_geographic_code(definition))
        {
            Some(code) => Crs::Epsg(code),
            None => Crs::Definition(definition.to_string()),
        }
    }

    pub fn epsg_code(&self) -> Option<EpsgCode> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Definition(_) => None,
        }
    }

    /// The string handed to PROJ.
    pub fn proj_definition(&self) -> String {
        match self {
            Crs::Epsg(code) => epsg_code_to_authority_string(*code),
            Crs::Definition(definition) => definition.clone(),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "{}", epsg_code_to_authority_string(*code)),
            Crs::Definition(definition) => write!(f, "{}", definition),
        }
    }
}

impl FromStr for Crs {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(anyhow!("Empty CRS definition"));
        }
        Ok(Crs::parse(s))
    }
}

fn parse_authority_string(definition: &str) -> Option<EpsgCode> {
    let (authority, code) = definition.split_once(':')?;
    if !authority.trim().eq_ignore_ascii_case("EPSG") {
        return None;
    }
    code.trim().parse().ok()
}

/// Find the `AUTHORITY` (WKT1) or `ID` (WKT2) node that belongs to the outermost CRS.
/// Nested nodes name the datum, ellipsoid etc. and are ignored.
fn top_level_authority_code(wkt: &str) -> Option<EpsgCode> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut token_start = 0;
    let mut code = None;
    for (index, c) in wkt.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            _ if in_quotes => {}
            '[' | '(' => {
                if depth == 1 {
                    let keyword = wkt[token_start..index].trim();
                    if keyword.eq_ignore_ascii_case("AUTHORITY") || keyword.eq_ignore_ascii_case("ID")
                    {
                        code = parse_authority_body(&wkt[index + 1..]).or(code);
                    }
                }
                depth += 1;
                token_start = index + 1;
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                token_start = index + 1;
            }
            ',' => token_start = index + 1,
            _ => {}
        }
    }
    code
}

fn parse_authority_body(body: &str) -> Option<EpsgCode> {
    let mut parts = body.splitn(3, |c| c == ',' || c == ']' || c == ')');
    let authority = parts.next()?.trim().trim_matches('"');
    let code = parts.next()?.trim().trim_matches('"');
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    code.parse().ok()
}

/// ESRI `.prj` files usually omit authority nodes, so geographic CRSs are recognized by name.
fn well_known_geographic_code(wkt: &str) -> Option<EpsgCode> {
    let is_geographic = wkt
        .get(..6)
        .map_or(false, |keyword| keyword.eq_ignore_ascii_case("GEOGCS"));
    if !is_geographic {
        return None;
    }
    let name = wkt.split('"').nth(1)?;
    match name {
        "GCS_WGS_1984" | "WGS 84" | "WGS84" => Some(WGS84_EPSG_CODE),
        "GCS_JGD_2000" | "JGD2000" => Some(4612),
        "GCS_JGD_2011" | "JGD2011" => Some(6668),
        _ => None,
    }
}

/// Whether features in `source` must be projected to end up in `target`.
/// A missing source CRS always needs reprojection.
pub fn needs_reprojection(source: Option<&Crs>, target: &Crs) -> bool {
    source != Some(target)
}

/// Project all geometries of the collection to `to_crs` in place.
pub fn reproject_features(collection: &mut FeatureCollection, to_crs: &Crs) -> anyhow::Result<()> {
    let from_crs = collection
        .crs
        .as_ref()
        .ok_or_else(|| anyhow!("The features have no CRS, cannot project them to {}", to_crs))?;
    let projection = proj::Proj::new_known_crs(
        &from_crs.proj_definition(),
        &to_crs.proj_definition(),
        None,
    )
    .map_err(|err| anyhow!("Could not create projection to {}, {}", to_crs, err))?;

    for geometry in collection.geometries_mut() {
        geometry
            .transform(&projection)
            .map_err(|err| anyhow!("Could not project geometry, {}", err))?;
    }
    collection.crs = Some(to_crs.clone());
    Ok(())
}
