use anyhow::{anyhow, Context};
use dbase::FieldValue;
use encoding_rs::Encoding;
use shapefile::{PolygonRing, Shape};
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::feature::{Attributes, Feature, FeatureCollection};
use crate::crs::crs_utils::Crs;

/// Look up a text encoding by label.
///
/// Accepts WHATWG labels (`shift_jis`, `utf-8`, ...) as well as Windows code page names as they
/// appear in `.cpg` files and GDAL options (`cp932`, `CP1252`, `65001`).
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim();
    let lowercase = label.to_ascii_lowercase();
    let code_page = lowercase.strip_prefix("cp").unwrap_or(&lowercase);
    match code_page {
        "932" => Some(encoding_rs::SHIFT_JIS),
        "65001" => Some(encoding_rs::UTF_8),
        code if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) => {
            Encoding::for_label(format!("windows-{}", code).as_bytes())
                .or_else(|| Encoding::for_label(label.as_bytes()))
        }
        _ => Encoding::for_label(label.as_bytes()),
    }
}

/// Path of a shapefile sidecar, e.g. the `.dbf` next to a `.shp`. Upper case extensions are used
/// when the shapefile itself has one and a lower case sidecar does not exist.
fn companion_path(filepath: &Path, extension: &str) -> PathBuf {
    let lowercase = filepath.with_extension(extension);
    if lowercase.exists() {
        return lowercase;
    }
    let uppercase = filepath.with_extension(extension.to_ascii_uppercase());
    if uppercase.exists() {
        uppercase
    } else {
        lowercase
    }
}

/// The `.cpg` sidecar wins over `fallback_encoding` when it names a known encoding.
fn resolve_encoding(filepath: &Path, fallback_encoding: &'static Encoding) -> &'static Encoding {
    let cpg_path = companion_path(filepath, "cpg");
    match fs::read_to_string(&cpg_path) {
        Ok(contents) => match encoding_for_label(&contents) {
            Some(encoding) => encoding,
            None => {
                log::warn!(
                    "Unknown encoding '{}' in {:?}, using {}",
                    contents.trim(),
                    cpg_path,
                    fallback_encoding.name()
                );
                fallback_encoding
            }
        },
        Err(_) => fallback_encoding,
    }
}

fn read_crs(filepath: &Path) -> anyhow::Result<Option<Crs>> {
    let prj_path = companion_path(filepath, "prj");
    if !prj_path.exists() {
        return Ok(None);
    }
    let wkt = fs::read_to_string(&prj_path).with_context(|| format!("Reading {:?}", prj_path))?;
    if wkt.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(Crs::parse(&wkt)))
}

/// Read every shape and attribute record of a shapefile into memory.
///
/// Attribute text is decoded with the encoding named by the `.cpg` sidecar, or with
/// `fallback_encoding` when there is none. The CRS comes from the `.prj` sidecar and is `None`
/// when that file is missing.
pub fn read_features_from_shapefile(
    filepath: &Path,
    fallback_encoding: &'static Encoding,
) -> anyhow::Result<FeatureCollection> {
    let shapes = shapefile::ShapeReader::from_path(filepath)
        .and_then(|mut reader| reader.read())
        .map_err(|err| anyhow!("Could not read shapes from {:?}, {}", filepath, err))?;

    let dbf_path = companion_path(filepath, "dbf");
    let encoding = resolve_encoding(filepath, fallback_encoding);
    log::debug!("Decoding {:?} as {}", dbf_path, encoding.name());
    let mut table_reader = dbase::Reader::from_path_with_encoding(
        &dbf_path,
        dbase::encoding::EncodingRs::from(encoding),
    )
    .map_err(|err| anyhow!("Could not open attribute table {:?}, {}", dbf_path, err))?;
    let field_names: Vec<String> = table_reader
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();
    let records = table_reader
        .read()
        .map_err(|err| anyhow!("Could not read attribute table {:?}, {}", dbf_path, err))?;

    if shapes.len() != records.len() {
        return Err(anyhow!(
            "Found {} shapes but {} attribute records",
            shapes.len(),
            records.len()
        ));
    }

    let features = shapes
        .into_iter()
        .zip(records)
        .enumerate()
        .map(|(index, (shape, mut record))| {
            let geometry = shape_to_geometry(shape)
                .with_context(|| format!("Converting shape {}", index))?;
            // Records are hash maps, attributes keep the table's column order.
            let attributes: Attributes = field_names
                .iter()
                .filter_map(|name| {
                    let value = record.remove(name)?;
                    Some((name.clone(), field_value_to_json(value)))
                })
                .collect();
            Ok(Feature {
                geometry,
                attributes,
            })
        })
        .collect::<anyhow::Result<Vec<Feature>>>()?;

    Ok(FeatureCollection {
        features,
        field_names,
        crs: read_crs(filepath)?,
    })
}

trait PlanarPoint {
    fn coord(&self) -> geo::Coord;
}

impl PlanarPoint for shapefile::Point {
    fn coord(&self) -> geo::Coord {
        geo::Coord {
            x: self.x,
            y: self.y,
        }
    }
}

impl PlanarPoint for shapefile::PointM {
    fn coord(&self) -> geo::Coord {
        geo::Coord {
            x: self.x,
            y: self.y,
        }
    }
}

impl PlanarPoint for shapefile::PointZ {
    fn coord(&self) -> geo::Coord {
        geo::Coord {
            x: self.x,
            y: self.y,
        }
    }
}

fn line_string<P: PlanarPoint>(points: &[P]) -> geo::LineString {
    points.iter().map(PlanarPoint::coord).collect()
}

fn multi_point<P: PlanarPoint>(points: &[P]) -> geo::Geometry {
    geo::Geometry::MultiPoint(
        points
            .iter()
            .map(|point| geo::Point::from(point.coord()))
            .collect(),
    )
}

/// Single part polylines become LineStrings, multi part ones MultiLineStrings.
fn polyline<P: PlanarPoint>(parts: &[Vec<P>]) -> geo::Geometry {
    match parts {
        [part] => geo::Geometry::LineString(line_string(part)),
        _ => geo::Geometry::MultiLineString(geo::MultiLineString(
            parts.iter().map(|part| line_string(part)).collect(),
        )),
    }
}

/// Each outer ring starts a new polygon, inner rings are holes of the preceding outer ring.
fn polygon<P: PlanarPoint>(rings: &[PolygonRing<P>]) -> geo::Geometry {
    let mut polygons: Vec<geo::Polygon> = Vec::new();
    for ring in rings {
        let ring_line = line_string(ring.points());
        match ring {
            PolygonRing::Inner(_) if !polygons.is_empty() => {
                let last = polygons.len() - 1;
                polygons[last].interiors_push(ring_line);
            }
            _ => polygons.push(geo::Polygon::new(ring_line, vec![])),
        }
    }
    if polygons.len() == 1 {
        geo::Geometry::Polygon(polygons.remove(0))
    } else {
        geo::Geometry::MultiPolygon(geo::MultiPolygon(polygons))
    }
}

/// Convert a shape to a 2D geometry. Z and M values are dropped.
pub fn shape_to_geometry(shape: Shape) -> anyhow::Result<Option<geo::Geometry>> {
    let geometry = match shape {
        Shape::NullShape => return Ok(None),
        Shape::Point(point) => geo::Geometry::Point(point.coord().into()),
        Shape::PointM(point) => geo::Geometry::Point(point.coord().into()),
        Shape::PointZ(point) => geo::Geometry::Point(point.coord().into()),
        Shape::Polyline(line) => polyline(line.parts()),
        Shape::PolylineM(line) => polyline(line.parts()),
        Shape::PolylineZ(line) => polyline(line.parts()),
        Shape::Polygon(shape) => polygon(shape.rings()),
        Shape::PolygonM(shape) => polygon(shape.rings()),
        Shape::PolygonZ(shape) => polygon(shape.rings()),
        Shape::Multipoint(points) => multi_point(points.points()),
        Shape::MultipointM(points) => multi_point(points.points()),
        Shape::MultipointZ(points) => multi_point(points.points()),
        Shape::Multipatch(_) => return Err(anyhow!("Multipatch shapes are not supported")),
    };
    Ok(Some(geometry))
}

fn number_or_null(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn field_value_to_json(value: FieldValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        FieldValue::Character(Some(text)) => Value::String(text),
        FieldValue::Numeric(Some(number)) => number_or_null(number),
        FieldValue::Logical(Some(flag)) => Value::Bool(flag),
        FieldValue::Date(Some(date)) => Value::String(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        FieldValue::Float(Some(number)) => number_or_null(number as f64),
        FieldValue::Integer(number) => Value::Number(number.into()),
        FieldValue::Currency(number) => number_or_null(number),
        FieldValue::DateTime(date_time) => {
            let date = date_time.date();
            Value::String(format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                date.month(),
                date.day()
            ))
        }
        FieldValue::Double(number) => number_or_null(number),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None)
        | FieldValue::Float(None) => Value::Null,
    }
}
