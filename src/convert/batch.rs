use indicatif::ProgressBar;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use super::{
    fields::{apply_field_selection, select_and_rename_fields, FieldSelection},
    simplify::simplify_features,
};
use crate::{
    config::ConversionSettings,
    crs::crs_utils::{needs_reprojection, reproject_features},
    error::{ConversionError, Result},
    geofile::{geojson::write_features_to_geojson, shapefile::read_features_from_shapefile},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub feature_count: usize,
    pub reprojected: bool,
    pub renamed_fields: bool,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub converted: Vec<ConvertedFile>,
    pub failed: Vec<(PathBuf, ConversionError)>,
}

/// List the `.shp` files directly inside `input_dir`, sorted by name.
pub fn discover_shapefiles(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(ConversionError::discovery(
            input_dir,
            "input directory does not exist",
        ));
    }
    let mut shapefiles = Vec::new();
    for entry in WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| ConversionError::discovery(input_dir, err))?;
        let is_shapefile = entry
            .path()
            .extension()
            .map_or(false, |extension| extension.eq_ignore_ascii_case("shp"));
        if entry.file_type().is_file() && is_shapefile {
            shapefiles.push(entry.into_path());
        }
    }
    if shapefiles.is_empty() {
        return Err(ConversionError::discovery(input_dir, "no .shp files found"));
    }
    Ok(shapefiles)
}

/// `<output_dir>/<input stem>.geojson`
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    output_dir.join(format!("{}.geojson", stem))
}

/// Load, filter, reproject, simplify and write one shapefile.
pub fn convert_file(input: &Path, settings: &ConversionSettings) -> Result<ConvertedFile> {
    log::info!("Reading {:?}", input);
    let mut collection = read_features_from_shapefile(input, settings.encoding)
        .map_err(|err| ConversionError::load(input, format!("{:#}", err)))?;
    let feature_count = collection.len();

    let selection = select_and_rename_fields(&collection.field_names, &settings.field_mapping);
    let renamed_fields = matches!(selection, FieldSelection::Rename(_));
    apply_field_selection(&mut collection, &selection);

    if collection.crs.is_none() {
        if let Some(fallback_crs) = &settings.source_crs_fallback {
            log::warn!("{:?} has no .prj, assuming {}", input, fallback_crs);
            collection.crs = Some(fallback_crs.clone());
        }
    }
    let reprojected = needs_reprojection(collection.crs.as_ref(), &settings.target_crs);
    if reprojected {
        log::info!(
            "Projecting {} features to {}",
            feature_count,
            settings.target_crs
        );
        reproject_features(&mut collection, &settings.target_crs)
            .map_err(|err| ConversionError::transform(input, format!("{:#}", err)))?;
    }

    // Always after reprojection, so the tolerance is in target CRS units.
    log::info!("Simplifying geometries");
    simplify_features(
        &mut collection,
        settings.simplify_algorithm,
        settings.simplify_tolerance,
    );
    debug_assert_eq!(collection.len(), feature_count);

    let output = output_path_for(input, &settings.output_dir);
    let name = input.file_stem().unwrap_or_default().to_string_lossy();
    log::info!("Saving {:?}", output);
    write_features_to_geojson(&collection, &name, &output)
        .map_err(|err| ConversionError::write(&output, err))?;

    Ok(ConvertedFile {
        input: input.to_path_buf(),
        output,
        feature_count,
        reprojected,
        renamed_fields,
    })
}

/// Convert every shapefile of the input directory.
///
/// Only a missing output directory that cannot be created, or failed discovery, is returned as
/// an error. Failures of single files are logged and collected in the report.
pub fn convert_directory(settings: &ConversionSettings) -> Result<BatchReport> {
    fs::create_dir_all(&settings.output_dir)
        .map_err(|err| ConversionError::write(&settings.output_dir, err))?;
    let shapefiles = discover_shapefiles(&settings.input_dir)?;
    log::info!(
        "Found {} shapefiles in {:?}",
        shapefiles.len(),
        settings.input_dir
    );

    let mut report = BatchReport::default();
    let bar = ProgressBar::new(shapefiles.len() as u64);
    for shapefile in shapefiles {
        match convert_file(&shapefile, settings) {
            Ok(converted) => report.converted.push(converted),
            Err(err) => {
                log::error!("Conversion error: {}", err);
                report.failed.push((shapefile, err));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    log::info!(
        "Converted {} of {} files",
        report.converted.len(),
        report.converted.len() + report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use approx::assert_relative_eq;
    use geo::CoordsIter;
    use serde_json::json;
    use testdir::testdir;

    use super::{convert_directory, discover_shapefiles, output_path_for};
    use crate::{
        config::{Config, ConversionSettings},
        error::ErrorKind,
        geofile::shapefile::test_utils::{
            write_polyline_shapefile, ESRI_WGS84_PRJ, WEB_MERCATOR_PRJ,
        },
    };

    fn settings_for(dir: &Path) -> ConversionSettings {
        let input_dir = dir.join("input");
        fs::create_dir_all(&input_dir).unwrap();
        Config {
            input_dir,
            output_dir: dir.join("output"),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn output_files(output_dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(output_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
        let radius = 6378137.0_f64;
        let lon = (x / radius).to_degrees();
        let lat = (2.0 * (y / radius).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
        (lon, lat)
    }

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(
                Path::new("N02-20_GML/N02-20_RailroadSection.shp"),
                Path::new("railway_geojson")
            ),
            Path::new("railway_geojson/N02-20_RailroadSection.geojson")
        );
    }

    #[test]
    fn test_empty_directory_reports_discovery_error() {
        let settings = settings_for(&testdir!());
        fs::write(settings.input_dir.join("readme.txt"), "no shapefiles here").unwrap();

        let err = convert_directory(&settings).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Discovery);
        assert!(output_files(&settings.output_dir).is_empty());
    }

    #[test]
    fn test_missing_input_directory_reports_discovery_error() {
        let err = discover_shapefiles(&testdir!().join("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Discovery);
    }

    #[test]
    fn test_discovery_ignores_sidecars_and_sorts() {
        let dir = testdir!();
        for name in ["b.shp", "a.SHP", "a.dbf", "b.prj", "c.geojson"] {
            fs::write(dir.join(name), "").unwrap();
        }
        let shapefiles = discover_shapefiles(&dir).unwrap();
        assert_eq!(shapefiles, vec![dir.join("a.SHP"), dir.join("b.shp")]);
    }

    #[test]
    fn test_projected_railway_end_to_end() {
        let settings = settings_for(&testdir!());
        let (x0, y0, x1, y1) = (15558765.0, 4256434.0, 15560765.0, 4258434.0);
        write_polyline_shapefile(
            &settings.input_dir,
            "N02-20_RailroadSection",
            &["N02_001", "N02_002", "N02_003", "N02_004"],
            &[(
                vec![(x0, y0), (x1, y1)],
                vec!["11", "2", "Yamanote Line", "JR East"],
            )],
            Some(WEB_MERCATOR_PRJ),
        );

        let report = convert_directory(&settings).unwrap();

        assert!(report.failed.is_empty());
        assert_eq!(report.converted.len(), 1);
        let converted = &report.converted[0];
        assert_eq!(converted.feature_count, 1);
        assert!(converted.reprojected);
        assert!(converted.renamed_fields);

        let output_path = settings.output_dir.join("N02-20_RailroadSection.geojson");
        // Properties are written in mapping order, not sorted.
        let raw = fs::read_to_string(&output_path).unwrap();
        assert!(raw.contains(r#""properties":{"line_name":"Yamanote Line","company":"JR East"}"#));
        let output = read_json(&output_path);
        let features = output["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(
            features[0]["properties"],
            json!({"line_name": "Yamanote Line", "company": "JR East"})
        );
        let coordinates = features[0]["geometry"]["coordinates"].as_array().unwrap();
        assert_eq!(coordinates.len(), 2);
        for (coordinate, (x, y)) in coordinates.iter().zip([(x0, y0), (x1, y1)]) {
            let (lon, lat) = web_mercator_to_wgs84(x, y);
            let written_lon = coordinate[0].as_f64().unwrap();
            let written_lat = coordinate[1].as_f64().unwrap();
            assert!((-180.0..=180.0).contains(&written_lon));
            assert!((-90.0..=90.0).contains(&written_lat));
            assert_relative_eq!(written_lon, lon, epsilon = 1e-6);
            assert_relative_eq!(written_lat, lat, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_unmatched_fields_are_kept_unchanged() {
        let settings = settings_for(&testdir!());
        write_polyline_shapefile(
            &settings.input_dir,
            "stations",
            &["N02_003", "N02_005"],
            &[(
                vec![(139.70, 35.68), (139.71, 35.69)],
                vec!["Yamanote Line", "Tokyo"],
            )],
            Some(ESRI_WGS84_PRJ),
        );

        let report = convert_directory(&settings).unwrap();

        let converted = &report.converted[0];
        assert!(!converted.reprojected);
        assert!(!converted.renamed_fields);
        let output = read_json(&converted.output);
        assert_eq!(
            output["features"][0]["properties"],
            json!({"N02_003": "Yamanote Line", "N02_005": "Tokyo"})
        );
    }

    #[test]
    fn test_failed_file_does_not_stop_batch() {
        let settings = settings_for(&testdir!());
        let row = (
            vec![(139.70, 35.68), (139.71, 35.69)],
            vec!["Yamanote Line", "JR East"],
        );
        write_polyline_shapefile(
            &settings.input_dir,
            "a_broken",
            &["N02_003", "N02_004"],
            &[row.clone()],
            Some(ESRI_WGS84_PRJ),
        );
        fs::remove_file(settings.input_dir.join("a_broken.dbf")).unwrap();
        write_polyline_shapefile(
            &settings.input_dir,
            "b_valid",
            &["N02_003", "N02_004"],
            &[row],
            Some(ESRI_WGS84_PRJ),
        );

        let report = convert_directory(&settings).unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, settings.input_dir.join("a_broken.shp"));
        assert_eq!(report.failed[0].1.kind(), ErrorKind::Load);
        assert_eq!(report.converted.len(), 1);
        assert_eq!(output_files(&settings.output_dir), vec!["b_valid.geojson"]);
    }

    #[test]
    fn test_missing_prj_without_fallback_fails_to_transform() {
        let settings = settings_for(&testdir!());
        write_polyline_shapefile(
            &settings.input_dir,
            "naive",
            &["N02_003", "N02_004"],
            &[(vec![(139.70, 35.68), (139.71, 35.69)], vec!["a", "b"])],
            None,
        );

        let report = convert_directory(&settings).unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1.kind(), ErrorKind::Transform);
    }

    #[test]
    fn test_missing_prj_uses_fallback_crs() {
        let dir = testdir!();
        let mut settings = settings_for(&dir);
        settings.source_crs_fallback = Some(crate::crs::crs_utils::Crs::wgs84());
        write_polyline_shapefile(
            &settings.input_dir,
            "naive",
            &["N02_003", "N02_004"],
            &[(vec![(139.70, 35.68), (139.71, 35.69)], vec!["a", "b"])],
            None,
        );

        let report = convert_directory(&settings).unwrap();

        assert!(report.failed.is_empty());
        assert!(!report.converted[0].reprojected);
    }

    #[test]
    fn test_conversion_is_deterministic_and_simplifies() {
        let dir = testdir!();
        let settings = settings_for(&dir);
        let wiggly_line = vec![
            (139.7000, 35.6800),
            (139.7050, 35.6802),
            (139.7100, 35.6799),
            (139.7150, 35.6801),
            (139.7200, 35.6800),
            (139.7200, 35.6900),
        ];
        write_polyline_shapefile(
            &settings.input_dir,
            "line",
            &["N02_003", "N02_004"],
            &[
                (wiggly_line, vec!["Chuo Line", "JR East"]),
                (vec![(139.0, 35.0), (139.5, 35.5)], vec!["Ome Line", "JR East"]),
            ],
            Some(ESRI_WGS84_PRJ),
        );
        let mut second_settings = settings.clone();
        second_settings.output_dir = dir.join("output_again");

        convert_directory(&settings).unwrap();
        convert_directory(&second_settings).unwrap();

        let first = fs::read_to_string(settings.output_dir.join("line.geojson")).unwrap();
        let second = fs::read_to_string(second_settings.output_dir.join("line.geojson")).unwrap();
        assert_eq!(first, second);

        let output: geojson::GeoJson = first.parse().unwrap();
        let collection = geojson::FeatureCollection::try_from(output).unwrap();
        assert_eq!(collection.features.len(), 2);
        let geometry: geo::Geometry = collection.features[0]
            .geometry
            .clone()
            .unwrap()
            .value
            .try_into()
            .unwrap();
        assert_eq!(geometry.coords_count(), 3);
    }
}
