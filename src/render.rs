use crate::atlas::Atlas;
use crate::config::AppConfig;
use crate::legend::legend_for;
use crate::types::Mode;
use anyhow::{Context, Result};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use serde_json::json;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Constants for Web Mercator
const TILE_SIZE: u32 = 256;
pub const FILL_OPACITY: f64 = 0.75;

/// Every boundary feature, with fill and joined statistics as properties.
pub fn choropleth(atlas: &Atlas, mode: Mode) -> FeatureCollection {
    let features = atlas
        .countries()
        .iter()
        .map(|country| {
            let report = atlas.report(mode, country);
            let stats = atlas.stats(&country.code);

            let mut properties = JsonObject::new();
            properties.insert("name".to_string(), json!(country.name));
            properties.insert("mode".to_string(), json!(mode));
            properties.insert("class".to_string(), json!(report.class));
            properties.insert("has_data".to_string(), json!(mode.has_data(&stats)));
            properties.insert("fill".to_string(), json!(report.fill));
            properties.insert("fill-opacity".to_string(), json!(FILL_OPACITY));
            properties.insert("tooltip".to_string(), json!(report.tooltip));
            if let Some(covid) = stats.covid {
                properties.insert("covid".to_string(), json!(covid));
            }
            if let Some(population) = stats.population {
                properties.insert("population".to_string(), json!(population));
            }

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&country.geometry))),
                id: Some(Id::String(country.code.clone())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection { bbox: None, features, foreign_members: None }
}

/// Writes `choropleth_{mode}.geojson` plus the mode's legend as
/// `legend_{mode}.json` and `legend_{mode}.html` into the output directory.
pub fn write_choropleth(config: &AppConfig, atlas: &Atlas, mode: Mode) -> Result<PathBuf> {
    let dir = &config.output.dir;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let path = dir.join(format!("choropleth_{}.geojson", mode));
    let collection = choropleth(atlas, mode);
    let body = serde_json::to_string(&collection).context("Failed to serialize choropleth")?;
    fs::write(&path, body).with_context(|| format!("Failed to write {:?}", path))?;

    let legend = legend_for(mode);
    let legend_path = dir.join(format!("legend_{}.json", mode));
    let body = serde_json::to_string_pretty(&legend).context("Failed to serialize legend")?;
    fs::write(&legend_path, body).with_context(|| format!("Failed to write {:?}", legend_path))?;
    let html_path = dir.join(format!("legend_{}.html", mode));
    fs::write(&html_path, legend.to_html()).with_context(|| format!("Failed to write {:?}", html_path))?;

    info!("Wrote {:?} and {:?}", path, legend_path);
    Ok(path)
}

/// Renders `{tile_dir}/{mode}/{z}/{x}/{y}.png` for every configured zoom
/// level. Tiles with no filled pixel are not written. Returns the number of
/// tiles written.
pub fn generate_tiles(config: &AppConfig, atlas: &Atlas, mode: Mode) -> Result<usize> {
    info!(
        "Rendering {} tiles from min_zoom {} to max_zoom {}...",
        mode, config.output.min_zoom, config.output.max_zoom
    );

    let fills: Vec<Option<Rgba<u8>>> = atlas
        .countries()
        .iter()
        .map(|country| atlas.fill_color(mode, &country.code).and_then(parse_color))
        .collect();

    let mode_dir = config.output.tile_dir().join(mode.as_str());

    let counts = (config.output.min_zoom..=config.output.max_zoom)
        .into_par_iter()
        .map(|z| render_zoom_level(&mode_dir, atlas, &fills, z))
        .collect::<Result<Vec<usize>>>()?;

    let total: usize = counts.iter().sum();
    info!("Wrote {} {} tiles", total, mode);
    Ok(total)
}

fn render_zoom_level(
    mode_dir: &Path,
    atlas: &Atlas,
    fills: &[Option<Rgba<u8>>],
    zoom: u8,
) -> Result<usize> {
    let n = 1u32 << zoom;
    let tiles: Vec<(u32, u32)> = (0..n).flat_map(|x| (0..n).map(move |y| (x, y))).collect();

    let local_tiles: Vec<((u32, u32), RgbaImage)> = tiles
        .par_iter()
        .filter_map(|&(x, y)| render_tile(atlas, fills, zoom, x, y).map(|img| ((x, y), img)))
        .collect();

    debug!("z{}: {} of {} tiles have fills", zoom, local_tiles.len(), tiles.len());

    // Save tiles: {mode_dir}/{z}/{x}/{y}.png
    let z_dir = mode_dir.join(zoom.to_string());
    local_tiles
        .par_iter()
        .map(|((x, y), img)| {
            let x_dir = z_dir.join(x.to_string());
            fs::create_dir_all(&x_dir).with_context(|| format!("Failed to create {:?}", x_dir))?;
            let path = x_dir.join(format!("{}.png", y));
            img.save(&path).with_context(|| format!("Failed to save tile {:?}", path))
        })
        .collect::<Result<()>>()?;

    Ok(local_tiles.len())
}

fn render_tile(
    atlas: &Atlas,
    fills: &[Option<Rgba<u8>>],
    zoom: u8,
    x: u32,
    y: u32,
) -> Option<RgbaImage> {
    let (west, north) = tile_pixel_to_lon_lat(zoom, x, y, 0.0, 0.0);
    let (east, south) = tile_pixel_to_lon_lat(zoom, x + 1, y + 1, 0.0, 0.0);
    if !atlas.any_within([west, south], [east, north]) {
        return None;
    }

    let mut img: RgbaImage = ImageBuffer::new(TILE_SIZE, TILE_SIZE);
    let mut painted = false;

    for py in 0..TILE_SIZE {
        for px in 0..TILE_SIZE {
            let (lon, lat) = tile_pixel_to_lon_lat(zoom, x, y, px as f64 + 0.5, py as f64 + 0.5);
            let fill = atlas.locate_index(lon, lat).and_then(|i| fills[i]);
            if let Some(color) = fill {
                img.put_pixel(px, py, color);
                painted = true;
            }
        }
    }

    painted.then_some(img)
}

/// Palette color to RGBA at the fill opacity. Accepts `#rrggbb` and the
/// named colors of the fatality palette.
pub fn parse_color(color: &str) -> Option<Rgba<u8>> {
    let alpha = (FILL_OPACITY * 255.0).round() as u8;
    let rgb = match color {
        "green" => [0x00, 0x80, 0x00],
        "yellow" => [0xff, 0xff, 0x00],
        "orange" => [0xff, 0xa5, 0x00],
        "red" => [0xff, 0x00, 0x00],
        "maroon" => [0x80, 0x00, 0x00],
        hex => {
            let hex = hex.strip_prefix('#')?;
            if hex.len() != 6 || !hex.is_ascii() {
                return None;
            }
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            [r, g, b]
        }
    };
    Some(Rgba([rgb[0], rgb[1], rgb[2], alpha]))
}

// Coordinate conversions
fn tile_pixel_to_lon_lat(zoom: u8, tx: u32, ty: u32, px: f64, py: f64) -> (f64, f64) {
    let n = 2.0_f64.powi(zoom as i32);
    let x_t = tx as f64 + px / TILE_SIZE as f64;
    let y_t = ty as f64 + py / TILE_SIZE as f64;

    let lon = x_t / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y_t / n)).sinh().atan().to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::fixtures::sample_atlas;

    fn test_config(dir: &Path) -> AppConfig {
        let content = format!(
            r#"
            [input]
            covid = "covid.json"
            population = "pop.json"
            boundaries = "countries.geo.json"

            [output]
            dir = "{}"
            min_zoom = 0
            max_zoom = 0
            "#,
            dir.display()
        );
        AppConfig::from_toml_str(&content).unwrap()
    }

    #[test]
    fn parses_palette_colors() {
        assert_eq!(parse_color("#fff33b"), Some(Rgba([0xff, 0xf3, 0x3b, 191])));
        assert_eq!(parse_color("maroon"), Some(Rgba([0x80, 0x00, 0x00, 191])));
        assert_eq!(parse_color("#fff"), None);
        assert_eq!(parse_color("clear"), None);
    }

    #[test]
    fn tile_corners() {
        let (lon, lat) = tile_pixel_to_lon_lat(0, 0, 0, 0.0, 0.0);
        assert_eq!(lon, -180.0);
        assert!((lat - 85.0511).abs() < 1e-3);

        let (lon, lat) = tile_pixel_to_lon_lat(0, 0, 0, 128.0, 128.0);
        assert!(lon.abs() < 1e-9);
        assert!(lat.abs() < 1e-9);

        let (lon, _) = tile_pixel_to_lon_lat(1, 1, 0, 0.0, 0.0);
        assert_eq!(lon, 0.0);
    }

    #[test]
    fn choropleth_features_carry_fill() {
        let atlas = sample_atlas();
        let collection = choropleth(&atlas, Mode::Covid);
        assert_eq!(collection.features.len(), 3);

        let alpha = &collection.features[0];
        assert_eq!(alpha.id, Some(Id::String("AAA".into())));
        let props = alpha.properties.as_ref().unwrap();
        assert_eq!(props["fill"], "#f3903f");
        assert_eq!(props["class"], "bucket-2");
        assert_eq!(props["covid"]["confirmed"], 2_000);

        let charlie = collection.features[2].properties.as_ref().unwrap();
        assert!(charlie["fill"].is_null());
        assert_eq!(charlie["tooltip"]["kind"], "no_data");
        assert_eq!(charlie["has_data"], false);
    }

    #[test]
    fn writes_choropleth_and_legend() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let atlas = sample_atlas();

        let path = write_choropleth(&config, &atlas, Mode::Population).unwrap();
        assert_eq!(path, dir.path().join("choropleth_population.geojson"));

        let body = fs::read_to_string(&path).unwrap();
        let parsed: geojson::GeoJson = body.parse().unwrap();
        assert!(matches!(parsed, geojson::GeoJson::FeatureCollection(_)));

        let legend = fs::read_to_string(dir.path().join("legend_population.json")).unwrap();
        assert!(legend.contains("Urban Population Ratio"));
        assert!(dir.path().join("legend_population.html").exists());
    }

    #[test]
    fn renders_filled_tile() {
        let atlas = sample_atlas();
        let fills: Vec<Option<Rgba<u8>>> = atlas
            .countries()
            .iter()
            .map(|c| atlas.fill_color(Mode::Covid, &c.code).and_then(parse_color))
            .collect();

        let img = render_tile(&atlas, &fills, 0, 0, 0).unwrap();
        // lon/lat (4.9, 4.9) sits inside AAA
        assert_eq!(*img.get_pixel(131, 124), Rgba([0xf3, 0x90, 0x3f, 191]));
        // open ocean
        assert_eq!(img.get_pixel(10, 10)[3], 0);
    }

    #[test]
    fn skips_tiles_without_fills() {
        let atlas = sample_atlas();
        let fills = vec![None; atlas.countries().len()];
        assert!(render_tile(&atlas, &fills, 0, 0, 0).is_none());
        // z1 north-west quadrant holds no country
        let fills: Vec<Option<Rgba<u8>>> = vec![parse_color("red"); atlas.countries().len()];
        assert!(render_tile(&atlas, &fills, 1, 0, 0).is_none());
    }

    #[test]
    fn generates_tile_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let atlas = sample_atlas();

        let written = generate_tiles(&config, &atlas, Mode::Covid).unwrap();
        assert_eq!(written, 1);
        assert!(dir.path().join("tiles/covid/0/0/0.png").exists());
    }
}
