use crate::config::AppConfig;
use crate::types::{Country, CovidRecord, PopulationRecord};
use anyhow::{anyhow, bail, Context, Result};
use geo::MultiPolygon;
use geojson::GeoJson;
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use shapefile::Reader;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            Source::Remote(location.to_string())
        } else {
            Source::Local(PathBuf::from(location))
        }
    }

    /// Lowercased file extension, ignoring any URL query string.
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            Source::Remote(url) => url.split(&['?', '#'][..]).next().unwrap_or(url),
            Source::Local(path) => path.to_str()?,
        };
        let file = path.rsplit('/').next()?;
        let (_, ext) = file.rsplit_once('.')?;
        Some(ext.to_lowercase())
    }
}

/// The COVID document as published.
#[derive(Debug, Deserialize)]
struct CovidDocument {
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    date: Option<String>,
    result: Vec<CovidEntry>,
}

/// One `{"<code>": {...}}` object from the `result` array. Only the
/// first key in document order is read; any further keys are skipped.
#[derive(Debug)]
struct CovidEntry(Option<(String, CovidRecord)>);

impl<'de> Deserialize<'de> for CovidEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = CovidEntry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object keyed by country code")
            }

            fn visit_map<A>(self, mut map: A) -> Result<CovidEntry, A::Error>
            where
                A: MapAccess<'de>,
            {
                let first = map.next_entry::<String, CovidRecord>()?;
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(CovidEntry(first))
            }
        }

        deserializer.deserialize_map(EntryVisitor)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CovidSnapshot {
    pub date: Option<String>,
    pub records: Vec<(String, CovidRecord)>,
}

/// Everything fetched at startup.
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    pub covid: CovidSnapshot,
    pub population: Vec<PopulationRecord>,
    pub countries: Vec<Country>,
}

pub async fn load_data(config: &AppConfig) -> Result<Datasets> {
    info!("Loading datasets...");

    let covid = fetch_covid(&Source::parse(&config.input.covid)).await?;
    info!("Loaded COVID data for {} countries", covid.records.len());

    let population = fetch_population(&Source::parse(&config.input.population)).await?;
    info!("Loaded population data for {} countries", population.len());

    let countries = fetch_boundaries(
        &Source::parse(&config.input.boundaries),
        config.input.join_property.as_deref(),
        &config.input.name_property,
    )
    .await?;
    info!("Loaded boundaries for {} countries", countries.len());

    Ok(Datasets { covid, population, countries })
}

pub async fn fetch_covid(source: &Source) -> Result<CovidSnapshot> {
    let bytes = fetch_bytes(source, "covid").await?;
    parse_covid(&bytes)
}

pub async fn fetch_population(source: &Source) -> Result<Vec<PopulationRecord>> {
    let bytes = fetch_bytes(source, "population").await?;
    match source.extension().as_deref() {
        Some("csv") => parse_population_csv(&bytes),
        _ => parse_population_json(&bytes),
    }
}

pub async fn fetch_boundaries(
    source: &Source,
    join_property: Option<&str>,
    name_property: &str,
) -> Result<Vec<Country>> {
    if let (Source::Local(path), Some("shp")) = (source, source.extension().as_deref()) {
        let join_property = join_property
            .ok_or_else(|| anyhow!("Shapefile boundaries need input.join_property"))?;
        return load_shapefile(path, join_property, name_property);
    }
    let bytes = fetch_bytes(source, "boundary").await?;
    parse_boundaries(&bytes, join_property, name_property)
}

async fn fetch_bytes(source: &Source, what: &str) -> Result<Vec<u8>> {
    match source {
        Source::Remote(url) => {
            debug!("GET {}", url);
            let response = reqwest::get(url)
                .await
                .with_context(|| format!("Failed to fetch {} data from {}", what, url))?;
            if !response.status().is_success() {
                bail!("Failed to fetch {} data: {}", what, response.status());
            }
            let body = response
                .bytes()
                .await
                .with_context(|| format!("Failed to read {} data from {}", what, url))?;
            Ok(body.to_vec())
        }
        Source::Local(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {} data: {:?}", what, path)),
    }
}

pub fn parse_covid(bytes: &[u8]) -> Result<CovidSnapshot> {
    let document: CovidDocument =
        serde_json::from_slice(bytes).context("Failed to parse covid data")?;

    let records: Vec<(String, CovidRecord)> = document
        .result
        .into_iter()
        .filter_map(|entry| entry.0)
        .collect();

    if let Some(count) = document.count {
        if count as usize != records.len() {
            warn!("COVID document reports {} countries but holds {}", count, records.len());
        }
    }

    Ok(CovidSnapshot { date: document.date, records })
}

pub fn parse_population_json(bytes: &[u8]) -> Result<Vec<PopulationRecord>> {
    let records: Vec<PopulationRecord> =
        serde_json::from_slice(bytes).context("Failed to parse population data")?;
    Ok(keep_coded(records))
}

/// Reads the population table in its pre-conversion CSV form.
pub fn parse_population_csv(bytes: &[u8]) -> Result<Vec<PopulationRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);
    let mut records = Vec::new();
    for (row, result) in rdr.deserialize().enumerate() {
        let record: PopulationRecord =
            result.with_context(|| format!("Failed to parse population CSV row {}", row + 1))?;
        records.push(record);
    }
    Ok(keep_coded(records))
}

fn keep_coded(records: Vec<PopulationRecord>) -> Vec<PopulationRecord> {
    let before = records.len();
    let records: Vec<PopulationRecord> = records
        .into_iter()
        .filter(|r| !r.countrycode.trim().is_empty())
        .collect();
    if records.len() < before {
        warn!("Skipped {} population rows without a country code", before - records.len());
    }
    records
}

/// GeoJSON FeatureCollection of country outlines.
///
/// The join key is the feature `id`, or `join_property` when given.
/// Non-areal features are skipped.
pub fn parse_boundaries(
    bytes: &[u8],
    join_property: Option<&str>,
    name_property: &str,
) -> Result<Vec<Country>> {
    let geojson = GeoJson::from_reader(bytes).context("Failed to parse boundary GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Boundary GeoJSON must be a FeatureCollection")),
    };

    let mut countries = Vec::new();

    for feature in collection.features {
        let key = match join_property {
            Some(property) => feature.property(property).and_then(json_key),
            None => match &feature.id {
                Some(geojson::feature::Id::String(s)) => Some(s.clone()),
                Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
                None => None,
            },
        };
        let Some(code) = key else {
            debug!("Skipping boundary feature without a join key");
            continue;
        };

        let name = feature
            .property(name_property)
            .and_then(|v| v.as_str())
            .unwrap_or(&code)
            .to_string();

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of {}: {:?}", code, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        countries.push(Country { code, name, geometry });
    }

    Ok(countries)
}

fn json_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn load_shapefile(path: &Path, join_property: &str, name_property: &str) -> Result<Vec<Country>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut countries = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let code = match record.get(join_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(shapefile::dbase::FieldValue::Character(None)) => continue,
            Some(_) => bail!("Shapefile join column must be a string"),
            None => bail!("Join column '{}' not found in Shapefile", join_property),
        };

        let name = match record.get(name_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            _ => code.clone(),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.into(),
            shapefile::Shape::PolygonM(polygon) => polygon.into(),
            shapefile::Shape::PolygonZ(polygon) => polygon.into(),
            _ => {
                debug!("Skipping non-polygon shape for {}", code);
                continue;
            }
        };

        countries.push(Country { code, name, geometry });
    }

    Ok(countries)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(f64),
    Text(String),
    Null,
}

/// Numeric coercion with JavaScript `Number()` rules: null and blank text
/// are 0, anything unparsable is NaN.
pub fn coerce_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LooseNumber::deserialize(deserializer)? {
        LooseNumber::Number(n) => n,
        LooseNumber::Text(s) => number_from_text(&s),
        LooseNumber::Null => 0.0,
    })
}

/// `Number(text)`: decimal with optional sign and exponent, unsigned
/// `0x`/`0o`/`0b` integers, and the exact spelling `Infinity`.
pub fn number_from_text(text: &str) -> f64 {
    let s = text.trim();
    if s.is_empty() {
        return 0.0;
    }

    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.starts_with('+') {
            return f64::NAN;
        }
        return u128::from_str_radix(digits, radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }

    // Rust also accepts "inf", "nan" and "infinity" in any case.
    let unsigned = s.strip_prefix(&['+', '-'][..]).unwrap_or(s);
    if unsigned.starts_with(|c: char| c.is_ascii_alphabetic()) && unsigned != "Infinity" {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

/// Missing numeric fields coerce to NaN.
pub fn nan() -> f64 {
    f64::NAN
}
