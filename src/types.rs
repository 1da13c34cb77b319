use crate::data::{coerce_number, nan};
use anyhow::{anyhow, Error};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Case counts for one country, as published in the COVID snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CovidRecord {
    pub confirmed: u64,
    pub deaths: u64,
    #[serde(default)]
    pub recovered: u64,
}

impl CovidRecord {
    /// Deaths per confirmed case. NaN when there are no confirmed cases.
    pub fn fatality_rate(&self) -> f64 {
        self.deaths as f64 / self.confirmed as f64
    }
}

/// One row of the population dataset.
///
/// The published document is a CSV converted to JSON, so every numeric
/// field may arrive as a string and is coerced on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    #[serde(default)]
    pub yearcode: String,
    #[serde(default)]
    pub countryname: String,
    pub countrycode: String,
    #[serde(default = "nan", deserialize_with = "coerce_number")]
    pub totalpop: f64,
    #[serde(default = "nan", deserialize_with = "coerce_number")]
    pub urbanpop: f64,
    #[serde(default = "nan", deserialize_with = "coerce_number")]
    pub ruralpop: f64,
    #[serde(default = "nan", deserialize_with = "coerce_number")]
    pub netmigration: f64,
}

impl PopulationRecord {
    pub fn urban_ratio(&self) -> f64 {
        self.urbanpop / self.totalpop
    }
}

/// Whatever the two datasets hold for one country code.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountryStats<'a> {
    pub covid: Option<&'a CovidRecord>,
    pub population: Option<&'a PopulationRecord>,
}

/// Which statistic drives the fill color, legend and tooltip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Confirmed cases per head of population.
    Covid,
    /// Urban share of the population.
    Population,
    /// Deaths per confirmed case.
    Fatality,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Covid, Mode::Population, Mode::Fatality];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Covid => "covid",
            Mode::Population => "population",
            Mode::Fatality => "fatality",
        }
    }

    /// Whether `stats` carries every record this mode reads.
    pub fn has_data(&self, stats: &CountryStats<'_>) -> bool {
        match self {
            Mode::Covid => stats.covid.is_some() && stats.population.is_some(),
            Mode::Population => stats.population.is_some(),
            Mode::Fatality => stats.covid.is_some(),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown mode '{}' (expected covid, population or fatality)", s))
    }
}

/// A country boundary from the geometry dataset.
#[derive(Debug, Clone)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}
