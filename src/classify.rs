use crate::types::{CountryStats, CovidRecord, Mode, PopulationRecord};

/// Yellow-to-red ramp shared by the infection and urban scales.
pub const RATE_PALETTE: [&str; 5] = ["#fff33b", "#fdc70c", "#f3903f", "#ed683c", "#e93e3a"];
pub const FATALITY_PALETTE: [&str; 5] = ["green", "yellow", "orange", "red", "maroon"];

pub const INFECTION_RATE_THRESHOLDS: [f64; 5] = [0.005, 0.01, 0.05, 0.1, 0.21];
pub const URBAN_RATIO_THRESHOLDS: [f64; 5] = [0.6, 0.7, 0.8, 0.9, 0.99];
pub const FATALITY_RATE_THRESHOLDS: [f64; 4] = [0.01, 0.02, 0.03, 0.5];

/// Outcome of classifying one country.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillClass {
    /// Missing records, an undefined ratio, or a value past the top of an
    /// open-ended scale. Drawn with the renderer's default style.
    NoData,
    /// Index into the scale's palette.
    Bucket(usize),
}

impl FillClass {
    pub fn label(&self) -> String {
        match self {
            FillClass::NoData => "no-data".to_string(),
            FillClass::Bucket(i) => format!("bucket-{}", i),
        }
    }
}

/// Ordered exclusive upper bounds mapped onto a five color palette.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub thresholds: &'static [f64],
    pub palette: &'static [&'static str; 5],
    /// Values at or above the last threshold take the next palette color
    /// instead of falling through to `NoData`.
    pub catch_all: bool,
}

pub const INFECTION_SCALE: Scale = Scale {
    thresholds: &INFECTION_RATE_THRESHOLDS,
    palette: &RATE_PALETTE,
    catch_all: false,
};

pub const URBAN_SCALE: Scale = Scale {
    thresholds: &URBAN_RATIO_THRESHOLDS,
    palette: &RATE_PALETTE,
    catch_all: false,
};

pub const FATALITY_SCALE: Scale = Scale {
    thresholds: &FATALITY_RATE_THRESHOLDS,
    palette: &FATALITY_PALETTE,
    catch_all: true,
};

impl Scale {
    /// First threshold the value is strictly below wins. An undefined ratio
    /// (NaN, or infinity from a zero denominator) always lands on `NoData`,
    /// catch-all or not.
    pub fn bucket(&self, value: f64) -> FillClass {
        if !value.is_finite() {
            return FillClass::NoData;
        }
        match self.thresholds.iter().position(|&upper| value < upper) {
            Some(i) => FillClass::Bucket(i),
            None if self.catch_all => FillClass::Bucket(self.thresholds.len()),
            None => FillClass::NoData,
        }
    }

    pub fn color(&self, class: FillClass) -> Option<&'static str> {
        match class {
            FillClass::NoData => None,
            FillClass::Bucket(i) => self.palette.get(i).copied(),
        }
    }
}

pub fn scale_for(mode: Mode) -> &'static Scale {
    match mode {
        Mode::Covid => &INFECTION_SCALE,
        Mode::Population => &URBAN_SCALE,
        Mode::Fatality => &FATALITY_SCALE,
    }
}

pub fn classify_by_infection_rate(
    covid: Option<&CovidRecord>,
    population: Option<&PopulationRecord>,
) -> FillClass {
    match (covid, population) {
        (Some(covid), Some(population)) => {
            INFECTION_SCALE.bucket(covid.confirmed as f64 / population.totalpop)
        }
        _ => FillClass::NoData,
    }
}

pub fn classify_by_urban_ratio(population: Option<&PopulationRecord>) -> FillClass {
    match population {
        Some(population) => URBAN_SCALE.bucket(population.urban_ratio()),
        None => FillClass::NoData,
    }
}

pub fn classify_by_fatality_rate(covid: Option<&CovidRecord>) -> FillClass {
    match covid {
        Some(covid) => FATALITY_SCALE.bucket(covid.fatality_rate()),
        None => FillClass::NoData,
    }
}

pub fn classify(mode: Mode, stats: &CountryStats<'_>) -> FillClass {
    match mode {
        Mode::Covid => classify_by_infection_rate(stats.covid, stats.population),
        Mode::Population => classify_by_urban_ratio(stats.population),
        Mode::Fatality => classify_by_fatality_rate(stats.covid),
    }
}

/// Palette color for a country in `mode`, `None` for the default style.
pub fn fill_color(mode: Mode, stats: &CountryStats<'_>) -> Option<&'static str> {
    scale_for(mode).color(classify(mode, stats))
}
