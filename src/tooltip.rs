//! Tooltip payloads shown when a country is hovered or clicked.
//!
//! The payload is a tagged value per mode; [`Tooltip::rows`] flattens it
//! into labelled, display-formatted rows shared by the HTML and plain
//! text renderings.

use crate::types::{CountryStats, Mode};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tooltip {
    NoData {
        name: String,
    },
    Covid {
        name: String,
        confirmed: u64,
        population: f64,
        deaths: u64,
        fatality_rate: f64,
        infection_rate: f64,
    },
    Population {
        name: String,
        urban: f64,
        rural: f64,
        total: f64,
        urban_ratio: f64,
    },
    Fatality {
        name: String,
        confirmed: u64,
        deaths: u64,
        recovered: u64,
        fatality_rate: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipRow {
    pub label: &'static str,
    pub value: String,
    /// The statistic the current fill color is derived from.
    pub focus: bool,
}

impl TooltipRow {
    fn new(label: &'static str, value: String) -> Self {
        Self { label, value, focus: false }
    }

    fn focused(label: &'static str, value: String) -> Self {
        Self { label, value, focus: true }
    }
}

pub fn tooltip(mode: Mode, name: &str, stats: &CountryStats<'_>) -> Tooltip {
    let name = name.to_string();
    match (mode, stats.covid, stats.population) {
        (Mode::Covid, Some(covid), Some(population)) => Tooltip::Covid {
            name,
            confirmed: covid.confirmed,
            population: population.totalpop,
            deaths: covid.deaths,
            fatality_rate: covid.fatality_rate(),
            infection_rate: covid.confirmed as f64 / population.totalpop,
        },
        (Mode::Population, _, Some(population)) => Tooltip::Population {
            name,
            urban: population.urbanpop,
            rural: population.ruralpop,
            total: population.totalpop,
            urban_ratio: population.urban_ratio(),
        },
        (Mode::Fatality, Some(covid), _) => Tooltip::Fatality {
            name,
            confirmed: covid.confirmed,
            deaths: covid.deaths,
            recovered: covid.recovered,
            fatality_rate: covid.fatality_rate(),
        },
        (Mode::Covid | Mode::Population | Mode::Fatality, _, _) => Tooltip::NoData { name },
    }
}

impl Tooltip {
    pub fn name(&self) -> &str {
        match self {
            Tooltip::NoData { name }
            | Tooltip::Covid { name, .. }
            | Tooltip::Population { name, .. }
            | Tooltip::Fatality { name, .. } => name,
        }
    }

    pub fn heading(&self) -> Option<&'static str> {
        match self {
            Tooltip::NoData { .. } => None,
            Tooltip::Covid { .. } | Tooltip::Fatality { .. } => Some("COVID-19 Data"),
            Tooltip::Population { .. } => Some("Population Data"),
        }
    }

    pub fn rows(&self) -> Vec<TooltipRow> {
        match self {
            Tooltip::NoData { .. } => vec![TooltipRow::new("NO DATA FOUND", String::new())],
            Tooltip::Covid { confirmed, population, deaths, fatality_rate, infection_rate, .. } => vec![
                TooltipRow::new("Confirmed Cases", format_count(*confirmed as f64)),
                TooltipRow::new("Population", format_count(*population)),
                TooltipRow::new("Deaths", format_count(*deaths as f64)),
                TooltipRow::new("Case Fatality Rate", format_percent(*fatality_rate)),
                TooltipRow::focused("Infection Rate", format_percent(*infection_rate)),
            ],
            Tooltip::Population { urban, rural, total, urban_ratio, .. } => vec![
                TooltipRow::new("Urban Population", format_count(*urban)),
                TooltipRow::new("Rural Population", format_count(*rural)),
                TooltipRow::new("Total Population", format_count(*total)),
                TooltipRow::focused("Urban Ratio", format_percent(*urban_ratio)),
            ],
            Tooltip::Fatality { confirmed, deaths, recovered, fatality_rate, .. } => vec![
                TooltipRow::new("Confirmed Cases", format_count(*confirmed as f64)),
                TooltipRow::new("Deaths", format_count(*deaths as f64)),
                TooltipRow::new("Recovered", format_count(*recovered as f64)),
                TooltipRow::focused("Case Fatality Rate", format_percent(*fatality_rate)),
            ],
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<div>");
        let _ = write!(html, "<p id='country-name'>{}</p>", escape_html(self.name()));
        if let Some(heading) = self.heading() {
            let _ = write!(html, "<h4>{}</h4>", heading);
        }
        for row in self.rows() {
            let id = if row.focus { " id=\"focus\"" } else { "" };
            if row.value.is_empty() {
                let _ = write!(html, "<p{}><strong>{}</strong></p>", id, row.label);
            } else {
                let _ = write!(
                    html,
                    "<p{}><strong>{}: </strong><br>{}</p>",
                    id, row.label, row.value
                );
            }
        }
        html.push_str("</div>");
        html
    }

    pub fn to_text(&self) -> String {
        let mut text = self.name().to_string();
        if let Some(heading) = self.heading() {
            let _ = write!(text, " ({})", heading);
        }
        for row in self.rows() {
            let marker = if row.focus { "*" } else { " " };
            if row.value.is_empty() {
                let _ = write!(text, "\n{} {}", marker, row.label);
            } else {
                let _ = write!(text, "\n{} {}: {}", marker, row.label, row.value);
            }
        }
        text
    }
}

/// Whole number with comma thousands separators; "N/A" if not finite.
pub fn format_count(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Ratio as a percentage with two decimals; "N/A" if not finite.
pub fn format_percent(ratio: f64) -> String {
    if !ratio.is_finite() {
        return "N/A".to_string();
    }
    format!("{:.2}%", ratio * 100.0)
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
