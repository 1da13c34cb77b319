use crate::classify;
use crate::data::Datasets;
use crate::tooltip::{self, Tooltip};
use crate::types::{Country, CountryStats, CovidRecord, Mode, PopulationRecord};
use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

// Wrapper for RTree indexing
pub struct CountryEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for CountryEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Boundaries joined to both statistics snapshots.
///
/// Built once after load and never mutated; lookups by code are hash
/// lookups, lookups by position go through an R-tree of bounding boxes.
pub struct Atlas {
    countries: Vec<Country>,
    by_code: HashMap<String, usize>,
    covid: HashMap<String, CovidRecord>,
    population: HashMap<String, PopulationRecord>,
    tree: RTree<CountryEnvelope>,
    snapshot_date: Option<String>,
}

/// Everything a client needs to draw and describe one country.
#[derive(Debug, Clone, Serialize)]
pub struct CountryReport {
    pub code: String,
    pub name: String,
    pub mode: Mode,
    pub class: String,
    pub fill: Option<&'static str>,
    pub tooltip: Tooltip,
    pub html: String,
}

impl Atlas {
    pub fn new(datasets: Datasets) -> Self {
        let Datasets { covid, population, countries } = datasets;

        // First record wins when a code repeats.
        let mut covid_by_code = HashMap::new();
        for (code, record) in covid.records {
            covid_by_code.entry(code).or_insert(record);
        }
        let mut population_by_code = HashMap::new();
        for record in population {
            population_by_code.entry(record.countrycode.clone()).or_insert(record);
        }

        let mut by_code = HashMap::new();
        for (i, country) in countries.iter().enumerate() {
            by_code.entry(country.code.clone()).or_insert(i);
        }

        let tree_items: Vec<CountryEnvelope> = countries
            .iter()
            .enumerate()
            .filter_map(|(i, country)| {
                let rect = country.geometry.bounding_rect()?;
                Some(CountryEnvelope {
                    index: i,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        let tree = RTree::bulk_load(tree_items);

        let unmatched = countries
            .iter()
            .filter(|c| !covid_by_code.contains_key(&c.code) && !population_by_code.contains_key(&c.code))
            .count();
        info!(
            "Joined {} countries ({} without any statistics)",
            countries.len(),
            unmatched
        );

        Self {
            countries,
            by_code,
            covid: covid_by_code,
            population: population_by_code,
            tree,
            snapshot_date: covid.date,
        }
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn snapshot_date(&self) -> Option<&str> {
        self.snapshot_date.as_deref()
    }

    pub fn country(&self, code: &str) -> Option<&Country> {
        self.by_code.get(code).map(|&i| &self.countries[i])
    }

    /// Joined records for a code. Absent records are a normal outcome.
    pub fn stats(&self, code: &str) -> CountryStats<'_> {
        CountryStats {
            covid: self.covid.get(code),
            population: self.population.get(code),
        }
    }

    pub fn fill_color(&self, mode: Mode, code: &str) -> Option<&'static str> {
        classify::fill_color(mode, &self.stats(code))
    }

    /// Country under a lon/lat position.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&Country> {
        self.locate_index(lon, lat).map(|i| &self.countries[i])
    }

    /// Index into [`Atlas::countries`] of the country containing the point.
    pub fn locate_index(&self, lon: f64, lat: f64) -> Option<usize> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .find(|&i| self.countries[i].geometry.contains(&point))
    }

    /// Whether any country's bounding box touches the given box.
    pub fn any_within(&self, min: [f64; 2], max: [f64; 2]) -> bool {
        let envelope = AABB::from_corners(min, max);
        self.tree.locate_in_envelope_intersecting(&envelope).next().is_some()
    }

    pub fn report(&self, mode: Mode, country: &Country) -> CountryReport {
        let stats = self.stats(&country.code);
        let class = classify::classify(mode, &stats);
        let tooltip = tooltip::tooltip(mode, &country.name, &stats);
        CountryReport {
            code: country.code.clone(),
            name: country.name.clone(),
            mode,
            class: class.label(),
            fill: classify::scale_for(mode).color(class),
            html: tooltip.to_html(),
            tooltip,
        }
    }
}
