use crate::classify::scale_for;
use crate::tooltip::escape_html;
use crate::types::Mode;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub mode: Mode,
    pub title: &'static str,
    pub entries: Vec<LegendEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub color: &'static str,
    pub label: &'static str,
}

// Labels as published; the infection legend's last grade reads 20% while
// the threshold is 21%.
const INFECTION_LABELS: [&str; 5] = ["< 0.5%", "< 1%", "< 5%", "< 10%", "< 20%"];
const URBAN_LABELS: [&str; 5] = ["< 60%", "< 70%", "< 80%", "< 90%", "< 99%"];
const FATALITY_LABELS: [&str; 5] = ["< 1%", "< 2%", "< 3%", "< 50%", "≥ 50%"];

pub fn legend_for(mode: Mode) -> Legend {
    let (title, labels) = match mode {
        Mode::Covid => ("COVID-19 Infection Rate", &INFECTION_LABELS),
        Mode::Population => ("Urban Population Ratio", &URBAN_LABELS),
        Mode::Fatality => ("COVID-19 Case Fatality Rate", &FATALITY_LABELS),
    };
    let palette = scale_for(mode).palette;
    Legend {
        mode,
        title,
        entries: palette
            .iter()
            .zip(labels.iter())
            .map(|(&color, &label)| LegendEntry { color, label })
            .collect(),
    }
}

impl Legend {
    pub fn to_html(&self) -> String {
        let mut html = String::from("<div class=\"legend\">");
        let _ = write!(html, "<h4 class=\"legend-title\">{}</h4>", self.title);
        for entry in &self.entries {
            let _ = write!(
                html,
                "<i style=\"background-color:{}\">{}</i>",
                entry.color,
                escape_html(entry.label)
            );
        }
        html.push_str("</div>");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_has_five_entries() {
        for mode in Mode::ALL {
            let legend = legend_for(mode);
            assert_eq!(legend.entries.len(), 5);
            assert_eq!(legend.mode, mode);
        }
    }

    #[test]
    fn covid_legend_uses_rate_palette() {
        let legend = legend_for(Mode::Covid);
        assert_eq!(legend.title, "COVID-19 Infection Rate");
        assert_eq!(legend.entries[0], LegendEntry { color: "#fff33b", label: "< 0.5%" });
        assert_eq!(legend.entries[4].color, "#e93e3a");
    }

    #[test]
    fn fatality_legend_has_open_top() {
        let legend = legend_for(Mode::Fatality);
        assert_eq!(legend.entries[4], LegendEntry { color: "maroon", label: "≥ 50%" });
    }

    #[test]
    fn html_escapes_labels() {
        let html = legend_for(Mode::Population).to_html();
        assert!(html.starts_with("<div class=\"legend\"><h4 class=\"legend-title\">Urban Population Ratio</h4>"));
        assert!(html.contains("<i style=\"background-color:#fff33b\">&lt; 60%</i>"));
    }
}
