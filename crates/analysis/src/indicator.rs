use serde::{Deserialize, Serialize};

use crate::config::{AnalysisType, TemporalResolution};

/// A variable the backend can analyse, as listed by `GET /indicator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub name: String,
    pub variable: String,
    pub source: String,
    #[serde(default)]
    pub analysis_types: Vec<AnalysisType>,
    #[serde(default)]
    pub temporal_resolutions: Vec<TemporalResolution>,
}

impl Indicator {
    /// An indicator with no resolutions listed is offered at every resolution.
    pub fn applies_to(
        &self,
        analysis_type: AnalysisType,
        resolution: Option<TemporalResolution>,
    ) -> bool {
        if !self.analysis_types.contains(&analysis_type) {
            return false;
        }
        match resolution {
            Some(r) => self.temporal_resolutions.is_empty() || self.temporal_resolutions.contains(&r),
            None => true,
        }
    }
}

/// Indicators offered for `analysis_type` (and `resolution` when set), by name.
pub fn variable_options(
    indicators: &[Indicator],
    analysis_type: AnalysisType,
    resolution: Option<TemporalResolution>,
) -> Vec<&Indicator> {
    let mut out: Vec<&Indicator> = indicators
        .iter()
        .filter(|i| i.applies_to(analysis_type, resolution))
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.variable.cmp(&b.variable)));
    out
}

#[cfg(test)]
mod tests {
    use super::{Indicator, variable_options};
    use crate::config::{AnalysisType, TemporalResolution};
    use pretty_assertions::assert_eq;

    fn catalog() -> Vec<Indicator> {
        serde_json::from_value(serde_json::json!([
            {
                "name": "Vegetation index",
                "variable": "ndvi",
                "source": "modis",
                "analysisTypes": ["temporal", "spatial", "baci"],
                "temporalResolutions": ["annual", "quarterly", "monthly"]
            },
            {
                "name": "Burned area",
                "variable": "burn",
                "source": "modis",
                "analysisTypes": ["temporal"],
                "temporalResolutions": ["annual"]
            },
            {
                "name": "Population",
                "variable": "pop",
                "source": "worldpop",
                "analysisTypes": ["baseline"]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn filters_by_type_and_resolution_sorted_by_name() {
        let all = catalog();
        let names: Vec<&str> = variable_options(&all, AnalysisType::Temporal, None)
            .iter()
            .map(|i| i.variable.as_str())
            .collect();
        assert_eq!(names, vec!["burn", "ndvi"]);

        let monthly = variable_options(
            &all,
            AnalysisType::Temporal,
            Some(TemporalResolution::Monthly),
        );
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].variable, "ndvi");
    }

    #[test]
    fn missing_resolutions_match_any_resolution() {
        let all = catalog();
        let baseline = variable_options(
            &all,
            AnalysisType::Baseline,
            Some(TemporalResolution::Quarterly),
        );
        assert_eq!(baseline.len(), 1);
        assert_eq!(baseline[0].source, "worldpop");
    }
}
