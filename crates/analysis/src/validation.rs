use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, AnalysisType, ComparisonPeriod, Period, TemporalResolution};

/// How a valid configuration is to be run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Standard,
    /// Spatial run without locations: only the reference layer is computed.
    ReferenceOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a landscape must be selected")]
    MissingLandscape,
    #[error("a variable must be selected")]
    MissingVariable,
    #[error("a temporal resolution must be selected")]
    MissingResolution,
    #[error("missing {0}")]
    MissingPeriod(&'static str),
    #[error("quarter {0} is outside 1..=4")]
    QuarterOutOfRange(u8),
    #[error("month {0} is outside 1..=12")]
    MonthOutOfRange(u8),
    #[error("comparison {field} has {got} entries but there are {expected} comparison years")]
    ComparisonLength {
        field: &'static str,
        got: usize,
        expected: usize,
    },
    #[error("baseline start and end dates must be set together")]
    IncompleteBaselineDates,
    #[error("baseline start {start} is after end {end}")]
    BaselineDatesReversed { start: NaiveDate, end: NaiveDate },
    #[error("a reference layer must be selected")]
    MissingReferenceLayer,
    #[error("at least one location must be selected")]
    MissingLocation,
    #[error("at least one control location must be selected")]
    MissingControlLocation,
}

impl AnalysisConfig {
    /// Checks the draft and returns the kind of request it makes.
    pub fn validate(&self) -> Result<RequestKind, ValidationError> {
        if self.landscape.is_none() {
            return Err(ValidationError::MissingLandscape);
        }
        match self.analysis_type {
            AnalysisType::Baseline => {
                check_baseline_dates(self.baseline_start_date, self.baseline_end_date)?;
                require_area(self)?;
                Ok(RequestKind::Standard)
            }
            AnalysisType::Temporal => {
                check_temporal(self)?;
                require_area(self)?;
                Ok(RequestKind::Standard)
            }
            AnalysisType::Spatial => {
                if self.variable.is_none() {
                    return Err(ValidationError::MissingVariable);
                }
                if self.reference_layer.is_none() {
                    return Err(ValidationError::MissingReferenceLayer);
                }
                if self.has_area() {
                    Ok(RequestKind::Standard)
                } else {
                    Ok(RequestKind::ReferenceOnly)
                }
            }
            AnalysisType::Baci => {
                check_temporal(self)?;
                require_area(self)?;
                if self.control_locations.is_empty() {
                    return Err(ValidationError::MissingControlLocation);
                }
                Ok(RequestKind::Standard)
            }
        }
    }

    pub fn is_submittable(&self) -> bool {
        self.validate().is_ok()
    }
}

fn require_area(config: &AnalysisConfig) -> Result<(), ValidationError> {
    if config.has_area() {
        Ok(())
    } else {
        Err(ValidationError::MissingLocation)
    }
}

fn check_temporal(config: &AnalysisConfig) -> Result<(), ValidationError> {
    if config.variable.is_none() {
        return Err(ValidationError::MissingVariable);
    }
    let resolution = config
        .temporal_resolution
        .ok_or(ValidationError::MissingResolution)?;
    check_periods(resolution, &config.period, &config.comparison_period)
}

fn check_periods(
    resolution: TemporalResolution,
    period: &Period,
    comparison: &ComparisonPeriod,
) -> Result<(), ValidationError> {
    if period.year.is_none() {
        return Err(ValidationError::MissingPeriod("period year"));
    }
    if comparison.year.is_empty() {
        return Err(ValidationError::MissingPeriod("comparison year"));
    }
    let expected = comparison.year.len();
    match resolution {
        TemporalResolution::Annual => {}
        TemporalResolution::Quarterly => {
            let q = period.quarter.ok_or(ValidationError::MissingPeriod("period quarter"))?;
            check_quarter(q)?;
            if comparison.quarter.is_empty() {
                return Err(ValidationError::MissingPeriod("comparison quarter"));
            }
            check_parallel("quarter", comparison.quarter.len(), expected)?;
            comparison.quarter.iter().try_for_each(|q| check_quarter(*q))?;
        }
        TemporalResolution::Monthly => {
            let m = period.month.ok_or(ValidationError::MissingPeriod("period month"))?;
            check_month(m)?;
            if comparison.month.is_empty() {
                return Err(ValidationError::MissingPeriod("comparison month"));
            }
            check_parallel("month", comparison.month.len(), expected)?;
            comparison.month.iter().try_for_each(|m| check_month(*m))?;
        }
    }
    Ok(())
}

fn check_quarter(q: u8) -> Result<(), ValidationError> {
    if (1..=4).contains(&q) {
        Ok(())
    } else {
        Err(ValidationError::QuarterOutOfRange(q))
    }
}

fn check_month(m: u8) -> Result<(), ValidationError> {
    if (1..=12).contains(&m) {
        Ok(())
    } else {
        Err(ValidationError::MonthOutOfRange(m))
    }
}

fn check_parallel(field: &'static str, got: usize, expected: usize) -> Result<(), ValidationError> {
    if got == expected {
        Ok(())
    } else {
        Err(ValidationError::ComparisonLength {
            field,
            got,
            expected,
        })
    }
}

fn check_baseline_dates(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match (start, end) {
        (None, None) => Ok(()),
        (Some(start), Some(end)) if start > end => {
            Err(ValidationError::BaselineDatesReversed { start, end })
        }
        (Some(_), Some(_)) => Ok(()),
        _ => Err(ValidationError::IncompleteBaselineDates),
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestKind, ValidationError};
    use crate::area::AreaSelection;
    use crate::config::{
        AnalysisConfig, AnalysisType, ComparisonPeriod, ConfigPatch, Period, TemporalResolution,
    };
    use chrono::NaiveDate;
    use foundation::geometry::{LngLat, square_polygon};
    use pretty_assertions::assert_eq;

    fn here() -> LngLat {
        LngLat::new(31.0, -2.0)
    }

    fn with_type(t: AnalysisType) -> AnalysisConfig {
        let mut c = AnalysisConfig::new();
        c.update(ConfigPatch::default().landscape("K2C").analysis_type(t));
        c
    }

    fn pick(c: &mut AnalysisConfig, id: &str) {
        c.toggle_location(AreaSelection::community(id, id, here()));
    }

    #[test]
    fn nothing_is_submittable_without_landscape() {
        assert_eq!(
            AnalysisConfig::new().validate(),
            Err(ValidationError::MissingLandscape)
        );
    }

    #[test]
    fn baseline_needs_a_location_or_drawn_area() {
        let mut c = with_type(AnalysisType::Baseline);
        assert_eq!(c.validate(), Err(ValidationError::MissingLocation));
        pick(&mut c, "c1");
        assert_eq!(c.validate(), Ok(RequestKind::Standard));

        let mut drawn = with_type(AnalysisType::Baseline);
        drawn.set_custom_geom(square_polygon(here(), 0.1));
        assert!(drawn.is_submittable());
    }

    #[test]
    fn baseline_dates_must_be_ordered_pairs() {
        let mut c = with_type(AnalysisType::Baseline);
        pick(&mut c, "c1");
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        c.baseline_start_date = Some(d(2020, 1, 1));
        assert_eq!(c.validate(), Err(ValidationError::IncompleteBaselineDates));

        c.baseline_end_date = Some(d(2019, 12, 31));
        assert!(matches!(
            c.validate(),
            Err(ValidationError::BaselineDatesReversed { .. })
        ));

        c.baseline_end_date = Some(d(2020, 12, 31));
        assert!(c.is_submittable());
    }

    #[test]
    fn quarterly_temporal_without_variable_is_rejected() {
        let mut c = with_type(AnalysisType::Temporal);
        c.update(
            ConfigPatch::default()
                .resolution(TemporalResolution::Quarterly)
                .period(Period::quarterly(2020, 1))
                .comparison_period(ComparisonPeriod::quarterly([(2021, 1)])),
        );
        pick(&mut c, "c1");
        assert!(!c.is_submittable());
        assert_eq!(c.validate(), Err(ValidationError::MissingVariable));
    }

    #[test]
    fn quarterly_requires_comparison_quarter() {
        let mut c = with_type(AnalysisType::Temporal);
        c.update(
            ConfigPatch::default()
                .resolution(TemporalResolution::Quarterly)
                .variable("ndvi")
                .period(Period::quarterly(2020, 1))
                .comparison_period(ComparisonPeriod::annual([2021])),
        );
        pick(&mut c, "c1");
        assert_eq!(
            c.validate(),
            Err(ValidationError::MissingPeriod("comparison quarter"))
        );

        c.comparison_period.quarter = vec![2];
        assert_eq!(c.validate(), Ok(RequestKind::Standard));
    }

    #[test]
    fn monthly_checks_ranges_and_parallel_arrays() {
        let mut c = with_type(AnalysisType::Temporal);
        c.update(
            ConfigPatch::default()
                .resolution(TemporalResolution::Monthly)
                .variable("rain")
                .period(Period::monthly(2020, 13))
                .comparison_period(ComparisonPeriod::monthly([(2021, 1), (2022, 1)])),
        );
        pick(&mut c, "c1");
        assert_eq!(c.validate(), Err(ValidationError::MonthOutOfRange(13)));

        c.period.month = Some(6);
        c.comparison_period.month.pop();
        assert_eq!(
            c.validate(),
            Err(ValidationError::ComparisonLength {
                field: "month",
                got: 1,
                expected: 2
            })
        );
    }

    #[test]
    fn spatial_without_locations_is_reference_only() {
        let mut c = with_type(AnalysisType::Spatial);
        c.update(ConfigPatch::default().variable("ndvi"));
        assert_eq!(c.validate(), Err(ValidationError::MissingReferenceLayer));

        c.update(ConfigPatch::default().reference_layer("ref", square_polygon(here(), 0.5)));
        assert_eq!(c.validate(), Ok(RequestKind::ReferenceOnly));

        pick(&mut c, "c1");
        assert_eq!(c.validate(), Ok(RequestKind::Standard));
    }

    #[test]
    fn baci_requires_treatment_and_control() {
        let mut c = with_type(AnalysisType::Baci);
        c.update(
            ConfigPatch::default()
                .resolution(TemporalResolution::Annual)
                .variable("ndvi")
                .period(Period::annual(2018))
                .comparison_period(ComparisonPeriod::annual([2022])),
        );
        assert_eq!(c.validate(), Err(ValidationError::MissingLocation));
        pick(&mut c, "treated");
        assert_eq!(c.validate(), Err(ValidationError::MissingControlLocation));
        c.toggle_control_location(AreaSelection::community("control", "control", here()));
        assert_eq!(c.validate(), Ok(RequestKind::Standard));
    }

    #[test]
    fn errors_read_as_messages() {
        assert_eq!(
            ValidationError::MissingPeriod("comparison year").to_string(),
            "missing comparison year"
        );
    }
}
