//! Reshaping completed job payloads into renderable views.
//!
//! Assembly never reformats values: tables hand out the rows exactly as the
//! backend sent them, and every view keeps the raw payload alongside.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{AnalysisConfig, AnalysisType};

/// A completed job before assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub config: AnalysisConfig,
    pub raw: Value,
}

impl AnalysisResult {
    pub fn new(config: AnalysisConfig, raw: Value) -> Self {
        Self { config, raw }
    }
}

/// Columns never shown in tables.
const INTERNAL_COLUMNS: &[&str] = &["geometry", "bbox"];

pub fn is_internal_column(name: &str) -> bool {
    name.starts_with('_') || INTERNAL_COLUMNS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// A categorical aggregate plus a time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalView {
    pub aggregate: Value,
    pub series: Value,
}

/// Spatial output with the temporal view synthesized from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialView {
    pub spatial: AnalysisResult,
    pub temporal: AnalysisResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResultView {
    Table(TableView),
    Temporal(TemporalView),
    Spatial(SpatialView),
}

/// A published result. `raw` is the backend's `results` exactly as received
/// (the Baseline pass-through); `view` is a display shape derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledResult {
    pub config: AnalysisConfig,
    pub raw: Value,
    pub view: ResultView,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("expected a table (array or object), got {0}")]
    NotTabular(&'static str),
    #[error("expected an aggregate and a series, got {0}")]
    NotASeriesPair(&'static str),
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Builds the view for `result.config.analysis_type`.
pub fn assemble(result: AnalysisResult) -> Result<AssembledResult, AssembleError> {
    let view = match result.config.analysis_type {
        AnalysisType::Baseline | AnalysisType::Baci => ResultView::Table(table_view(&result.raw)?),
        AnalysisType::Temporal => ResultView::Temporal(temporal_view(&result.raw)?),
        AnalysisType::Spatial => {
            let temporal = synthesize_temporal(&result);
            ResultView::Spatial(SpatialView {
                spatial: result.clone(),
                temporal,
            })
        }
    };
    Ok(AssembledResult {
        config: result.config,
        raw: result.raw,
        view,
    })
}

/// Rows from a bare array, a feature collection (`features[].properties`)
/// or an object carrying `rows`/`data`. Columns come from a declared
/// `columns` list when present, otherwise from the first row.
pub fn table_view(raw: &Value) -> Result<TableView, AssembleError> {
    let rows = match raw {
        Value::Array(items) => object_rows(items),
        Value::Object(obj) => {
            if let Some(Value::Array(features)) = obj.get("features") {
                features
                    .iter()
                    .filter_map(|f| f.get("properties").and_then(Value::as_object).cloned())
                    .collect()
            } else if let Some(Value::Array(items)) = obj.get("rows").or_else(|| obj.get("data")) {
                object_rows(items)
            } else {
                vec![obj.clone()]
            }
        }
        other => return Err(AssembleError::NotTabular(kind_of(other))),
    };

    let declared = raw.get("columns").and_then(Value::as_array).map(|cols| {
        cols.iter()
            .filter_map(|c| match c {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
    });
    let columns = declared
        .unwrap_or_else(|| rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default())
        .into_iter()
        .filter(|c| !is_internal_column(c))
        .collect();

    Ok(TableView { columns, rows })
}

fn object_rows(items: &[Value]) -> Vec<Map<String, Value>> {
    items.iter().filter_map(|v| v.as_object().cloned()).collect()
}

/// Accepts `[aggregate, series]` or `{aggregate, series}`.
pub fn temporal_view(raw: &Value) -> Result<TemporalView, AssembleError> {
    match raw {
        Value::Array(pair) if pair.len() == 2 => Ok(TemporalView {
            aggregate: pair[0].clone(),
            series: pair[1].clone(),
        }),
        Value::Object(obj) => match (obj.get("aggregate"), obj.get("series")) {
            (Some(aggregate), Some(series)) => Ok(TemporalView {
                aggregate: aggregate.clone(),
                series: series.clone(),
            }),
            _ => Err(AssembleError::NotASeriesPair("an object without aggregate/series")),
        },
        Value::Array(_) => Err(AssembleError::NotASeriesPair("an array of the wrong length")),
        other => Err(AssembleError::NotASeriesPair(kind_of(other))),
    }
}

/// Derives the temporal companion of a spatial result.
///
/// The payload is copied; when it carries a `temporal` member that member
/// becomes the temporal payload, otherwise the whole copy does. The copy's
/// config is relabeled `Temporal` so downstream consumers chart it as a
/// temporal result. The input is left untouched.
pub fn synthesize_temporal(spatial: &AnalysisResult) -> AnalysisResult {
    let raw = spatial
        .raw
        .get("temporal")
        .cloned()
        .unwrap_or_else(|| spatial.raw.clone());
    let mut config = spatial.config.clone();
    config.analysis_type = AnalysisType::Temporal;
    AnalysisResult { config, raw }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisResult, AssembleError, ResultView, assemble, synthesize_temporal, table_view};
    use crate::config::{AnalysisConfig, AnalysisType, ConfigPatch};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config(t: AnalysisType) -> AnalysisConfig {
        let mut c = AnalysisConfig::new();
        c.update(ConfigPatch::default().landscape("K2C").analysis_type(t));
        c
    }

    #[test]
    fn baseline_is_pass_through_with_inferred_columns() {
        let raw = json!([
            {"_internal": 1, "community": "A", "forest_ha": 12.345678},
            {"_internal": 2, "community": "B", "forest_ha": 3}
        ]);
        let out = assemble(AnalysisResult::new(config(AnalysisType::Baseline), raw.clone())).unwrap();
        assert_eq!(out.raw, raw);
        let ResultView::Table(table) = out.view else {
            panic!("expected table");
        };
        assert_eq!(table.columns, vec!["community", "forest_ha"]);
        assert_eq!(table.rows[0]["forest_ha"], json!(12.345678));
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn declared_columns_win_over_inference() {
        let raw = json!({
            "columns": [{"name": "b"}, "a", "geometry"],
            "rows": [{"a": 1, "b": 2, "c": 3}]
        });
        let table = table_view(&raw).unwrap();
        assert_eq!(table.columns, vec!["b", "a"]);
    }

    #[test]
    fn feature_collections_yield_properties() {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": null, "properties": {"id": "x", "v": 1}}
            ]
        });
        let table = table_view(&raw).unwrap();
        assert_eq!(table.columns, vec!["id", "v"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn scalars_are_not_tables() {
        assert_eq!(table_view(&json!(3)), Err(AssembleError::NotTabular("a number")));
    }

    #[test]
    fn temporal_exposes_the_pair_unaltered() {
        let raw = json!([{"forest": 10}, [{"t": 2020, "v": 1.5}]]);
        let out = assemble(AnalysisResult::new(config(AnalysisType::Temporal), raw)).unwrap();
        let ResultView::Temporal(view) = out.view else {
            panic!("expected temporal view");
        };
        assert_eq!(view.aggregate, json!({"forest": 10}));
        assert_eq!(view.series, json!([{"t": 2020, "v": 1.5}]));
        assert_eq!(out.config.analysis_type, AnalysisType::Temporal);
    }

    #[test]
    fn temporal_rejects_single_series() {
        let err = assemble(AnalysisResult::new(
            config(AnalysisType::Temporal),
            json!([1, 2, 3]),
        ))
        .unwrap_err();
        assert!(matches!(err, AssembleError::NotASeriesPair(_)));
    }

    #[test]
    fn spatial_produces_relabeled_temporal_copy() {
        let raw = json!({"spatial": {"mean": 0.4}, "temporal": [{"a": 1}, []]});
        let input = AnalysisResult::new(config(AnalysisType::Spatial), raw.clone());
        let out = assemble(input.clone()).unwrap();
        let ResultView::Spatial(view) = out.view else {
            panic!("expected spatial view");
        };
        assert_eq!(view.spatial, input);
        assert_eq!(view.temporal.config.analysis_type, AnalysisType::Temporal);
        assert_eq!(view.temporal.raw, json!([{"a": 1}, []]));
        assert_eq!(out.raw, raw);
    }

    #[test]
    fn synthesis_without_temporal_member_copies_everything() {
        let input = AnalysisResult::new(config(AnalysisType::Spatial), json!({"mean": 1}));
        let t = synthesize_temporal(&input);
        assert_eq!(t.raw, json!({"mean": 1}));
        assert_eq!(input.config.analysis_type, AnalysisType::Spatial);
    }
}
