use serde_json::{Map, Value, json};

/// Feature filter applied to a layer, e.g. to restrict communities to the
/// active landscape or to highlight the selected feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Matches every feature.
    All,
    /// Matches no feature (used to clear a highlight).
    Nothing,
    Eq { key: String, value: Value },
    In { key: String, values: Vec<Value> },
    And(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn any_of(key: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            key: key.into(),
            values,
        }
    }

    /// Evaluates the filter against feature properties.
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        match self {
            FilterExpr::All => true,
            FilterExpr::Nothing => false,
            FilterExpr::Eq { key, value } => properties
                .get(key)
                .is_some_and(|v| values_match(v, value)),
            FilterExpr::In { key, values } => properties
                .get(key)
                .is_some_and(|v| values.iter().any(|want| values_match(v, want))),
            FilterExpr::And(all) => all.iter().all(|f| f.matches(properties)),
        }
    }

    /// Style-spec expression for the renderer.
    pub fn to_expression(&self) -> Value {
        match self {
            FilterExpr::All => json!(true),
            FilterExpr::Nothing => json!(false),
            FilterExpr::Eq { key, value } => json!(["==", ["get", key], value]),
            FilterExpr::In { key, values } => json!(["in", ["get", key], ["literal", values]]),
            FilterExpr::And(all) => {
                let mut out = vec![json!("all")];
                out.extend(all.iter().map(FilterExpr::to_expression));
                Value::Array(out)
            }
        }
    }
}

/// Loose equality: ids often arrive as numbers from tiles and as strings
/// from configuration.
pub fn values_match(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (value_as_key(a), value_as_key(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// String form of a scalar id-like value.
pub fn value_as_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A feature as returned by a rendered-features query.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub layer_id: String,
    pub id: Option<Value>,
    pub properties: Map<String, Value>,
    pub geometry: Option<geojson::Geometry>,
}

impl RenderedFeature {
    pub fn new(layer_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            id: None,
            properties: Map::new(),
            geometry: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: geojson::Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Scalar property rendered as a string key.
    pub fn property_key(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(value_as_key)
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterExpr, RenderedFeature, values_match};
    use serde_json::json;

    fn props(f: &RenderedFeature) -> &serde_json::Map<String, serde_json::Value> {
        &f.properties
    }

    #[test]
    fn eq_matches_numbers_against_strings() {
        let f = RenderedFeature::new("communities").with_property("landscape_id", 7);
        assert!(FilterExpr::eq("landscape_id", "7").matches(props(&f)));
        assert!(!FilterExpr::eq("landscape_id", "8").matches(props(&f)));
    }

    #[test]
    fn missing_property_never_matches() {
        let f = RenderedFeature::new("communities");
        assert!(!FilterExpr::eq("landscape_id", "7").matches(props(&f)));
        assert!(FilterExpr::All.matches(props(&f)));
        assert!(!FilterExpr::Nothing.matches(props(&f)));
    }

    #[test]
    fn and_requires_every_clause() {
        let f = RenderedFeature::new("l")
            .with_property("a", "x")
            .with_property("b", 2);
        let both = FilterExpr::And(vec![FilterExpr::eq("a", "x"), FilterExpr::eq("b", 2)]);
        let one = FilterExpr::And(vec![FilterExpr::eq("a", "x"), FilterExpr::eq("b", 3)]);
        assert!(both.matches(props(&f)));
        assert!(!one.matches(props(&f)));
    }

    #[test]
    fn in_filter_matches_any_value() {
        let f = RenderedFeature::new("l").with_property("id", "c2");
        let filter = FilterExpr::any_of("id", vec![json!("c1"), json!("c2")]);
        assert!(filter.matches(props(&f)));
    }

    #[test]
    fn expressions_follow_style_spec_shape() {
        assert_eq!(
            FilterExpr::eq("landscape_id", "K2C").to_expression(),
            json!(["==", ["get", "landscape_id"], "K2C"])
        );
        assert_eq!(FilterExpr::Nothing.to_expression(), json!(false));
        assert_eq!(
            FilterExpr::And(vec![FilterExpr::All]).to_expression(),
            json!(["all", true])
        );
    }

    #[test]
    fn non_scalar_values_only_match_exactly() {
        assert!(values_match(&json!([1]), &json!([1])));
        assert!(!values_match(&json!([1]), &json!("1")));
    }
}
