use foundation::geometry::LngLat;
use serde::{Deserialize, Serialize};

/// One picked area of interest.
///
/// Every selection strategy produces this shape. `id` is the toggle key in
/// [`crate::AnalysisConfig::locations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSelection {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_layer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<geojson::Geometry>,
}

impl AreaSelection {
    /// A predefined community polygon, located at the click.
    pub fn community(id: impl Into<String>, name: impl Into<String>, at: LngLat) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude: at.lat,
            longitude: at.lng,
            source_layer_id: None,
            geometry: None,
        }
    }

    /// A polygon feature of a user layer. The id is `"{layer},{feature}"` so
    /// equal feature ids on different layers stay distinct.
    pub fn user_feature(
        layer_id: &str,
        feature_id: &str,
        name: impl Into<String>,
        at: LngLat,
        geometry: geojson::Geometry,
    ) -> Self {
        Self {
            id: composite_feature_id(layer_id, feature_id),
            name: name.into(),
            latitude: at.lat,
            longitude: at.lng,
            source_layer_id: Some(layer_id.to_string()),
            geometry: Some(geometry),
        }
    }

    pub fn lng_lat(&self) -> LngLat {
        LngLat::new(self.longitude, self.latitude)
    }
}

pub fn composite_feature_id(layer_id: &str, feature_id: &str) -> String {
    format!("{layer_id},{feature_id}")
}

/// Appends `selection` unless an entry with the same id exists, in which
/// case that entry is removed. Returns true when the selection was added.
pub fn toggle_selection(list: &mut Vec<AreaSelection>, selection: AreaSelection) -> bool {
    if let Some(idx) = list.iter().position(|s| s.id == selection.id) {
        list.remove(idx);
        false
    } else {
        list.push(selection);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{AreaSelection, toggle_selection};
    use foundation::geometry::{LngLat, square_polygon};
    use pretty_assertions::assert_eq;

    #[test]
    fn user_feature_ids_are_composite() {
        let at = LngLat::new(30.0, -1.5);
        let a = AreaSelection::user_feature("farms", "7", "Farm 7", at, square_polygon(at, 0.01));
        assert_eq!(a.id, "farms,7");
        assert_eq!(a.source_layer_id.as_deref(), Some("farms"));
    }

    #[test]
    fn toggle_removes_only_matching_id() {
        let mut list = vec![
            AreaSelection::community("a", "A", LngLat::new(0.0, 0.0)),
            AreaSelection::community("b", "B", LngLat::new(0.0, 0.0)),
        ];
        assert!(!toggle_selection(
            &mut list,
            AreaSelection::community("a", "A again", LngLat::new(1.0, 1.0))
        ));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "b");
    }

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let a = AreaSelection::community("c1", "Kigoma", LngLat::new(29.6, -4.9));
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["latitude"], serde_json::json!(-4.9));
        assert!(v.get("sourceLayerId").is_none());
        assert!(v.get("geometry").is_none());
    }
}
