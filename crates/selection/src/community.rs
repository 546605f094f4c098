use analysis::area::AreaSelection;
use layers::layer::{LayerSpec, SourceSpec};
use layers::query::{FilterExpr, values_match};
use layers::surface::{Cursor, MapEvent, MapEventKind, MapSurface};
use layers::symbology::{COMMUNITY_FILL, HIGHLIGHT_FILL};
use serde_json::Value;
use tracing::{debug, info};

use crate::strategy::{Activation, GeometrySelection, ListenerSet, SelectionOutcome, SelectionScope};

pub const COMMUNITY_SOURCE: &str = "communities";
pub const COMMUNITY_SOURCE_LAYER: &str = "communities";
pub const COMMUNITY_FILL_LAYER: &str = "communities-fill";
pub const COMMUNITY_HIGHLIGHT_LAYER: &str = "communities-highlight";

const LANDSCAPE_PROPERTY: &str = "landscape_id";
const ID_PROPERTY: &str = "id";
const NAME_PROPERTY: &str = "name";

/// Picks predefined community polygons of the active landscape.
#[derive(Debug)]
pub struct CommunitySelector {
    tiles_url: String,
    landscape: Option<String>,
    listeners: ListenerSet,
    highlighted: Option<String>,
}

impl CommunitySelector {
    pub fn new(tiles_url: impl Into<String>) -> Self {
        Self {
            tiles_url: tiles_url.into(),
            landscape: None,
            listeners: ListenerSet::default(),
            highlighted: None,
        }
    }

    pub fn landscape(&self) -> Option<&str> {
        self.landscape.as_deref()
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.highlighted.as_deref()
    }

    fn set_highlight(&mut self, map: &mut dyn MapSurface, id: Option<String>) {
        let filter = match &id {
            Some(id) => FilterExpr::eq(ID_PROPERTY, id.as_str()),
            None => FilterExpr::Nothing,
        };
        map.set_filter(COMMUNITY_HIGHLIGHT_LAYER, filter);
        self.highlighted = id;
    }

    fn pick(&mut self, map: &mut dyn MapSurface, event: &MapEvent) -> Option<SelectionOutcome> {
        let landscape = self.landscape.clone()?;
        let landscape = Value::String(landscape);
        let hits = map.query_rendered_features(event.point, &[COMMUNITY_FILL_LAYER.to_string()]);
        let feature = hits.into_iter().find(|f| {
            f.properties
                .get(LANDSCAPE_PROPERTY)
                .is_some_and(|v| values_match(v, &landscape))
        })?;

        let id = feature
            .property_key(ID_PROPERTY)
            .or_else(|| feature.id.as_ref().and_then(layers::query::value_as_key))?;
        let name = feature.property_key(NAME_PROPERTY).unwrap_or_else(|| id.clone());
        debug!(%id, %name, "community picked");

        // Clicking the highlighted community again clears the highlight, the
        // same way it toggles the location off.
        if self.highlighted.as_deref() == Some(id.as_str()) {
            self.set_highlight(map, None);
        } else {
            self.set_highlight(map, Some(id.clone()));
        }
        Some(SelectionOutcome::Picked(AreaSelection::community(
            id,
            name,
            event.lng_lat,
        )))
    }
}

impl GeometrySelection for CommunitySelector {
    fn name(&self) -> &'static str {
        "community"
    }

    fn activate(&mut self, map: &mut dyn MapSurface, scope: &SelectionScope) -> Activation {
        let SelectionScope::Landscape(landscape) = scope else {
            return Activation::NoOp;
        };
        if landscape.is_empty() {
            return Activation::NoOp;
        }
        if self.is_active() {
            if self.landscape.as_deref() == Some(landscape.as_str()) {
                return Activation::AlreadyActive;
            }
            self.deactivate(map);
        }

        if !map.has_source(COMMUNITY_SOURCE) {
            map.add_source(
                COMMUNITY_SOURCE,
                SourceSpec::Vector {
                    url: self.tiles_url.clone(),
                },
            );
        }
        map.add_layer(
            LayerSpec::fill(COMMUNITY_FILL_LAYER, COMMUNITY_SOURCE, COMMUNITY_FILL)
                .with_source_layer(COMMUNITY_SOURCE_LAYER)
                .with_filter(FilterExpr::eq(LANDSCAPE_PROPERTY, landscape.as_str())),
            None,
        );
        map.add_layer(
            LayerSpec::fill(COMMUNITY_HIGHLIGHT_LAYER, COMMUNITY_SOURCE, HIGHLIGHT_FILL)
                .with_source_layer(COMMUNITY_SOURCE_LAYER)
                .with_filter(FilterExpr::Nothing),
            None,
        );

        self.listeners
            .register(map, MapEventKind::Click, COMMUNITY_FILL_LAYER);
        self.listeners
            .register(map, MapEventKind::MouseEnter, COMMUNITY_FILL_LAYER);
        self.listeners
            .register(map, MapEventKind::MouseLeave, COMMUNITY_FILL_LAYER);
        self.landscape = Some(landscape.clone());
        info!(%landscape, "community selection armed");
        Activation::Activated
    }

    fn deactivate(&mut self, map: &mut dyn MapSurface) {
        if !self.is_active() {
            return;
        }
        self.listeners.clear(map);
        map.remove_layer(COMMUNITY_HIGHLIGHT_LAYER);
        map.remove_layer(COMMUNITY_FILL_LAYER);
        map.set_cursor(Cursor::Default);
        self.highlighted = None;
        self.landscape = None;
        debug!("community selection disarmed");
    }

    fn is_active(&self) -> bool {
        !self.listeners.is_empty()
    }

    fn handle_event(
        &mut self,
        map: &mut dyn MapSurface,
        event: &MapEvent,
    ) -> Option<SelectionOutcome> {
        if !self.listeners.owns(event.listener) {
            return None;
        }
        match event.kind {
            MapEventKind::MouseEnter => {
                map.set_cursor(Cursor::Pointer);
                None
            }
            MapEventKind::MouseLeave => {
                map.set_cursor(Cursor::Default);
                None
            }
            MapEventKind::Click => self.pick(map, event),
            MapEventKind::DrawCreate | MapEventKind::DrawUpdate => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        COMMUNITY_FILL_LAYER, COMMUNITY_HIGHLIGHT_LAYER, COMMUNITY_SOURCE, CommunitySelector,
    };
    use crate::strategy::{Activation, GeometrySelection, SelectionOutcome, SelectionScope};
    use foundation::geometry::{LngLat, ScreenPoint, ScreenRect};
    use layers::memory::InMemoryMap;
    use layers::query::{FilterExpr, RenderedFeature};
    use layers::surface::{Cursor, MapEventKind, MapSurface};
    use pretty_assertions::assert_eq;

    fn map_with_communities() -> InMemoryMap {
        let mut map = InMemoryMap::new();
        let rect = |x: f64| ScreenRect::new(ScreenPoint::new(x, 0.0), ScreenPoint::new(x + 9.0, 9.0));
        map.place_feature(
            rect(0.0),
            RenderedFeature::new(COMMUNITY_FILL_LAYER)
                .with_property("id", 101)
                .with_property("name", "Bwindi")
                .with_property("landscape_id", "K2C"),
        );
        map.place_feature(
            rect(20.0),
            RenderedFeature::new(COMMUNITY_FILL_LAYER)
                .with_property("id", 202)
                .with_property("name", "Elsewhere")
                .with_property("landscape_id", "OTHER"),
        );
        map
    }

    fn scope() -> SelectionScope {
        SelectionScope::Landscape("K2C".into())
    }

    fn click(map: &mut InMemoryMap, sel: &mut CommunitySelector, x: f64) -> Vec<SelectionOutcome> {
        let events = map.fire(
            MapEventKind::Click,
            COMMUNITY_FILL_LAYER,
            ScreenPoint::new(x, 5.0),
            LngLat::new(29.7, -1.1),
        );
        events
            .iter()
            .filter_map(|e| sel.handle_event(map, e))
            .collect()
    }

    #[test]
    fn empty_scope_registers_nothing() {
        let mut map = InMemoryMap::new();
        let mut sel = CommunitySelector::new("pmtiles://communities");
        assert_eq!(sel.activate(&mut map, &SelectionScope::None), Activation::NoOp);
        assert_eq!(
            sel.activate(&mut map, &SelectionScope::Landscape(String::new())),
            Activation::NoOp
        );
        assert_eq!(map.total_listeners(), 0);
        assert!(!sel.is_active());
    }

    #[test]
    fn activation_filters_by_landscape_and_is_idempotent() {
        let mut map = map_with_communities();
        let mut sel = CommunitySelector::new("pmtiles://communities");
        assert_eq!(sel.activate(&mut map, &scope()), Activation::Activated);
        assert_eq!(sel.activate(&mut map, &scope()), Activation::AlreadyActive);
        assert!(map.has_source(COMMUNITY_SOURCE));
        assert_eq!(
            map.filter(COMMUNITY_FILL_LAYER),
            Some(&FilterExpr::eq("landscape_id", "K2C"))
        );
        assert_eq!(map.listener_count(MapEventKind::Click, COMMUNITY_FILL_LAYER), 1);
        assert_eq!(map.total_listeners(), 3);
    }

    #[test]
    fn click_emits_selection_and_highlights() {
        let mut map = map_with_communities();
        let mut sel = CommunitySelector::new("pmtiles://communities");
        sel.activate(&mut map, &scope());

        let out = click(&mut map, &mut sel, 4.0);
        assert_eq!(out.len(), 1);
        let SelectionOutcome::Picked(area) = &out[0] else {
            panic!("expected pick");
        };
        assert_eq!(area.id, "101");
        assert_eq!(area.name, "Bwindi");
        assert_eq!(area.longitude, 29.7);
        assert_eq!(
            map.filter(COMMUNITY_HIGHLIGHT_LAYER),
            Some(&FilterExpr::eq("id", "101"))
        );

        // Second click on the same community clears the highlight.
        click(&mut map, &mut sel, 4.0);
        assert_eq!(map.filter(COMMUNITY_HIGHLIGHT_LAYER), Some(&FilterExpr::Nothing));
    }

    #[test]
    fn clicks_outside_the_landscape_emit_nothing() {
        let mut map = map_with_communities();
        let mut sel = CommunitySelector::new("pmtiles://communities");
        sel.activate(&mut map, &scope());
        assert!(click(&mut map, &mut sel, 24.0).is_empty());
        assert!(click(&mut map, &mut sel, 100.0).is_empty());
    }

    #[test]
    fn hover_drives_the_cursor() {
        let mut map = map_with_communities();
        let mut sel = CommunitySelector::new("pmtiles://communities");
        sel.activate(&mut map, &scope());
        let p = ScreenPoint::new(1.0, 1.0);
        let ll = LngLat::new(0.0, 0.0);
        for e in map.fire(MapEventKind::MouseEnter, COMMUNITY_FILL_LAYER, p, ll) {
            sel.handle_event(&mut map, &e);
        }
        assert_eq!(map.cursor(), Cursor::Pointer);
        for e in map.fire(MapEventKind::MouseLeave, COMMUNITY_FILL_LAYER, p, ll) {
            sel.handle_event(&mut map, &e);
        }
        assert_eq!(map.cursor(), Cursor::Default);
    }

    #[test]
    fn deactivate_removes_listeners_and_layers() {
        let mut map = map_with_communities();
        let mut sel = CommunitySelector::new("pmtiles://communities");
        sel.activate(&mut map, &scope());
        sel.deactivate(&mut map);
        assert_eq!(map.total_listeners(), 0);
        assert!(!map.has_layer(COMMUNITY_FILL_LAYER));
        assert!(map.has_source(COMMUNITY_SOURCE), "source is shared");
        assert!(!sel.is_active());

        assert_eq!(sel.activate(&mut map, &scope()), Activation::Activated);
        assert_eq!(map.total_listeners(), 3);
    }

    #[test]
    fn landscape_switch_rearms_without_duplicates() {
        let mut map = map_with_communities();
        let mut sel = CommunitySelector::new("pmtiles://communities");
        sel.activate(&mut map, &scope());
        assert_eq!(
            sel.activate(&mut map, &SelectionScope::Landscape("OTHER".into())),
            Activation::Activated
        );
        assert_eq!(map.total_listeners(), 3);
        assert_eq!(sel.landscape(), Some("OTHER"));
        let out = click(&mut map, &mut sel, 24.0);
        assert_eq!(out.len(), 1);
    }
}
