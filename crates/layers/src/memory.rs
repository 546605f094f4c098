use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::geometry::{LngLat, ScreenPoint, ScreenRect};
use foundation::ids::IdAllocator;
use parking_lot::Mutex;
use tracing::debug;

use crate::layer::{LayerSpec, SourceSpec};
use crate::query::{FilterExpr, RenderedFeature};
use crate::surface::{Cursor, DrawTool, ListenerId, MapEvent, MapEventKind, MapSurface};

#[derive(Debug, Clone)]
struct PlacedFeature {
    rect: ScreenRect,
    feature: RenderedFeature,
}

/// Headless map surface.
///
/// Keeps the same registry a renderer would (sources, ordered layers,
/// filters, listeners, cursor) and answers rendered-feature queries from
/// features placed at pixel rectangles. Used by hosts without a renderer
/// and by tests.
#[derive(Debug, Default)]
pub struct InMemoryMap {
    sources: BTreeMap<String, SourceSpec>,
    // Bottom to top.
    layers: Vec<LayerSpec>,
    listeners: BTreeMap<ListenerId, (MapEventKind, String)>,
    listener_ids: IdAllocator,
    placed: Vec<PlacedFeature>,
    cursor: Cursor,
}

impl InMemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `feature` hit-testable inside `rect`.
    pub fn place_feature(&mut self, rect: ScreenRect, feature: RenderedFeature) {
        self.placed.push(PlacedFeature { rect, feature });
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Layer ids bottom to top.
    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    pub fn filter(&self, layer_id: &str) -> Option<&FilterExpr> {
        self.layer(layer_id).and_then(|l| l.filter.as_ref())
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn listener_count(&self, kind: MapEventKind, layer_id: &str) -> usize {
        self.listeners
            .values()
            .filter(|(k, l)| *k == kind && l == layer_id)
            .count()
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Simulates the renderer dispatching `kind` on `layer_id`.
    ///
    /// Returns one event per registered listener, in registration order, so a
    /// duplicated registration shows up as a duplicated event.
    pub fn fire(
        &self,
        kind: MapEventKind,
        layer_id: &str,
        point: ScreenPoint,
        lng_lat: LngLat,
    ) -> Vec<MapEvent> {
        self.listeners
            .iter()
            .filter(|(_, (k, l))| *k == kind && l == layer_id)
            .map(|(id, _)| MapEvent {
                listener: *id,
                kind,
                layer_id: layer_id.to_string(),
                point,
                lng_lat,
            })
            .collect()
    }
}

impl MapSurface for InMemoryMap {
    fn add_source(&mut self, id: &str, source: SourceSpec) {
        self.sources.insert(id.to_string(), source);
    }

    fn remove_source(&mut self, id: &str) -> bool {
        self.sources.remove(id).is_some()
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_layer(&mut self, layer: LayerSpec, before_id: Option<&str>) {
        // Re-adding replaces in place of the old layer.
        self.layers.retain(|l| l.id != layer.id);
        let idx = before_id
            .and_then(|b| self.layers.iter().position(|l| l.id == b))
            .unwrap_or(self.layers.len());
        self.layers.insert(idx, layer);
    }

    fn remove_layer(&mut self, id: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        self.layers.len() != before
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }

    fn set_filter(&mut self, layer_id: &str, filter: FilterExpr) {
        match self.layers.iter_mut().find(|l| l.id == layer_id) {
            Some(layer) => layer.filter = Some(filter),
            None => debug!(layer_id, "set_filter on missing layer ignored"),
        }
    }

    fn on(&mut self, event: MapEventKind, layer_id: &str) -> ListenerId {
        let id = ListenerId(self.listener_ids.next_id());
        self.listeners.insert(id, (event, layer_id.to_string()));
        id
    }

    fn off(&mut self, listener: ListenerId) -> bool {
        self.listeners.remove(&listener).is_some()
    }

    fn query_rendered_features(
        &self,
        point: ScreenPoint,
        layers: &[String],
    ) -> Vec<RenderedFeature> {
        let mut out = Vec::new();
        for layer in self.layers.iter().rev() {
            if !layers.iter().any(|l| l == &layer.id) {
                continue;
            }
            for placed in self.placed.iter().rev() {
                if placed.feature.layer_id != layer.id || !placed.rect.contains(point) {
                    continue;
                }
                if let Some(filter) = &layer.filter
                    && !filter.matches(&placed.feature.properties)
                {
                    continue;
                }
                out.push(placed.feature.clone());
            }
        }
        out
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }
}

#[derive(Debug, Default)]
struct DrawState {
    attached: bool,
    shapes: Vec<geojson::Geometry>,
}

/// Headless drawing tool.
///
/// Clones share one drawing, the way a host keeps the control while a
/// selector holds a handle to it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDrawTool {
    state: Arc<Mutex<DrawState>>,
}

impl InMemoryDrawTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the user completing a shape.
    pub fn push_shape(&self, geometry: geojson::Geometry) {
        self.state.lock().shapes.push(geometry);
    }
}

impl DrawTool for InMemoryDrawTool {
    fn add_control(&mut self) {
        self.state.lock().attached = true;
    }

    fn remove_control(&mut self) {
        self.state.lock().attached = false;
    }

    fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    fn get_all(&self) -> Vec<geojson::Geometry> {
        self.state.lock().shapes.clone()
    }

    fn delete_all(&mut self) {
        self.state.lock().shapes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryDrawTool, InMemoryMap};
    use crate::layer::{LayerSpec, SourceSpec};
    use crate::query::{FilterExpr, RenderedFeature};
    use crate::surface::{DrawTool, MapEventKind, MapSurface};
    use crate::symbology::{COMMUNITY_FILL, HIGHLIGHT_FILL};
    use foundation::geometry::{LngLat, ScreenPoint, ScreenRect};
    use pretty_assertions::assert_eq;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> ScreenRect {
        ScreenRect::new(ScreenPoint::new(x0, y0), ScreenPoint::new(x1, y1))
    }

    #[test]
    fn layers_respect_before_id() {
        let mut map = InMemoryMap::new();
        map.add_layer(LayerSpec::fill("a", "s", COMMUNITY_FILL), None);
        map.add_layer(LayerSpec::fill("c", "s", COMMUNITY_FILL), None);
        map.add_layer(LayerSpec::fill("b", "s", COMMUNITY_FILL), Some("c"));
        map.add_layer(LayerSpec::fill("d", "s", COMMUNITY_FILL), Some("missing"));
        assert_eq!(map.layer_ids(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn query_applies_layer_filter_and_hit_rect() {
        let mut map = InMemoryMap::new();
        map.add_source("communities", SourceSpec::Vector { url: "x".into() });
        map.add_layer(
            LayerSpec::fill("communities-fill", "communities", COMMUNITY_FILL)
                .with_filter(FilterExpr::eq("landscape_id", "K2C")),
            None,
        );
        map.place_feature(
            rect(0.0, 0.0, 10.0, 10.0),
            RenderedFeature::new("communities-fill").with_property("landscape_id", "K2C"),
        );
        map.place_feature(
            rect(0.0, 0.0, 10.0, 10.0),
            RenderedFeature::new("communities-fill").with_property("landscape_id", "OTHER"),
        );

        let layers = vec!["communities-fill".to_string()];
        let hits = map.query_rendered_features(ScreenPoint::new(5.0, 5.0), &layers);
        assert_eq!(hits.len(), 1);
        assert!(
            map.query_rendered_features(ScreenPoint::new(50.0, 5.0), &layers)
                .is_empty()
        );
    }

    #[test]
    fn query_returns_topmost_layer_first() {
        let mut map = InMemoryMap::new();
        map.add_layer(LayerSpec::fill("low", "s", COMMUNITY_FILL), None);
        map.add_layer(LayerSpec::fill("high", "s", HIGHLIGHT_FILL), None);
        map.place_feature(rect(0.0, 0.0, 1.0, 1.0), RenderedFeature::new("low"));
        map.place_feature(rect(0.0, 0.0, 1.0, 1.0), RenderedFeature::new("high"));
        let hits = map.query_rendered_features(
            ScreenPoint::new(0.5, 0.5),
            &["low".to_string(), "high".to_string()],
        );
        let order: Vec<&str> = hits.iter().map(|f| f.layer_id.as_str()).collect();
        assert_eq!(order, vec!["high", "low"]);
    }

    #[test]
    fn fire_yields_one_event_per_listener() {
        let mut map = InMemoryMap::new();
        let a = map.on(MapEventKind::Click, "l");
        let b = map.on(MapEventKind::Click, "l");
        let here = ScreenPoint::new(1.0, 1.0);
        let ll = LngLat::new(0.0, 0.0);
        assert_eq!(map.fire(MapEventKind::Click, "l", here, ll).len(), 2);

        assert!(map.off(a));
        assert!(!map.off(a));
        let events = map.fire(MapEventKind::Click, "l", here, ll);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].listener, b);
        assert_eq!(map.listener_count(MapEventKind::Click, "l"), 1);
    }

    #[test]
    fn draw_tool_tracks_control_and_shapes() {
        let mut draw = InMemoryDrawTool::new();
        let host = draw.clone();
        assert!(!draw.is_attached());
        draw.add_control();
        assert!(host.is_attached());
        host.push_shape(foundation::geometry::square_polygon(LngLat::new(0.0, 0.0), 0.1));
        assert_eq!(draw.get_all().len(), 1);
        draw.delete_all();
        draw.remove_control();
        assert!(draw.get_all().is_empty());
        assert!(!draw.is_attached());
    }
}
