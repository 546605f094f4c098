use foundation::geometry::{
    SQ_M_PER_SQ_KM, centroid, combine_polygons, geodesic_area_m2, multipolygon_to_geojson,
};
use layers::layer::{LayerSpec, SourceSpec};
use layers::surface::{Cursor, DrawTool, MapEvent, MapEventKind, MapSurface};
use layers::symbology::{DRAWN_AREA_FILL, DRAWN_AREA_LINE};
use tracing::{debug, info, warn};

use crate::strategy::{
    Activation, DrawnArea, GeometrySelection, ListenerSet, SelectionOutcome, SelectionScope,
};

pub const DRAWN_AREA_SOURCE: &str = "drawn-area";
pub const DRAWN_AREA_FILL_LAYER: &str = "drawn-area-fill";
pub const DRAWN_AREA_LINE_LAYER: &str = "drawn-area-line";

/// Freehand polygon drawing, bounded by a maximum geodesic area.
pub struct FreehandDrawSelector {
    draw: Box<dyn DrawTool + Send>,
    max_area_m2: f64,
    listeners: ListenerSet,
    active: bool,
    preview_area_m2: Option<f64>,
    too_large: bool,
}

impl std::fmt::Debug for FreehandDrawSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreehandDrawSelector")
            .field("max_area_m2", &self.max_area_m2)
            .field("active", &self.active)
            .field("preview_area_m2", &self.preview_area_m2)
            .field("too_large", &self.too_large)
            .finish_non_exhaustive()
    }
}

impl FreehandDrawSelector {
    pub fn new(draw: Box<dyn DrawTool + Send>, max_area_m2: f64) -> Self {
        Self {
            draw,
            max_area_m2,
            listeners: ListenerSet::default(),
            active: false,
            preview_area_m2: None,
            too_large: false,
        }
    }

    pub fn max_area_m2(&self) -> f64 {
        self.max_area_m2
    }

    pub fn set_max_area_m2(&mut self, max_area_m2: f64) {
        self.max_area_m2 = max_area_m2;
    }

    /// Area of everything drawn so far, updated on each draw event.
    pub fn preview_area_m2(&self) -> Option<f64> {
        self.preview_area_m2
    }

    /// Set when the last finish attempt exceeded the maximum area.
    pub fn area_too_large(&self) -> bool {
        self.too_large
    }

    pub fn draw_tool(&self) -> &dyn DrawTool {
        &*self.draw
    }

    fn refresh_preview(&mut self) {
        let shapes = self.draw.get_all();
        self.preview_area_m2 = combine_polygons(&shapes).map(|mp| geodesic_area_m2(&mp));
    }

    /// Combines every drawn shape and checks the result against the maximum.
    ///
    /// Within the limit the overlay is drawn and the strategy disarms itself.
    /// Over the limit nothing is drawn and the strategy stays armed. Returns
    /// `None` when nothing areal has been drawn.
    pub fn finish(&mut self, map: &mut dyn MapSurface) -> Option<SelectionOutcome> {
        if !self.active {
            return None;
        }
        let shapes = self.draw.get_all();
        let combined = combine_polygons(&shapes)?;
        let area_m2 = geodesic_area_m2(&combined);
        self.preview_area_m2 = Some(area_m2);

        if area_m2 > self.max_area_m2 {
            self.too_large = true;
            warn!(
                area_km2 = area_m2 / SQ_M_PER_SQ_KM,
                max_km2 = self.max_area_m2 / SQ_M_PER_SQ_KM,
                "drawn area exceeds maximum"
            );
            return Some(SelectionOutcome::TooLarge {
                area_m2,
                max_area_m2: self.max_area_m2,
            });
        }

        let Some(center) = centroid(&combined) else {
            warn!("drawn area has no centroid");
            return None;
        };
        let geometry = multipolygon_to_geojson(&combined);
        self.show_overlay(map, &geometry);
        self.too_large = false;
        self.deactivate(map);
        info!(area_km2 = area_m2 / SQ_M_PER_SQ_KM, "drawn area accepted");
        Some(SelectionOutcome::Drawn(DrawnArea {
            geometry,
            centroid: center,
            area_m2,
        }))
    }

    /// Discards the shapes drawn in this session and disarms.
    pub fn cancel(&mut self, map: &mut dyn MapSurface) {
        self.draw.delete_all();
        self.deactivate(map);
    }

    fn show_overlay(&self, map: &mut dyn MapSurface, geometry: &geojson::Geometry) {
        self.clear_overlay(map);
        map.add_source(
            DRAWN_AREA_SOURCE,
            SourceSpec::GeoJson {
                data: geojson::GeoJson::Geometry(geometry.clone()),
            },
        );
        map.add_layer(
            LayerSpec::fill(DRAWN_AREA_FILL_LAYER, DRAWN_AREA_SOURCE, DRAWN_AREA_FILL),
            None,
        );
        map.add_layer(
            LayerSpec::line(DRAWN_AREA_LINE_LAYER, DRAWN_AREA_SOURCE, DRAWN_AREA_LINE),
            None,
        );
    }

    /// Removes the overlay of a previously accepted drawing.
    pub fn clear_overlay(&self, map: &mut dyn MapSurface) {
        map.remove_layer(DRAWN_AREA_LINE_LAYER);
        map.remove_layer(DRAWN_AREA_FILL_LAYER);
        map.remove_source(DRAWN_AREA_SOURCE);
    }
}

impl GeometrySelection for FreehandDrawSelector {
    fn name(&self) -> &'static str {
        "freehand-draw"
    }

    fn activate(&mut self, map: &mut dyn MapSurface, scope: &SelectionScope) -> Activation {
        if !matches!(scope, SelectionScope::Draw) {
            return Activation::NoOp;
        }
        if self.active {
            return Activation::AlreadyActive;
        }
        // A new drawing replaces the previous one.
        self.clear_overlay(map);
        self.draw.delete_all();
        self.draw.add_control();
        self.listeners.register(map, MapEventKind::DrawCreate, "");
        self.listeners.register(map, MapEventKind::DrawUpdate, "");
        map.set_cursor(Cursor::Crosshair);
        self.active = true;
        self.too_large = false;
        self.preview_area_m2 = None;
        info!("freehand drawing armed");
        Activation::Activated
    }

    fn deactivate(&mut self, map: &mut dyn MapSurface) {
        if !self.active {
            return;
        }
        self.listeners.clear(map);
        self.draw.remove_control();
        map.set_cursor(Cursor::Default);
        self.active = false;
        debug!("freehand drawing disarmed");
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn handle_event(
        &mut self,
        _map: &mut dyn MapSurface,
        event: &MapEvent,
    ) -> Option<SelectionOutcome> {
        if !self.listeners.owns(event.listener) {
            return None;
        }
        if matches!(event.kind, MapEventKind::DrawCreate | MapEventKind::DrawUpdate) {
            self.refresh_preview();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DRAWN_AREA_FILL_LAYER, DRAWN_AREA_LINE_LAYER, DRAWN_AREA_SOURCE, FreehandDrawSelector,
    };
    use crate::strategy::{Activation, GeometrySelection, SelectionOutcome, SelectionScope};
    use foundation::geometry::{
        LngLat, ScreenPoint, combine_polygons, geodesic_area_m2, square_polygon,
    };
    use layers::memory::{InMemoryDrawTool, InMemoryMap};
    use layers::surface::{Cursor, DrawTool, MapEventKind, MapSurface};

    fn selector(max_area_m2: f64) -> (FreehandDrawSelector, InMemoryDrawTool) {
        let tool = InMemoryDrawTool::new();
        let sel = FreehandDrawSelector::new(Box::new(tool.clone()), max_area_m2);
        (sel, tool)
    }

    fn square(half_deg: f64) -> geojson::Geometry {
        square_polygon(LngLat::new(30.0, -1.0), half_deg)
    }

    fn square_area(half_deg: f64) -> f64 {
        geodesic_area_m2(&combine_polygons([&square(half_deg)]).unwrap())
    }

    #[test]
    fn only_the_draw_scope_activates() {
        let mut map = InMemoryMap::new();
        let (mut sel, tool) = selector(1.0);
        assert_eq!(
            sel.activate(&mut map, &SelectionScope::Landscape("K2C".into())),
            Activation::NoOp
        );
        assert_eq!(sel.activate(&mut map, &SelectionScope::Draw), Activation::Activated);
        assert_eq!(sel.activate(&mut map, &SelectionScope::Draw), Activation::AlreadyActive);
        assert!(tool.is_attached());
        assert_eq!(map.total_listeners(), 2);
        assert_eq!(map.cursor(), Cursor::Crosshair);
    }

    #[test]
    fn accepted_drawing_leaves_overlay_and_disarms() {
        let mut map = InMemoryMap::new();
        let (mut sel, tool) = selector(square_area(0.1) * 2.0);
        sel.activate(&mut map, &SelectionScope::Draw);
        tool.push_shape(square(0.1));

        let Some(SelectionOutcome::Drawn(area)) = sel.finish(&mut map) else {
            panic!("expected drawn area");
        };
        assert!((area.centroid.lng - 30.0).abs() < 1e-9);
        assert!(matches!(area.geometry.value, geojson::Value::MultiPolygon(_)));
        assert!(map.has_source(DRAWN_AREA_SOURCE));
        assert!(map.has_layer(DRAWN_AREA_FILL_LAYER));
        assert!(map.has_layer(DRAWN_AREA_LINE_LAYER));
        assert!(!sel.is_active());
        assert!(!sel.draw_tool().is_attached());
        assert_eq!(map.total_listeners(), 0);
    }

    #[test]
    fn area_just_over_the_maximum_is_rejected_without_overlay() {
        let mut map = InMemoryMap::new();
        let (mut sel, tool) = selector(square_area(0.1) - 1.0);
        sel.activate(&mut map, &SelectionScope::Draw);
        tool.push_shape(square(0.1));

        let out = sel.finish(&mut map);
        assert!(matches!(out, Some(SelectionOutcome::TooLarge { .. })));
        assert!(sel.area_too_large());
        assert!(sel.is_active());
        assert!(!map.has_source(DRAWN_AREA_SOURCE));
        assert!(!map.has_layer(DRAWN_AREA_FILL_LAYER));
    }

    #[test]
    fn multiple_shapes_combine_into_one_area() {
        let mut map = InMemoryMap::new();
        let (mut sel, tool) = selector(f64::MAX);
        sel.activate(&mut map, &SelectionScope::Draw);
        tool.push_shape(square(0.1));
        tool.push_shape(square_polygon(LngLat::new(31.0, -1.0), 0.1));
        let Some(SelectionOutcome::Drawn(area)) = sel.finish(&mut map) else {
            panic!("expected drawn area");
        };
        let geojson::Value::MultiPolygon(parts) = &area.geometry.value else {
            panic!("expected multipolygon");
        };
        assert_eq!(parts.len(), 2);
        assert!((area.area_m2 / square_area(0.1) - 2.0).abs() < 0.01);
    }

    #[test]
    fn nothing_drawn_finishes_with_nothing() {
        let mut map = InMemoryMap::new();
        let (mut sel, _tool) = selector(f64::MAX);
        sel.activate(&mut map, &SelectionScope::Draw);
        assert!(sel.finish(&mut map).is_none());
        assert!(sel.is_active());
    }

    #[test]
    fn draw_events_update_the_preview() {
        let mut map = InMemoryMap::new();
        let (mut sel, tool) = selector(f64::MAX);
        sel.activate(&mut map, &SelectionScope::Draw);
        tool.push_shape(square(0.1));
        for e in map.fire(
            MapEventKind::DrawCreate,
            "",
            ScreenPoint::new(0.0, 0.0),
            LngLat::new(30.0, -1.0),
        ) {
            sel.handle_event(&mut map, &e);
        }
        let preview = sel.preview_area_m2().unwrap();
        assert!((preview - square_area(0.1)).abs() < 1.0);
    }

    #[test]
    fn new_drawing_replaces_overlay_and_cancel_discards_shapes() {
        let mut map = InMemoryMap::new();
        let (mut sel, tool) = selector(f64::MAX);
        sel.activate(&mut map, &SelectionScope::Draw);
        tool.push_shape(square(0.1));
        sel.finish(&mut map);
        assert!(map.has_source(DRAWN_AREA_SOURCE));

        sel.activate(&mut map, &SelectionScope::Draw);
        assert!(!map.has_source(DRAWN_AREA_SOURCE));
        tool.push_shape(square(0.2));
        sel.cancel(&mut map);
        assert!(sel.draw_tool().get_all().is_empty());
        assert!(!sel.is_active());
        assert_eq!(map.cursor(), Cursor::Default);
    }
}
