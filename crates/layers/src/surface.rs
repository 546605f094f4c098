//! Contracts for the imperative map surface and its drawing tool.
//!
//! The surface owns one registry of sources, layers and event listeners.
//! Listeners are plain handles: the host delivers a [`MapEvent`] carrying
//! the handle that fired, and whoever owns that handle decides what to do.
//! Nothing here stores callbacks, so removing a handle is all it takes to
//! stop receiving events.

use foundation::geometry::{LngLat, ScreenPoint};

use crate::layer::{LayerSpec, SourceSpec};
use crate::query::{FilterExpr, RenderedFeature};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapEventKind {
    Click,
    MouseEnter,
    MouseLeave,
    /// Drawing tool finished a shape.
    DrawCreate,
    /// Drawing tool edited a shape.
    DrawUpdate,
}

impl MapEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MapEventKind::Click => "click",
            MapEventKind::MouseEnter => "mouseenter",
            MapEventKind::MouseLeave => "mouseleave",
            MapEventKind::DrawCreate => "draw.create",
            MapEventKind::DrawUpdate => "draw.update",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Pointer,
    Crosshair,
}

/// An event delivered to the owner of `listener`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
    pub listener: ListenerId,
    pub kind: MapEventKind,
    pub layer_id: String,
    pub point: ScreenPoint,
    pub lng_lat: LngLat,
}

pub trait MapSurface {
    fn add_source(&mut self, id: &str, source: SourceSpec);
    fn remove_source(&mut self, id: &str) -> bool;
    fn has_source(&self, id: &str) -> bool;

    /// Adds `layer` below `before_id` when given and present, on top otherwise.
    fn add_layer(&mut self, layer: LayerSpec, before_id: Option<&str>);
    fn remove_layer(&mut self, id: &str) -> bool;
    fn has_layer(&self, id: &str) -> bool;

    fn set_filter(&mut self, layer_id: &str, filter: FilterExpr);

    /// Registers interest in `event` on `layer_id` (empty for map-wide events).
    fn on(&mut self, event: MapEventKind, layer_id: &str) -> ListenerId;
    fn off(&mut self, listener: ListenerId) -> bool;

    /// Features under `point` on the given layers, topmost first.
    fn query_rendered_features(&self, point: ScreenPoint, layers: &[String])
    -> Vec<RenderedFeature>;

    fn set_cursor(&mut self, cursor: Cursor);
}

/// Polygon drawing control attached to the map.
pub trait DrawTool {
    fn add_control(&mut self);
    fn remove_control(&mut self);
    fn is_attached(&self) -> bool;
    /// Every shape currently drawn.
    fn get_all(&self) -> Vec<geojson::Geometry>;
    fn delete_all(&mut self);
}
