//! The "pick an area" contract shared by every selection strategy.

use analysis::area::AreaSelection;
use foundation::geometry::LngLat;
use layers::surface::{ListenerId, MapEvent, MapEventKind, MapSurface};

/// A user layer eligible for feature picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLayerRef {
    pub layer_id: String,
    pub source_id: String,
    /// Property holding the feature identifier; `"id"` when unset.
    pub id_attribute: Option<String>,
    /// Property holding the display name; `"name"` when unset.
    pub name_attribute: Option<String>,
}

impl UserLayerRef {
    pub fn new(layer_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            source_id: source_id.into(),
            id_attribute: None,
            name_attribute: None,
        }
    }

    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = Some(attribute.into());
        self
    }

    pub fn with_name_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.name_attribute = Some(attribute.into());
        self
    }
}

/// What a strategy is armed for.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SelectionScope {
    #[default]
    None,
    /// Communities of one landscape.
    Landscape(String),
    UserLayers(Vec<UserLayerRef>),
    /// Freehand drawing over the whole map.
    Draw,
}

impl SelectionScope {
    pub fn is_empty(&self) -> bool {
        match self {
            SelectionScope::None => true,
            SelectionScope::Landscape(l) => l.is_empty(),
            SelectionScope::UserLayers(layers) => layers.is_empty(),
            SelectionScope::Draw => false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Empty or foreign scope: nothing registered.
    NoOp,
    /// Already armed for this scope: nothing re-registered.
    AlreadyActive,
    Activated,
}

/// An accepted freehand drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnArea {
    pub geometry: geojson::Geometry,
    pub centroid: LngLat,
    pub area_m2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Picked(AreaSelection),
    Drawn(DrawnArea),
    TooLarge { area_m2: f64, max_area_m2: f64 },
}

pub trait GeometrySelection {
    fn name(&self) -> &'static str;

    /// Registers listeners and layers for `scope`. Calling it again with the
    /// same scope registers nothing; with a different scope the strategy
    /// re-arms itself for the new one.
    fn activate(&mut self, map: &mut dyn MapSurface, scope: &SelectionScope) -> Activation;

    /// Removes every listener this strategy registered. Safe to call when
    /// inactive.
    fn deactivate(&mut self, map: &mut dyn MapSurface);

    fn is_active(&self) -> bool;

    /// Handles an event addressed to one of this strategy's listeners.
    /// Events for other listeners are ignored.
    fn handle_event(
        &mut self,
        map: &mut dyn MapSurface,
        event: &MapEvent,
    ) -> Option<SelectionOutcome>;
}

/// Listener handles owned by one strategy instance.
#[derive(Debug, Default)]
pub struct ListenerSet {
    ids: Vec<ListenerId>,
}

impl ListenerSet {
    pub fn register(&mut self, map: &mut dyn MapSurface, kind: MapEventKind, layer_id: &str) {
        self.ids.push(map.on(kind, layer_id));
    }

    pub fn owns(&self, id: ListenerId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self, map: &mut dyn MapSurface) {
        for id in self.ids.drain(..) {
            map.off(id);
        }
    }
}
