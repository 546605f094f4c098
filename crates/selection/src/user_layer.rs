use analysis::area::AreaSelection;
use foundation::geometry::is_areal;
use layers::layer::LayerSpec;
use layers::query::{FilterExpr, RenderedFeature, value_as_key};
use layers::surface::{Cursor, MapEvent, MapEventKind, MapSurface};
use layers::symbology::HIGHLIGHT_FILL;
use tracing::{debug, info};

use crate::strategy::{
    Activation, GeometrySelection, ListenerSet, SelectionOutcome, SelectionScope, UserLayerRef,
};

const DEFAULT_ID_ATTRIBUTE: &str = "id";
const DEFAULT_NAME_ATTRIBUTE: &str = "name";

pub fn highlight_layer_id(layer_id: &str) -> String {
    format!("{layer_id}-highlight")
}

/// Picks polygon features from layers the user uploaded.
#[derive(Debug, Default)]
pub struct UserLayerSelector {
    layers: Vec<UserLayerRef>,
    listeners: ListenerSet,
    /// (layer, filter attribute, feature id) of the current highlight.
    highlighted: Option<(String, String, String)>,
}

impl UserLayerSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> &[UserLayerRef] {
        &self.layers
    }

    /// Composite id of the highlighted feature.
    pub fn highlighted(&self) -> Option<String> {
        self.highlighted
            .as_ref()
            .map(|(layer, _, fid)| analysis::area::composite_feature_id(layer, fid))
    }

    /// Identifier of `feature` and the attribute it was read from. The
    /// configured attribute wins, then the default attribute, then the
    /// feature's own id.
    fn resolve_id(layer: &UserLayerRef, feature: &RenderedFeature) -> Option<(String, String)> {
        let configured = layer.id_attribute.as_deref().unwrap_or(DEFAULT_ID_ATTRIBUTE);
        [configured, DEFAULT_ID_ATTRIBUTE]
            .into_iter()
            .find_map(|attr| feature.property_key(attr).map(|v| (attr.to_string(), v)))
            .or_else(|| {
                feature
                    .id
                    .as_ref()
                    .and_then(value_as_key)
                    .map(|v| (DEFAULT_ID_ATTRIBUTE.to_string(), v))
            })
    }

    fn set_highlight(&mut self, map: &mut dyn MapSurface, next: Option<(String, String, String)>) {
        if let Some((layer, _, _)) = &self.highlighted {
            map.set_filter(&highlight_layer_id(layer), FilterExpr::Nothing);
        }
        if let Some((layer, attr, fid)) = &next {
            map.set_filter(&highlight_layer_id(layer), FilterExpr::eq(attr.as_str(), fid.as_str()));
        }
        self.highlighted = next;
    }

    fn pick(&mut self, map: &mut dyn MapSurface, event: &MapEvent) -> Option<SelectionOutcome> {
        let layer = self
            .layers
            .iter()
            .find(|l| l.layer_id == event.layer_id)?
            .clone();
        let hits = map.query_rendered_features(event.point, &[layer.layer_id.clone()]);
        let (feature, geometry) = hits.into_iter().find_map(|f| {
            let g = f.geometry.clone().filter(is_areal)?;
            Some((f, g))
        })?;
        let Some((attr, fid)) = Self::resolve_id(&layer, &feature) else {
            debug!(layer = %layer.layer_id, "clicked feature has no identifier");
            return None;
        };
        let name_attr = layer.name_attribute.as_deref().unwrap_or(DEFAULT_NAME_ATTRIBUTE);
        let name = feature
            .property_key(name_attr)
            .unwrap_or_else(|| fid.clone());

        let same = self
            .highlighted
            .as_ref()
            .is_some_and(|(l, _, f)| *l == layer.layer_id && *f == fid);
        if same {
            self.set_highlight(map, None);
        } else {
            self.set_highlight(map, Some((layer.layer_id.clone(), attr, fid.clone())));
        }
        debug!(layer = %layer.layer_id, %fid, "user feature picked");
        Some(SelectionOutcome::Picked(AreaSelection::user_feature(
            &layer.layer_id,
            &fid,
            name,
            event.lng_lat,
            geometry,
        )))
    }
}

impl GeometrySelection for UserLayerSelector {
    fn name(&self) -> &'static str {
        "user-layer"
    }

    fn activate(&mut self, map: &mut dyn MapSurface, scope: &SelectionScope) -> Activation {
        let SelectionScope::UserLayers(layers) = scope else {
            return Activation::NoOp;
        };
        if layers.is_empty() {
            return Activation::NoOp;
        }
        if self.is_active() {
            if self.layers == *layers {
                return Activation::AlreadyActive;
            }
            self.deactivate(map);
        }

        for layer in layers {
            map.add_layer(
                LayerSpec::fill(highlight_layer_id(&layer.layer_id), &layer.source_id, HIGHLIGHT_FILL)
                    .with_filter(FilterExpr::Nothing),
                None,
            );
            self.listeners
                .register(map, MapEventKind::Click, &layer.layer_id);
            self.listeners
                .register(map, MapEventKind::MouseEnter, &layer.layer_id);
            self.listeners
                .register(map, MapEventKind::MouseLeave, &layer.layer_id);
        }
        self.layers = layers.clone();
        info!(layers = self.layers.len(), "user layer selection armed");
        Activation::Activated
    }

    fn deactivate(&mut self, map: &mut dyn MapSurface) {
        if !self.is_active() {
            return;
        }
        self.listeners.clear(map);
        for layer in self.layers.drain(..) {
            map.remove_layer(&highlight_layer_id(&layer.layer_id));
        }
        map.set_cursor(Cursor::Default);
        self.highlighted = None;
        debug!("user layer selection disarmed");
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
