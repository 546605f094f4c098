//! The analysis workbench.
//!
//! Wires the draft configuration, the interaction mode controller and its
//! selection strategies, the job client and the draft store together. The
//! workbench is owned by one thread; only the job client's polling runs on
//! the async runtime, and its outcomes are folded back in by
//! [`Workbench::pump_job_events`].

use std::sync::Arc;

use analysis::area::AreaSelection;
use analysis::config::{AnalysisConfig, AnalysisType, ConfigPatch, PatchOutcome};
use analysis::indicator::{Indicator, variable_options};
use analysis::validation::{RequestKind, ValidationError};
use drafts::{DraftError, DraftStore};
use jobs::api::AnalysisApi;
use jobs::client::{AnalysisJobClient, JobError, JobEvent, JobId, PublishedState};
use jobs::protocol::{AnalysisRequest, ReferenceLayer};
use layers::layer::{LayerSpec, SourceSpec};
use layers::surface::{DrawTool, MapEvent, MapSurface};
use layers::symbology::REFERENCE_RASTER_OPACITY;
use runtime::event_bus::EventBus;
use selection::community::{COMMUNITY_FILL_LAYER, CommunitySelector};
use selection::draw::FreehandDrawSelector;
use selection::mode::{InteractionMode, InteractionModeController, ModeError};
use selection::strategy::{DrawnArea, SelectionOutcome, SelectionScope, UserLayerRef};
use selection::user_layer::UserLayerSelector;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::settings::Settings;

pub const REFERENCE_SOURCE: &str = "reference-layer";
pub const REFERENCE_LAYER: &str = "reference-layer-raster";
/// `referenceLayerId` of a reference area drawn by hand.
pub const DRAWN_REFERENCE_ID: &str = "drawn-area";
pub const JOB_EVENT: &str = "job";

#[derive(Debug, thiserror::Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Where pick mode takes its areas from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AreaSource {
    #[default]
    Communities,
    UserLayers(Vec<UserLayerRef>),
}

/// Which list a BACI pick lands in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PickTarget {
    #[default]
    Treatment,
    Control,
}

pub struct Workbench<M: MapSurface, D: DraftStore> {
    map: M,
    config: AnalysisConfig,
    controller: InteractionModeController,
    jobs: AnalysisJobClient,
    job_events: tokio::sync::broadcast::Receiver<JobEvent>,
    drafts: D,
    area_source: AreaSource,
    pick_target: PickTarget,
    indicators: Vec<Indicator>,
    shown_reference: Option<ReferenceLayer>,
    events: EventBus,
}

impl<M: MapSurface, D: DraftStore> Workbench<M, D> {
    /// Builds a workbench and restores the saved draft, if any.
    pub fn new(
        settings: &Settings,
        map: M,
        draw: Box<dyn DrawTool + Send>,
        api: Arc<dyn AnalysisApi>,
        drafts: D,
    ) -> Self {
        let controller = InteractionModeController::new(
            CommunitySelector::new(&settings.communities_url),
            FreehandDrawSelector::new(draw, settings.max_area_m2()),
            UserLayerSelector::new(),
        );
        let jobs = AnalysisJobClient::new(api, settings.job_settings());
        let job_events = jobs.subscribe();
        let config = match drafts.load() {
            Ok(Some(draft)) => {
                info!(saved_at_ms = draft.saved_at_ms, "restored analysis draft");
                draft.config
            }
            Ok(None) => AnalysisConfig::new(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable draft");
                AnalysisConfig::new()
            }
        };
        let mut wb = Self {
            map,
            config,
            controller,
            jobs,
            job_events,
            drafts,
            area_source: AreaSource::default(),
            pick_target: PickTarget::default(),
            indicators: Vec::new(),
            shown_reference: None,
            events: EventBus::new(),
        };
        wb.sync();
        wb
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn mode(&self) -> InteractionMode {
        self.controller.mode()
    }

    pub fn controller(&self) -> &InteractionModeController {
        &self.controller
    }

    pub fn jobs(&self) -> &AnalysisJobClient {
        &self.jobs
    }

    pub fn published(&self) -> PublishedState {
        self.jobs.state()
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn drafts(&self) -> &D {
        &self.drafts
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn area_source(&self) -> &AreaSource {
        &self.area_source
    }

    pub fn pick_target(&self) -> PickTarget {
        self.pick_target
    }

    pub fn is_submittable(&self) -> bool {
        self.config.is_submittable()
    }

    fn scope(&self) -> SelectionScope {
        match &self.area_source {
            AreaSource::Communities => self
                .config
                .landscape
                .clone()
                .map(SelectionScope::Landscape)
                .unwrap_or_default(),
            AreaSource::UserLayers(layers) => SelectionScope::UserLayers(layers.clone()),
        }
    }

    fn sync(&mut self) -> InteractionMode {
        let ready = self
            .config
            .pick_mode_ready(self.jobs.reference_published());
        let scope = self.scope();
        self.controller.sync(&mut self.map, ready, &scope)
    }

    /// Draws whatever drawn area the config still references.
    fn drawn_overlay_in_use(&self) -> bool {
        self.config.custom_geom.is_some()
            || self.config.reference_layer_id.as_deref() == Some(DRAWN_REFERENCE_ID)
    }

    /// Re-arms selection and persists the draft.
    fn after_change(&mut self) -> Result<(), WorkbenchError> {
        if !self.drawn_overlay_in_use() && self.mode() != InteractionMode::Drawing {
            self.controller.clear_drawn_overlay(&mut self.map);
        }
        self.sync();
        self.drafts.save(&self.config)?;
        Ok(())
    }

    /// Applies one form step.
    ///
    /// A new landscape or analysis type returns to `Idle`, resets the job
    /// client and re-targets BACI picks at the treatment list.
    pub fn apply(&mut self, patch: ConfigPatch) -> Result<PatchOutcome, WorkbenchError> {
        let outcome = self.config.update(patch);
        if outcome.landscape_changed || outcome.analysis_type_changed {
            let reason = if outcome.landscape_changed {
                "landscape changed"
            } else {
                "analysis type changed"
            };
            self.controller.disarm(&mut self.map, reason);
            self.jobs.reset(Some(self.config.analysis_type));
            self.pick_target = PickTarget::Treatment;
            self.refresh_reference_layer();
        }
        if outcome.reference_changed {
            self.drop_stale_reference();
        }
        if (outcome.analysis_type_changed || outcome.resolution_changed)
            && !self.indicators.is_empty()
        {
            self.config.retain_offered_variable(&self.indicators);
        }
        if outcome.changed {
            self.after_change()?;
        }
        Ok(outcome)
    }

    pub fn set_area_source(&mut self, source: AreaSource) {
        if self.area_source != source {
            self.area_source = source;
            self.sync();
        }
    }

    pub fn set_pick_target(&mut self, target: PickTarget) {
        self.pick_target = target;
    }

    /// Feeds a map event to the armed strategy and folds its outcome into
    /// the draft.
    pub fn handle_map_event(
        &mut self,
        event: &MapEvent,
    ) -> Result<Option<SelectionOutcome>, WorkbenchError> {
        let Some(outcome) = self.controller.handle_event(&mut self.map, event) else {
            return Ok(None);
        };
        match &outcome {
            SelectionOutcome::Picked(area) => self.route_pick(area.clone()),
            SelectionOutcome::Drawn(area) => self.route_drawn(area),
            SelectionOutcome::TooLarge { .. } => return Ok(Some(outcome)),
        }
        self.after_change()?;
        Ok(Some(outcome))
    }

    fn route_pick(&mut self, area: AreaSelection) {
        if self.config.analysis_type == AnalysisType::Spatial
            && self.config.reference_layer.is_none()
            && let Some(geometry) = area.geometry.clone()
        {
            info!(id = %area.id, "picked feature becomes the reference area");
            self.set_reference(ConfigPatch::default().reference_layer(area.id, geometry));
            return;
        }
        let added = match (self.config.analysis_type, self.pick_target) {
            (AnalysisType::Baci, PickTarget::Control) => {
                self.config.toggle_control_location(area)
            }
            _ => self.config.toggle_location(area),
        };
        debug!(added, "location toggled");
    }

    fn route_drawn(&mut self, area: &DrawnArea) {
        if self.config.analysis_type == AnalysisType::Spatial && self.config.reference_layer.is_none()
        {
            info!(area_m2 = area.area_m2, "drawn area becomes the reference area");
            self.set_reference(
                ConfigPatch::default().reference_layer(DRAWN_REFERENCE_ID, area.geometry.clone()),
            );
        } else {
            self.config.set_custom_geom(area.geometry.clone());
        }
    }

    fn set_reference(&mut self, patch: ConfigPatch) {
        if self.config.update(patch).reference_changed {
            self.drop_stale_reference();
        }
    }

    /// A published raster belongs to the reference it was computed for.
    fn drop_stale_reference(&mut self) {
        if self.jobs.reference_published() || self.jobs.is_loading() {
            debug!("reference area changed, discarding its analysis");
            self.jobs.reset(None);
            self.refresh_reference_layer();
        }
    }

    /// "Draw".
    pub fn begin_drawing(&mut self) -> Result<(), WorkbenchError> {
        self.controller
            .begin_drawing(&mut self.map, self.config.analysis_type)?;
        Ok(())
    }

    /// "Finish Drawing". An oversized area leaves drawing armed and the draft
    /// untouched.
    pub fn finish_drawing(&mut self) -> Result<SelectionOutcome, WorkbenchError> {
        let outcome = self.controller.finish_drawing(&mut self.map)?;
        if let SelectionOutcome::Drawn(area) = &outcome {
            self.route_drawn(area);
            self.after_change()?;
        }
        Ok(outcome)
    }

    /// "Cancel".
    pub fn cancel_drawing(&mut self) -> Result<(), WorkbenchError> {
        self.controller.cancel_drawing(&mut self.map)?;
        self.sync();
        Ok(())
    }

    /// Removes the area picked or drawn for a Spatial reference so another
    /// can be chosen.
    pub fn clear_reference(&mut self) -> Result<(), WorkbenchError> {
        self.config.clear_reference_layer();
        self.jobs.reset(None);
        self.refresh_reference_layer();
        self.after_change()
    }

    /// "Reset Form": empties the draft, the published result and the map
    /// overlays.
    pub fn reset_form(&mut self) -> Result<(), WorkbenchError> {
        self.controller.disarm(&mut self.map, "form reset");
        self.controller.clear_drawn_overlay(&mut self.map);
        self.config.reset();
        self.jobs.reset(None);
        self.pick_target = PickTarget::Treatment;
        self.refresh_reference_layer();
        self.drafts.clear()?;
        self.sync();
        info!("analysis form reset");
        Ok(())
    }

    /// Validates and submits the draft, then folds in whatever the
    /// submission already settled.
    pub async fn submit(&mut self) -> Result<JobId, WorkbenchError> {
        let request = AnalysisRequest::new(self.config.clone())?;
        let id = self.jobs.submit(request).await;
        self.pump_job_events();
        Ok(id)
    }

    pub async fn retry(&mut self) -> Option<JobId> {
        let id = self.jobs.retry().await;
        self.pump_job_events();
        id
    }

    /// Waits for the tracked job to settle, then folds in its outcome.
    pub async fn settle(&mut self) -> PublishedState {
        self.jobs.wait_settled().await;
        self.pump_job_events();
        self.jobs.state()
    }

    /// Applies queued job events to the mode and the map.
    pub fn pump_job_events(&mut self) {
        loop {
            let event = match self.job_events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "job events dropped");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            };
            self.events.emit(JOB_EVENT, format!("{event:?}"));
            match event {
                JobEvent::Completed {
                    kind: RequestKind::ReferenceOnly,
                    ..
                } => info!("reference analysis published, picking enabled"),
                JobEvent::Failed {
                    kind: RequestKind::ReferenceOnly,
                    ..
                }
                | JobEvent::TimedOut {
                    kind: RequestKind::ReferenceOnly,
                    ..
                } => {
                    self.controller
                        .disarm(&mut self.map, "reference analysis failed");
                }
                _ => {}
            }
        }
        self.refresh_reference_layer();
        self.sync();
    }

    /// Keeps the map's reference raster in step with the published layer.
    fn refresh_reference_layer(&mut self) {
        let published = self.jobs.state().reference_layer;
        if published == self.shown_reference {
            return;
        }
        if self.shown_reference.take().is_some() {
            self.map.remove_layer(REFERENCE_LAYER);
            self.map.remove_source(REFERENCE_SOURCE);
        }
        if let Some(layer) = published {
            self.map.add_source(
                REFERENCE_SOURCE,
                SourceSpec::Raster {
                    tiles: layer.tiles.clone(),
                    tile_size: layer.tile_size,
                },
            );
            let before = self
                .map
                .has_layer(COMMUNITY_FILL_LAYER)
                .then_some(COMMUNITY_FILL_LAYER);
            self.map.add_layer(
                LayerSpec::raster(REFERENCE_LAYER, REFERENCE_SOURCE, REFERENCE_RASTER_OPACITY),
                before,
            );
            self.shown_reference = Some(layer);
        }
    }

    /// Fetches the indicator catalog and drops a variable it no longer offers.
    pub async fn load_indicators(&mut self) -> Result<usize, WorkbenchError> {
        self.indicators = self.jobs.indicators().await?;
        if self.config.retain_offered_variable(&self.indicators) {
            self.after_change()?;
        }
        Ok(self.indicators.len())
    }

    /// Variables selectable for the current analysis type and resolution.
    pub fn variable_options(&self) -> Vec<&Indicator> {
        variable_options(
            &self.indicators,
            self.config.analysis_type,
            self.config.temporal_resolution,
        )
    }
}
