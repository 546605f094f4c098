//! Interaction mode state machine.
//!
//! The controller owns the three selection strategies and guarantees that at
//! most one of them is armed: the outgoing strategy is always deactivated
//! before the incoming one activates, and map events are routed only to the
//! armed strategy.

use std::fmt;

use analysis::config::AnalysisType;
use layers::surface::{MapEvent, MapSurface};
use runtime::event_bus::EventBus;
use tracing::info;

use crate::community::CommunitySelector;
use crate::draw::FreehandDrawSelector;
use crate::strategy::{Activation, GeometrySelection, SelectionOutcome, SelectionScope};
use crate::user_layer::UserLayerSelector;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum InteractionMode {
    #[default]
    Idle,
    AwaitingAreaPick,
    Drawing,
}

impl InteractionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionMode::Idle => "idle",
            InteractionMode::AwaitingAreaPick => "awaiting-area-pick",
            InteractionMode::Drawing => "drawing",
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StrategyKind {
    Community,
    FreehandDraw,
    UserLayer,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("drawing is only available for spatial analyses")]
    DrawingNotAllowed,
    #[error("cannot {action} while {mode}")]
    InvalidTransition {
        action: &'static str,
        mode: InteractionMode,
    },
    #[error("nothing has been drawn")]
    NothingDrawn,
}

pub const MODE_EVENT: &str = "mode";

#[derive(Debug)]
pub struct InteractionModeController {
    mode: InteractionMode,
    armed: Option<StrategyKind>,
    community: CommunitySelector,
    draw: FreehandDrawSelector,
    user_layers: UserLayerSelector,
    events: EventBus,
}

impl InteractionModeController {
    pub fn new(
        community: CommunitySelector,
        draw: FreehandDrawSelector,
        user_layers: UserLayerSelector,
    ) -> Self {
        Self {
            mode: InteractionMode::Idle,
            armed: None,
            community,
            draw,
            user_layers,
            events: EventBus::new(),
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn armed(&self) -> Option<StrategyKind> {
        self.armed
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn community(&self) -> &CommunitySelector {
        &self.community
    }

    pub fn draw(&self) -> &FreehandDrawSelector {
        &self.draw
    }

    pub fn user_layers(&self) -> &UserLayerSelector {
        &self.user_layers
    }

    /// Drawn area exceeded the maximum on the last finish attempt.
    pub fn area_too_large(&self) -> bool {
        self.draw.area_too_large()
    }

    fn strategy_mut(&mut self, kind: StrategyKind) -> &mut dyn GeometrySelection {
        match kind {
            StrategyKind::Community => &mut self.community,
            StrategyKind::FreehandDraw => &mut self.draw,
            StrategyKind::UserLayer => &mut self.user_layers,
        }
    }

    fn transition(&mut self, to: InteractionMode, reason: &str) {
        if self.mode == to {
            return;
        }
        info!(from = %self.mode, %to, reason, "interaction mode changed");
        self.events
            .emit(MODE_EVENT, format!("{} -> {to} ({reason})", self.mode));
        self.mode = to;
    }

    fn disarm_current(&mut self, map: &mut dyn MapSurface) {
        if let Some(kind) = self.armed.take() {
            self.strategy_mut(kind).deactivate(map);
        }
    }

    /// Arms `kind` for `scope`, deactivating whatever was armed before.
    fn arm(
        &mut self,
        map: &mut dyn MapSurface,
        kind: StrategyKind,
        scope: &SelectionScope,
    ) -> Activation {
        if self.armed != Some(kind) {
            self.disarm_current(map);
        }
        let activation = self.strategy_mut(kind).activate(map, scope);
        self.armed = match activation {
            Activation::NoOp => None,
            Activation::Activated | Activation::AlreadyActive => Some(kind),
        };
        activation
    }

    /// Reconciles the mode with the current configuration.
    ///
    /// When `ready` and the scope names something to pick from, the matching
    /// pick strategy is armed and the mode becomes `AwaitingAreaPick`;
    /// otherwise everything is disarmed and the mode becomes `Idle`. An
    /// ongoing drawing is left alone: it ends through finish or cancel.
    pub fn sync(
        &mut self,
        map: &mut dyn MapSurface,
        ready: bool,
        scope: &SelectionScope,
    ) -> InteractionMode {
        if self.mode == InteractionMode::Drawing {
            return self.mode;
        }
        let kind = match scope {
            SelectionScope::Landscape(_) => Some(StrategyKind::Community),
            SelectionScope::UserLayers(_) => Some(StrategyKind::UserLayer),
            SelectionScope::None | SelectionScope::Draw => None,
        };
        match kind {
            Some(kind) if ready && !scope.is_empty() => {
                if self.arm(map, kind, scope) == Activation::NoOp {
                    self.transition(InteractionMode::Idle, "nothing to pick from");
                } else {
                    self.transition(InteractionMode::AwaitingAreaPick, "configuration ready");
                }
            }
            _ => {
                self.disarm_current(map);
                self.transition(InteractionMode::Idle, "configuration not ready");
            }
        }
        self.mode
    }

    /// Forces `Idle` from any mode, discarding an unfinished drawing.
    pub fn disarm(&mut self, map: &mut dyn MapSurface, reason: &str) {
        if self.mode == InteractionMode::Drawing {
            self.draw.cancel(map);
            self.armed = None;
        }
        self.disarm_current(map);
        self.transition(InteractionMode::Idle, reason);
    }

    /// "Draw": swaps the pick strategy for freehand drawing.
    pub fn begin_drawing(
        &mut self,
        map: &mut dyn MapSurface,
        analysis_type: AnalysisType,
    ) -> Result<(), ModeError> {
        if analysis_type != AnalysisType::Spatial {
            return Err(ModeError::DrawingNotAllowed);
        }
        if self.mode != InteractionMode::AwaitingAreaPick {
            return Err(ModeError::InvalidTransition {
                action: "start drawing",
                mode: self.mode,
            });
        }
        self.arm(map, StrategyKind::FreehandDraw, &SelectionScope::Draw);
        self.transition(InteractionMode::Drawing, "draw requested");
        Ok(())
    }

    /// "Finish Drawing".
    ///
    /// An accepted drawing returns [`SelectionOutcome::Drawn`] and moves to
    /// `Idle`. An oversized one returns [`SelectionOutcome::TooLarge`] and
    /// keeps drawing armed.
    pub fn finish_drawing(
        &mut self,
        map: &mut dyn MapSurface,
    ) -> Result<SelectionOutcome, ModeError> {
        if self.mode != InteractionMode::Drawing {
            return Err(ModeError::InvalidTransition {
                action: "finish drawing",
                mode: self.mode,
            });
        }
        let outcome = self.draw.finish(map).ok_or(ModeError::NothingDrawn)?;
        if let SelectionOutcome::Drawn(_) = outcome {
            self.armed = None;
            self.transition(InteractionMode::Idle, "drawing finished");
        }
        Ok(outcome)
    }

    /// "Cancel".
    pub fn cancel_drawing(&mut self, map: &mut dyn MapSurface) -> Result<(), ModeError> {
        if self.mode != InteractionMode::Drawing {
            return Err(ModeError::InvalidTransition {
                action: "cancel drawing",
                mode: self.mode,
            });
        }
        self.draw.cancel(map);
        self.armed = None;
        self.transition(InteractionMode::Idle, "drawing cancelled");
        Ok(())
    }

    /// Removes the overlay of an accepted drawing ("Reset Form").
    pub fn clear_drawn_overlay(&mut self, map: &mut dyn MapSurface) {
        self.draw.clear_overlay(map);
    }

    /// Routes `event` to the armed strategy only.
    pub fn handle_event(
        &mut self,
        map: &mut dyn MapSurface,
        event: &MapEvent,
    ) -> Option<SelectionOutcome> {
        let kind = self.armed?;
        self.strategy_mut(kind).handle_event(map, event)
    }
}
