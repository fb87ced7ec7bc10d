//! Body-tuning parameters with nested, owner-tagged overrides.
//!
//! Slope limit, step height and minimum move distance are shared between core
//! movement and auxiliary systems (a slide lowers the step height, a grapple
//! raises the slope limit). Each parameter keeps its original value, a base
//! value driven by core movement, and a LIFO stack of overrides keyed by
//! [`OwnerId`]. The top of the stack is the effective value and its owner.

use bevy::log::debug;
use bevy::prelude::*;

use crate::arbiter::OwnerId;
use crate::config::MovementConfig;

/// A tunable body parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum TuningParameter {
    /// Maximum climbable slope (degrees).
    SlopeLimit,
    /// Maximum step the body-mover climbs automatically.
    StepHeight,
    /// Displacements shorter than this are dropped.
    MinMoveDistance,
}

impl TuningParameter {
    pub const ALL: [Self; 3] = [Self::SlopeLimit, Self::StepHeight, Self::MinMoveDistance];
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TuningOverride {
    owner: OwnerId,
    value: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct ParameterStack {
    original: f32,
    base: f32,
    overrides: Vec<TuningOverride>,
}

impl ParameterStack {
    fn new(original: f32) -> Self {
        Self {
            original,
            base: original,
            overrides: Vec::new(),
        }
    }

    fn effective(&self) -> f32 {
        self.overrides.last().map_or(self.base, |o| o.value)
    }
}

/// Current body-tuning values of one character.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyTuning {
    slope_limit: ParameterStack,
    step_height: ParameterStack,
    min_move_distance: ParameterStack,
}

impl Default for BodyTuning {
    fn default() -> Self {
        Self::from_config(&MovementConfig::default())
    }
}

impl BodyTuning {
    pub fn from_config(config: &MovementConfig) -> Self {
        Self {
            slope_limit: ParameterStack::new(config.slope.default_slope_limit),
            step_height: ParameterStack::new(config.body.step_height),
            min_move_distance: ParameterStack::new(config.body.min_move_distance),
        }
    }

    fn stack(&self, parameter: TuningParameter) -> &ParameterStack {
        match parameter {
            TuningParameter::SlopeLimit => &self.slope_limit,
            TuningParameter::StepHeight => &self.step_height,
            TuningParameter::MinMoveDistance => &self.min_move_distance,
        }
    }

    fn stack_mut(&mut self, parameter: TuningParameter) -> &mut ParameterStack {
        match parameter {
            TuningParameter::SlopeLimit => &mut self.slope_limit,
            TuningParameter::StepHeight => &mut self.step_height,
            TuningParameter::MinMoveDistance => &mut self.min_move_distance,
        }
    }

    /// Value the body-mover should use now.
    pub fn effective(&self, parameter: TuningParameter) -> f32 {
        self.stack(parameter).effective()
    }

    /// Value from the configuration, before any change.
    pub fn original(&self, parameter: TuningParameter) -> f32 {
        self.stack(parameter).original
    }

    /// Owner of the effective override, `None` when the base value applies.
    pub fn owner(&self, parameter: TuningParameter) -> Option<OwnerId> {
        self.stack(parameter).overrides.last().map(|o| o.owner)
    }

    /// Number of stacked overrides.
    pub fn depth(&self, parameter: TuningParameter) -> usize {
        self.stack(parameter).overrides.len()
    }

    /// Push an override; it stays effective until released or restored.
    pub fn request_override(&mut self, parameter: TuningParameter, value: f32, owner: OwnerId) {
        debug!("{parameter:?} override {value} by {owner:?}");
        self.stack_mut(parameter)
            .overrides
            .push(TuningOverride { owner, value });
    }

    /// Remove `owner`'s most recent override.
    ///
    /// Returns `false` if `owner` holds none.
    pub fn release_override(&mut self, parameter: TuningParameter, owner: OwnerId) -> bool {
        let stack = self.stack_mut(parameter);
        match stack.overrides.iter().rposition(|o| o.owner == owner) {
            Some(index) => {
                stack.overrides.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every override and reset the base to the original value.
    pub fn restore_to_original(&mut self, parameter: TuningParameter) {
        let stack = self.stack_mut(parameter);
        if !stack.overrides.is_empty() {
            debug!("{parameter:?} restored to original, dropped {} override(s)", stack.overrides.len());
        }
        stack.overrides.clear();
        stack.base = stack.original;
    }

    /// [`restore_to_original`](Self::restore_to_original) for every parameter.
    pub fn restore_all(&mut self) {
        for parameter in TuningParameter::ALL {
            self.restore_to_original(parameter);
        }
    }

    /// Core movement's own value, used when no override is stacked.
    pub(crate) fn set_base(&mut self, parameter: TuningParameter, value: f32) {
        self.stack_mut(parameter).base = value;
    }

    /// Re-read original values from `config`, keeping overrides.
    pub(crate) fn sync_originals(&mut self, config: &MovementConfig) {
        self.slope_limit.original = config.slope.default_slope_limit;
        self.step_height.original = config.body.step_height;
        self.step_height.base = config.body.step_height;
        self.min_move_distance.original = config.body.min_move_distance;
        self.min_move_distance.base = config.body.min_move_distance;
    }
}
