//! Jump state machine.
//!
//! Handles grounded jumps, coyote time, input buffering, the air-jump budget,
//! variable jump height and the anti-softlock emergency jump.
//!
//! The machine never writes velocity itself: [`JumpState::update`] returns a
//! [`JumpOutcome`] that the orchestrator commits through the arbiter.

use std::collections::VecDeque;

use bevy::log::debug;
use bevy::prelude::*;

use crate::config::JumpConfig;
use crate::slope::horizontal;

/// Which rule produced a jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum JumpKind {
    /// Pressed while grounded.
    Grounded,
    /// Pressed shortly before landing and replayed on touchdown.
    Buffered,
    /// Pressed shortly after walking off a ledge.
    Coyote,
    /// Forced after repeated failed attempts while stuck.
    Emergency,
    /// Spent one unit of the air-jump budget.
    Double,
}

/// Coarse jump availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum JumpPhase {
    GroundedReady,
    CoyoteWindow,
    AirborneSpent,
}

/// Per-frame inputs to the jump state machine.
#[derive(Debug, Clone, Copy)]
pub struct JumpContext {
    pub now: f32,
    pub up: Vec3,
    /// Gravity magnitude (units/second^2).
    pub gravity: f32,
    /// Debounced grounded flag.
    pub grounded: bool,
    /// Raw contact with something below (probe or body-mover flag).
    pub touching_ground: bool,
    /// Position along `up`, used to detect height gain.
    pub height: f32,
    pub velocity: Vec3,
    pub latched_momentum: Option<Vec3>,
    pub platform_velocity: Vec3,
    /// Rising edge of the jump input this frame.
    pub pressed: bool,
}

/// A jump that fired this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpOutcome {
    pub kind: JumpKind,
    pub velocity: Vec3,
    /// Extra displacement applied once to free a stuck body.
    pub nudge: Vec3,
}

/// Jump bookkeeping for one character.
#[derive(Debug, Clone)]
pub struct JumpState {
    last_grounded_time: f32,
    buffered_jump_time: Option<f32>,
    air_jumps_remaining: u32,
    jump_cooldown_until: f32,
    suppress_grounded_until: f32,
    coyote_available: bool,
    ascending: bool,
    cut_applied: bool,
    failed_attempts: VecDeque<f32>,
    failure_anchor_height: Option<f32>,
}

impl JumpState {
    pub fn new(config: &JumpConfig) -> Self {
        Self {
            last_grounded_time: f32::NEG_INFINITY,
            buffered_jump_time: None,
            air_jumps_remaining: config.air_jumps,
            jump_cooldown_until: f32::NEG_INFINITY,
            suppress_grounded_until: f32::NEG_INFINITY,
            coyote_available: false,
            ascending: false,
            cut_applied: false,
            failed_attempts: VecDeque::new(),
            failure_anchor_height: None,
        }
    }

    pub fn last_grounded_time(&self) -> f32 {
        self.last_grounded_time
    }

    pub fn buffered_jump_time(&self) -> Option<f32> {
        self.buffered_jump_time
    }

    pub fn air_jumps_remaining(&self) -> u32 {
        self.air_jumps_remaining
    }

    pub fn jump_cooldown_until(&self) -> f32 {
        self.jump_cooldown_until
    }

    pub fn suppress_grounded_until(&self) -> f32 {
        self.suppress_grounded_until
    }

    /// Whether ground samples must be ignored so lift-off is not cancelled.
    #[inline]
    pub fn is_grounded_suppressed(&self, now: f32) -> bool {
        now < self.suppress_grounded_until
    }

    /// Whether the body is still rising from a jump that can be cut.
    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    /// Grounded, or still inside the coyote window.
    pub fn grounded_with_coyote(&self, now: f32, grounded: bool, config: &JumpConfig) -> bool {
        grounded || self.in_coyote_window(now, config)
    }

    pub fn phase(&self, now: f32, grounded: bool, config: &JumpConfig) -> JumpPhase {
        if grounded {
            JumpPhase::GroundedReady
        } else if self.in_coyote_window(now, config) {
            JumpPhase::CoyoteWindow
        } else {
            JumpPhase::AirborneSpent
        }
    }

    /// Whether a grounded jump would fire right now.
    pub fn can_jump(&self, now: f32, grounded: bool) -> bool {
        grounded && now >= self.jump_cooldown_until
    }

    /// Drop a pending buffered press.
    pub fn clear_buffered(&mut self) {
        self.buffered_jump_time = None;
    }

    /// Grounded entry: restore the air-jump budget and reopen coyote time.
    pub fn on_landed(&mut self, now: f32, config: &JumpConfig) {
        self.last_grounded_time = now;
        self.air_jumps_remaining = config.air_jumps;
        self.coyote_available = true;
        self.ascending = false;
        self.cut_applied = false;
    }

    /// Grounded exit without a jump.
    pub fn on_left_ground(&mut self, now: f32) {
        self.last_grounded_time = self.last_grounded_time.max(now);
    }

    /// Run one frame of the jump state machine.
    pub fn update(&mut self, ctx: &JumpContext, config: &JumpConfig) -> Option<JumpOutcome> {
        let now = ctx.now;
        if ctx.grounded {
            self.last_grounded_time = now;
        }
        self.prune_failures(ctx, config);

        let grounded_ready = self.can_jump(now, ctx.grounded);

        if ctx.pressed {
            if grounded_ready {
                return Some(self.execute(JumpKind::Grounded, config.impulse, ctx, config));
            }
            if !ctx.grounded && self.in_coyote_window(now, config) && now >= self.jump_cooldown_until
            {
                return Some(self.execute(JumpKind::Coyote, config.impulse, ctx, config));
            }
            if self.failed_attempts.len() + 1 >= config.failed_attempt_limit as usize
                && ctx.touching_ground
            {
                return Some(self.execute(JumpKind::Emergency, config.emergency_impulse, ctx, config));
            }
            if !ctx.grounded
                && self.air_jumps_remaining > 0
                && now >= self.jump_cooldown_until
            {
                self.air_jumps_remaining -= 1;
                return Some(self.execute(JumpKind::Double, config.double_jump_impulse, ctx, config));
            }

            self.buffered_jump_time = Some(now);
            if ctx.touching_ground {
                self.record_failure(ctx);
            }
            return None;
        }

        if grounded_ready
            && self
                .buffered_jump_time
                .is_some_and(|pressed_at| now - pressed_at <= config.buffer_time)
        {
            return Some(self.execute(JumpKind::Buffered, config.impulse, ctx, config));
        }

        None
    }

    /// Variable height: cut the ascent once when the button is released.
    ///
    /// Returns the reduced velocity if a cut was applied.
    pub fn apply_cut(&mut self, velocity: Vec3, held: bool, up: Vec3, config: &JumpConfig) -> Option<Vec3> {
        if !self.ascending {
            return None;
        }
        let vertical = velocity.dot(up);
        if vertical <= 0.0 {
            self.ascending = false;
            return None;
        }
        if held || self.cut_applied {
            return None;
        }
        self.cut_applied = true;
        Some(velocity - up * vertical * (1.0 - config.cut_factor))
    }

    fn in_coyote_window(&self, now: f32, config: &JumpConfig) -> bool {
        self.coyote_available && now - self.last_grounded_time <= config.coyote_time
    }

    fn execute(&mut self, kind: JumpKind, impulse: f32, ctx: &JumpContext, config: &JumpConfig) -> JumpOutcome {
        let up = ctx.up;
        let mut planar = match (kind, ctx.latched_momentum) {
            (JumpKind::Double, _) => horizontal(ctx.velocity, up),
            (_, Some(momentum)) => horizontal(momentum, up),
            (_, None) => horizontal(ctx.velocity, up),
        };
        if kind != JumpKind::Double {
            planar += horizontal(ctx.platform_velocity, up);
        }

        let velocity = planar + up * impulse;
        let nudge = if kind == JumpKind::Emergency {
            up * config.unstick_nudge
        } else {
            Vec3::ZERO
        };

        let lift_time = if ctx.gravity.abs() > f32::EPSILON {
            (impulse / ctx.gravity).abs() * 0.5
        } else {
            0.0
        };
        self.suppress_grounded_until = ctx.now + lift_time.max(config.min_grounded_suppression);
        self.jump_cooldown_until = ctx.now + config.cooldown;
        self.buffered_jump_time = None;
        self.coyote_available = false;
        self.ascending = true;
        self.cut_applied = false;
        self.failed_attempts.clear();
        self.failure_anchor_height = None;

        debug!("jump {kind:?} with impulse {impulse:.2}");
        JumpOutcome { kind, velocity, nudge }
    }

    fn record_failure(&mut self, ctx: &JumpContext) {
        if self.failed_attempts.is_empty() {
            self.failure_anchor_height = Some(ctx.height);
        }
        self.failed_attempts.push_back(ctx.now);
    }

    fn prune_failures(&mut self, ctx: &JumpContext, config: &JumpConfig) {
        while self
            .failed_attempts
            .front()
            .is_some_and(|&t| ctx.now - t > config.failed_attempt_window)
        {
            self.failed_attempts.pop_front();
        }
        let gained = self
            .failure_anchor_height
            .is_some_and(|anchor| ctx.height - anchor > config.min_height_gain);
        if gained || self.failed_attempts.is_empty() {
            self.failed_attempts.clear();
            self.failure_anchor_height = None;
        }
    }
}
