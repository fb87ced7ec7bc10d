//! Movement orchestrator.
//!
//! [`MovementState`] owns every piece of per-character movement state and is
//! the only thing that mutates it. Each fixed tick runs two phases:
//!
//! - **simulate**: resolve velocity claims, attempt wall jumps, run
//!   locomotion, slope forces, gravity and the jump state machine, commit the
//!   result through the arbiter and produce the displacement for the
//!   body-mover;
//! - **settle**: after the body has moved (and any platform has carried it),
//!   debounce the fresh ground sample, handle landing and leaving ground, and
//!   remember touched surfaces for wall detection.
//!
//! Auxiliary systems only use the narrow facade (`request_velocity`,
//! `add_velocity`, `launch_air`, tuning overrides, ...).

use bevy::log::debug;
use bevy::prelude::*;

use crate::arbiter::{ClaimOutcome, ClaimResolution, OwnerId, VelocityArbiter, VelocityOwner};
use crate::backend::SensorReadings;
use crate::collision::CollisionData;
use crate::config::MovementConfig;
use crate::grounding::{classify, GroundProbe, GroundSample, GroundTransition, GroundingState};
use crate::intent::MovementIntent;
use crate::jumping::{JumpContext, JumpKind, JumpState};
use crate::slope::{horizontal, SlopeForceModel, SlopeInput, SlopeMotion};
use crate::state::MovementMode;
use crate::tuning::{BodyTuning, TuningParameter};
use crate::wall_jump::{
    sweep_direction, WallContact, WallJumpContext, WallJumpRefusal, WallJumpState,
};

/// Below this horizontal speed, slope classification uses the input direction.
const SLOPE_DIRECTION_MIN_SPEED: f32 = 0.1;

/// Input for one simulate step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    /// Frame timestamp (seconds).
    pub now: f32,
    pub dt: f32,
    /// Body position before the move.
    pub position: Vec3,
    /// Camera-relative direction on the ground plane, length at most 1.
    pub walk_direction: Vec3,
    /// Camera-relative 3D direction used while flying.
    pub fly_direction: Vec3,
    pub camera_forward: Vec3,
    /// Rising edge of the jump button.
    pub jump_pressed: bool,
    pub jump_held: bool,
    pub sprint: bool,
    pub crouch: bool,
}

impl FrameInput {
    /// A frame with no input at all.
    pub fn idle(now: f32, dt: f32, position: Vec3) -> Self {
        Self {
            now,
            dt,
            position,
            walk_direction: Vec3::ZERO,
            fly_direction: Vec3::ZERO,
            camera_forward: Vec3::NEG_Z,
            jump_pressed: false,
            jump_held: false,
            sprint: false,
            crouch: false,
        }
    }
}

/// Sensor data for one settle step.
#[derive(Debug, Clone, Copy)]
pub struct SettleInput<'a> {
    pub now: f32,
    /// Body position after the move.
    pub position: Vec3,
    pub probe: GroundProbe,
    /// The body-mover's own grounded flag.
    pub fallback_grounded: bool,
    /// Surfaces touched by the move.
    pub touched: &'a [CollisionData],
}

/// Something animation, audio or gameplay code may want to react to.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum MovementEvent {
    Jumped(JumpKind),
    WallJumped {
        normal: Vec3,
        wall: Option<Entity>,
    },
    Landed {
        /// Height lost since the apex of the airborne phase.
        fall_distance: f32,
    },
    /// Walked or was pushed off the ground (jumps report `Jumped` instead).
    LeftGround,
    ClaimExpired(VelocityOwner),
    /// An emergency jump nudged a stuck body free.
    EmergencyUnstick,
}

/// A [`MovementEvent`] published to the app, tagged with its character.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct MovementEventMessage {
    pub entity: Entity,
    pub event: MovementEvent,
}

/// Read-only view of a character's movement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementSnapshot {
    pub raw_grounded: bool,
    pub grounded: bool,
    pub grounded_with_coyote: bool,
    pub velocity: Vec3,
    pub slope_angle_degrees: f32,
    pub ground_normal: Vec3,
    pub mode: MovementMode,
    pub wall_jump_chain: bool,
    pub owner: VelocityOwner,
    pub air_jumps_remaining: u32,
    pub protection_active: bool,
}

/// All movement state of one character.
#[derive(Debug, Clone)]
pub struct MovementState {
    config: MovementConfig,
    up: Vec3,
    now: f32,
    mode: MovementMode,
    enabled: bool,
    grounding: GroundingState,
    fallback_grounded: bool,
    arbiter: VelocityArbiter,
    slope: SlopeForceModel,
    jump: JumpState,
    wall: WallJumpState,
    tuning: BodyTuning,
    platform: Option<Entity>,
    platform_velocity: Vec3,
    height: f32,
    fall_apex: f32,
    touching_wall: Option<WallContact>,
    translation: Vec3,
    wall_probe_direction: Vec3,
    events: Vec<MovementEvent>,
}

impl Default for MovementState {
    fn default() -> Self {
        Self::new(&MovementConfig::default())
    }
}

impl MovementState {
    pub fn new(config: &MovementConfig) -> Self {
        Self {
            config: *config,
            up: Vec3::Y,
            now: 0.0,
            mode: MovementMode::Walking,
            enabled: true,
            grounding: GroundingState::default(),
            fallback_grounded: false,
            arbiter: VelocityArbiter::new(),
            slope: SlopeForceModel::new(&config.slope),
            jump: JumpState::new(&config.jump),
            wall: WallJumpState::default(),
            tuning: BodyTuning::from_config(config),
            platform: None,
            platform_velocity: Vec3::ZERO,
            height: 0.0,
            fall_apex: 0.0,
            touching_wall: None,
            translation: Vec3::ZERO,
            wall_probe_direction: Vec3::ZERO,
            events: Vec::new(),
        }
    }

    /// Use a custom world-up direction.
    pub fn with_up(mut self, up: Vec3) -> Self {
        let up = up.normalize_or_zero();
        self.up = if up == Vec3::ZERO { Vec3::Y } else { up };
        self
    }

    // ----- simulate -----

    /// Compute this frame's velocity and displacement.
    pub fn simulate(
        &mut self,
        input: &FrameInput,
        wall_cone: &[Option<CollisionData>; 3],
        config: &MovementConfig,
    ) {
        self.begin_frame(input.now, config);
        self.translation = Vec3::ZERO;
        self.height = input.position.dot(self.up);
        if !self.enabled {
            return;
        }

        let gravity = self.up * -config.locomotion.gravity;
        match self.arbiter.resolve_claim(input.now, input.dt, gravity) {
            ClaimResolution::Claimed => {
                self.finish_frame(input, Vec3::ZERO);
                return;
            }
            ClaimResolution::Expired(owner) => self.events.push(MovementEvent::ClaimExpired(owner)),
            ClaimResolution::Unclaimed => {}
        }

        let nudge = match self.mode {
            MovementMode::Flying => {
                self.simulate_flight(input, config);
                Vec3::ZERO
            }
            MovementMode::Walking => self.simulate_walking(input, wall_cone, config),
        };
        self.finish_frame(input, nudge);
    }

    fn simulate_flight(&mut self, input: &FrameInput, config: &MovementConfig) {
        let target = input.fly_direction * config.locomotion.fly_speed;
        let velocity = approach(
            self.arbiter.velocity(),
            target,
            config.locomotion.ground_acceleration * input.dt,
        );
        self.arbiter.commit_movement(velocity);
    }

    fn simulate_walking(
        &mut self,
        input: &FrameInput,
        wall_cone: &[Option<CollisionData>; 3],
        config: &MovementConfig,
    ) -> Vec3 {
        let now = input.now;
        let dt = input.dt;
        let up = self.up;
        let locomotion = &config.locomotion;
        let grounded = self.grounding.is_grounded();
        let velocity = self.arbiter.velocity();

        let wall = self.wall.detect(wall_cone, now, up, &config.wall_jump);
        self.touching_wall = if grounded { None } else { wall };

        if input.jump_pressed
            && !self.jump.grounded_with_coyote(now, grounded, &config.jump)
            && self.try_wall_jump(input, wall, velocity, config)
        {
            return Vec3::ZERO;
        }

        let mut planar = horizontal(velocity, up);
        let mut vertical = velocity.dot(up);
        let has_input = input.walk_direction.length_squared() > 1e-6;
        let target_speed = if input.crouch {
            locomotion.crouch_speed
        } else if input.sprint {
            locomotion.sprint_speed
        } else {
            locomotion.walk_speed
        };
        let target = input.walk_direction * target_speed;

        let mut band = None;
        if grounded {
            let speed = planar.length();
            let response = self.slope.evaluate(
                &SlopeInput {
                    normal: self.grounding.ground_normal,
                    up,
                    slope_angle_degrees: self.grounding.slope_angle_degrees,
                    motion_direction: if speed > SLOPE_DIRECTION_MIN_SPEED {
                        planar
                    } else {
                        input.walk_direction
                    },
                    speed,
                    has_input,
                },
                &config.slope,
                locomotion.sprint_speed,
            );
            self.tuning
                .set_base(TuningParameter::SlopeLimit, self.slope.slope_limit());

            let on_flat = self.grounding.slope_angle_degrees < config.slope.minimum_slope_angle;
            planar = if on_flat && speed > locomotion.sprint_speed + locomotion.momentum_margin {
                // Carried momentum bleeds off instead of snapping to the target speed.
                let kept = (speed - locomotion.momentum_decay * dt).max(target_speed);
                let carried = planar * (kept / speed);
                if has_input {
                    approach(carried, input.walk_direction * kept, locomotion.ground_acceleration * dt)
                } else {
                    carried
                }
            } else if has_input && response.motion == SlopeMotion::Downhill && speed >= target_speed {
                // Downhill gains are kept; input only steers the heading.
                approach(
                    planar,
                    input.walk_direction.normalize_or_zero() * speed,
                    locomotion.ground_acceleration * dt,
                )
            } else {
                let rate = if has_input {
                    locomotion.ground_acceleration
                } else {
                    locomotion.ground_deceleration
                };
                let stepped = approach(planar, target, rate * dt);
                planar + (stepped - planar) * response.horizontal_friction
            };
            planar += horizontal(response.acceleration, up) * dt;
            vertical -= locomotion.gravity * dt;
            band = Some(response.band);
        } else {
            let desired = if has_input {
                approach(
                    planar,
                    target,
                    locomotion.ground_acceleration * locomotion.air_control * dt,
                )
            } else {
                planar
            };
            let blended = self.arbiter.blend_with_protection(
                desired + up * vertical,
                now,
                config.arbiter.protected_air_control,
            );
            planar = horizontal(blended, up);
            vertical = (vertical - locomotion.gravity * dt).max(-locomotion.max_fall_speed);
        }

        let ctx = JumpContext {
            now,
            up,
            gravity: locomotion.gravity,
            grounded,
            touching_ground: self.grounding.raw_grounded || self.fallback_grounded,
            height: self.height,
            velocity: planar + up * vertical,
            latched_momentum: self.arbiter.latched_air_momentum(),
            platform_velocity: self.platform_velocity,
            pressed: input.jump_pressed,
        };

        let mut nudge = Vec3::ZERO;
        let velocity = match self.jump.update(&ctx, &config.jump) {
            Some(outcome) => {
                self.grounding.force_airborne(now);
                self.leave_ground(false);
                self.events.push(MovementEvent::Jumped(outcome.kind));
                if outcome.kind == JumpKind::Emergency {
                    self.events.push(MovementEvent::EmergencyUnstick);
                }
                nudge = outcome.nudge;
                band = None;
                outcome.velocity
            }
            None => {
                let velocity = planar + up * vertical;
                self.jump
                    .apply_cut(velocity, input.jump_held, up, &config.jump)
                    .unwrap_or(velocity)
            }
        };

        self.arbiter.commit_movement(velocity);
        if let Some(band) = band {
            self.arbiter.apply_ground_stick(band, up);
        }
        nudge
    }

    fn try_wall_jump(
        &mut self,
        input: &FrameInput,
        wall: Option<WallContact>,
        velocity: Vec3,
        config: &MovementConfig,
    ) -> bool {
        let ctx = WallJumpContext {
            now: input.now,
            up: self.up,
            grounded: self.grounding.is_grounded(),
            velocity,
            camera_forward: input.camera_forward,
        };
        match self.wall.try_wall_jump(&ctx, wall, &config.wall_jump) {
            Ok(outcome) => {
                self.arbiter.apply_protected(
                    outcome.velocity,
                    input.now + config.arbiter.protection_duration,
                    config.arbiter.protection_priority,
                );
                self.arbiter.clear_latched_air_momentum();
                self.jump.clear_buffered();
                self.fall_apex = self.height;
                self.events.push(MovementEvent::WallJumped {
                    normal: outcome.wall.normal,
                    wall: outcome.wall.entity,
                });
                true
            }
            Err(WallJumpRefusal::NoWall) => false,
            Err(reason) => {
                debug!("wall jump refused: {reason:?}");
                false
            }
        }
    }

    fn finish_frame(&mut self, input: &FrameInput, nudge: Vec3) {
        let velocity = self.arbiter.velocity();
        let translation = velocity * input.dt + nudge;
        self.translation =
            if translation.length() < self.tuning.effective(TuningParameter::MinMoveDistance) {
                Vec3::ZERO
            } else {
                translation
            };
        self.wall_probe_direction = sweep_direction(velocity, input.camera_forward, self.up);
    }

    // ----- settle -----

    /// Re-sample the ground after the body has moved.
    pub fn settle(&mut self, input: &SettleInput, config: &MovementConfig) {
        self.begin_frame(input.now, config);
        if !self.enabled {
            return;
        }
        let now = input.now;
        let up = self.up;
        self.height = input.position.dot(up);
        self.fallback_grounded = input.fallback_grounded;

        if self.mode == MovementMode::Flying {
            return;
        }

        let mut sample = classify(input.probe, input.fallback_grounded, up, &config.grounding);
        let ground_hit = match input.probe {
            GroundProbe::Hit(hit) if sample.grounded => Some(hit),
            _ => None,
        };

        let rising = self.arbiter.velocity().dot(up) > config.slope.flat_stick_speed;
        if sample.grounded && (rising || self.jump.is_grounded_suppressed(now)) {
            sample = GroundSample {
                distance: sample.distance,
                ..GroundSample::airborne(up)
            };
        }

        match self.grounding.update(&sample, now, &config.grounding) {
            Some(GroundTransition::Landed) => self.land(now, config),
            Some(GroundTransition::LeftGround) => {
                self.jump.on_left_ground(now);
                self.leave_ground(true);
            }
            None => {}
        }

        if self.grounding.is_grounded() {
            if self.platform != self.grounding.ground_entity {
                self.platform = self.grounding.ground_entity;
                self.platform_velocity = Vec3::ZERO;
            }
        } else {
            self.fall_apex = self.fall_apex.max(self.height);
        }

        if let Some(hit) = ground_hit {
            self.wall.record_contact(&hit, now, up, &config.wall_jump);
        }
        for hit in input.touched {
            self.wall.record_contact(hit, now, up, &config.wall_jump);
        }
    }

    fn land(&mut self, now: f32, config: &MovementConfig) {
        self.jump.on_landed(now, &config.jump);
        self.wall.on_landed();
        self.arbiter.clear_latched_air_momentum();
        self.touching_wall = None;
        self.platform = self.grounding.ground_entity;
        self.platform_velocity = Vec3::ZERO;

        let fall_distance = (self.fall_apex - self.height).max(0.0);
        debug!("landed after falling {fall_distance:.2}");
        self.events.push(MovementEvent::Landed { fall_distance });
    }

    fn leave_ground(&mut self, report: bool) {
        self.platform = None;
        self.platform_velocity = Vec3::ZERO;
        self.fall_apex = self.height;
        if report {
            debug!("left ground");
            self.events.push(MovementEvent::LeftGround);
        }
    }

    fn begin_frame(&mut self, now: f32, config: &MovementConfig) {
        self.now = now;
        if self.config != *config {
            self.tuning.sync_originals(config);
            self.config = *config;
        }
    }

    // ----- auxiliary-system facade -----

    /// Take over velocity for `duration` seconds.
    pub fn request_velocity(
        &mut self,
        owner: OwnerId,
        vector: Vec3,
        duration: f32,
        override_gravity: bool,
    ) -> ClaimOutcome {
        self.arbiter.request_velocity(
            owner,
            vector,
            duration,
            override_gravity,
            self.now,
            &self.config.arbiter,
        )
    }

    /// Add an impulse to the current velocity.
    pub fn add_velocity(&mut self, delta: Vec3) {
        self.arbiter.add_velocity(delta, self.now, &self.config.arbiter);
    }

    /// Cancel the active claim.
    pub fn clear_external(&mut self) -> bool {
        self.arbiter.clear_external()
    }

    /// One-frame velocity write that may break a wall-jump protection window.
    pub fn set_immediate(&mut self, vector: Vec3, priority: u8) -> bool {
        self.arbiter
            .set_immediate(vector, priority, self.now, &self.config.arbiter)
    }

    pub fn latch_air_momentum(&mut self, momentum: Vec3) {
        self.arbiter.latch_air_momentum(momentum);
    }

    /// Release any claim and continue airborne with `velocity`.
    pub fn launch_air(&mut self, velocity: Vec3) {
        self.arbiter.launch_air(velocity);
        if velocity.dot(self.up) > 0.0 && self.grounding.force_airborne(self.now) {
            self.leave_ground(true);
        }
    }

    pub fn request_slope_limit_override(&mut self, value: f32, owner: OwnerId) {
        self.tuning
            .request_override(TuningParameter::SlopeLimit, value, owner);
    }

    pub fn restore_slope_limit_to_original(&mut self) {
        self.tuning.restore_to_original(TuningParameter::SlopeLimit);
    }

    pub fn request_override(&mut self, parameter: TuningParameter, value: f32, owner: OwnerId) {
        self.tuning.request_override(parameter, value, owner);
    }

    pub fn release_override(&mut self, parameter: TuningParameter, owner: OwnerId) -> bool {
        self.tuning.release_override(parameter, owner)
    }

    pub fn restore_to_original(&mut self, parameter: TuningParameter) {
        self.tuning.restore_to_original(parameter);
    }

    /// Drop a pending buffered jump press.
    pub fn clear_buffered_jump(&mut self) {
        self.jump.clear_buffered();
    }

    /// Velocity of the platform the character stands on.
    pub fn set_platform_velocity(&mut self, velocity: Vec3) {
        self.platform_velocity = velocity;
    }

    /// Switch between walking and flying.
    ///
    /// Leaving flight latches the horizontal velocity as air momentum and
    /// restores all body-tuning overrides.
    pub fn set_mode(&mut self, mode: MovementMode) {
        if mode == self.mode {
            return;
        }
        debug!("movement mode {:?} -> {mode:?}", self.mode);
        match mode {
            MovementMode::Flying => {
                self.arbiter.clear_external();
                self.jump.clear_buffered();
                if self.grounding.force_airborne(self.now) {
                    self.leave_ground(true);
                }
            }
            MovementMode::Walking => {
                let momentum = horizontal(self.arbiter.velocity(), self.up);
                self.arbiter.clear_external();
                self.arbiter.latch_air_momentum(momentum);
                self.tuning.restore_all();
            }
        }
        self.mode = mode;
    }

    /// Stop simulating; every override and claim is released.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        debug!("movement disabled");
        self.tuning.restore_all();
        self.arbiter.reset();
        self.jump.clear_buffered();
        self.translation = Vec3::ZERO;
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.arbiter.commit_movement(Vec3::ZERO);
        self.enabled = true;
    }

    // ----- read access -----

    pub fn snapshot(&self) -> MovementSnapshot {
        let grounded = self.grounding.is_grounded();
        MovementSnapshot {
            raw_grounded: self.grounding.raw_grounded,
            grounded,
            grounded_with_coyote: self
                .jump
                .grounded_with_coyote(self.now, grounded, &self.config.jump),
            velocity: self.arbiter.velocity(),
            slope_angle_degrees: self.grounding.slope_angle_degrees,
            ground_normal: self.grounding.ground_normal,
            mode: self.mode,
            wall_jump_chain: self.wall.is_chaining(self.now, &self.config.wall_jump),
            owner: self.arbiter.owner(),
            air_jumps_remaining: self.jump.air_jumps_remaining(),
            protection_active: self.arbiter.is_protected(self.now),
        }
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> impl Iterator<Item = MovementEvent> + '_ {
        self.events.drain(..)
    }

    pub fn events(&self) -> &[MovementEvent] {
        &self.events
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> MovementMode {
        self.mode
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn velocity(&self) -> Vec3 {
        self.arbiter.velocity()
    }

    pub fn owner(&self) -> VelocityOwner {
        self.arbiter.owner()
    }

    pub fn is_grounded(&self) -> bool {
        self.grounding.is_grounded()
    }

    /// Displacement for the body-mover this frame.
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// Centre direction for next frame's wall cone sweep.
    pub fn wall_probe_direction(&self) -> Vec3 {
        self.wall_probe_direction
    }

    pub fn touching_wall(&self) -> Option<WallContact> {
        self.touching_wall
    }

    pub fn platform(&self) -> Option<Entity> {
        self.platform
    }

    pub fn grounding(&self) -> &GroundingState {
        &self.grounding
    }

    pub fn arbiter(&self) -> &VelocityArbiter {
        &self.arbiter
    }

    pub fn jump_state(&self) -> &JumpState {
        &self.jump
    }

    pub fn wall_jump_state(&self) -> &WallJumpState {
        &self.wall
    }

    pub fn tuning(&self) -> &BodyTuning {
        &self.tuning
    }
}

/// Move `current` towards `target` by at most `max_delta`.
fn approach(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= f32::EPSILON {
        target
    } else {
        current + delta / distance * max_delta
    }
}

/// Central hub component of a kinematic character.
///
/// Spawning it pulls in [`MovementConfig`], [`MovementIntent`] and
/// [`SensorReadings`]; the controller systems drive the wrapped
/// [`MovementState`] from those every fixed tick.
#[derive(Component, Debug, Clone, Default, Deref, DerefMut)]
#[require(MovementConfig, MovementIntent, SensorReadings, Transform)]
pub struct CharacterController(pub MovementState);

impl CharacterController {
    pub fn new(config: &MovementConfig) -> Self {
        Self(MovementState::new(config))
    }
}
