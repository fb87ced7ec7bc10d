//! Controller configuration.
//!
//! [`MovementConfig`] is the configuration asset of named parameters. It is
//! grouped by the component that reads each parameter and can be loaded from
//! JSON; every field has a default so partial assets work.

use std::path::Path;

use bevy::log::warn;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ground sensor and debounce parameters.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Consecutive agreeing raw samples required before the debounced state flips.
    pub debounce_frames: u32,

    /// Minimum time (seconds) since the last raw grounded sample before the
    /// debounced state may flip to airborne.
    pub hysteresis_seconds: f32,

    /// Ground sweep radius as a fraction of the body radius.
    pub probe_radius_scale: f32,

    /// Maximum distance below the body's base that still counts as grounded.
    pub probe_distance: f32,

    /// Contacts whose `normal · up` is at or below this are walls or ceilings.
    pub min_ground_dot: f32,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            debounce_frames: 1,
            hysteresis_seconds: 0.02,
            probe_radius_scale: 0.9,
            probe_distance: 0.15,
            min_ground_dot: 0.1,
        }
    }
}

/// Horizontal locomotion and gravity.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    /// Target speed while walking (units/second).
    pub walk_speed: f32,
    /// Target speed while sprinting (units/second).
    pub sprint_speed: f32,
    /// Target speed while crouching (units/second).
    pub crouch_speed: f32,
    /// Speed in flying mode (units/second).
    pub fly_speed: f32,

    /// Ground acceleration toward the target speed (units/second^2).
    pub ground_acceleration: f32,
    /// Ground deceleration when there is no input (units/second^2).
    pub ground_deceleration: f32,
    /// Air control multiplier applied to ground acceleration (0.0-1.0).
    pub air_control: f32,

    /// Gravity magnitude (units/second^2), applied along `-up`.
    pub gravity: f32,
    /// Terminal fall speed (units/second).
    pub max_fall_speed: f32,

    /// Speed above `sprint_speed` at which flat-ground momentum is conserved.
    pub momentum_margin: f32,
    /// Deceleration (units/second^2) applied to conserved momentum.
    pub momentum_decay: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            walk_speed: 6.0,
            sprint_speed: 10.0,
            crouch_speed: 3.0,
            fly_speed: 12.0,
            ground_acceleration: 60.0,
            ground_deceleration: 50.0,
            air_control: 0.35,
            gravity: 25.0,
            max_fall_speed: 50.0,
            momentum_margin: 1.0,
            momentum_decay: 4.0,
        }
    }
}

/// Slope traversal force model.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeConfig {
    /// Slopes below this angle (degrees) are treated as flat ground.
    pub minimum_slope_angle: f32,

    /// Alignment beyond which motion is classified as downhill/uphill.
    pub alignment_threshold: f32,

    /// Upper bound (degrees) of the gentle segment of the downhill curve.
    pub gentle_slope_angle: f32,
    /// Normalized downhill strength at 0° on the gentle segment.
    pub gentle_boost_min: f32,
    /// Normalized downhill strength at `gentle_slope_angle`.
    pub gentle_boost_max: f32,
    /// Angle (degrees) at which the steep segment reaches full strength.
    pub steep_reference_angle: f32,

    /// Downhill acceleration at full normalized strength (units/second^2).
    pub downhill_acceleration: f32,

    /// Downward speed used to keep the body glued to flat ground.
    pub flat_stick_speed: f32,

    /// Fraction of horizontal velocity changes removed while walking uphill.
    pub uphill_friction: f32,

    /// Default walkable slope ceiling (degrees).
    pub default_slope_limit: f32,
    /// Slope ceiling reached at full sprint while walking uphill (degrees).
    pub max_slope_limit: f32,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            minimum_slope_angle: 1.0,
            alignment_threshold: 0.2,
            gentle_slope_angle: 15.0,
            gentle_boost_min: 0.3,
            gentle_boost_max: 0.7,
            steep_reference_angle: 45.0,
            downhill_acceleration: 8.0,
            flat_stick_speed: 2.0,
            uphill_friction: 0.15,
            default_slope_limit: 45.0,
            max_slope_limit: 60.0,
        }
    }
}

/// Jump state machine parameters.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    /// Vertical speed set by a grounded, buffered or coyote jump.
    pub impulse: f32,
    /// Vertical speed set by the anti-softlock emergency jump.
    pub emergency_impulse: f32,
    /// Vertical speed set by a double jump (not additive).
    pub double_jump_impulse: f32,

    /// Grace window (seconds) after leaving ground during which a jump still counts.
    pub coyote_time: f32,
    /// Window (seconds) during which an early press fires on landing.
    pub buffer_time: f32,
    /// Minimum time (seconds) between two jumps.
    pub cooldown: f32,

    /// Air jumps available after leaving the ground.
    pub air_jumps: u32,

    /// Multiplier applied to upward velocity when jump is released early (< 1).
    pub cut_factor: f32,

    /// Failed presses that escalate into an emergency jump.
    pub failed_attempt_limit: u32,
    /// Window (seconds) in which failed presses are counted.
    pub failed_attempt_window: f32,
    /// Height gain below which attempts count as stuck.
    pub min_height_gain: f32,
    /// Upward displacement applied with an emergency jump.
    pub unstick_nudge: f32,

    /// Lower bound (seconds) of the post-jump grounded suppression.
    pub min_grounded_suppression: f32,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            impulse: 9.0,
            emergency_impulse: 11.0,
            double_jump_impulse: 8.0,
            coyote_time: 0.15,
            buffer_time: 0.15,
            cooldown: 0.1,
            air_jumps: 1,
            cut_factor: 0.5,
            failed_attempt_limit: 3,
            failed_attempt_window: 1.0,
            min_height_gain: 0.05,
            unstick_nudge: 0.15,
            min_grounded_suppression: 0.25,
        }
    }
}

/// Wall detection and wall-jump physics.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallJumpConfig {
    /// Whether wall jumping is enabled.
    pub enabled: bool,

    /// Smallest angle from up (degrees) classified as a wall.
    pub min_wall_angle: f32,
    /// Largest angle from up (degrees) classified as a wall.
    pub max_wall_angle: f32,

    /// How long (seconds) a cached wall contact stays usable.
    pub contact_grace: f32,
    /// Half angle (degrees) of the three-ray detection cone.
    pub cone_half_angle: f32,
    /// Length of the cone rays.
    pub detection_distance: f32,

    /// Minimum time (seconds) between wall jumps.
    pub cooldown: f32,
    /// Time (seconds) after a wall jump before another one may be considered.
    pub rejump_grace: f32,
    /// Maximum wall jumps before touching the ground again.
    pub max_consecutive: u32,
    /// Minimum downward speed required to wall jump.
    pub min_fall_speed: f32,

    /// Fraction of the current horizontal velocity kept by a wall jump.
    pub horizontal_preservation: f32,
    /// Speed pushed away from the wall.
    pub outward_force: f32,
    /// Speed added along the camera direction.
    pub camera_bonus: f32,
    /// Extra outward speed per unit of fall speed.
    pub fall_speed_bonus: f32,
    /// Upward speed of a wall jump.
    pub upward_force: f32,

    /// Time (seconds) after a wall jump during which the chain flag stays set.
    pub chain_window: f32,
}

impl Default for WallJumpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_wall_angle: 50.0,
            max_wall_angle: 130.0,
            contact_grace: 0.2,
            cone_half_angle: 30.0,
            detection_distance: 0.8,
            cooldown: 0.2,
            rejump_grace: 0.1,
            max_consecutive: 3,
            min_fall_speed: 0.5,
            horizontal_preservation: 0.3,
            outward_force: 6.0,
            camera_bonus: 2.0,
            fall_speed_bonus: 0.2,
            upward_force: 9.0,
            chain_window: 1.0,
        }
    }
}

/// Velocity arbiter parameters.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Duration (seconds) of the wall-jump protection window.
    pub protection_duration: f32,
    /// Priority an immediate write needs to break through protection.
    pub protection_priority: u8,
    /// Weight of a new claim when blended against protected velocity (0.0-1.0).
    pub protection_blend: f32,
    /// Scale applied to additive impulses during protection.
    pub protected_add_scale: f32,
    /// Weight of air control against protected velocity (0.0-1.0).
    pub protected_air_control: f32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            protection_duration: 0.3,
            protection_priority: 5,
            protection_blend: 0.3,
            protected_add_scale: 0.5,
            protected_air_control: 0.2,
        }
    }
}

/// Body-mover parameters that auxiliary systems may temporarily override.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyTuningConfig {
    /// Maximum step the body-mover climbs automatically.
    pub step_height: f32,
    /// Displacements shorter than this are not applied.
    pub min_move_distance: f32,
}

impl Default for BodyTuningConfig {
    fn default() -> Self {
        Self {
            step_height: 0.3,
            min_move_distance: 0.0005,
        }
    }
}

/// Configuration asset for a kinematic character.
#[derive(Component, Reflect, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Component)]
#[serde(default)]
pub struct MovementConfig {
    pub grounding: GroundingConfig,
    pub locomotion: LocomotionConfig,
    pub slope: SlopeConfig,
    pub jump: JumpConfig,
    pub wall_jump: WallJumpConfig,
    pub arbiter: ArbiterConfig,
    pub body: BodyTuningConfig,
}

impl MovementConfig {
    /// Create a config optimized for responsive player control.
    pub fn player() -> Self {
        Self {
            locomotion: LocomotionConfig {
                ground_acceleration: 80.0,
                air_control: 0.45,
                ..default()
            },
            jump: JumpConfig {
                impulse: 10.0,
                ..default()
            },
            ..default()
        }
    }

    /// Create a config for AI-controlled characters.
    ///
    /// AI never wall jumps and gets no air jumps.
    pub fn ai() -> Self {
        Self {
            locomotion: LocomotionConfig {
                ground_acceleration: 40.0,
                air_control: 0.1,
                ..default()
            },
            jump: JumpConfig {
                air_jumps: 0,
                ..default()
            },
            wall_jump: WallJumpConfig {
                enabled: false,
                ..default()
            },
            ..default()
        }
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Load a config, falling back to defaults when it is missing or invalid.
    ///
    /// The failure is reported once here; the simulation never sees it.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("{err}; using default movement config");
                Self::default()
            }
        }
    }

    /// Check that every parameter is in a usable range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grounding.debounce_frames == 0 {
            return Err(ConfigError::invalid("grounding.debounce_frames", "must be at least 1"));
        }
        if self.grounding.hysteresis_seconds < 0.0 {
            return Err(ConfigError::invalid("grounding.hysteresis_seconds", "must not be negative"));
        }
        if self.locomotion.gravity <= 0.0 {
            return Err(ConfigError::invalid("locomotion.gravity", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.jump.cut_factor) {
            return Err(ConfigError::invalid("jump.cut_factor", "must be in [0, 1)"));
        }
        if self.jump.coyote_time < 0.0 || self.jump.buffer_time < 0.0 {
            return Err(ConfigError::invalid("jump", "coyote and buffer windows must not be negative"));
        }
        if self.wall_jump.min_wall_angle >= self.wall_jump.max_wall_angle {
            return Err(ConfigError::invalid(
                "wall_jump.min_wall_angle",
                "must be below max_wall_angle",
            ));
        }
        if self.slope.gentle_slope_angle <= 0.0
            || self.slope.steep_reference_angle <= self.slope.gentle_slope_angle
        {
            return Err(ConfigError::invalid(
                "slope.steep_reference_angle",
                "must be above a positive gentle_slope_angle",
            ));
        }
        if !(0.0..=1.0).contains(&self.arbiter.protection_blend) {
            return Err(ConfigError::invalid("arbiter.protection_blend", "must be in [0, 1]"));
        }
        Ok(())
    }

    /// Builder: set gravity magnitude.
    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.locomotion.gravity = gravity;
        self
    }

    /// Builder: set jump impulse.
    pub fn with_jump_impulse(mut self, impulse: f32) -> Self {
        self.jump.impulse = impulse;
        self
    }

    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.jump.coyote_time = time;
        self
    }

    /// Builder: set jump buffer time.
    pub fn with_jump_buffer_time(mut self, time: f32) -> Self {
        self.jump.buffer_time = time;
        self
    }

    /// Builder: set grounding debounce.
    pub fn with_debounce(mut self, frames: u32, hysteresis_seconds: f32) -> Self {
        self.grounding.debounce_frames = frames;
        self.grounding.hysteresis_seconds = hysteresis_seconds;
        self
    }

    /// Builder: set walk and sprint speeds.
    pub fn with_speeds(mut self, walk: f32, sprint: f32) -> Self {
        self.locomotion.walk_speed = walk;
        self.locomotion.sprint_speed = sprint;
        self
    }

    /// Builder: enable or disable wall jumping.
    pub fn with_wall_jump_enabled(mut self, enabled: bool) -> Self {
        self.wall_jump.enabled = enabled;
        self
    }

    /// Builder: set the number of air jumps.
    pub fn with_air_jumps(mut self, count: u32) -> Self {
        self.jump.air_jumps = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MovementConfig::default().validate().is_ok());
        assert!(MovementConfig::player().validate().is_ok());
        assert!(MovementConfig::ai().validate().is_ok());
    }

    #[test]
    fn player_preset_is_snappier() {
        let player = MovementConfig::player();
        let default = MovementConfig::default();
        assert!(player.locomotion.ground_acceleration >= default.locomotion.ground_acceleration);
        assert!(player.jump.impulse >= default.jump.impulse);
    }

    #[test]
    fn ai_preset_disables_wall_jump() {
        assert!(!MovementConfig::ai().wall_jump.enabled);
        assert_eq!(MovementConfig::ai().jump.air_jumps, 0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = MovementConfig::from_json_str(
            r#"{ "jump": { "impulse": 12.5 }, "grounding": { "debounce_frames": 3 } }"#,
        )
        .unwrap();

        assert_eq!(config.jump.impulse, 12.5);
        assert_eq!(config.jump.coyote_time, JumpConfig::default().coyote_time);
        assert_eq!(config.grounding.debounce_frames, 3);
        assert_eq!(config.slope, SlopeConfig::default());
    }

    #[test]
    fn empty_json_is_default() {
        let config = MovementConfig::from_json_str("{}").unwrap();
        assert_eq!(config, MovementConfig::default());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = MovementConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = MovementConfig::from_json_str(r#"{ "grounding": { "debounce_frames": 0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "grounding.debounce_frames",
                ..
            }
        ));

        let err = MovementConfig::from_json_str(r#"{ "jump": { "cut_factor": 1.5 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = MovementConfig::load_or_default("definitely/not/here/movement.json");
        assert_eq!(config, MovementConfig::default());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MovementConfig::load("definitely/not/here/movement.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn builders() {
        let config = MovementConfig::default()
            .with_gravity(30.0)
            .with_jump_impulse(7.0)
            .with_coyote_time(0.2)
            .with_jump_buffer_time(0.05)
            .with_debounce(2, 0.04)
            .with_speeds(5.0, 9.0)
            .with_wall_jump_enabled(false)
            .with_air_jumps(2);

        assert_eq!(config.locomotion.gravity, 30.0);
        assert_eq!(config.jump.impulse, 7.0);
        assert_eq!(config.jump.coyote_time, 0.2);
        assert_eq!(config.jump.buffer_time, 0.05);
        assert_eq!(config.grounding.debounce_frames, 2);
        assert_eq!(config.grounding.hysteresis_seconds, 0.04);
        assert_eq!(config.locomotion.walk_speed, 5.0);
        assert_eq!(config.locomotion.sprint_speed, 9.0);
        assert!(!config.wall_jump.enabled);
        assert_eq!(config.jump.air_jumps, 2);
    }

    #[test]
    fn round_trips_through_json() {
        let config = MovementConfig::player();
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(MovementConfig::from_json_str(&text).unwrap(), config);
    }
}
