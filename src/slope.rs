//! Slope traversal force model.
//!
//! Classifies grounded motion relative to the slope's downhill direction and
//! produces the forces for the frame: downhill acceleration with an
//! anti-bounce vertical band, uphill climb ceiling and friction, or a neutral
//! stick force. With no directional input nothing but the flat stick applies,
//! so a character standing on a slope never slides.

use bevy::prelude::*;

use crate::arbiter::VerticalBand;
use crate::config::SlopeConfig;

/// How the body is moving relative to the slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum SlopeMotion {
    /// No directional input.
    Idle,
    /// Slope below the minimum angle.
    Flat,
    Downhill,
    Uphill,
    /// Moving across the slope.
    Traverse,
}

/// Per-frame inputs to the slope model.
#[derive(Debug, Clone, Copy)]
pub struct SlopeInput {
    pub normal: Vec3,
    pub up: Vec3,
    pub slope_angle_degrees: f32,
    /// Direction of travel (horizontal velocity, or input direction when stationary).
    pub motion_direction: Vec3,
    /// Current horizontal speed.
    pub speed: f32,
    pub has_input: bool,
}

/// Forces for the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeResponse {
    pub motion: SlopeMotion,
    /// Acceleration to add along the slope (units/second^2).
    pub acceleration: Vec3,
    /// Allowed grounded vertical velocity.
    pub band: VerticalBand,
    /// Multiplier applied to horizontal velocity changes (1.0 = no friction).
    pub horizontal_friction: f32,
    /// Normalized downhill strength (0.0 unless downhill).
    pub strength: f32,
}

/// Remove the `up` component of `v`.
#[inline]
pub fn horizontal(v: Vec3, up: Vec3) -> Vec3 {
    v - up * v.dot(up)
}

/// World-down projected onto the slope plane.
///
/// Zero on flat ground.
pub fn downhill_direction(normal: Vec3, up: Vec3) -> Vec3 {
    let down = -up;
    (down - normal * down.dot(normal)).normalize_or_zero()
}

/// Alignment of travel with the downhill direction, in [-1, 1].
pub fn downhill_alignment(motion_direction: Vec3, normal: Vec3, up: Vec3) -> f32 {
    let travel = horizontal(motion_direction, up).normalize_or_zero();
    let downhill = horizontal(downhill_direction(normal, up), up).normalize_or_zero();
    travel.dot(downhill)
}

/// Two-segment downhill strength curve.
///
/// Gentle slopes get a boosted baseline between `gentle_boost_min` and
/// `gentle_boost_max`; steeper slopes continue linearly to 1.0 at
/// `steep_reference_angle`.
pub fn slope_strength(angle_degrees: f32, config: &SlopeConfig) -> f32 {
    let angle = angle_degrees.max(0.0);
    let gentle = config.gentle_slope_angle;
    if angle <= gentle {
        config.gentle_boost_min + (angle / gentle) * (config.gentle_boost_max - config.gentle_boost_min)
    } else {
        let t = ((angle - gentle) / (config.steep_reference_angle - gentle)).clamp(0.0, 1.0);
        config.gentle_boost_max + t * (1.0 - config.gentle_boost_max)
    }
}

/// Vertical band that keeps a body glued to flat ground.
pub fn flat_band(config: &SlopeConfig) -> VerticalBand {
    VerticalBand::new(-config.flat_stick_speed, -config.flat_stick_speed * 0.5)
}

/// Slope force model with its current climb ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeForceModel {
    slope_limit: f32,
    last_motion: SlopeMotion,
}

impl SlopeForceModel {
    pub fn new(config: &SlopeConfig) -> Self {
        Self {
            slope_limit: config.default_slope_limit,
            last_motion: SlopeMotion::Idle,
        }
    }

    /// Current slope-climb ceiling (degrees).
    #[inline]
    pub fn slope_limit(&self) -> f32 {
        self.slope_limit
    }

    /// Classification from the last evaluation.
    #[inline]
    pub fn last_motion(&self) -> SlopeMotion {
        self.last_motion
    }

    /// Reset the ceiling to its default.
    pub fn reset(&mut self, config: &SlopeConfig) {
        self.slope_limit = config.default_slope_limit;
        self.last_motion = SlopeMotion::Idle;
    }

    /// Compute the slope forces for this frame.
    ///
    /// `reference_speed` scales the uphill ceiling (usually the sprint speed).
    pub fn evaluate(
        &mut self,
        input: &SlopeInput,
        config: &SlopeConfig,
        reference_speed: f32,
    ) -> SlopeResponse {
        let neutral = SlopeResponse {
            motion: SlopeMotion::Idle,
            acceleration: Vec3::ZERO,
            band: flat_band(config),
            horizontal_friction: 1.0,
            strength: 0.0,
        };

        if !input.has_input {
            self.last_motion = SlopeMotion::Idle;
            return neutral;
        }

        if input.slope_angle_degrees < config.minimum_slope_angle {
            self.slope_limit = config.default_slope_limit;
            self.last_motion = SlopeMotion::Flat;
            return SlopeResponse {
                motion: SlopeMotion::Flat,
                ..neutral
            };
        }

        let alignment = downhill_alignment(input.motion_direction, input.normal, input.up);

        let response = if alignment > config.alignment_threshold {
            let strength = slope_strength(input.slope_angle_degrees, config);
            let downhill = downhill_direction(input.normal, input.up);
            // Vertical speed needed to follow the slope at the current speed.
            let follow = input.speed * input.slope_angle_degrees.to_radians().tan();
            SlopeResponse {
                motion: SlopeMotion::Downhill,
                acceleration: downhill * config.downhill_acceleration * strength,
                band: VerticalBand::new(
                    -(config.flat_stick_speed + follow),
                    -config.flat_stick_speed * 0.5,
                ),
                strength,
                ..neutral
            }
        } else if alignment < -config.alignment_threshold {
            let speed_factor = if reference_speed > 0.0 {
                (input.speed / reference_speed).clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.slope_limit = config.default_slope_limit
                + (config.max_slope_limit - config.default_slope_limit) * speed_factor;
            SlopeResponse {
                motion: SlopeMotion::Uphill,
                horizontal_friction: 1.0 - config.uphill_friction,
                ..neutral
            }
        } else {
            self.slope_limit = config.default_slope_limit;
            SlopeResponse {
                motion: SlopeMotion::Traverse,
                ..neutral
            }
        };

        self.last_motion = response.motion;
        response
    }
}
