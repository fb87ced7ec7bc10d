//! Wall sensing and wall-jump physics.
//!
//! Walls are found in two steps. Recent contacts reported by the body-mover
//! are kept in a small ring buffer and reused within a grace period, which
//! costs no extra queries. Only when the cache is empty does the backend's
//! three-ray cone sweep count.
//!
//! A wall jump replaces velocity with an outward/upward impulse and opens a
//! protection window on the arbiter. Jumping twice off the same collider is
//! refused until the body touches a different surface.

use std::collections::VecDeque;

use bevy::log::debug;
use bevy::prelude::*;

use crate::collision::CollisionData;
use crate::config::WallJumpConfig;
use crate::slope::horizontal;

/// Number of wall contacts remembered.
pub const CONTACT_HISTORY: usize = 5;

/// Below this horizontal speed the sweep follows the camera instead.
const STATIONARY_SPEED: f32 = 0.1;

/// A remembered wall contact.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct WallContact {
    pub normal: Vec3,
    pub point: Vec3,
    pub entity: Option<Entity>,
    pub time: f32,
}

impl WallContact {
    pub fn from_hit(hit: &CollisionData, time: f32) -> Self {
        Self {
            normal: hit.normal,
            point: hit.point,
            entity: hit.entity,
            time,
        }
    }
}

/// Why a wall jump was not performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallJumpRefusal {
    Disabled,
    Grounded,
    Cooldown,
    Grace,
    ChainLimit,
    NotFalling,
    NoWall,
    SameWall,
}

/// Per-frame inputs to the wall-jump check.
#[derive(Debug, Clone, Copy)]
pub struct WallJumpContext {
    pub now: f32,
    pub up: Vec3,
    pub grounded: bool,
    pub velocity: Vec3,
    pub camera_forward: Vec3,
}

/// Result of a successful wall jump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallJumpOutcome {
    pub velocity: Vec3,
    pub wall: WallContact,
}

/// Whether a surface normal belongs to a wall (not floor, not ceiling).
pub fn is_wall_surface(normal: Vec3, up: Vec3, config: &WallJumpConfig) -> bool {
    let angle = normal.normalize_or_zero().dot(up).clamp(-1.0, 1.0).acos().to_degrees();
    normal != Vec3::ZERO && angle >= config.min_wall_angle && angle <= config.max_wall_angle
}

/// Direction the wall cone is centred on.
///
/// Horizontal velocity when moving, otherwise the horizontal camera forward.
/// Zero when neither gives a direction.
pub fn sweep_direction(velocity: Vec3, camera_forward: Vec3, up: Vec3) -> Vec3 {
    let planar = horizontal(velocity, up);
    if planar.length() > STATIONARY_SPEED {
        planar.normalize()
    } else {
        horizontal(camera_forward, up).normalize_or_zero()
    }
}

/// The three cone-sweep directions: centre, then +/- the half angle about `up`.
pub fn cone_directions(forward: Vec3, up: Vec3, config: &WallJumpConfig) -> [Vec3; 3] {
    let half = config.cone_half_angle.to_radians();
    let axis = up.normalize_or_zero();
    [
        forward,
        Quat::from_axis_angle(axis, half) * forward,
        Quat::from_axis_angle(axis, -half) * forward,
    ]
}

/// Wall-jump bookkeeping for one character.
#[derive(Debug, Clone)]
pub struct WallJumpState {
    last_wall_jump_time: f32,
    consecutive_wall_jumps: u32,
    last_jumped_wall: Option<Entity>,
    contacts: VecDeque<WallContact>,
}

impl Default for WallJumpState {
    fn default() -> Self {
        Self {
            last_wall_jump_time: f32::NEG_INFINITY,
            consecutive_wall_jumps: 0,
            last_jumped_wall: None,
            contacts: VecDeque::with_capacity(CONTACT_HISTORY),
        }
    }
}

impl WallJumpState {
    pub fn last_wall_jump_time(&self) -> f32 {
        self.last_wall_jump_time
    }

    pub fn consecutive_wall_jumps(&self) -> u32 {
        self.consecutive_wall_jumps
    }

    pub fn last_jumped_wall(&self) -> Option<Entity> {
        self.last_jumped_wall
    }

    pub fn contacts(&self) -> impl Iterator<Item = &WallContact> {
        self.contacts.iter()
    }

    /// Whether the body is in a wall-jump chain.
    pub fn is_chaining(&self, now: f32, config: &WallJumpConfig) -> bool {
        self.consecutive_wall_jumps > 0 && now - self.last_wall_jump_time <= config.chain_window
    }

    /// Remember a touched surface.
    ///
    /// Walls enter the ring buffer. Touching any identified surface other
    /// than the last jumped wall clears the same-wall lock. Returns whether
    /// the surface was a wall.
    pub fn record_contact(
        &mut self,
        hit: &CollisionData,
        now: f32,
        up: Vec3,
        config: &WallJumpConfig,
    ) -> bool {
        if hit.entity.is_some() && self.last_jumped_wall.is_some() && !hit.same_surface(self.last_jumped_wall) {
            debug!("same-wall lock cleared by contact with {:?}", hit.entity);
            self.last_jumped_wall = None;
        }

        if !is_wall_surface(hit.normal, up, config) {
            return false;
        }
        if self.contacts.len() == CONTACT_HISTORY {
            self.contacts.pop_front();
        }
        self.contacts.push_back(WallContact::from_hit(hit, now));
        true
    }

    /// Most recent cached contact still inside the grace period.
    ///
    /// Contacts with the wall locked by the last wall jump are skipped.
    pub fn cached_wall(&self, now: f32, config: &WallJumpConfig) -> Option<WallContact> {
        self.contacts
            .iter()
            .rev()
            .filter(|c| !self.is_locked(c.entity))
            .find(|c| now - c.time <= config.contact_grace)
            .copied()
    }

    fn is_locked(&self, entity: Option<Entity>) -> bool {
        entity.is_some() && entity == self.last_jumped_wall
    }

    /// Find a wall: cached contacts first, then the first valid cone hit.
    ///
    /// The locked wall never wins over another valid wall.
    pub fn detect(
        &self,
        cone: &[Option<CollisionData>; 3],
        now: f32,
        up: Vec3,
        config: &WallJumpConfig,
    ) -> Option<WallContact> {
        self.cached_wall(now, config).or_else(|| {
            cone.iter()
                .flatten()
                .find(|hit| {
                    hit.distance <= config.detection_distance
                        && is_wall_surface(hit.normal, up, config)
                        && !self.is_locked(hit.entity)
                })
                .map(|hit| WallContact::from_hit(hit, now))
        })
    }

    /// Eligibility checks that do not depend on a particular wall.
    pub fn can_wall_jump(&self, ctx: &WallJumpContext, config: &WallJumpConfig) -> Result<(), WallJumpRefusal> {
        let since_last = ctx.now - self.last_wall_jump_time;
        if !config.enabled {
            Err(WallJumpRefusal::Disabled)
        } else if ctx.grounded {
            Err(WallJumpRefusal::Grounded)
        } else if since_last < config.cooldown {
            Err(WallJumpRefusal::Cooldown)
        } else if since_last < config.rejump_grace {
            Err(WallJumpRefusal::Grace)
        } else if self.consecutive_wall_jumps >= config.max_consecutive {
            Err(WallJumpRefusal::ChainLimit)
        } else if -ctx.velocity.dot(ctx.up) < config.min_fall_speed {
            Err(WallJumpRefusal::NotFalling)
        } else {
            Ok(())
        }
    }

    /// Attempt a wall jump off `wall`.
    pub fn try_wall_jump(
        &mut self,
        ctx: &WallJumpContext,
        wall: Option<WallContact>,
        config: &WallJumpConfig,
    ) -> Result<WallJumpOutcome, WallJumpRefusal> {
        self.can_wall_jump(ctx, config)?;
        let wall = wall.ok_or(WallJumpRefusal::NoWall)?;
        if self.is_locked(wall.entity) {
            debug!("wall jump refused: same wall {:?}", wall.entity);
            return Err(WallJumpRefusal::SameWall);
        }

        let velocity = wall_jump_velocity(ctx, &wall, config);

        self.last_wall_jump_time = ctx.now;
        self.consecutive_wall_jumps += 1;
        self.last_jumped_wall = wall.entity;
        debug!(
            "wall jump #{} off {:?}",
            self.consecutive_wall_jumps, wall.entity
        );

        Ok(WallJumpOutcome { velocity, wall })
    }

    /// Grounded entry resets everything.
    pub fn on_landed(&mut self) {
        *self = Self::default();
    }
}

/// Compose the wall-jump velocity.
///
/// Preserved share of horizontal velocity, outward push, camera bonus
/// (mirrored when the camera aims into the wall), fall-speed bonus and the
/// upward force.
pub fn wall_jump_velocity(ctx: &WallJumpContext, wall: &WallContact, config: &WallJumpConfig) -> Vec3 {
    let up = ctx.up;
    let outward = horizontal(wall.normal, up).normalize_or_zero();

    let preserved = horizontal(ctx.velocity, up) * config.horizontal_preservation;

    let mut camera = horizontal(ctx.camera_forward, up).normalize_or_zero();
    if camera.dot(outward) < -0.5 {
        camera = -camera;
    }

    let fall_speed = (-ctx.velocity.dot(up)).max(0.0);

    preserved
        + outward * config.outward_force
        + camera * config.camera_bonus
        + outward * fall_speed * config.fall_speed_bonus
        + up * config.upward_force
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_hit(entity: u32) -> CollisionData {
        CollisionData::new(0.3, Vec3::X, Vec3::new(-0.5, 1.0, 0.0), Some(Entity::from_raw(entity)))
    }

    fn falling(now: f32) -> WallJumpContext {
        WallJumpContext {
            now,
            up: Vec3::Y,
            grounded: false,
            velocity: Vec3::new(-2.0, -4.0, 0.0),
            camera_forward: Vec3::NEG_Z,
        }
    }

    #[test]
    fn wall_surface_classification() {
        let config = WallJumpConfig::default();
        assert!(is_wall_surface(Vec3::X, Vec3::Y, &config));
        assert!(is_wall_surface(Vec3::new(1.0, -0.2, 0.0), Vec3::Y, &config));
        assert!(!is_wall_surface(Vec3::Y, Vec3::Y, &config));
        assert!(!is_wall_surface(Vec3::NEG_Y, Vec3::Y, &config));
        // 30° slope is ground, not wall.
        assert!(!is_wall_surface(Vec3::new(0.5, 0.866, 0.0), Vec3::Y, &config));
    }

    #[test]
    fn ring_buffer_keeps_last_five() {
        let config = WallJumpConfig::default();
        let mut state = WallJumpState::default();
        for i in 0..8 {
            assert!(state.record_contact(&wall_hit(i), i as f32 * 0.01, Vec3::Y, &config));
        }
        let ids: Vec<_> = state.contacts().filter_map(|c| c.entity).collect();
        assert_eq!(ids.len(), CONTACT_HISTORY);
        assert_eq!(ids.first(), Some(&Entity::from_raw(3)));
        assert_eq!(ids.last(), Some(&Entity::from_raw(7)));
    }

    #[test]
    fn floor_contacts_are_not_cached() {
        let config = WallJumpConfig::default();
        let mut state = WallJumpState::default();
        let floor = CollisionData::new(0.0, Vec3::Y, Vec3::ZERO, Some(Entity::from_raw(1)));
        assert!(!state.record_contact(&floor, 0.0, Vec3::Y, &config));
        assert_eq!(state.contacts().count(), 0);
    }

    #[test]
    fn cache_wins_over_cone_within_grace() {
        let config = WallJumpConfig::default();
        let mut state = WallJumpState::default();
        state.record_contact(&wall_hit(1), 1.0, Vec3::Y, &config);

        let cone = [Some(wall_hit(2)), None, None];
        let found = state.detect(&cone, 1.1, Vec3::Y, &config).expect("wall");
        assert_eq!(found.entity, Some(Entity::from_raw(1)));

        let found = state.detect(&cone, 1.5, Vec3::Y, &config).expect("wall");
        assert_eq!(found.entity, Some(Entity::from_raw(2)));
        assert_eq!(found.time, 1.5);
    }

    #[test]
    fn cone_skips_non_wall_hits() {
        let config = WallJumpConfig::default();
        let state = WallJumpState::default();
        let ramp = CollisionData::new(0.2, Vec3::new(0.0, 0.9, 0.43), Vec3::ZERO, None);
        let cone = [Some(ramp), None, Some(wall_hit(9))];
        let found = state.detect(&cone, 0.0, Vec3::Y, &config).expect("wall");
        assert_eq!(found.entity, Some(Entity::from_raw(9)));

        let far = CollisionData {
            distance: config.detection_distance + 1.0,
            ..wall_hit(4)
        };
        assert!(state.detect(&[Some(far), None, None], 0.0, Vec3::Y, &config).is_none());
    }

    #[test]
    fn cone_directions_fan_about_up() {
        let config = WallJumpConfig::default();
        let [centre, left, right] = cone_directions(Vec3::NEG_Z, Vec3::Y, &config);
        assert_eq!(centre, Vec3::NEG_Z);
        assert!((left.dot(centre) - 30f32.to_radians().cos()).abs() < 1e-5);
        assert!((right.dot(centre) - 30f32.to_radians().cos()).abs() < 1e-5);
        assert!(left.x * right.x < 0.0);
        assert!(left.y.abs() < 1e-6);
    }

    #[test]
    fn sweep_prefers_velocity_then_camera() {
        assert_eq!(sweep_direction(Vec3::new(3.0, -9.0, 0.0), Vec3::NEG_Z, Vec3::Y), Vec3::X);
        assert_eq!(sweep_direction(Vec3::new(0.0, -9.0, 0.0), Vec3::NEG_Z, Vec3::Y), Vec3::NEG_Z);
        assert_eq!(sweep_direction(Vec3::ZERO, Vec3::Y, Vec3::Y), Vec3::ZERO);
    }

    #[test]
    fn eligibility() {
        let config = WallJumpConfig::default();
        let state = WallJumpState::default();
        assert_eq!(state.can_wall_jump(&falling(1.0), &config), Ok(()));
        assert_eq!(
            state.can_wall_jump(&WallJumpContext { grounded: true, ..falling(1.0) }, &config),
            Err(WallJumpRefusal::Grounded)
        );
        assert_eq!(
            state.can_wall_jump(&WallJumpContext { velocity: Vec3::new(0.0, 1.0, 0.0), ..falling(1.0) }, &config),
            Err(WallJumpRefusal::NotFalling)
        );
        let disabled = WallJumpConfig { enabled: false, ..config };
        assert_eq!(state.can_wall_jump(&falling(1.0), &disabled), Err(WallJumpRefusal::Disabled));
    }

    #[test]
    fn same_wall_twice_is_refused() {
        let config = WallJumpConfig::default();
        let mut state = WallJumpState::default();
        let wall = WallContact::from_hit(&wall_hit(7), 1.0);

        let first = state.try_wall_jump(&falling(1.0), Some(wall), &config);
        assert!(first.is_ok());
        assert_eq!(state.consecutive_wall_jumps(), 1);

        let second = state.try_wall_jump(&falling(1.5), Some(WallContact { time: 1.5, ..wall }), &config);
        assert_eq!(second, Err(WallJumpRefusal::SameWall));
        assert_eq!(state.consecutive_wall_jumps(), 1);
    }

    #[test]
    fn different_surface_clears_lock() {
        let config = WallJumpConfig::default();
        let mut state = WallJumpState::default();
        let wall = WallContact::from_hit(&wall_hit(7), 1.0);
        state.try_wall_jump(&falling(1.0), Some(wall), &config).expect("first");

        let other = CollisionData::new(0.0, Vec3::Y, Vec3::ZERO, Some(Entity::from_raw(8)));
        state.record_contact(&other, 1.3, Vec3::Y, &config);
        assert_eq!(state.last_jumped_wall(), None);

        assert!(state.try_wall_jump(&falling(1.5), Some(wall), &config).is_ok());
        assert_eq!(state.consecutive_wall_jumps(), 2);
    }

    #[test]
    fn locked_wall_does_not_hide_another_wall() {
        let config = WallJumpConfig {
            contact_grace: 0.5,
            ..default()
        };
        let mut state = WallJumpState::default();
        state
            .try_wall_jump(&falling(1.0), Some(WallContact::from_hit(&wall_hit(7), 1.0)), &config)
            .expect("first");
        state.record_contact(&wall_hit(7), 1.1, Vec3::Y, &config);

        let other = CollisionData::new(0.4, Vec3::NEG_X, Vec3::new(0.5, 1.0, 0.0), Some(Entity::from_raw(8)));
        let cone = [Some(wall_hit(7)), Some(other), None];
        let found = state.detect(&cone, 1.3, Vec3::Y, &config).expect("wall");
        assert_eq!(found.entity, Some(Entity::from_raw(8)));

        let outcome = state.try_wall_jump(&falling(1.3), Some(found), &config);
        assert!(outcome.is_ok());
        assert_eq!(state.consecutive_wall_jumps(), 2);
    }

    #[test]
    fn only_locked_wall_in_reach_finds_nothing() {
        let config = WallJumpConfig::default();
        let mut state = WallJumpState::default();
        state
            .try_wall_jump(&falling(1.0), Some(WallContact::from_hit(&wall_hit(7), 1.0)), &config)
            .expect("first");
        state.record_contact(&wall_hit(7), 1.1, Vec3::Y, &config);

        assert!(state.cached_wall(1.2, &config).is_none());
        assert!(state.detect(&[Some(wall_hit(7)), None, None], 1.2, Vec3::Y, &config).is_none());
    }

    #[test]
    fn same_wall_contact_keeps_lock() {
        let config = WallJumpConfig::default();
        let mut state = WallJumpState::default();
        state
            .try_wall_jump(&falling(1.0), Some(WallContact::from_hit(&wall_hit(7), 1.0)), &config)
            .expect("first");
        state.record_contact(&wall_hit(7), 1.1, Vec3::Y, &config);
        assert_eq!(state.last_jumped_wall(), Some(Entity::from_raw(7)));
    }

    #[test]
    fn cooldown_and_chain_limit() {
        let config = WallJumpConfig { max_consecutive: 2, ..default() };
        let mut state = WallJumpState::default();
        let wall = |id, t| Some(WallContact::from_hit(&wall_hit(id), t));

        state.try_wall_jump(&falling(1.0), wall(1, 1.0), &config).expect("first");
        assert_eq!(
            state.try_wall_jump(&falling(1.05), wall(2, 1.05), &config),
            Err(WallJumpRefusal::Cooldown)
        );
        state.try_wall_jump(&falling(1.5), wall(2, 1.5), &config).expect("second");
        assert_eq!(
            state.try_wall_jump(&falling(2.0), wall(3, 2.0), &config),
            Err(WallJumpRefusal::ChainLimit)
        );
        assert!(state.is_chaining(2.0, &config));

        state.on_landed();
        assert_eq!(state.consecutive_wall_jumps(), 0);
        assert!(!state.is_chaining(2.0, &config));
    }

    #[test]
    fn impulse_composition() {
        let config = WallJumpConfig::default();
        let ctx = WallJumpContext {
            camera_forward: Vec3::X,
            ..falling(0.0)
        };
        let wall = WallContact::from_hit(&wall_hit(1), 0.0);
        let v = wall_jump_velocity(&ctx, &wall, &config);

        let expected_x = -2.0 * config.horizontal_preservation
            + config.outward_force
            + config.camera_bonus
            + 4.0 * config.fall_speed_bonus;
        assert!((v.x - expected_x).abs() < 1e-5);
        assert!((v.y - config.upward_force).abs() < 1e-5);
        assert!(v.z.abs() < 1e-6);
    }

    #[test]
    fn camera_into_wall_is_mirrored() {
        let config = WallJumpConfig::default();
        let wall = WallContact::from_hit(&wall_hit(1), 0.0);
        let into = WallJumpContext { camera_forward: Vec3::NEG_X, ..falling(0.0) };
        let away = WallJumpContext { camera_forward: Vec3::X, ..falling(0.0) };
        assert_eq!(
            wall_jump_velocity(&into, &wall, &config),
            wall_jump_velocity(&away, &wall, &config)
        );
    }
}
