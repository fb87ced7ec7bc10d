//! State marker components.
//!
//! These components mirror the controller's debounced state onto the entity
//! so gameplay, animation and audio systems can filter with plain queries.
//! They are added and removed by `sync_state_markers` after each settle
//! phase and are never read back by the controller itself.

use bevy::prelude::*;

/// Whether ground rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum MovementMode {
    /// Gravity, grounding, slopes and jumps apply.
    #[default]
    Walking,
    /// Free 3D movement; no gravity or ground rules.
    Flying,
}

/// Marker component indicating the character is grounded (debounced).
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_kinematic_controller::prelude::*;
///
/// fn footsteps(q: Query<Entity, With<Grounded>>) {
///     for _entity in &q {}
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is airborne.
///
/// Mutually exclusive with [`Grounded`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// The character is next to a wall it could jump off.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct TouchingWall {
    /// Wall normal, pointing away from the wall.
    pub normal: Vec3,
    /// Collider of the wall, if known.
    pub entity: Option<Entity>,
}

impl Default for TouchingWall {
    fn default() -> Self {
        Self {
            normal: Vec3::X,
            entity: None,
        }
    }
}

impl TouchingWall {
    pub fn new(normal: Vec3, entity: Option<Entity>) -> Self {
        Self { normal, entity }
    }

    /// Horizontal direction from the character towards the wall.
    pub fn direction(&self, up: Vec3) -> Vec3 {
        -(self.normal - up * self.normal.dot(up)).normalize_or_zero()
    }
}

/// The character is chaining wall jumps.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct WallJumpChain;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_mode_defaults_to_walking() {
        assert_eq!(MovementMode::default(), MovementMode::Walking);
    }

    #[test]
    fn touching_wall_direction_points_into_wall() {
        let wall = TouchingWall::new(Vec3::new(1.0, 0.2, 0.0), None);
        let dir = wall.direction(Vec3::Y);
        assert!((dir - Vec3::NEG_X).length() < 1e-6);
    }
}
