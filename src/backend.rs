//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement to
//! work with the controller, and the [`SensorReadings`] component through
//! which they hand geometry queries to the backend-agnostic systems. This
//! allows easy swapping between physics engines (Rapier3D, a custom
//! collision world, a scripted test world).

use bevy::prelude::*;

use crate::collision::CollisionData;
use crate::grounding::GroundProbe;

/// Trait for physics backend implementations.
///
/// The backend's plugin must add, for every entity with a
/// [`CharacterController`](crate::movement::CharacterController):
///
/// 1. a system in [`MovementSet::Sensors`](crate::MovementSet::Sensors)
///    that fills [`SensorReadings::wall_cone`] by casting along
///    [`crate::wall_jump::cone_directions`] of the controller's
///    `wall_probe_direction()`;
/// 2. a system in [`MovementSet::Move`](crate::MovementSet::Move) that moves
///    the body by the controller's `translation()` with collision resolution,
///    using the effective [`BodyTuning`](crate::tuning::BodyTuning) values;
/// 3. a system in [`MovementSet::SettleSensors`](crate::MovementSet::SettleSensors)
///    that fills [`SensorReadings::ground`], `fallback_grounded` and
///    `touched`.
///
/// # Example
///
/// For an example implementation, see the `rapier` module's
/// `Rapier3dBackend`. [`ManualBackend`] adds no systems at all, for hosts
/// that run their own collision world and write [`SensorReadings`] directly.
pub trait CharacterPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;
}

/// Backend that leaves sensing and moving to the host application.
pub struct ManualBackend;

impl CharacterPhysicsBackend for ManualBackend {
    fn plugin() -> impl Plugin {
        NoOpBackendPlugin
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

/// Geometry query results for one character, written by the backend.
#[derive(Component, Debug, Clone, Default)]
pub struct SensorReadings {
    /// Cone sweep results (centre, +half angle, -half angle).
    pub wall_cone: [Option<CollisionData>; 3],
    /// Downward sweep from the body's base.
    pub ground: GroundProbe,
    /// The body-mover's own grounded flag.
    pub fallback_grounded: bool,
    /// Surfaces touched by the last move.
    pub touched: Vec<CollisionData>,
}

impl SensorReadings {
    /// Reset the results produced by the settle-phase sensors.
    pub fn clear_settle(&mut self) {
        self.ground = GroundProbe::Failed;
        self.fallback_grounded = false;
        self.touched.clear();
    }

    /// Nearest cone hit, if any.
    pub fn nearest_wall_hit(&self) -> Option<&CollisionData> {
        self.wall_cone
            .iter()
            .flatten()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_default_to_failed_probe() {
        let readings = SensorReadings::default();
        assert_eq!(readings.ground, GroundProbe::Failed);
        assert!(readings.wall_cone.iter().all(Option::is_none));
    }

    #[test]
    fn nearest_wall_hit() {
        let readings = SensorReadings {
            wall_cone: [
                Some(CollisionData::new(0.6, Vec3::X, Vec3::ZERO, None)),
                None,
                Some(CollisionData::new(0.2, Vec3::Z, Vec3::ZERO, None)),
            ],
            ..default()
        };
        assert_eq!(readings.nearest_wall_hit().map(|h| h.normal), Some(Vec3::Z));
    }

    #[test]
    fn clear_settle_keeps_cone() {
        let mut readings = SensorReadings {
            wall_cone: [Some(CollisionData::default()), None, None],
            ground: GroundProbe::Miss,
            fallback_grounded: true,
            touched: vec![CollisionData::default()],
        };
        readings.clear_settle();
        assert_eq!(readings.ground, GroundProbe::Failed);
        assert!(!readings.fallback_grounded);
        assert!(readings.touched.is_empty());
        assert!(readings.wall_cone[0].is_some());
    }
}
