//! Collision result structures.
//!
//! These structures hold the results of geometry queries (sweeps and
//! raycasts) used for ground detection, wall detection and the surfaces
//! touched by a collision-resolved move.

use bevy::prelude::*;

/// Information about a sweep/raycast collision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionData {
    /// Distance travelled along the query direction before the hit.
    pub distance: f32,
    /// Normal of the surface at hit point.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Identity of the collider that was hit (if known).
    pub entity: Option<Entity>,
}

impl Default for CollisionData {
    fn default() -> Self {
        Self {
            distance: 0.0,
            normal: Vec3::Y,
            point: Vec3::ZERO,
            entity: None,
        }
    }
}

impl CollisionData {
    /// Create a collision result.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
        }
    }

    /// Angle between `up` and the surface normal, in degrees.
    ///
    /// 0° is flat ground, 90° a vertical wall, 180° a ceiling.
    pub fn angle_from_up_degrees(&self, up: Vec3) -> f32 {
        self.normal
            .normalize_or_zero()
            .dot(up)
            .clamp(-1.0, 1.0)
            .acos()
            .to_degrees()
    }

    /// Whether this hit belongs to the same collider as `other`.
    ///
    /// Hits without an identity never match anything.
    pub fn same_surface(&self, other: Option<Entity>) -> bool {
        matches!((self.entity, other), (Some(a), Some(b)) if a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_data_new() {
        let hit = CollisionData::new(5.0, Vec3::Y, Vec3::new(10.0, 0.0, 2.0), None);

        assert_eq!(hit.distance, 5.0);
        assert_eq!(hit.normal, Vec3::Y);
        assert_eq!(hit.point, Vec3::new(10.0, 0.0, 2.0));
    }

    #[test]
    fn collision_data_with_entity() {
        let entity = Entity::from_raw(42);
        let hit = CollisionData::new(3.0, Vec3::X, Vec3::ZERO, Some(entity));

        assert_eq!(hit.entity, Some(entity));
        assert!(hit.same_surface(Some(entity)));
        assert!(!hit.same_surface(Some(Entity::from_raw(7))));
        assert!(!hit.same_surface(None));
    }

    #[test]
    fn anonymous_hits_never_match() {
        let hit = CollisionData::new(1.0, Vec3::X, Vec3::ZERO, None);
        assert!(!hit.same_surface(None));
    }

    #[test]
    fn angle_from_up() {
        let floor = CollisionData::new(0.0, Vec3::Y, Vec3::ZERO, None);
        let wall = CollisionData::new(0.0, Vec3::X, Vec3::ZERO, None);
        let ceiling = CollisionData::new(0.0, Vec3::NEG_Y, Vec3::ZERO, None);

        assert!(floor.angle_from_up_degrees(Vec3::Y).abs() < 0.01);
        assert!((wall.angle_from_up_degrees(Vec3::Y) - 90.0).abs() < 0.01);
        assert!((ceiling.angle_from_up_degrees(Vec3::Y) - 180.0).abs() < 0.01);
    }
}
