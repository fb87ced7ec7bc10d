//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.
//!
//! Bodies are moved with Rapier's own [`KinematicCharacterController`], which
//! handles collide-and-slide, step climbing and snapping. Run the physics
//! plugin in the fixed schedule so the settle sensors see this tick's move:
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use bevy_rapier3d::prelude::*;
//! use msg_kinematic_controller::prelude::*;
//!
//! App::new()
//!     .add_plugins(DefaultPlugins)
//!     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule())
//!     .add_plugins(KinematicControllerPlugin::<Rapier3dBackend>::default())
//!     .run();
//! ```

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::{CharacterPhysicsBackend, SensorReadings};
use crate::collision::CollisionData;
use crate::config::MovementConfig;
use crate::grounding::GroundProbe;
use crate::movement::CharacterController;
use crate::tuning::TuningParameter;
use crate::wall_jump::cone_directions;
use crate::MovementSet;

/// Skin kept between the body and the world by Rapier's mover.
const CONTROLLER_OFFSET: f32 = 0.02;
/// Narrowest ledge the autostep will climb onto.
const AUTOSTEP_MIN_WIDTH: f32 = 0.1;

/// Rapier3D physics backend for the character controller.
///
/// Sensing uses `RapierContext` ray and shape casts; moving hands the
/// controller's displacement to [`KinematicCharacterController`].
pub struct Rapier3dBackend;

impl CharacterPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }
}

/// Plugin that sets up Rapier3D-specific systems for the character controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            (
                rapier_wall_probe.in_set(MovementSet::Sensors),
                rapier_apply_translation.in_set(MovementSet::Move),
            ),
        );

        // The character output is written back after the step.
        app.configure_sets(
            FixedPostUpdate,
            MovementSet::SettleSensors.after(PhysicsSet::Writeback),
        );
        app.add_systems(
            FixedPostUpdate,
            rapier_ground_probe.in_set(MovementSet::SettleSensors),
        );
    }
}

/// Half segment length and radius of a collider, treated as a capsule.
///
/// Balls report a zero half height; other shapes fall back to their half
/// extents, with the smaller horizontal extent as radius.
pub fn capsule_dimensions(collider: &Collider) -> (f32, f32) {
    if let Some(capsule) = collider.as_capsule() {
        let segment = capsule.segment();
        let half_height = (segment.a().y - segment.b().y).abs() / 2.0;
        (half_height, capsule.radius())
    } else if let Some(ball) = collider.as_ball() {
        (0.0, ball.radius())
    } else if let Some(cuboid) = collider.as_cuboid() {
        let half = cuboid.half_extents();
        let radius = half.x.min(half.z);
        ((half.y - radius).max(0.0), radius)
    } else {
        (0.0, 0.0)
    }
}

/// Distance from collider center to its base.
pub fn collider_bottom_offset(collider: &Collider) -> f32 {
    let (half_height, radius) = capsule_dimensions(collider);
    half_height + radius
}

/// Fill the wall cone from the controller's probe direction.
fn rapier_wall_probe(
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(
        Entity,
        &GlobalTransform,
        &CharacterController,
        &MovementConfig,
        &mut SensorReadings,
        Option<&Collider>,
        Option<&CollisionGroups>,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, controller, config, mut readings, collider, groups) in
        &mut q_controllers
    {
        let forward = controller.wall_probe_direction();
        if !config.wall_jump.enabled || forward == Vec3::ZERO {
            readings.wall_cone = [None; 3];
            continue;
        }

        let origin = transform.translation();
        let radius = collider.map(|c| capsule_dimensions(c).1).unwrap_or(0.0);
        let max_distance = radius + config.wall_jump.detection_distance;
        let filter = query_filter(entity, groups);

        readings.wall_cone = cone_directions(forward, controller.up(), &config.wall_jump).map(
            |direction| {
                context
                    .cast_ray_and_get_normal(origin, direction, max_distance, true, filter)
                    .map(|(hit_entity, hit)| {
                        CollisionData::new(
                            (hit.time_of_impact - radius).max(0.0),
                            hit.normal,
                            hit.point,
                            Some(hit_entity),
                        )
                    })
            },
        );
    }
}

/// Hand this tick's displacement and effective body tuning to Rapier.
fn rapier_apply_translation(
    mut q_controllers: Query<(&CharacterController, &mut KinematicCharacterController)>,
) {
    for (controller, mut mover) in &mut q_controllers {
        let tuning = controller.tuning();
        mover.up = controller.up();
        mover.offset = CharacterLength::Absolute(CONTROLLER_OFFSET);
        mover.max_slope_climb_angle = tuning.effective(TuningParameter::SlopeLimit).to_radians();

        let step_height = tuning.effective(TuningParameter::StepHeight);
        mover.autostep = (step_height > 0.0).then(|| CharacterAutostep {
            max_height: CharacterLength::Absolute(step_height),
            min_width: CharacterLength::Absolute(AUTOSTEP_MIN_WIDTH),
            include_dynamic_bodies: false,
        });

        let translation = controller.translation();
        mover.translation =
            (controller.is_enabled() && translation != Vec3::ZERO).then_some(translation);
    }
}

/// Probe the ground below the moved body and collect what the move touched.
fn rapier_ground_probe(
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(
        Entity,
        &GlobalTransform,
        &CharacterController,
        &MovementConfig,
        &mut SensorReadings,
        Option<&Collider>,
        Option<&CollisionGroups>,
        Option<&KinematicCharacterControllerOutput>,
    )>,
) {
    let context = rapier_context.single().ok();

    for (entity, transform, controller, config, mut readings, collider, groups, output) in
        &mut q_controllers
    {
        readings.clear_settle();

        if let Some(output) = output {
            readings.fallback_grounded = output.grounded;
            readings
                .touched
                .extend(output.collisions.iter().filter_map(|collision| {
                    let details = collision.hit.details?;
                    Some(CollisionData::new(
                        collision.hit.time_of_impact,
                        details.normal1,
                        details.witness1,
                        Some(collision.entity),
                    ))
                }));
        }

        // No physics world: the probe stays Failed and the fallback decides.
        let Some(context) = context.as_ref() else {
            continue;
        };

        let up = controller.up();
        let (half_height, radius) = collider.map(capsule_dimensions).unwrap_or((0.0, 0.0));
        let probe_radius = (radius * config.grounding.probe_radius_scale).max(0.01);
        // Start with the probe ball resting inside the lower hemisphere so its
        // lowest point sits `lift` above the body's base.
        let lift = (radius - probe_radius).max(0.0);
        let origin = transform.translation() - up * half_height;

        let hit = context.cast_shape(
            origin,
            Quat::IDENTITY,
            -up,
            &Collider::ball(probe_radius),
            ShapeCastOptions {
                max_time_of_impact: lift + config.grounding.probe_distance,
                stop_at_penetration: false,
                compute_impact_geometry_on_penetration: false,
                ..default()
            },
            query_filter(entity, groups),
        );
        readings.ground = ground_probe_from_hit(hit, lift);
    }
}

/// Convert a ground shape-cast result, removing the initial `lift`.
fn ground_probe_from_hit(hit: Option<(Entity, ShapeCastHit)>, lift: f32) -> GroundProbe {
    let Some((hit_entity, hit)) = hit else {
        return GroundProbe::Miss;
    };
    match (hit.status, hit.details) {
        // Started in penetration: geometry is unreliable this tick.
        (ShapeCastStatus::PenetratingOrWithinTargetDist, _) | (_, None) => GroundProbe::Failed,
        (_, Some(details)) => GroundProbe::Hit(CollisionData::new(
            (hit.time_of_impact - lift).max(0.0),
            details.normal1,
            details.witness1,
            Some(hit_entity),
        )),
    }
}

fn query_filter(entity: Entity, groups: Option<&CollisionGroups>) -> QueryFilter<'static> {
    let filter = QueryFilter::default()
        .exclude_rigid_body(entity)
        .exclude_sensors();
    match groups {
        Some(groups) => filter.groups(*groups),
        None => filter,
    }
}

/// Bundle for creating a kinematic character with Rapier3D physics.
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use msg_kinematic_controller::prelude::*;
/// use msg_kinematic_controller::rapier::Rapier3dCharacterBundle;
///
/// fn spawn_player(mut commands: Commands) {
///     let config = MovementConfig::player();
///     commands.spawn((
///         Transform::from_xyz(0.0, 2.0, 0.0),
///         Rapier3dCharacterBundle::capsule(0.5, 0.4, &config),
///         config,
///     ));
/// }
/// ```
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub controller: CharacterController,
    /// Should stay [`RigidBody::KinematicPositionBased`].
    pub rigid_body: RigidBody,
    pub collider: Collider,
    /// Rapier's collide-and-slide mover, driven by the Move set.
    pub mover: KinematicCharacterController,
}

impl Rapier3dCharacterBundle {
    /// Upright capsule character.
    ///
    /// `half_height` is half the length of the capsule's straight segment.
    pub fn capsule(half_height: f32, radius: f32, config: &MovementConfig) -> Self {
        Self {
            controller: CharacterController::new(config),
            rigid_body: RigidBody::KinematicPositionBased,
            collider: Collider::capsule_y(half_height, radius),
            mover: KinematicCharacterController {
                offset: CharacterLength::Absolute(CONTROLLER_OFFSET),
                max_slope_climb_angle: config.slope.default_slope_limit.to_radians(),
                autostep: (config.body.step_height > 0.0).then(|| CharacterAutostep {
                    max_height: CharacterLength::Absolute(config.body.step_height),
                    min_width: CharacterLength::Absolute(AUTOSTEP_MIN_WIDTH),
                    include_dynamic_bodies: false,
                }),
                ..default()
            },
        }
    }

    pub fn with_collider(mut self, collider: Collider) -> Self {
        self.collider = collider;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast_hit(status: ShapeCastStatus, details: Option<ShapeCastHitDetails>) -> Option<(Entity, ShapeCastHit)> {
        Some((
            Entity::from_raw(4),
            ShapeCastHit {
                time_of_impact: 0.35,
                details,
                status,
            },
        ))
    }

    #[test]
    fn ground_cast_results_are_classified() {
        let details = ShapeCastHitDetails {
            witness1: Vec3::new(0.0, -1.0, 0.0),
            witness2: Vec3::ZERO,
            normal1: Vec3::Y,
            normal2: Vec3::NEG_Y,
        };
        match ground_probe_from_hit(cast_hit(ShapeCastStatus::Converged, Some(details)), 0.3) {
            GroundProbe::Hit(hit) => {
                assert!((hit.distance - 0.05).abs() < 1e-5);
                assert_eq!(hit.normal, Vec3::Y);
                assert_eq!(hit.entity, Some(Entity::from_raw(4)));
            }
            other => panic!("expected hit, got {other:?}"),
        }

        assert_eq!(ground_probe_from_hit(None, 0.3), GroundProbe::Miss);
        assert_eq!(
            ground_probe_from_hit(cast_hit(ShapeCastStatus::PenetratingOrWithinTargetDist, None), 0.3),
            GroundProbe::Failed
        );
        assert_eq!(
            ground_probe_from_hit(cast_hit(ShapeCastStatus::PenetratingOrWithinTargetDist, Some(details)), 0.3),
            GroundProbe::Failed
        );
    }

    #[test]
    fn capsule_dimensions_from_capsule() {
        let (half_height, radius) = capsule_dimensions(&Collider::capsule_y(0.5, 0.4));
        assert!((half_height - 0.5).abs() < 1e-5);
        assert!((radius - 0.4).abs() < 1e-5);
        assert!((collider_bottom_offset(&Collider::capsule_y(0.5, 0.4)) - 0.9).abs() < 1e-5);
    }

    #[test]
    fn capsule_dimensions_from_other_shapes() {
        assert_eq!(capsule_dimensions(&Collider::ball(0.3)), (0.0, 0.3));

        let (half_height, radius) = capsule_dimensions(&Collider::cuboid(0.3, 1.0, 0.5));
        assert!((radius - 0.3).abs() < 1e-5);
        assert!((half_height - 0.7).abs() < 1e-5);
    }

    #[test]
    fn bundle_uses_config_tuning() {
        let config = MovementConfig::default();
        let bundle = Rapier3dCharacterBundle::capsule(0.5, 0.4, &config);

        assert_eq!(bundle.rigid_body, RigidBody::KinematicPositionBased);
        assert!(
            (bundle.mover.max_slope_climb_angle - config.slope.default_slope_limit.to_radians()).abs()
                < 1e-6
        );
        assert_eq!(bundle.mover.autostep.is_some(), config.body.step_height > 0.0);
    }

    #[test]
    fn bundle_spawns_with_required_components() {
        let mut world = World::new();
        let config = MovementConfig::default();
        let entity = world
            .spawn(Rapier3dCharacterBundle::capsule(0.5, 0.4, &config))
            .id();

        assert!(world.get::<CharacterController>(entity).is_some());
        assert!(world.get::<SensorReadings>(entity).is_some());
        assert!(world.get::<MovementConfig>(entity).is_some());
        assert!(world.get::<KinematicCharacterController>(entity).is_some());
    }
}
