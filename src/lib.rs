//! # `msg_kinematic_controller`
//!
//! A 3D kinematic character controller with physics backend abstraction.
//!
//! This crate moves characters by displacement rather than by forces:
//! - Sweeps the ground below the body and debounces grounded state
//! - Arbitrates who owns the velocity (movement, dashes, knockback)
//! - Applies slope forces uphill and downhill with a ground-stick band
//! - Handles coyote time, jump buffering, double and emergency jumps
//! - Detects walls with a cone sweep for wall jumps
//! - Lets abilities temporarily override body tuning (slope limit, step height)
//! - Abstracts the body-mover for easy swapping (Rapier3D included)
//!
//! ## Architecture
//!
//! Every fixed tick runs in two phases:
//! 1. **Simulate** ([`MovementSet::Sensors`] → [`MovementSet::Simulate`] →
//!    [`MovementSet::Move`]): the backend sweeps the wall cone, the
//!    controller computes a velocity, the backend moves the body.
//! 2. **Settle** ([`MovementSet::SettleSensors`] → [`MovementSet::Settle`] →
//!    [`MovementSet::Sync`]): the backend probes the ground at the new
//!    position, the controller debounces grounding and emits events, and
//!    marker components are synced.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use msg_kinematic_controller::prelude::*;
//!
//! let config = MovementConfig::player();
//! let controller = CharacterController::new(&config);
//! let mut intent = MovementIntent::default();
//! intent.set_move(Vec2::Y);
//!
//! // Spawn these together with the backend's body components.
//! ```

use bevy::prelude::*;

pub mod arbiter;
pub mod backend;
pub mod collision;
pub mod config;
pub mod error;
pub mod flight;
pub mod grounding;
pub mod intent;
pub mod jumping;
pub mod movement;
pub mod slope;
pub mod state;
pub mod systems;
pub mod tuning;
pub mod wall_jump;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::arbiter::{OwnerId, VelocityOwner};
    pub use crate::backend::{CharacterPhysicsBackend, ManualBackend, SensorReadings};
    pub use crate::collision::CollisionData;
    pub use crate::config::MovementConfig;
    pub use crate::error::ConfigError;
    pub use crate::flight::{FlightMode, FlightModeRegistry};
    pub use crate::grounding::GroundProbe;
    pub use crate::intent::MovementIntent;
    pub use crate::jumping::JumpKind;
    pub use crate::movement::{
        CharacterController, MovementEvent, MovementEventMessage, MovementSnapshot,
        MovementState,
    };
    pub use crate::state::{Airborne, Grounded, MovementMode, TouchingWall, WallJumpChain};
    pub use crate::tuning::TuningParameter;
    pub use crate::{KinematicControllerPlugin, MovementSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// System sets for the controller's two phases.
///
/// The first three run chained in `FixedUpdate`, the last three chained in
/// `FixedPostUpdate`. Backends put their sensing and moving systems in
/// `Sensors`, `Move` and `SettleSensors`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementSet {
    /// Wall cone sweep.
    Sensors,
    /// Velocity and displacement for this tick.
    Simulate,
    /// Body-mover applies the displacement.
    Move,
    /// Ground probe and touched surfaces at the new position.
    SettleSensors,
    /// Grounding debounce, landing and events.
    Settle,
    /// State marker components.
    Sync,
}

/// Main plugin for the character controller system.
///
/// This plugin is generic over a physics backend `B` which provides sensing
/// and moving. Use [`backend::ManualBackend`] to drive [`backend::SensorReadings`]
/// from your own collision code.
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_kinematic_controller::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule())
///     .add_plugins(KinematicControllerPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct KinematicControllerPlugin<B: backend::CharacterPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::CharacterPhysicsBackend> Default for KinematicControllerPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::CharacterPhysicsBackend> Plugin for KinematicControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::MovementConfig>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<state::MovementMode>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::TouchingWall>();
        app.register_type::<state::WallJumpChain>();
        app.register_type::<movement::MovementEvent>();
        app.register_type::<arbiter::VelocityOwner>();
        app.register_type::<tuning::TuningParameter>();

        app.add_event::<movement::MovementEventMessage>();
        app.init_resource::<flight::FlightModeRegistry>();

        app.configure_sets(
            FixedUpdate,
            (MovementSet::Sensors, MovementSet::Simulate, MovementSet::Move).chain(),
        );
        app.configure_sets(
            FixedPostUpdate,
            (
                MovementSet::SettleSensors,
                MovementSet::Settle,
                MovementSet::Sync,
            )
                .chain(),
        );

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.add_systems(
            FixedUpdate,
            (
                systems::update_flight_modes.before(MovementSet::Sensors),
                systems::simulate_movement.in_set(MovementSet::Simulate),
            ),
        );
        app.add_systems(
            FixedPostUpdate,
            (
                systems::settle_movement.in_set(MovementSet::Settle),
                systems::sync_state_markers.in_set(MovementSet::Sync),
            ),
        );
    }
}
