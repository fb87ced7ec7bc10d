//! Core controller systems.
//!
//! These systems drive [`CharacterController`] from its intent and the
//! backend's [`SensorReadings`]. They never talk to a physics engine
//! directly, so any [`CharacterPhysicsBackend`](crate::backend::CharacterPhysicsBackend)
//! can sit around them.

use bevy::log::debug;
use bevy::prelude::*;

use crate::backend::SensorReadings;
use crate::config::MovementConfig;
use crate::flight::FlightModeRegistry;
use crate::intent::MovementIntent;
use crate::movement::{CharacterController, MovementEventMessage, SettleInput};
use crate::state::{Airborne, Grounded, MovementMode, TouchingWall, WallJumpChain};

/// Switch characters between walking and flying from the registered
/// [`FlightMode`](crate::flight::FlightMode)s.
pub fn update_flight_modes(
    registry: Res<FlightModeRegistry>,
    mut q_controllers: Query<(Entity, &mut CharacterController)>,
) {
    if registry.is_empty() {
        return;
    }

    for (entity, mut controller) in &mut q_controllers {
        if !controller.is_enabled() {
            continue;
        }
        let snapshot = controller.snapshot();
        let mode = match registry.requesting(entity, &snapshot) {
            Some(label) => {
                if controller.mode() != MovementMode::Flying {
                    debug!("{entity}: flight requested by {label}");
                }
                MovementMode::Flying
            }
            None => MovementMode::Walking,
        };
        if controller.mode() != mode {
            controller.set_mode(mode);
        }
    }
}

/// Run the simulate phase: claims, locomotion, slopes, gravity and jumps.
///
/// The resulting displacement is left in the controller for the backend's
/// [`MovementSet::Move`](crate::MovementSet::Move) system.
pub fn simulate_movement(
    time: Res<Time>,
    mut q_controllers: Query<(
        &mut CharacterController,
        &MovementConfig,
        &mut MovementIntent,
        &SensorReadings,
        &Transform,
    )>,
) {
    let now = time.elapsed_secs();
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }

    for (mut controller, config, mut intent, readings, transform) in &mut q_controllers {
        let input = intent.frame_input(now, dt, transform.translation, controller.up());
        controller.simulate(&input, &readings.wall_cone, config);
        intent.advance();
    }
}

/// Run the settle phase on the post-move sensor results and publish the
/// frame's events.
pub fn settle_movement(
    time: Res<Time>,
    mut q_controllers: Query<(
        Entity,
        &mut CharacterController,
        &MovementConfig,
        &SensorReadings,
        &Transform,
    )>,
    mut events: EventWriter<MovementEventMessage>,
) {
    let now = time.elapsed_secs();

    for (entity, mut controller, config, readings, transform) in &mut q_controllers {
        let input = SettleInput {
            now,
            position: transform.translation,
            probe: readings.ground,
            fallback_grounded: readings.fallback_grounded,
            touched: &readings.touched,
        };
        controller.settle(&input, config);

        for event in controller.drain_events() {
            events.write(MovementEventMessage { entity, event });
        }
    }
}

/// Sync state marker components with the controller's debounced state.
pub fn sync_state_markers(
    mut commands: Commands,
    q_controllers: Query<(
        Entity,
        &CharacterController,
        Has<Grounded>,
        Has<Airborne>,
        Option<&TouchingWall>,
        Has<WallJumpChain>,
    )>,
) {
    for (entity, controller, has_grounded, has_airborne, touching_wall, has_chain) in
        &q_controllers
    {
        let snapshot = controller.snapshot();

        if snapshot.grounded && !has_grounded {
            commands.entity(entity).insert(Grounded).remove::<Airborne>();
        } else if !snapshot.grounded && !has_airborne {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }

        match controller.touching_wall() {
            Some(contact) => {
                let marker = TouchingWall::new(contact.normal, contact.entity);
                if touching_wall != Some(&marker) {
                    commands.entity(entity).insert(marker);
                }
            }
            None if touching_wall.is_some() => {
                commands.entity(entity).remove::<TouchingWall>();
            }
            None => {}
        }

        if snapshot.wall_jump_chain && !has_chain {
            commands.entity(entity).insert(WallJumpChain);
        } else if !snapshot.wall_jump_chain && has_chain {
            commands.entity(entity).remove::<WallJumpChain>();
        }
    }
}
