//! Flight-mode capability.
//!
//! Systems that can put a character into free flight (noclip, jetpacks,
//! swimming volumes) implement [`FlightMode`] and register it once in the
//! [`FlightModeRegistry`]. Every frame `update_flight_modes` asks each
//! registered mode whether it wants a character flying and switches its
//! [`MovementMode`](crate::state::MovementMode) accordingly.

use bevy::prelude::*;

use crate::movement::MovementSnapshot;

/// A collaborator able to request flight for a character.
pub trait FlightMode: Send + Sync + 'static {
    /// Name used in logs.
    fn label(&self) -> &str;

    /// Whether `entity` should be flying this frame.
    fn requests_flight(&self, entity: Entity, snapshot: &MovementSnapshot) -> bool;
}

/// Registered flight modes.
///
/// With no modes registered the controller never changes mode on its own.
#[derive(Resource, Default)]
pub struct FlightModeRegistry {
    modes: Vec<Box<dyn FlightMode>>,
}

impl FlightModeRegistry {
    pub fn register(&mut self, mode: impl FlightMode) -> &mut Self {
        self.modes.push(Box::new(mode));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.modes.iter().map(|m| m.label())
    }

    /// Label of the first mode requesting flight for `entity`.
    pub fn requesting(&self, entity: Entity, snapshot: &MovementSnapshot) -> Option<&str> {
        self.modes
            .iter()
            .find(|m| m.requests_flight(entity, snapshot))
            .map(|m| m.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFly;

    impl FlightMode for AlwaysFly {
        fn label(&self) -> &str {
            "always"
        }

        fn requests_flight(&self, _entity: Entity, _snapshot: &MovementSnapshot) -> bool {
            true
        }
    }

    struct WhenAirborne;

    impl FlightMode for WhenAirborne {
        fn label(&self) -> &str {
            "airborne"
        }

        fn requests_flight(&self, _entity: Entity, snapshot: &MovementSnapshot) -> bool {
            !snapshot.grounded
        }
    }

    #[test]
    fn empty_registry_requests_nothing() {
        let registry = FlightModeRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.requesting(Entity::from_raw(1), &MovementSnapshot::default()), None);
    }

    #[test]
    fn first_requesting_mode_wins() {
        let mut registry = FlightModeRegistry::default();
        registry.register(WhenAirborne).register(AlwaysFly);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.labels().collect::<Vec<_>>(), vec!["airborne", "always"]);

        let grounded = MovementSnapshot {
            grounded: true,
            ..default()
        };
        assert_eq!(registry.requesting(Entity::from_raw(1), &grounded), Some("always"));
        assert_eq!(
            registry.requesting(Entity::from_raw(1), &MovementSnapshot::default()),
            Some("airborne")
        );
    }
}
