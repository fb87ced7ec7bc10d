//! Velocity arbitration.
//!
//! [`VelocityArbiter`] owns the single authoritative velocity vector. Core
//! movement and auxiliary systems (slide, dive, grapple, knockback) never
//! write velocity directly; they go through the claim protocol here so that
//! exactly one writer is active per frame.
//!
//! Resolution order each frame:
//! 1. an unexpired external claim sets velocity (gravity added unless the
//!    claim overrides it);
//! 2. otherwise core movement commits its computed velocity;
//! 3. the ground-stick clamp runs last when grounded and unclaimed.
//!
//! After a wall jump a protection window shields the new velocity: claims
//! and impulses arriving inside it are blended or scaled instead of
//! replacing it outright.

use bevy::log::debug;
use bevy::prelude::*;

use crate::config::ArbiterConfig;

/// Identity of an auxiliary system holding a velocity claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub struct OwnerId(pub u32);

impl OwnerId {
    pub const SLIDE: Self = Self(1);
    pub const DIVE: Self = Self(2);
    pub const GRAPPLE: Self = Self(3);
    pub const KNOCKBACK: Self = Self(4);
    pub const PLATFORM: Self = Self(5);
}

/// Which logical system currently writes velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum VelocityOwner {
    /// Nobody (controller disabled or not yet simulated).
    #[default]
    None,
    /// Core movement (input, slope, jump, wall jump).
    Movement,
    /// An auxiliary system holding a timed claim.
    Auxiliary(OwnerId),
    /// A one-shot immediate write (knockback-class effects).
    External,
}

impl VelocityOwner {
    /// Whether this owner holds a claim rather than the movement default.
    pub fn is_claim(&self) -> bool {
        matches!(self, Self::Auxiliary(_) | Self::External)
    }
}

/// A timed replacement of velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalForceClaim {
    pub vector: Vec3,
    pub expire_at: f32,
    pub overrides_gravity: bool,
    pub owner: VelocityOwner,
}

impl ExternalForceClaim {
    /// Claims apply up to and including `expire_at`.
    #[inline]
    pub fn is_active(&self, now: f32) -> bool {
        now <= self.expire_at
    }
}

/// Wall-jump protection window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionWindow {
    pub until: f32,
    pub priority: u8,
}

/// How a velocity request was honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The requested vector replaced velocity.
    Applied,
    /// A protection window was active; the vector was blended in.
    Blended,
}

/// What the claim step of resolution did this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResolution {
    /// An active claim wrote velocity; core movement must not run.
    Claimed,
    /// The claim held by `owner` expired; movement owns velocity again.
    Expired(VelocityOwner),
    /// No claim; core movement owns velocity.
    Unclaimed,
}

/// Allowed vertical velocity range while grounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalBand {
    pub min: f32,
    pub max: f32,
}

impl VerticalBand {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Sole owner and mutator of the authoritative velocity.
#[derive(Debug, Clone, Default)]
pub struct VelocityArbiter {
    velocity: Vec3,
    owner: VelocityOwner,
    claim: Option<ExternalForceClaim>,
    protection: Option<ProtectionWindow>,
    latched_air_momentum: Option<Vec3>,
}

impl VelocityArbiter {
    pub fn new() -> Self {
        Self {
            owner: VelocityOwner::Movement,
            ..default()
        }
    }

    /// Current authoritative velocity.
    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Current velocity owner.
    #[inline]
    pub fn owner(&self) -> VelocityOwner {
        self.owner
    }

    /// The pending claim, if any (may be expired until the next resolution).
    pub fn claim(&self) -> Option<&ExternalForceClaim> {
        self.claim.as_ref()
    }

    /// Whether an unexpired claim exists at `now`.
    pub fn has_active_claim(&self, now: f32) -> bool {
        self.claim.is_some_and(|c| c.is_active(now))
    }

    /// Whether a wall-jump protection window is active at `now`.
    pub fn is_protected(&self, now: f32) -> bool {
        self.protection.is_some_and(|p| now < p.until)
    }

    /// The protection window, if one is active at `now`.
    pub fn protection(&self, now: f32) -> Option<ProtectionWindow> {
        self.protection.filter(|p| now < p.until)
    }

    /// Replace velocity with `vector` for `duration` seconds.
    ///
    /// Inside a protection window the vector is blended against the protected
    /// velocity instead of overwriting it.
    pub fn request_velocity(
        &mut self,
        owner: OwnerId,
        vector: Vec3,
        duration: f32,
        override_gravity: bool,
        now: f32,
        config: &ArbiterConfig,
    ) -> ClaimOutcome {
        let (vector, outcome) = if self.is_protected(now) {
            (
                self.velocity.lerp(vector, config.protection_blend),
                ClaimOutcome::Blended,
            )
        } else {
            (vector, ClaimOutcome::Applied)
        };

        let owner = VelocityOwner::Auxiliary(owner);
        self.claim = Some(ExternalForceClaim {
            vector,
            expire_at: now + duration.max(0.0),
            overrides_gravity: override_gravity,
            owner,
        });
        self.owner = owner;
        self.velocity = vector;
        debug!("velocity claim {owner:?} for {duration:.3}s ({outcome:?})");
        outcome
    }

    /// Add an impulse to velocity (and to the active claim, if any).
    ///
    /// Scaled down inside a protection window.
    pub fn add_velocity(&mut self, delta: Vec3, now: f32, config: &ArbiterConfig) {
        let delta = if self.is_protected(now) {
            delta * config.protected_add_scale
        } else {
            delta
        };
        self.velocity += delta;
        if let Some(claim) = self.claim.as_mut().filter(|c| c.is_active(now)) {
            claim.vector += delta;
        }
    }

    /// Cancel the active claim and hand velocity back to movement.
    ///
    /// Returns `false` if there was nothing to cancel.
    pub fn clear_external(&mut self) -> bool {
        match self.claim.take() {
            Some(claim) => {
                debug!("velocity claim {:?} cleared", claim.owner);
                self.owner = VelocityOwner::Movement;
                true
            }
            None => false,
        }
    }

    /// Write velocity immediately for one frame.
    ///
    /// Breaks through a protection window only if `priority` meets or exceeds
    /// its priority; otherwise the write is blended like a regular claim and
    /// `false` is returned.
    pub fn set_immediate(
        &mut self,
        vector: Vec3,
        priority: u8,
        now: f32,
        config: &ArbiterConfig,
    ) -> bool {
        let breaks_through = match self.protection(now) {
            Some(window) => priority >= window.priority,
            None => true,
        };

        let vector = if breaks_through {
            self.protection = None;
            vector
        } else {
            self.velocity.lerp(vector, config.protection_blend)
        };

        self.claim = Some(ExternalForceClaim {
            vector,
            expire_at: now,
            overrides_gravity: false,
            owner: VelocityOwner::External,
        });
        self.owner = VelocityOwner::External;
        self.velocity = vector;
        breaks_through
    }

    /// Store momentum from an auxiliary system to carry across a mode change.
    ///
    /// While latched, the horizontal part is authoritative for jumps.
    pub fn latch_air_momentum(&mut self, momentum: Vec3) {
        self.latched_air_momentum = Some(momentum);
    }

    /// Latched momentum, if any.
    pub fn latched_air_momentum(&self) -> Option<Vec3> {
        self.latched_air_momentum
    }

    /// Drop latched momentum (on landing).
    pub fn clear_latched_air_momentum(&mut self) {
        self.latched_air_momentum = None;
    }

    /// Hand off to airborne movement with `velocity`, releasing any claim.
    pub fn launch_air(&mut self, velocity: Vec3) {
        self.claim = None;
        self.owner = VelocityOwner::Movement;
        self.velocity = velocity;
        self.latched_air_momentum = Some(velocity);
    }

    /// Step 1 of resolution: apply or expire the claim.
    pub fn resolve_claim(&mut self, now: f32, dt: f32, gravity: Vec3) -> ClaimResolution {
        let Some(claim) = self.claim.as_mut() else {
            if self.owner.is_claim() {
                self.owner = VelocityOwner::Movement;
            }
            return ClaimResolution::Unclaimed;
        };

        if claim.is_active(now) {
            if !claim.overrides_gravity {
                claim.vector += gravity * dt;
            }
            self.velocity = claim.vector;
            self.owner = claim.owner;
            return ClaimResolution::Claimed;
        }

        let owner = claim.owner;
        self.claim = None;
        self.owner = VelocityOwner::Movement;
        debug!("velocity claim {owner:?} expired");
        ClaimResolution::Expired(owner)
    }

    /// Step 2 of resolution: core movement writes its velocity.
    pub(crate) fn commit_movement(&mut self, velocity: Vec3) {
        self.velocity = velocity;
        self.owner = VelocityOwner::Movement;
    }

    /// Step 3 of resolution: keep a grounded body glued to the surface.
    ///
    /// Only non-positive vertical velocity along `up` is clamped so jumps pass through.
    pub(crate) fn apply_ground_stick(&mut self, band: VerticalBand, up: Vec3) {
        let vertical = self.velocity.dot(up);
        if vertical <= 0.0 {
            let clamped = vertical.clamp(band.min, band.max);
            self.velocity += up * (clamped - vertical);
        }
    }

    /// Replace velocity with a wall-jump result and open a protection window.
    pub(crate) fn apply_protected(&mut self, velocity: Vec3, until: f32, priority: u8) {
        self.velocity = velocity;
        self.owner = VelocityOwner::Movement;
        self.protection = Some(ProtectionWindow { until, priority });
    }

    /// Blend a movement-computed velocity against the protected one.
    ///
    /// Outside a protection window `desired` is returned unchanged.
    pub(crate) fn blend_with_protection(&self, desired: Vec3, now: f32, weight: f32) -> Vec3 {
        if self.is_protected(now) {
            self.velocity.lerp(desired, weight)
        } else {
            desired
        }
    }

    /// Release everything: no claim, no protection, no owner.
    pub(crate) fn reset(&mut self) {
        self.claim = None;
        self.protection = None;
        self.latched_air_momentum = None;
        self.owner = VelocityOwner::None;
    }
}
