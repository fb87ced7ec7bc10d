//! Ground sensor and grounding debounce.
//!
//! The backend sweeps a sphere down from the body's base once per settle
//! phase and reports a [`GroundProbe`]. [`classify`] turns that into a raw
//! [`GroundSample`], and [`GroundingState::update`] debounces the raw samples
//! so single-frame gaps (stair lips, slope seams) never flicker the body
//! into a falling state.

use bevy::prelude::*;

use crate::collision::CollisionData;
use crate::config::GroundingConfig;

/// Result of the downward ground sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroundProbe {
    /// The sweep hit geometry. `distance` is measured from the body's base.
    Hit(CollisionData),
    /// The sweep found nothing within range.
    Miss,
    /// The sweep could not run (no physics context, started in penetration).
    /// The body-mover's own grounded flag is used instead.
    Failed,
}

impl Default for GroundProbe {
    fn default() -> Self {
        Self::Failed
    }
}

/// One raw ground reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundSample {
    pub grounded: bool,
    pub normal: Vec3,
    pub slope_angle_degrees: f32,
    pub distance: f32,
    pub entity: Option<Entity>,
}

impl GroundSample {
    /// An ungrounded sample.
    pub fn airborne(up: Vec3) -> Self {
        Self {
            grounded: false,
            normal: up,
            slope_angle_degrees: 0.0,
            distance: f32::INFINITY,
            entity: None,
        }
    }
}

/// Turn a sweep result into a raw grounded sample.
///
/// Contacts whose normal is too far from `up` (walls, ceilings) are
/// reported as ungrounded. A failed sweep falls back to `fallback_grounded`.
pub fn classify(
    probe: GroundProbe,
    fallback_grounded: bool,
    up: Vec3,
    config: &GroundingConfig,
) -> GroundSample {
    match probe {
        GroundProbe::Hit(hit) => {
            let normal = hit.normal.normalize_or_zero();
            let dot = normal.dot(up);
            if dot <= config.min_ground_dot || hit.distance > config.probe_distance {
                return GroundSample {
                    distance: hit.distance,
                    ..GroundSample::airborne(up)
                };
            }
            GroundSample {
                grounded: true,
                normal,
                slope_angle_degrees: dot.clamp(-1.0, 1.0).acos().to_degrees(),
                distance: hit.distance.max(0.0),
                entity: hit.entity,
            }
        }
        GroundProbe::Miss => GroundSample::airborne(up),
        GroundProbe::Failed => GroundSample {
            grounded: fallback_grounded,
            distance: if fallback_grounded { 0.0 } else { f32::INFINITY },
            ..GroundSample::airborne(up)
        },
    }
}

/// A committed change of the debounced grounded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundTransition {
    Landed,
    LeftGround,
}

/// Debounced grounding state, recomputed every settle phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundingState {
    pub raw_grounded: bool,
    pub debounced_grounded: bool,
    pub consecutive_grounded_frames: u32,
    pub consecutive_airborne_frames: u32,
    pub last_grounded_time: f32,
    pub last_airborne_time: f32,
    pub ground_normal: Vec3,
    pub slope_angle_degrees: f32,
    pub ground_distance: f32,
    pub ground_entity: Option<Entity>,
}

impl Default for GroundingState {
    fn default() -> Self {
        Self {
            raw_grounded: false,
            debounced_grounded: false,
            consecutive_grounded_frames: 0,
            consecutive_airborne_frames: 0,
            last_grounded_time: f32::NEG_INFINITY,
            last_airborne_time: f32::NEG_INFINITY,
            ground_normal: Vec3::Y,
            slope_angle_degrees: 0.0,
            ground_distance: f32::INFINITY,
            ground_entity: None,
        }
    }
}

impl GroundingState {
    /// Feed one raw sample taken at `now`.
    ///
    /// Air→ground commits after `debounce_frames` consecutive grounded samples.
    /// Ground→air commits after `debounce_frames` consecutive airborne samples
    /// and only once more than `hysteresis_seconds` passed since the last
    /// grounded sample.
    pub fn update(
        &mut self,
        sample: &GroundSample,
        now: f32,
        config: &GroundingConfig,
    ) -> Option<GroundTransition> {
        let required = config.debounce_frames.max(1);

        self.raw_grounded = sample.grounded;
        if sample.grounded {
            self.consecutive_grounded_frames = self.consecutive_grounded_frames.saturating_add(1);
            self.consecutive_airborne_frames = 0;
            self.last_grounded_time = now;
            self.ground_normal = sample.normal;
            self.slope_angle_degrees = sample.slope_angle_degrees;
            self.ground_distance = sample.distance;
            self.ground_entity = sample.entity;
        } else {
            self.consecutive_airborne_frames = self.consecutive_airborne_frames.saturating_add(1);
            self.consecutive_grounded_frames = 0;
            self.last_airborne_time = now;
            self.ground_distance = sample.distance;
        }

        if !self.debounced_grounded && self.consecutive_grounded_frames >= required {
            self.debounced_grounded = true;
            return Some(GroundTransition::Landed);
        }

        if self.debounced_grounded
            && self.consecutive_airborne_frames >= required
            && now - self.last_grounded_time > config.hysteresis_seconds
        {
            self.debounced_grounded = false;
            self.ground_normal = Vec3::Y;
            self.slope_angle_degrees = 0.0;
            self.ground_entity = None;
            return Some(GroundTransition::LeftGround);
        }

        None
    }

    /// Commit to airborne immediately (jump lift-off).
    ///
    /// Returns `true` if the debounced state changed.
    pub fn force_airborne(&mut self, now: f32) -> bool {
        let changed = self.debounced_grounded;
        self.debounced_grounded = false;
        self.raw_grounded = false;
        self.consecutive_grounded_frames = 0;
        self.last_airborne_time = now;
        self.ground_entity = None;
        self.ground_normal = Vec3::Y;
        self.slope_angle_degrees = 0.0;
        changed
    }

    /// Whether the debounced state is grounded.
    #[inline]
    pub fn is_grounded(&self) -> bool {
        self.debounced_grounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    fn sample(grounded: bool) -> GroundSample {
        if grounded {
            GroundSample {
                grounded: true,
                normal: Vec3::Y,
                slope_angle_degrees: 0.0,
                distance: 0.0,
                entity: None,
            }
        } else {
            GroundSample::airborne(Vec3::Y)
        }
    }

    fn config(frames: u32, hysteresis: f32) -> GroundingConfig {
        GroundingConfig {
            debounce_frames: frames,
            hysteresis_seconds: hysteresis,
            ..default()
        }
    }

    fn run(raw: &[bool], config: &GroundingConfig) -> Vec<bool> {
        let mut state = GroundingState::default();
        raw.iter()
            .enumerate()
            .map(|(i, &g)| {
                state.update(&sample(g), i as f32 * DT, config);
                state.debounced_grounded
            })
            .collect()
    }

    #[test]
    fn single_frame_debounce_without_hysteresis_follows_raw() {
        let raw = [true, true, false, true, true, true];
        assert_eq!(run(&raw, &config(1, 0.0)), raw.to_vec());
    }

    #[test]
    fn hysteresis_absorbs_single_frame_gap() {
        // Gap of one frame at 60 Hz is shorter than 0.02 s.
        let raw = [true, true, false, true, true];
        assert_eq!(run(&raw, &config(1, 0.02)), vec![true; 5]);
    }

    #[test]
    fn long_gap_eventually_leaves_ground() {
        let raw = [true, false, false, false];
        // 1/60 s after the last grounded sample is still inside the window,
        // 2/60 s is past it.
        assert_eq!(run(&raw, &config(1, 0.02)), vec![true, true, false, false]);
    }

    #[test]
    fn landing_requires_consecutive_frames() {
        let raw = [true, false, true, true, true];
        let out = run(&raw, &config(3, 0.0));
        assert_eq!(out, vec![false, false, false, false, true]);
    }

    #[test]
    fn transitions_are_reported_once() {
        let config = config(1, 0.0);
        let mut state = GroundingState::default();

        assert_eq!(state.update(&sample(true), 0.0, &config), Some(GroundTransition::Landed));
        assert_eq!(state.update(&sample(true), DT, &config), None);
        assert_eq!(
            state.update(&sample(false), 2.0 * DT, &config),
            Some(GroundTransition::LeftGround)
        );
        assert_eq!(state.update(&sample(false), 3.0 * DT, &config), None);
    }

    #[test]
    fn force_airborne_commits_immediately() {
        let config = config(1, 0.5);
        let mut state = GroundingState::default();
        state.update(&sample(true), 0.0, &config);

        assert!(state.force_airborne(DT));
        assert!(!state.is_grounded());
        assert!(!state.force_airborne(2.0 * DT));
    }

    #[test]
    fn classify_rejects_walls_and_ceilings() {
        let config = GroundingConfig::default();
        let wall = CollisionData::new(0.05, Vec3::X, Vec3::ZERO, None);
        let ceiling = CollisionData::new(0.05, Vec3::NEG_Y, Vec3::ZERO, None);
        let steep_but_floor = CollisionData::new(0.05, Vec3::new(1.0, 0.2, 0.0), Vec3::ZERO, None);

        assert!(!classify(GroundProbe::Hit(wall), true, Vec3::Y, &config).grounded);
        assert!(!classify(GroundProbe::Hit(ceiling), true, Vec3::Y, &config).grounded);
        // normal·up ≈ 0.196 > 0.1 is still ground
        assert!(classify(GroundProbe::Hit(steep_but_floor), false, Vec3::Y, &config).grounded);
    }

    #[test]
    fn classify_reports_slope_angle() {
        let config = GroundingConfig::default();
        let normal = Vec3::new(0.0, 30f32.to_radians().cos(), 30f32.to_radians().sin());
        let entity = Entity::from_raw(3);
        let hit = CollisionData::new(0.02, normal, Vec3::ZERO, Some(entity));

        let sample = classify(GroundProbe::Hit(hit), false, Vec3::Y, &config);
        assert!(sample.grounded);
        assert!((sample.slope_angle_degrees - 30.0).abs() < 0.01);
        assert_eq!(sample.entity, Some(entity));
    }

    #[test]
    fn classify_out_of_range_hit_is_airborne() {
        let config = GroundingConfig::default();
        let far = CollisionData::new(config.probe_distance + 0.5, Vec3::Y, Vec3::ZERO, None);
        assert!(!classify(GroundProbe::Hit(far), true, Vec3::Y, &config).grounded);
    }

    #[test]
    fn failed_sweep_uses_fallback() {
        let config = GroundingConfig::default();
        assert!(classify(GroundProbe::Failed, true, Vec3::Y, &config).grounded);
        assert!(!classify(GroundProbe::Failed, false, Vec3::Y, &config).grounded);
        assert!(!classify(GroundProbe::Miss, true, Vec3::Y, &config).grounded);
    }

    proptest! {
        #[test]
        fn debounce_is_monotonic(
            raw in proptest::collection::vec(any::<bool>(), 1..80),
            frames in 1u32..4,
            hysteresis_frames in 0u32..4,
        ) {
            let hysteresis = hysteresis_frames as f32 * DT;
            let config = config(frames, hysteresis);
            let mut state = GroundingState::default();
            let mut previous = false;

            for (i, &g) in raw.iter().enumerate() {
                let now = i as f32 * DT;
                state.update(&sample(g), now, &config);
                let current = state.debounced_grounded;

                if current && !previous {
                    // The last `frames` raw samples were all grounded.
                    prop_assert!(i + 1 >= frames as usize);
                    prop_assert!(raw[i + 1 - frames as usize..=i].iter().all(|&s| s));
                }
                if !current && previous {
                    prop_assert!(i + 1 >= frames as usize);
                    prop_assert!(raw[i + 1 - frames as usize..=i].iter().all(|&s| !s));
                    let last_true = raw[..=i].iter().rposition(|&s| s);
                    if let Some(last_true) = last_true {
                        prop_assert!(now - last_true as f32 * DT > hysteresis);
                    }
                }
                previous = current;
            }
        }
    }
}
