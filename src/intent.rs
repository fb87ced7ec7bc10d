//! Movement intent component.
//!
//! Intents carry what the player or AI wants this frame: directional axes in
//! camera space, the camera basis, and held states for jump, sprint and
//! crouch. The controller derives press/release edges itself, so callers only
//! ever write booleans.

use bevy::prelude::*;

use crate::movement::FrameInput;

/// Desired movement for one character.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_kinematic_controller::prelude::*;
///
/// let mut intent = MovementIntent::new();
/// intent.set_move(Vec2::new(0.0, 1.0));
/// intent.set_jump_pressed(true);
/// assert!(intent.is_moving());
///
/// intent.clear();
/// assert!(!intent.is_moving());
/// ```
#[derive(Component, Reflect, Debug, Clone, PartialEq)]
#[reflect(Component)]
pub struct MovementIntent {
    /// Directional axes (x = right, y = forward), length at most 1.
    pub axes: Vec2,
    /// Vertical axis used while flying (-1.0 = down, 1.0 = up).
    pub vertical: f32,
    /// Camera forward direction in world space.
    pub camera_forward: Vec3,
    /// Camera right direction in world space.
    pub camera_right: Vec3,
    /// Whether the jump action is held.
    ///
    /// Set this every frame from whatever input source you use; the
    /// controller detects the rising edge (a press) and the falling edge
    /// (release, used for variable jump height).
    pub jump_pressed: bool,
    pub sprint_pressed: bool,
    pub crouch_pressed: bool,
    pub(crate) jump_pressed_prev: bool,
    pub(crate) sprint_pressed_prev: bool,
    pub(crate) crouch_pressed_prev: bool,
}

impl Default for MovementIntent {
    fn default() -> Self {
        Self {
            axes: Vec2::ZERO,
            vertical: 0.0,
            camera_forward: Vec3::NEG_Z,
            camera_right: Vec3::X,
            jump_pressed: false,
            sprint_pressed: false,
            crouch_pressed: false,
            jump_pressed_prev: false,
            sprint_pressed_prev: false,
            crouch_pressed_prev: false,
        }
    }
}

impl MovementIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directional axes; longer inputs are clamped to unit length.
    pub fn set_move(&mut self, axes: Vec2) {
        self.axes = axes.clamp_length_max(1.0);
    }

    /// Set the vertical flying axis.
    pub fn set_vertical(&mut self, direction: f32) {
        self.vertical = direction.clamp(-1.0, 1.0);
    }

    /// Set the camera basis from a camera transform.
    pub fn set_camera(&mut self, camera: &Transform) {
        self.camera_forward = camera.forward().as_vec3();
        self.camera_right = camera.right().as_vec3();
    }

    pub fn set_jump_pressed(&mut self, pressed: bool) {
        self.jump_pressed = pressed;
    }

    pub fn set_sprint_pressed(&mut self, pressed: bool) {
        self.sprint_pressed = pressed;
    }

    pub fn set_crouch_pressed(&mut self, pressed: bool) {
        self.crouch_pressed = pressed;
    }

    /// Clear directional input. Button states are left alone.
    pub fn clear(&mut self) {
        self.axes = Vec2::ZERO;
        self.vertical = 0.0;
    }

    pub fn is_moving(&self) -> bool {
        self.axes.length_squared() > 1e-6 || self.vertical.abs() > 0.001
    }

    /// Jump went from released to held since the last simulated frame.
    pub fn jump_just_pressed(&self) -> bool {
        self.jump_pressed && !self.jump_pressed_prev
    }

    /// Jump went from held to released since the last simulated frame.
    pub fn jump_just_released(&self) -> bool {
        !self.jump_pressed && self.jump_pressed_prev
    }

    pub fn sprint_just_pressed(&self) -> bool {
        self.sprint_pressed && !self.sprint_pressed_prev
    }

    pub fn crouch_just_pressed(&self) -> bool {
        self.crouch_pressed && !self.crouch_pressed_prev
    }

    /// World-space walking direction, camera relative.
    ///
    /// The camera basis is flattened onto the plane normal to `up`.
    pub fn walk_direction(&self, up: Vec3) -> Vec3 {
        let flatten = |v: Vec3| (v - up * v.dot(up)).normalize_or_zero();
        (flatten(self.camera_right) * self.axes.x + flatten(self.camera_forward) * self.axes.y)
            .clamp_length_max(1.0)
    }

    /// World-space flying direction: the unflattened camera basis plus the
    /// vertical axis along `up`.
    pub fn fly_direction(&self, up: Vec3) -> Vec3 {
        (self.camera_right.normalize_or_zero() * self.axes.x
            + self.camera_forward.normalize_or_zero() * self.axes.y
            + up.normalize_or_zero() * self.vertical)
            .clamp_length_max(1.0)
    }

    /// Snapshot this intent for one simulation step.
    pub fn frame_input(&self, now: f32, dt: f32, position: Vec3, up: Vec3) -> FrameInput {
        FrameInput {
            now,
            dt,
            position,
            walk_direction: self.walk_direction(up),
            fly_direction: self.fly_direction(up),
            camera_forward: self.camera_forward,
            jump_pressed: self.jump_just_pressed(),
            jump_held: self.jump_pressed,
            sprint: self.sprint_pressed,
            crouch: self.crouch_pressed,
        }
    }

    /// Remember the current button states for edge detection.
    pub(crate) fn advance(&mut self) {
        self.jump_pressed_prev = self.jump_pressed;
        self.sprint_pressed_prev = self.sprint_pressed;
        self.crouch_pressed_prev = self.crouch_pressed;
    }
}
