use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Largest pitch magnitude in degrees; keeps the view direction off the
/// world up axis.
pub const PITCH_LIMIT: f32 = 89.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Tunables for [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// World units per second.
    pub speed: f32,
    /// Degrees per pixel of cursor movement.
    pub sensitivity: f32,
    /// Degrees per second while an arrow key is held.
    pub look_speed: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            speed: 2.5,
            sensitivity: 0.1,
            look_speed: 60.0,
            min_zoom: 1.0,
            max_zoom: 45.0,
            near: 0.1,
            far: 500.0,
        }
    }
}

/// First-person camera driven by keyboard, cursor and scroll deltas.
///
/// Yaw, pitch and zoom are in degrees. Zoom doubles as the vertical field of
/// view.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    zoom: f32,
    world_up: Vec3,
    front: Vec3,
    right: Vec3,
    up: Vec3,
    settings: CameraSettings,
}

impl Camera {
    /// Camera at `position` looking down -Z.
    pub fn new(position: Vec3) -> Self {
        Self::with_orientation(position, -90.0, 0.0, CameraSettings::default())
    }

    pub fn with_orientation(position: Vec3, yaw: f32, pitch: f32, settings: CameraSettings) -> Self {
        let mut camera = Self {
            position,
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            zoom: settings.max_zoom,
            world_up: Vec3::Y,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            settings,
        };
        camera.update_vectors();
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn process_keyboard(&mut self, direction: CameraMovement, dt: f32) {
        let velocity = self.settings.speed * dt;
        match direction {
            CameraMovement::Forward => self.position += self.front * velocity,
            CameraMovement::Backward => self.position -= self.front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
        }
    }

    /// Applies a cursor delta. `dy` is positive when the cursor moves up.
    pub fn process_mouse_movement(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.settings.sensitivity;
        self.pitch = (self.pitch + dy * self.settings.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    pub fn process_mouse_scroll(&mut self, dy: f32) {
        self.zoom = (self.zoom - dy).clamp(self.settings.min_zoom, self.settings.max_zoom);
    }

    /// Turns the camera from a held look key, at `look_speed` degrees per
    /// second.
    pub fn look(&mut self, direction: LookDirection, dt: f32) {
        let degrees = self.settings.look_speed * dt;
        let (yaw, pitch) = match direction {
            LookDirection::Up => (0.0, degrees),
            LookDirection::Down => (0.0, -degrees),
            LookDirection::Left => (-degrees, 0.0),
            LookDirection::Right => (degrees, 0.0),
        };
        self.yaw += yaw;
        self.pitch = (self.pitch + pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    /// Look-at matrix rebuilt from the current position and orientation.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.zoom.to_radians(),
            aspect.max(0.01),
            self.settings.near,
            self.settings.far,
        )
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_moves_along_view_direction() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 3.0));
        camera.process_keyboard(CameraMovement::Forward, 1.0);
        assert!(camera.position().distance(Vec3::new(0.0, 0.0, 0.5)) < 1e-5);

        let eye = camera.view_matrix().inverse().transform_point3(Vec3::ZERO);
        assert!(eye.distance(Vec3::new(0.0, 0.0, 0.5)) < 1e-5);
    }

    #[test]
    fn strafing_is_perpendicular_to_front() {
        let mut camera = Camera::default();
        camera.process_keyboard(CameraMovement::Right, 2.0);
        assert!(camera.position().distance(Vec3::new(5.0, 0.0, 3.0)) < 1e-4);
    }

    /// The clamp is inclusive: pushing far enough up lands exactly on
    /// `PITCH_LIMIT`, which still keeps `front` clear of the up axis.
    #[test]
    fn pitch_is_clamped_for_any_input() {
        let mut camera = Camera::default();
        for step in [1.0e4, -3.0e5, 250.0, 1.0e9, -1.0e9] {
            camera.process_mouse_movement(13.0, step);
            assert!(camera.pitch().abs() <= PITCH_LIMIT);
            assert!(camera.front().cross(camera.up()).length() > 0.5);
            assert!(!camera.view_matrix().is_nan());
        }
        for _ in 0..10_000 {
            camera.look(LookDirection::Up, 0.5);
        }
        assert_eq!(camera.pitch(), PITCH_LIMIT);
    }

    #[test]
    fn zoom_stays_within_bounds() {
        let mut camera = Camera::default();
        for dy in [3.0, 100.0, -7.5, -500.0, 0.25, 1.0e6] {
            camera.process_mouse_scroll(dy);
            let zoom = camera.zoom();
            assert!((camera.settings().min_zoom..=camera.settings().max_zoom).contains(&zoom));
        }
    }

    #[test]
    fn looking_right_turns_toward_positive_x() {
        let mut camera = Camera::default();
        camera.look(LookDirection::Right, 1.5);
        assert!(camera.front().x > 0.9);
    }

    #[test]
    fn projection_uses_zoom_as_fov() {
        let mut camera = Camera::default();
        let wide = camera.projection_matrix(16.0 / 9.0);
        camera.process_mouse_scroll(20.0);
        let narrow = camera.projection_matrix(16.0 / 9.0);
        // a smaller field of view scales clip-space y up
        assert!(narrow.y_axis.y > wide.y_axis.y);
    }
}
