use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};
use winit::keyboard::KeyCode;

use crate::input::InputState;

/// Pan speed as a fraction of the visible height per second.
const PAN_SPEED: f32 = 0.8;

/// Zoom factor applied per scroll line.
const ZOOM_STEP: f32 = 1.1;

/// Visible-height limits in world units.
const MIN_HEIGHT: f32 = 50.0;
const MAX_HEIGHT: f32 = 500_000.0;

/// Orthographic pan/zoom camera over the 2D simulation plane.
pub struct Camera {
    pub center: Vec2,
    pub height: f32, // world units visible vertically
    pub aspect: f32,
}

impl Camera {
    pub fn new(aspect: f32) -> Self {
        Self {
            center: Vec2::ZERO,
            height: 2000.0,
            aspect,
        }
    }

    /// Frame the bounding box of a particle set with some margin.
    pub fn fit(&mut self, min: Vec2, max: Vec2) {
        self.center = (min + max) * 0.5;
        let extent = max - min;
        let needed = extent.y.max(extent.x / self.aspect).max(MIN_HEIGHT);
        self.height = (needed * 1.2).clamp(MIN_HEIGHT, MAX_HEIGHT);
    }

    pub fn update(&mut self, input: &InputState, dt: f32) {
        let mut pan = Vec2::ZERO;
        if input.is_key_down(KeyCode::KeyW) {
            pan.y -= 1.0;
        }
        if input.is_key_down(KeyCode::KeyS) {
            pan.y += 1.0;
        }
        if input.is_key_down(KeyCode::KeyA) {
            pan.x -= 1.0;
        }
        if input.is_key_down(KeyCode::KeyD) {
            pan.x += 1.0;
        }
        self.center += pan * (PAN_SPEED * self.height * dt);

        if input.scroll_delta.abs() > 0.001 {
            let factor = ZOOM_STEP.powf(-input.scroll_delta);
            self.height = (self.height * factor).clamp(MIN_HEIGHT, MAX_HEIGHT);
        }
    }

    /// Orthographic view-projection; world y grows downward on screen,
    /// matching the generators' screen-like coordinates.
    pub fn view_projection_matrix(&self) -> Mat4 {
        let half_h = self.height * 0.5;
        let half_w = half_h * self.aspect;
        Mat4::orthographic_rh(
            self.center.x - half_w,
            self.center.x + half_w,
            self.center.y + half_h,
            self.center.y - half_h,
            -1.0,
            1.0,
        )
    }

    pub fn uniform_data(&self) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_projection_matrix().to_cols_array_2d(),
        }
    }
}

/// Camera uniform data for the render pipeline.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_centers_on_bounds() {
        let mut cam = Camera::new(2.0);
        cam.fit(Vec2::new(-100.0, -50.0), Vec2::new(300.0, 150.0));
        assert_eq!(cam.center, Vec2::new(100.0, 50.0));
        assert!(cam.height >= 200.0);
    }

    #[test]
    fn view_projection_maps_center_to_origin() {
        let mut cam = Camera::new(1.0);
        cam.center = Vec2::new(40.0, -20.0);
        let clip = cam
            .view_projection_matrix()
            .project_point3(glam::Vec3::new(40.0, -20.0, 0.0));
        assert!(clip.x.abs() < 1e-6 && clip.y.abs() < 1e-6);
    }

    #[test]
    fn zoom_respects_limits() {
        let mut cam = Camera::new(1.0);
        let mut input = InputState::new();
        input.scroll_delta = 1_000.0;
        cam.update(&input, 0.016);
        assert!(cam.height >= MIN_HEIGHT);

        input.scroll_delta = -1_000.0;
        cam.update(&input, 0.016);
        assert!(cam.height <= MAX_HEIGHT);
    }
}
