use glam::{Mat4, Vec3};

use crate::config::CameraOptions;

/// Perspective projector looking from `position` toward `target`.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Width / height; 0.0 while the surface has no height.
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    projection: Mat4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    /// Surface size in pixels
    pub viewport: [f32; 2],
    pub _padding: [f32; 2],
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position: Vec3::Z,
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov,
            aspect,
            near,
            far,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn from_options(options: &CameraOptions, aspect: f32) -> Self {
        let mut camera = Self::new(options.fov, aspect, options.near, options.far);
        camera.position = Vec3::from_array(options.position);
        camera.target = Vec3::from_array(options.target);
        camera
    }

    /// Recompute the cached projection after changing fov, aspect or clip planes.
    /// A zero aspect produces a zero matrix, which draws nothing.
    pub fn update_projection_matrix(&mut self) {
        self.projection = if self.aspect > 0.0 {
            Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
        } else {
            Mat4::ZERO
        };
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn uniform(&self, viewport: [f32; 2]) -> CameraUniform {
        CameraUniform {
            view_proj: (self.projection * self.view_matrix()).to_cols_array_2d(),
            viewport,
            _padding: [0.0; 2],
        }
    }
}
