use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

use crate::camera::PerspectiveCamera;
use crate::config::ControlsOptions;

const EPS: f32 = 1e-6;

/// Emitted whenever the controls move the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlsEvent {
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Rotate,
    Pan,
}

/// Orbits the camera around a target point on a sphere.
///
/// Input methods only accumulate deltas; `update` applies them to the camera
/// and reports a change when the camera actually moved.
pub struct OrbitControls {
    pub target: Vec3,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    radius: f32,
    /// Azimuth around +Y, measured from +Z
    theta: f32,
    /// Polar angle from +Y
    phi: f32,

    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vec3,

    drag: Option<(DragMode, Vec2)>,
}

impl OrbitControls {
    pub fn new(camera: &PerspectiveCamera, options: &ControlsOptions) -> Self {
        let offset = camera.position - camera.target;
        let radius = offset.length();
        let (theta, phi) = if radius > EPS {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, PI / 2.0)
        };

        Self {
            target: camera.target,
            rotate_speed: options.rotate_speed,
            zoom_speed: options.zoom_speed,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            radius,
            theta,
            phi,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            drag: None,
        }
    }

    pub fn distance(&self) -> f32 {
        self.radius
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn begin_drag(&mut self, mode: DragMode, pointer: Vec2) {
        self.drag = Some((mode, pointer));
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Follow the pointer during a drag. `viewport` is in pixels.
    pub fn drag_to(
        &mut self,
        camera: &mut PerspectiveCamera,
        pointer: Vec2,
        viewport: Vec2,
    ) -> Option<ControlsEvent> {
        let (mode, last) = self.drag?;
        self.drag = Some((mode, pointer));

        let delta = pointer - last;
        if viewport.y <= 0.0 || delta == Vec2::ZERO {
            return None;
        }

        match mode {
            DragMode::Rotate => {
                // a full-height drag turns the camera once around
                self.rotate_left(TAU * delta.x / viewport.y * self.rotate_speed);
                self.rotate_up(TAU * delta.y / viewport.y * self.rotate_speed);
            }
            DragMode::Pan => self.pan(camera, delta, viewport),
        }
        self.update(camera)
    }

    /// Wheel input: negative `delta_y` moves toward the target.
    pub fn dolly(
        &mut self,
        camera: &mut PerspectiveCamera,
        delta_y: f32,
    ) -> Option<ControlsEvent> {
        if delta_y < 0.0 {
            self.scale *= self.zoom_scale();
        } else if delta_y > 0.0 {
            self.scale /= self.zoom_scale();
        } else {
            return None;
        }
        self.update(camera)
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    fn pan(&mut self, camera: &PerspectiveCamera, delta: Vec2, viewport: Vec2) {
        // world units visible across the viewport height at the target distance
        let distance = (camera.position - self.target).length();
        let visible = 2.0 * distance * (camera.fov.to_radians() / 2.0).tan();

        let view = camera.view_matrix().inverse();
        let right = view.x_axis.truncate();
        let up = view.y_axis.truncate();

        self.pan_offset += right * (-delta.x * visible / viewport.y);
        self.pan_offset += up * (delta.y * visible / viewport.y);
    }

    /// Apply pending input to `camera`.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> Option<ControlsEvent> {
        self.theta += self.theta_delta;
        self.phi = (self.phi + self.phi_delta).clamp(EPS, PI - EPS);
        self.radius = (self.radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset;

        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.scale = 1.0;
        self.pan_offset = Vec3::ZERO;

        let sin_phi = self.phi.sin();
        let offset = Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        );
        let position = self.target + offset;

        let moved = position.distance_squared(camera.position) > EPS
            || self.target.distance_squared(camera.target) > EPS;

        camera.position = position;
        camera.target = self.target;

        moved.then_some(ControlsEvent::Change)
    }
}
