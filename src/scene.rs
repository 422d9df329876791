use glam::Vec3;

use crate::config::ParticleOptions;
use crate::particle_system::{ParticleEmitter, ParticleSystem};

/// Linear RGB colour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// From a 0xRRGGBB value
    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<Color> for wgpu::Color {
    fn from(color: Color) -> Self {
        wgpu::Color {
            r: color.r as f64,
            g: color.g as f64,
            b: color.b as f64,
            a: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub color: Color,
    pub intensity: f32,
    /// Range past which the light contributes nothing
    pub distance: f32,
    pub position: Vec3,
}

impl PointLight {
    pub fn new(color: Color, intensity: f32, distance: f32) -> Self {
        Self {
            color,
            intensity,
            distance,
            position: Vec3::ZERO,
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }
}

/// Three coloured lines along +X (red), +Y (green) and +Z (blue)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisHelper {
    pub size: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AxisVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl AxisHelper {
    pub fn new(size: f32) -> Self {
        Self { size }
    }

    /// Line-list vertices, two per axis
    pub fn vertices(&self) -> [AxisVertex; 6] {
        let s = self.size;
        let red = [1.0, 0.0, 0.0];
        let green = [0.0, 1.0, 0.0];
        let blue = [0.0, 0.0, 1.0];
        [
            AxisVertex { position: [0.0, 0.0, 0.0], color: red },
            AxisVertex { position: [s, 0.0, 0.0], color: red },
            AxisVertex { position: [0.0, 0.0, 0.0], color: green },
            AxisVertex { position: [0.0, s, 0.0], color: green },
            AxisVertex { position: [0.0, 0.0, 0.0], color: blue },
            AxisVertex { position: [0.0, 0.0, s], color: blue },
        ]
    }
}

pub enum SceneEntity {
    PointLight(PointLight),
    AxisHelper(AxisHelper),
    ParticleSystem(ParticleSystem),
}

/// Owner of every visual entity on the stage
pub struct Scene {
    pub background: Color,
    entities: Vec<SceneEntity>,
}

impl Scene {
    pub fn new(background: Color) -> Self {
        Self {
            background,
            entities: Vec::new(),
        }
    }

    pub fn add(&mut self, entity: impl Into<SceneEntity>) {
        self.entities.push(entity.into());
    }

    pub fn entities(&self) -> &[SceneEntity] {
        &self.entities
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn lights(&self) -> impl Iterator<Item = &PointLight> {
        self.entities.iter().filter_map(|entity| match entity {
            SceneEntity::PointLight(light) => Some(light),
            _ => None,
        })
    }

    pub fn axis_helpers(&self) -> impl Iterator<Item = &AxisHelper> {
        self.entities.iter().filter_map(|entity| match entity {
            SceneEntity::AxisHelper(helper) => Some(helper),
            _ => None,
        })
    }

    pub fn particle_systems(&self) -> impl Iterator<Item = &ParticleSystem> {
        self.entities.iter().filter_map(|entity| match entity {
            SceneEntity::ParticleSystem(system) => Some(system),
            _ => None,
        })
    }

    pub fn particle_systems_mut(&mut self) -> impl Iterator<Item = &mut ParticleSystem> {
        self.entities.iter_mut().filter_map(|entity| match entity {
            SceneEntity::ParticleSystem(system) => Some(system),
            _ => None,
        })
    }
}

/// Spawning into a scene reaches every emitter it owns.
impl ParticleEmitter for Scene {
    fn spawn_particle(&mut self, options: &ParticleOptions) {
        for system in self.particle_systems_mut() {
            system.spawn_particle(options);
        }
    }

    fn spawn_particles(&mut self, options: &ParticleOptions, count: u64) {
        for system in self.particle_systems_mut() {
            system.spawn_particles(options, count);
        }
    }

    fn update(&mut self, time: f64) {
        for system in self.particle_systems_mut() {
            system.update(time);
        }
    }
}

impl From<PointLight> for SceneEntity {
    fn from(light: PointLight) -> Self {
        SceneEntity::PointLight(light)
    }
}

impl From<AxisHelper> for SceneEntity {
    fn from(helper: AxisHelper) -> Self {
        SceneEntity::AxisHelper(helper)
    }
}

impl From<ParticleSystem> for SceneEntity {
    fn from(system: ParticleSystem) -> Self {
        SceneEntity::ParticleSystem(system)
    }
}
