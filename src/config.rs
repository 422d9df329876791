use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::particle_system::max_capacity;

/// Errors raised while loading or validating a stage configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything the stage needs to build its scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub camera: CameraOptions,
    pub controls: ControlsOptions,
    pub emitter: EmitterOptions,
    pub particles: ParticleOptions,
    pub spawner: SpawnerOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near: 1.0,
            far: 1100.0,
            position: [10.0, 10.0, 100.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsOptions {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
}

impl Default for ControlsOptions {
    fn default() -> Self {
        Self {
            rotate_speed: 1.0,
            zoom_speed: 1.2,
        }
    }
}

/// Creation-time parameters of the particle pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterOptions {
    /// Ring buffer capacity, fixed for the lifetime of the emitter.
    pub max_particles: usize,
    /// Fixed seed for spawn jitter; random when absent.
    pub seed: Option<u64>,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            max_particles: 250_000,
            seed: None,
        }
    }
}

/// Applied identically to every particle at spawn time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleOptions {
    pub position: [f32; 3],
    pub position_randomness: f32,
    pub velocity: [f32; 3],
    pub velocity_randomness: f32,
    /// 0xRRGGBB
    pub color: u32,
    pub color_randomness: f32,
    pub turbulence: f32,
    /// Seconds.
    pub lifetime: f32,
    /// Pixels.
    pub size: f32,
    pub size_randomness: f32,
}

impl Default for ParticleOptions {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            position_randomness: 0.3,
            velocity: [0.0; 3],
            velocity_randomness: 0.5,
            color: 0xaa88ff,
            color_randomness: 0.2,
            turbulence: 0.5,
            lifetime: 2.0,
            size: 5.0,
            size_randomness: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerOptions {
    /// Particles per second of simulated time.
    pub spawn_rate: f32,
    /// Multiplier applied to every sampled frame delta.
    pub time_scale: f32,
}

impl Default for SpawnerOptions {
    fn default() -> Self {
        Self {
            spawn_rate: 15_000.0,
            time_scale: 1.0,
        }
    }
}

impl StageConfig {
    /// Load a config file; fields missing from the file keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        check(
            "camera.fov",
            camera.fov > 0.0 && camera.fov < 180.0,
            "must be in (0, 180)",
        )?;
        check("camera.near", camera.near > 0.0, "must be positive")?;
        check(
            "camera.far",
            camera.far > camera.near,
            "must be greater than camera.near",
        )?;
        check(
            "camera.position",
            camera.position != camera.target,
            "must differ from camera.target",
        )?;

        check(
            "controls.rotate_speed",
            self.controls.rotate_speed >= 0.0,
            "must not be negative",
        )?;
        check(
            "controls.zoom_speed",
            self.controls.zoom_speed >= 0.0,
            "must not be negative",
        )?;

        check(
            "emitter.max_particles",
            self.emitter.max_particles > 0,
            "must be at least 1",
        )?;
        let limit = max_capacity(wgpu::Limits::default().max_buffer_size);
        if self.emitter.max_particles > limit {
            return Err(ConfigError::Invalid {
                field: "emitter.max_particles",
                reason: format!("must be at most {}", limit),
            });
        }

        let particles = &self.particles;
        check(
            "particles.position_randomness",
            particles.position_randomness >= 0.0,
            "must not be negative",
        )?;
        check(
            "particles.velocity_randomness",
            particles.velocity_randomness >= 0.0,
            "must not be negative",
        )?;
        check(
            "particles.color",
            particles.color <= 0xFF_FFFF,
            "must be a 24-bit RGB value",
        )?;
        check(
            "particles.color_randomness",
            (0.0..=1.0).contains(&particles.color_randomness),
            "must be in [0, 1]",
        )?;
        check(
            "particles.turbulence",
            (0.0..=1.0).contains(&particles.turbulence),
            "must be in [0, 1]",
        )?;
        check(
            "particles.lifetime",
            particles.lifetime > 0.0,
            "must be positive",
        )?;
        check("particles.size", particles.size >= 0.0, "must not be negative")?;
        check(
            "particles.size_randomness",
            particles.size_randomness >= 0.0,
            "must not be negative",
        )?;

        check(
            "spawner.spawn_rate",
            self.spawner.spawn_rate.is_finite() && self.spawner.spawn_rate >= 0.0,
            "must be a finite, non-negative number",
        )?;
        check(
            "spawner.time_scale",
            self.spawner.time_scale.is_finite() && self.spawner.time_scale >= 0.0,
            "must be a finite, non-negative number",
        )?;

        Ok(())
    }
}

fn check(field: &'static str, ok: bool, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: reason.to_owned(),
        })
    }
}
