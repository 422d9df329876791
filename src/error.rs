use crate::config::ConfigError;

/// Failures while bringing up or driving the stage
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create drawing surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to acquire GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface does not support any texture format")]
    UnsupportedSurface,
    #[error("{requested} particles exceed this device's limit of {limit}")]
    ParticleCapacity { requested: usize, limit: usize },
    #[error("failed to acquire frame: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
