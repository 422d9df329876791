// Library exports for the binary and for embedding
pub mod camera;
pub mod clock;
pub mod config;
pub mod controls;
pub mod error;
pub mod frame_driver;
pub mod particle_system;
pub mod renderer;
pub mod scene;
pub mod stage;
pub mod surface;

// Re-export main types
pub use camera::PerspectiveCamera;
pub use config::StageConfig;
pub use error::{Error, Result};
pub use frame_driver::{FrameDriver, FrameReport, FrameScheduler};
pub use particle_system::{Particle, ParticleEmitter, ParticleSystem};
pub use renderer::{Render, Renderer};
pub use scene::Scene;
pub use stage::Stage;
pub use surface::CanvasSize;
