use clap::Parser;
use glam::Vec2;
use sparkfield::controls::DragMode;
use sparkfield::{CanvasSize, Error, Renderer, Stage, StageConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

/// GPU particle emitter in an orbitable 3D scene
#[derive(Parser, Debug)]
#[command(name = "sparkfield", version)]
struct Args {
    /// JSON stage configuration; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Initial window width in logical pixels
    #[arg(long, default_value_t = 800)]
    width: u32,
    /// Initial window height in logical pixels
    #[arg(long, default_value_t = 600)]
    height: u32,
    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

struct App {
    config: StageConfig,
    initial_size: winit::dpi::LogicalSize<u32>,
    window: Option<Arc<Window>>,
    stage: Option<Stage<Renderer, Arc<Window>>>,
    failed: bool,
}

impl App {
    fn new(config: StageConfig, width: u32, height: u32) -> Self {
        Self {
            config,
            initial_size: winit::dpi::LogicalSize::new(width, height),
            window: None,
            stage: None,
            failed: false,
        }
    }

    fn fail(
        &mut self,
        event_loop: &ActiveEventLoop,
        message: &str,
        error: &dyn std::fmt::Display,
    ) {
        log::error!("{}: {}", message, error);
        self.failed = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("Sparkfield")
            .with_inner_size(self.initial_size);

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, "Failed to create window", &e),
        };
        self.window = Some(window.clone());

        let size = CanvasSize::from(window.inner_size());
        let surface_window = window.clone();
        let stage = Stage::start(
            size,
            self.config.clone(),
            move |_| pollster::block_on(Renderer::new(surface_window)),
            window,
        );
        match stage {
            Ok(stage) => self.stage = Some(stage),
            Err(e) => self.fail(event_loop, "Startup failed", &e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(stage) = self.stage.as_mut() else {
            return;
        };

        let result = match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => {
                stage.stop();
                event_loop.exit();
                Ok(())
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                match logical_key {
                    Key::Character(text) => stage.on_key_press(&text),
                    other => stage.on_key_press(&format!("{:?}", other)),
                }
                Ok(())
            }

            WindowEvent::Resized(physical_size) => stage.on_resize(physical_size.into()),

            WindowEvent::MouseInput { state, button, .. } => {
                match (state, button) {
                    (ElementState::Pressed, MouseButton::Left) => {
                        stage.on_pointer_down(DragMode::Rotate)
                    }
                    (ElementState::Pressed, MouseButton::Right) => {
                        stage.on_pointer_down(DragMode::Pan)
                    }
                    (ElementState::Released, MouseButton::Left | MouseButton::Right) => {
                        stage.on_pointer_up()
                    }
                    _ => {}
                }
                Ok(())
            }

            WindowEvent::CursorMoved { position, .. } => {
                stage.on_pointer_moved(Vec2::new(position.x as f32, position.y as f32))
            }

            WindowEvent::MouseWheel { delta, .. } => {
                // winit reports scrolling up as positive
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y,
                    MouseScrollDelta::PixelDelta(position) => -position.y as f32,
                };
                stage.on_wheel(delta_y)
            }

            WindowEvent::RedrawRequested => stage.animate().map(|_| ()),

            _ => Ok(()),
        };

        match result {
            Ok(()) => {}
            Err(Error::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                stage.stop();
                self.fail(event_loop, "Render error", &"GPU out of memory");
            }
            Err(e) => log::warn!("Render error: {}", e),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match StageConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => StageConfig::default(),
    };

    if args.print_config {
        return match config.to_json_string() {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };
    // Frames are requested by the stage itself
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config, args.width, args.height);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
        return ExitCode::FAILURE;
    }

    if app.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
