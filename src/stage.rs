use glam::{Vec2, Vec3};

use crate::camera::PerspectiveCamera;
use crate::clock::{Clock, FrameClock};
use crate::config::StageConfig;
use crate::controls::{ControlsEvent, DragMode, OrbitControls};
use crate::error::{Error, Result};
use crate::frame_driver::{FrameDriver, FrameReport, FrameScheduler};
use crate::particle_system::ParticleSystem;
use crate::renderer::Render;
use crate::scene::{AxisHelper, Color, PointLight, Scene};
use crate::surface::CanvasSize;

const AXIS_SIZE: f32 = 200.0;

/// The hosted view: scene, camera, renderer, controls and the frame loop
/// that drives them.
pub struct Stage<R, S, C: FrameClock = Clock> {
    scene: Scene,
    camera: PerspectiveCamera,
    renderer: R,
    controls: OrbitControls,
    driver: FrameDriver<C>,
    scheduler: S,
    size: CanvasSize,
    pointer: Vec2,
}

impl<R: Render, S: FrameScheduler> Stage<R, S> {
    /// Build everything once the surface exists and run the first tick.
    ///
    /// `make_renderer` is called after the camera and before the controls.
    /// Nothing is retried; the first failing step aborts startup.
    pub fn start<F>(
        size: CanvasSize,
        config: StageConfig,
        make_renderer: F,
        scheduler: S,
    ) -> Result<Self>
    where
        F: FnOnce(CanvasSize) -> Result<R>,
    {
        Self::start_with_clock(size, config, make_renderer, scheduler, Clock::new())
    }
}

impl<R: Render, S: FrameScheduler, C: FrameClock> Stage<R, S, C> {
    pub fn start_with_clock<F>(
        size: CanvasSize,
        config: StageConfig,
        make_renderer: F,
        scheduler: S,
        clock: C,
    ) -> Result<Self>
    where
        F: FnOnce(CanvasSize) -> Result<R>,
    {
        config.validate()?;
        let StageConfig {
            camera: camera_options,
            controls: controls_options,
            emitter: emitter_options,
            particles,
            spawner,
        } = config;

        let mut scene = create_scene();
        create_lights(&mut scene);
        log::debug!("Scene created with {} entities", scene.entities().len());

        let camera = PerspectiveCamera::from_options(&camera_options, size.aspect_ratio());
        log::debug!("Camera at {} with aspect {}", camera.position, camera.aspect);

        let renderer = make_renderer(size)?;
        log::debug!("Renderer bound to {}x{} surface", size.width, size.height);

        let limit = renderer.max_particles();
        if emitter_options.max_particles > limit {
            return Err(Error::ParticleCapacity {
                requested: emitter_options.max_particles,
                limit,
            });
        }

        let controls = OrbitControls::new(&camera, &controls_options);

        let particle_system = match emitter_options.seed {
            Some(seed) => ParticleSystem::with_seed(emitter_options.max_particles, seed),
            None => ParticleSystem::new(emitter_options.max_particles),
        };
        scene.add(particle_system);
        log::debug!(
            "Particle emitter added (capacity {}, {} particles/s)",
            emitter_options.max_particles,
            spawner.spawn_rate
        );

        let driver = FrameDriver::with_clock(clock, particles, spawner);

        let mut stage = Self {
            scene,
            camera,
            renderer,
            controls,
            driver,
            scheduler,
            size,
            pointer: Vec2::ZERO,
        };
        stage.driver.start();
        stage.animate()?;
        log::info!("Stage started");
        Ok(stage)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn driver(&self) -> &FrameDriver<C> {
        &self.driver
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    /// One frame: spawn, advance the emitter, draw, then queue the next frame.
    ///
    /// The next frame is queued even when drawing fails.
    pub fn animate(&mut self) -> Result<FrameReport> {
        let report = self.driver.step(&mut self.scene);
        log::trace!(
            "frame {} delta {:.4}s tick {:.3}s spawned {}",
            report.frame,
            report.delta,
            report.tick,
            report.spawned
        );

        let rendered = self.render();
        self.driver.reschedule(&self.scheduler);
        rendered.map(|()| report)
    }

    pub fn render(&mut self) -> Result<()> {
        self.renderer.render(&self.scene, &self.camera)?;
        Ok(())
    }

    /// Stop queueing frames. The frame already queued, if any, still runs.
    pub fn stop(&mut self) {
        self.driver.stop();
        log::debug!("Frame loop stopped after {} frames", self.driver.frames());
    }

    pub fn on_resize(&mut self, size: CanvasSize) -> Result<()> {
        log::info!("onResize: {}, {}", size.width, size.height);
        self.size = size;
        self.camera.aspect = size.aspect_ratio();
        self.camera.update_projection_matrix();
        self.renderer.resize(size, &self.camera);
        self.render()
    }

    pub fn on_controls_event(&mut self, event: ControlsEvent) -> Result<()> {
        match event {
            ControlsEvent::Change => self.render(),
        }
    }

    pub fn on_pointer_down(&mut self, mode: DragMode) {
        log::info!("onMouseDown");
        self.controls.begin_drag(mode, self.pointer);
    }

    pub fn on_pointer_up(&mut self) {
        log::info!("onMouseUp");
        self.controls.end_drag();
    }

    pub fn on_pointer_moved(&mut self, position: Vec2) -> Result<()> {
        self.pointer = position;
        let viewport = Vec2::new(self.size.width as f32, self.size.height as f32);
        match self.controls.drag_to(&mut self.camera, position, viewport) {
            Some(event) => self.on_controls_event(event),
            None => Ok(()),
        }
    }

    /// `delta_y` follows the DOM convention: negative scrolls toward the target.
    pub fn on_wheel(&mut self, delta_y: f32) -> Result<()> {
        match self.controls.dolly(&mut self.camera, delta_y) {
            Some(event) => self.on_controls_event(event),
            None => Ok(()),
        }
    }

    pub fn on_key_press(&mut self, key: &str) {
        log::info!("onKeyPress: {}", key);
    }
}

fn create_scene() -> Scene {
    let mut scene = Scene::new(Color::from_hex(0x000000));
    scene.add(AxisHelper::new(AXIS_SIZE));
    scene
}

fn create_lights(scene: &mut Scene) {
    for z in [100.0, -100.0] {
        let light = PointLight::new(Color::from_hex(0xffffff), 1.0, 1000.0);
        scene.add(light.at(Vec3::new(0.0, 0.0, z)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use glam::Mat4;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Render {
            aspect: f32,
            projection: Mat4,
            position: Vec3,
            spawned: u64,
            time: f64,
        },
        Resize {
            size: CanvasSize,
            aspect: f32,
            projection: Mat4,
        },
    }

    struct RecordingRenderer {
        calls: Vec<Call>,
        fail_next: Option<wgpu::SurfaceError>,
        max_particles: usize,
    }

    impl Default for RecordingRenderer {
        fn default() -> Self {
            Self {
                calls: Vec::new(),
                fail_next: None,
                max_particles: usize::MAX,
            }
        }
    }

    impl RecordingRenderer {
        fn renders(&self) -> usize {
            self.calls
                .iter()
                .filter(|call| matches!(call, Call::Render { .. }))
                .count()
        }
    }

    impl Render for RecordingRenderer {
        fn render(
            &mut self,
            scene: &Scene,
            camera: &PerspectiveCamera,
        ) -> Result<(), wgpu::SurfaceError> {
            if let Some(error) = self.fail_next.take() {
                return Err(error);
            }
            let system = scene.particle_systems().next();
            self.calls.push(Call::Render {
                aspect: camera.aspect,
                projection: camera.projection_matrix(),
                position: camera.position,
                spawned: system.map_or(0, |s| s.spawned_total()),
                time: system.map_or(0.0, |s| s.time()),
            });
            Ok(())
        }

        fn resize(&mut self, size: CanvasSize, camera: &PerspectiveCamera) {
            self.calls.push(Call::Resize {
                size,
                aspect: camera.aspect,
                projection: camera.projection_matrix(),
            });
        }

        fn max_particles(&self) -> usize {
            self.max_particles
        }
    }

    #[derive(Default)]
    struct CountingScheduler {
        scheduled: Cell<usize>,
    }

    impl FrameScheduler for CountingScheduler {
        fn schedule_frame(&self) {
            self.scheduled.set(self.scheduled.get() + 1);
        }
    }

    type TestStage = Stage<RecordingRenderer, CountingScheduler, ManualClock>;

    fn test_config() -> StageConfig {
        let mut config = StageConfig::default();
        config.emitter.max_particles = 1024;
        config.emitter.seed = Some(11);
        config
    }

    fn start(size: CanvasSize, deltas: &[f64]) -> TestStage {
        Stage::start_with_clock(
            size,
            test_config(),
            |_| Ok(RecordingRenderer::default()),
            CountingScheduler::default(),
            ManualClock::new(deltas.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn test_startup_builds_full_scene_with_one_loop() {
        let stage = start(CanvasSize::new(800, 600), &[]);

        assert!(!stage.scene().is_empty());
        assert_eq!(stage.scene().lights().count(), 2);
        assert_eq!(stage.scene().axis_helpers().count(), 1);
        assert_eq!(stage.scene().particle_systems().count(), 1);
        assert_eq!(stage.scene().background, Color::BLACK);

        assert!(stage.is_running());
        assert_eq!(stage.driver().frames(), 1);
        assert_eq!(stage.scheduler().scheduled.get(), 1);
        assert_eq!(stage.renderer().renders(), 1);
    }

    #[test]
    fn test_startup_order_camera_before_renderer() {
        let mut seen = None;
        let stage = Stage::start_with_clock(
            CanvasSize::new(1000, 500),
            test_config(),
            |size| {
                seen = Some(size);
                Ok(RecordingRenderer::default())
            },
            CountingScheduler::default(),
            ManualClock::default(),
        )
        .unwrap();
        assert_eq!(seen, Some(CanvasSize::new(1000, 500)));
        assert_eq!(stage.camera().aspect, 2.0);
        assert_eq!(stage.camera().fov, 60.0);
    }

    #[test]
    fn test_startup_with_zero_height_canvas() {
        let stage = start(CanvasSize::new(0, 600), &[]);
        assert_eq!(stage.camera().aspect, 0.0);
        assert!(stage.is_running());
    }

    #[test]
    fn test_failed_renderer_aborts_startup() {
        let result: Result<TestStage> = Stage::start_with_clock(
            CanvasSize::new(800, 600),
            test_config(),
            |_| Err(Error::NoAdapter),
            CountingScheduler::default(),
            ManualClock::default(),
        );
        assert!(matches!(result, Err(Error::NoAdapter)));
    }

    #[test]
    fn test_capacity_beyond_renderer_limit_aborts_startup() {
        let result: Result<TestStage> = Stage::start_with_clock(
            CanvasSize::new(800, 600),
            test_config(),
            |_| {
                Ok(RecordingRenderer {
                    max_particles: 512,
                    ..RecordingRenderer::default()
                })
            },
            CountingScheduler::default(),
            ManualClock::default(),
        );
        assert!(matches!(
            result,
            Err(Error::ParticleCapacity {
                requested: 1024,
                limit: 512
            })
        ));
    }

    #[test]
    fn test_invalid_config_aborts_startup() {
        let mut config = test_config();
        config.particles.lifetime = -1.0;
        let result: Result<TestStage> = Stage::start_with_clock(
            CanvasSize::new(800, 600),
            config,
            |_| Ok(RecordingRenderer::default()),
            CountingScheduler::default(),
            ManualClock::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_animate_spawns_and_updates_before_render() {
        let mut stage = start(CanvasSize::new(800, 600), &[0.0, 0.01]);
        let report = stage.animate().unwrap();

        assert_eq!(report.spawned, 150);
        match stage.renderer().calls.last() {
            Some(Call::Render { spawned, time, .. }) => {
                assert_eq!(*spawned, 150);
                assert_eq!(*time, 0.01);
            }
            other => panic!("expected a render, got {:?}", other),
        }
        assert_eq!(stage.scheduler().scheduled.get(), 2);
    }

    #[test]
    fn test_render_failure_still_reschedules() {
        let mut stage = start(CanvasSize::new(800, 600), &[]);
        stage.renderer.fail_next = Some(wgpu::SurfaceError::Timeout);

        let result = stage.animate();
        assert!(matches!(
            result,
            Err(Error::Surface(wgpu::SurfaceError::Timeout))
        ));
        assert_eq!(stage.scheduler().scheduled.get(), 2);
    }

    #[test]
    fn test_stop_ends_rescheduling() {
        let mut stage = start(CanvasSize::new(800, 600), &[]);
        stage.stop();
        stage.animate().unwrap();
        assert!(!stage.is_running());
        assert_eq!(stage.scheduler().scheduled.get(), 1);
    }

    #[test]
    fn test_resize_updates_camera_then_resizes_then_renders() {
        let mut stage = start(CanvasSize::new(800, 600), &[]);
        let size = CanvasSize::new(1200, 400);
        stage.on_resize(size).unwrap();

        let expected = PerspectiveCamera::new(60.0, 3.0, 1.0, 1100.0);
        let calls = &stage.renderer().calls;
        let tail = &calls[calls.len() - 2..];
        // the renderer is resized only after the camera took the new aspect
        assert_eq!(
            tail[0],
            Call::Resize {
                size,
                aspect: 3.0,
                projection: expected.projection_matrix(),
            }
        );
        match &tail[1] {
            Call::Render {
                aspect, projection, ..
            } => {
                assert_eq!(*aspect, 3.0);
                assert_eq!(*projection, expected.projection_matrix());
            }
            other => panic!("expected a render, got {:?}", other),
        }
        assert_eq!(stage.size(), size);
        // the resize render is extra; no frame was queued for it
        assert_eq!(stage.scheduler().scheduled.get(), 1);
    }

    #[test]
    fn test_resize_to_zero_height() {
        let mut stage = start(CanvasSize::new(800, 600), &[]);
        stage.on_resize(CanvasSize::new(800, 0)).unwrap();
        assert_eq!(stage.camera().aspect, 0.0);
        assert_eq!(stage.camera().projection_matrix(), Mat4::ZERO);
    }

    #[test]
    fn test_each_controls_change_renders_once() {
        let mut stage = start(CanvasSize::new(800, 600), &[]);
        let before = stage.renderer().renders();

        stage.on_pointer_moved(Vec2::new(100.0, 100.0)).unwrap();
        assert_eq!(stage.renderer().renders(), before, "no drag yet");

        stage.on_pointer_down(DragMode::Rotate);
        stage.on_pointer_moved(Vec2::new(120.0, 100.0)).unwrap();
        stage.on_pointer_moved(Vec2::new(140.0, 110.0)).unwrap();
        stage.on_pointer_up();
        stage.on_pointer_moved(Vec2::new(300.0, 300.0)).unwrap();
        assert_eq!(stage.renderer().renders(), before + 2);

        stage.on_wheel(-3.0).unwrap();
        stage.on_wheel(0.0).unwrap();
        assert_eq!(stage.renderer().renders(), before + 3);

        // controls renders are not frames
        assert_eq!(stage.driver().frames(), 1);
        assert_eq!(stage.scheduler().scheduled.get(), 1);
    }

    #[test]
    fn test_controls_render_sees_moved_camera() {
        let mut stage = start(CanvasSize::new(800, 600), &[]);
        let start_position = stage.camera().position;

        stage.on_wheel(-1.0).unwrap();
        match stage.renderer().calls.last() {
            Some(Call::Render { position, .. }) => {
                assert!(position.length() < start_position.length());
            }
            other => panic!("expected a render, got {:?}", other),
        }
    }

    #[test]
    fn test_key_press_has_no_effect() {
        let mut stage = start(CanvasSize::new(800, 600), &[]);
        let renders = stage.renderer().renders();
        stage.on_key_press("a");
        assert_eq!(stage.renderer().renders(), renders);
        assert_eq!(stage.driver().frames(), 1);
    }
}
