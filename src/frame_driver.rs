use crate::clock::{Clock, FrameClock};
use crate::config::{ParticleOptions, SpawnerOptions};
use crate::particle_system::ParticleEmitter;

/// Queues the next frame on the host's display refresh.
pub trait FrameScheduler {
    fn schedule_frame(&self);
}

impl FrameScheduler for winit::window::Window {
    fn schedule_frame(&self) {
        self.request_redraw();
    }
}

impl<T: FrameScheduler + ?Sized> FrameScheduler for std::sync::Arc<T> {
    fn schedule_frame(&self) {
        (**self).schedule_frame();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub delta: f64,
    pub tick: f64,
    pub spawned: u64,
}

/// Particles to emit for one frame: `floor(rate * delta)`, never negative.
///
/// Counts past `u64::MAX` saturate; non-finite products spawn nothing.
pub fn spawn_count(spawn_rate: f32, delta: f64) -> u64 {
    let count = (spawn_rate as f64 * delta).floor();
    if count.is_finite() && count > 0.0 {
        count as u64
    } else {
        0
    }
}

/// Advances simulation time and spawns particles once per display refresh.
pub struct FrameDriver<C: FrameClock = Clock> {
    clock: C,
    tick: f64,
    frame: u64,
    state: LoopState,
    particle_options: ParticleOptions,
    spawner_options: SpawnerOptions,
}

impl FrameDriver<Clock> {
    pub fn new(particle_options: ParticleOptions, spawner_options: SpawnerOptions) -> Self {
        Self::with_clock(Clock::new(), particle_options, spawner_options)
    }
}

impl<C: FrameClock> FrameDriver<C> {
    pub fn with_clock(
        clock: C,
        particle_options: ParticleOptions,
        spawner_options: SpawnerOptions,
    ) -> Self {
        Self {
            clock,
            tick: 0.0,
            frame: 0,
            state: LoopState::Stopped,
            particle_options,
            spawner_options,
        }
    }

    /// Accumulated simulation time in seconds
    pub fn tick(&self) -> f64 {
        self.tick
    }

    pub fn frames(&self) -> u64 {
        self.frame
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn particle_options(&self) -> &ParticleOptions {
        &self.particle_options
    }

    pub fn spawner_options(&self) -> &SpawnerOptions {
        &self.spawner_options
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Mark the loop live. Returns false if it already was.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = LoopState::Running;
        true
    }

    pub fn stop(&mut self) {
        self.state = LoopState::Stopped;
    }

    /// Sample the clock, accumulate `tick`, spawn, then advance the emitter.
    pub fn step<E: ParticleEmitter + ?Sized>(&mut self, emitter: &mut E) -> FrameReport {
        let delta = self.clock.delta() * self.spawner_options.time_scale as f64;

        self.tick += delta;
        if self.tick < 0.0 {
            self.tick = 0.0;
        }

        let spawned = spawn_count(self.spawner_options.spawn_rate, delta);
        emitter.spawn_particles(&self.particle_options, spawned);

        emitter.update(self.tick);

        self.frame += 1;
        FrameReport {
            frame: self.frame,
            delta,
            tick: self.tick,
            spawned,
        }
    }

    /// Queue the next tick if the loop is still live.
    pub fn reschedule<S: FrameScheduler + ?Sized>(&self, scheduler: &S) -> bool {
        if self.is_running() {
            scheduler.schedule_frame();
        }
        self.is_running()
    }
}
