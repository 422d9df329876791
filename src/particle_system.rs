use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

use crate::config::ParticleOptions;
use crate::scene::Color;

/// GPU-aligned particle record (64 bytes)
/// Written once at spawn; the shader derives everything else from the time uniform
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    pub position: [f32; 3],   // Spawn position
    pub start_time: f32,      // Spawn time relative to the system's epoch
    pub velocity: [f32; 3],   // Units per second
    pub lifetime: f32,        // Seconds; 0 marks an empty slot
    pub color: [f32; 3],      // RGB
    pub size: f32,            // Pixels at birth
    pub turbulence: f32,      // Noise amplitude
    pub _padding: [f32; 3],   // Padding for 16-byte alignment
}

impl Particle {
    /// Whether the particle is visible at epoch-relative time `time`
    pub fn is_alive(&self, time: f32) -> bool {
        let age = time - self.start_time;
        self.lifetime > 0.0 && age >= 0.0 && age < self.lifetime
    }
}

/// Seconds of simulation time after which a system moves its epoch forward,
/// keeping the `f32` times seen by the GPU small.
pub const EPOCH_SPAN: f64 = 1024.0;

/// Largest pool whose instance buffer fits in `max_buffer_size` bytes and
/// whose instance count fits a draw call.
pub fn max_capacity(max_buffer_size: u64) -> usize {
    let fits = max_buffer_size / std::mem::size_of::<Particle>() as u64;
    usize::try_from(fits.min(u32::MAX as u64)).unwrap_or(usize::MAX)
}

/// Something that accepts spawned particles and a simulation clock
pub trait ParticleEmitter {
    fn spawn_particle(&mut self, options: &ParticleOptions);

    /// Spawn `count` particles in one go.
    fn spawn_particles(&mut self, options: &ParticleOptions, count: u64) {
        for _ in 0..count {
            self.spawn_particle(options);
        }
    }

    /// Advance the simulation to absolute time `time` (seconds).
    fn update(&mut self, time: f64);
}

/// Fixed-capacity particle pool backed by a ring buffer.
///
/// Spawning only writes one record; ageing, motion and fading happen on the
/// GPU from `time`. When the ring is full the oldest slot is overwritten.
pub struct ParticleSystem {
    particles: Vec<Particle>,
    cursor: usize,
    spawned_total: u64,
    time: f64,
    /// Absolute time that `start_time`s and `shader_time` are measured from
    epoch: f64,
    /// Bumped whenever the epoch moves and every slot is rewritten
    epoch_generation: u64,
    rng: StdRng,
}

impl ParticleSystem {
    pub fn new(max_particles: usize) -> Self {
        Self::with_rng(max_particles, StdRng::from_entropy())
    }

    /// Deterministic jitter, for reproducible runs and tests
    pub fn with_seed(max_particles: usize, seed: u64) -> Self {
        Self::with_rng(max_particles, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_particles: usize, rng: StdRng) -> Self {
        Self {
            particles: vec![Particle::default(); max_particles.max(1)],
            cursor: 0,
            spawned_total: 0,
            time: 0.0,
            epoch: 0.0,
            epoch_generation: 0,
            rng,
        }
    }

    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    /// Slot the next spawn will write
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn spawned_total(&self) -> u64 {
        self.spawned_total
    }

    /// Absolute simulation time
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    pub fn epoch_generation(&self) -> u64 {
        self.epoch_generation
    }

    /// Current time relative to the epoch, as uploaded to the GPU
    pub fn shader_time(&self) -> f32 {
        (self.time - self.epoch) as f32
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn alive_count(&self) -> usize {
        let time = self.shader_time();
        self.particles.iter().filter(|p| p.is_alive(time)).count()
    }

    /// Slot ranges written since the pool had seen `uploaded` spawns.
    ///
    /// Returns at most two ranges (the tail and head of the ring). If more
    /// particles were spawned than fit, the whole pool is dirty.
    pub fn dirty_ranges(&self, uploaded: u64) -> Vec<Range<usize>> {
        let capacity = self.capacity();
        let pending = self.spawned_total.saturating_sub(uploaded);
        if pending == 0 {
            return Vec::new();
        }
        if pending >= capacity as u64 {
            return vec![0..capacity];
        }

        let pending = pending as usize;
        let start = (self.cursor + capacity - pending) % capacity;
        if start < self.cursor {
            vec![start..self.cursor]
        } else {
            let mut ranges = vec![start..capacity];
            if self.cursor > 0 {
                ranges.push(0..self.cursor);
            }
            ranges
        }
    }

    /// Get a slot range as a byte slice for GPU upload (zero-copy)
    pub fn range_bytes(&self, range: Range<usize>) -> &[u8] {
        bytemuck::cast_slice(&self.particles[range])
    }

    /// Move the epoch to the current time and shift every `start_time` with it.
    fn rebase(&mut self) {
        let shift = self.time - self.epoch;
        for particle in &mut self.particles {
            particle.start_time = (particle.start_time as f64 - shift) as f32;
        }
        self.epoch = self.time;
        self.epoch_generation += 1;
        log::debug!("Particle epoch moved to {:.3}s", self.epoch);
    }

    fn jitter(&mut self) -> f32 {
        self.rng.gen::<f32>() - 0.5
    }

    fn jitter_vec(&mut self, amount: f32) -> Vec3 {
        Vec3::new(self.jitter(), self.jitter(), self.jitter()) * amount
    }
}

impl ParticleEmitter for ParticleSystem {
    fn spawn_particle(&mut self, options: &ParticleOptions) {
        let position =
            Vec3::from_array(options.position) + self.jitter_vec(options.position_randomness);
        let velocity =
            Vec3::from_array(options.velocity) + self.jitter_vec(options.velocity_randomness);

        let base = Color::from_hex(options.color).to_array();
        let mut color = [0.0; 3];
        for (channel, value) in color.iter_mut().zip(base) {
            *channel = (value + self.jitter() * options.color_randomness).clamp(0.0, 1.0);
        }

        let size = (options.size + self.jitter() * options.size_randomness).max(0.0);

        self.particles[self.cursor] = Particle {
            position: position.to_array(),
            start_time: self.shader_time(),
            velocity: velocity.to_array(),
            lifetime: options.lifetime,
            color,
            size,
            turbulence: options.turbulence,
            _padding: [0.0; 3],
        };

        self.cursor = (self.cursor + 1) % self.capacity();
        self.spawned_total += 1;
    }

    fn spawn_particles(&mut self, options: &ParticleOptions, count: u64) {
        // Spawns beyond one full ring would be overwritten within this batch
        let capacity = self.capacity() as u64;
        let skipped = count.saturating_sub(capacity);
        if skipped > 0 {
            self.cursor = ((self.cursor as u64 + skipped) % capacity) as usize;
            self.spawned_total += skipped;
        }
        for _ in skipped..count {
            self.spawn_particle(options);
        }
    }

    fn update(&mut self, time: f64) {
        self.time = time;
        if (self.time - self.epoch).abs() >= EPOCH_SPAN {
            self.rebase();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(system: &mut ParticleSystem, count: usize) {
        let options = ParticleOptions::default();
        for _ in 0..count {
            system.spawn_particle(&options);
        }
    }

    #[test]
    fn test_particle_is_gpu_sized() {
        assert_eq!(std::mem::size_of::<Particle>(), 64);
    }

    #[test]
    fn test_spawn_applies_options_with_bounded_jitter() {
        let mut system = ParticleSystem::with_seed(64, 42);
        system.update(3.0);
        let options = ParticleOptions {
            position: [1.0, 2.0, 3.0],
            ..ParticleOptions::default()
        };
        for _ in 0..64 {
            system.spawn_particle(&options);
        }

        for particle in system.particles() {
            assert_eq!(particle.start_time, 3.0);
            assert_eq!(particle.lifetime, 2.0);
            assert_eq!(particle.turbulence, 0.5);
            for (value, base) in particle.position.iter().zip(options.position) {
                assert!((value - base).abs() <= 0.15 + 1e-6);
            }
            for value in particle.velocity {
                assert!(value.abs() <= 0.25 + 1e-6);
            }
            for value in particle.color {
                assert!((0.0..=1.0).contains(&value));
            }
            assert!((4.5..=5.5).contains(&particle.size));
        }
    }

    #[test]
    fn test_zero_randomness_is_exact() {
        let mut system = ParticleSystem::with_seed(4, 0);
        let options = ParticleOptions {
            position: [5.0, 0.0, -5.0],
            position_randomness: 0.0,
            velocity: [0.0, 1.0, 0.0],
            velocity_randomness: 0.0,
            color: 0xff0000,
            color_randomness: 0.0,
            size_randomness: 0.0,
            ..ParticleOptions::default()
        };
        system.spawn_particle(&options);

        let particle = system.particles()[0];
        assert_eq!(particle.position, [5.0, 0.0, -5.0]);
        assert_eq!(particle.velocity, [0.0, 1.0, 0.0]);
        assert_eq!(particle.color, [1.0, 0.0, 0.0]);
        assert_eq!(particle.size, 5.0);
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut system = ParticleSystem::with_seed(4, 1);
        spawn(&mut system, 3);
        system.update(1.0);
        spawn(&mut system, 2);

        assert_eq!(system.spawned_total(), 5);
        assert_eq!(system.cursor(), 1);
        assert_eq!(system.particles()[0].start_time, 1.0);
        assert_eq!(system.particles()[1].start_time, 0.0);
        assert_eq!(system.particles()[3].start_time, 1.0);
    }

    #[test]
    fn test_alive_count_follows_time() {
        let mut system = ParticleSystem::with_seed(16, 3);
        assert_eq!(system.alive_count(), 0);

        spawn(&mut system, 10);
        assert_eq!(system.alive_count(), 10);

        system.update(1.9);
        assert_eq!(system.alive_count(), 10);

        system.update(2.0);
        assert_eq!(system.alive_count(), 0);
    }

    #[test]
    fn test_dirty_ranges() {
        let mut system = ParticleSystem::with_seed(8, 9);
        assert!(system.dirty_ranges(0).is_empty());

        spawn(&mut system, 3);
        assert_eq!(system.dirty_ranges(0), vec![0..3]);
        assert!(system.dirty_ranges(3).is_empty());

        spawn(&mut system, 7);
        // cursor wrapped to 2; the last 7 spawns occupy 3..8 and 0..2
        assert_eq!(system.cursor(), 2);
        assert_eq!(system.dirty_ranges(3), vec![3..8, 0..2]);

        spawn(&mut system, 6);
        assert_eq!(system.cursor(), 0);
        assert_eq!(system.dirty_ranges(14), vec![6..8]);
        assert_eq!(system.dirty_ranges(0), vec![0..8]);
    }

    #[test]
    fn test_max_capacity_follows_buffer_limit() {
        let default_limit = wgpu::Limits::default().max_buffer_size;
        assert_eq!(max_capacity(default_limit), 4_194_304);
        assert_eq!(max_capacity(640), 10);
        assert_eq!(max_capacity(u64::MAX), u32::MAX as usize);
    }

    #[test]
    fn test_batch_larger_than_ring_only_writes_last_lap() {
        let mut system = ParticleSystem::with_seed(8, 4);
        system.update(2.0);
        system.spawn_particles(&ParticleOptions::default(), 7_864_320_003);

        assert_eq!(system.spawned_total(), 7_864_320_003);
        assert_eq!(system.cursor(), (7_864_320_003_u64 % 8) as usize);
        assert!(system.particles().iter().all(|p| p.start_time == 2.0));
        assert_eq!(system.dirty_ranges(0), vec![0..8]);
    }

    #[test]
    fn test_epoch_moves_on_long_runs() {
        let mut system = ParticleSystem::with_seed(4, 6);
        let start = 6.0 * 24.0 * 3600.0;
        system.update(start);
        assert_eq!(system.epoch(), start);
        assert_eq!(system.epoch_generation(), 1);

        spawn(&mut system, 1);
        system.update(start + 0.5);
        assert!((system.shader_time() - 0.5).abs() < 1e-6);
        assert_eq!(system.alive_count(), 1);

        // crossing another span keeps the particle's age intact
        system.update(start + 0.5 + EPOCH_SPAN);
        assert_eq!(system.epoch_generation(), 2);
        let particle = system.particles()[0];
        let age = system.shader_time() - particle.start_time;
        assert!((age as f64 - (EPOCH_SPAN + 0.5)).abs() < 1e-3);
        assert_eq!(system.alive_count(), 0);
    }

    #[test]
    fn test_frame_sized_steps_age_particles_late_in_a_run() {
        let mut system = ParticleSystem::with_seed(4, 8);
        let mut time = 524_288.0;
        system.update(time);
        spawn(&mut system, 1);
        for _ in 0..10 {
            time += 1.0 / 60.0;
            system.update(time);
        }
        let age = system.shader_time() - system.particles()[0].start_time;
        assert!((age - 10.0 / 60.0).abs() < 1e-4, "age {}", age);
    }

    #[test]
    fn test_range_bytes_length() {
        let mut system = ParticleSystem::with_seed(8, 5);
        spawn(&mut system, 2);
        assert_eq!(system.range_bytes(0..2).len(), 128);
    }
}
