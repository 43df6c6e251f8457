//! Simulation drivers: the SPH fluid system and the random point-cloud
//! test system, both behind the [`ParticleSystem`] capability trait.

use bevy::prelude::*;
use glam::{Vec3, Vec4};

use crate::SimError;
use crate::cpu::sph3d::{
    CpuKernels, ParticleStore, SphKernels, StepArgs, particle_seed, rand01,
};
use crate::effects::{EffectFlags, WAVE_LIFETIME_STEPS};
use crate::params::{FluidConfig, FluidParams};
use crate::sync::PositionChannel;

/// Capability surface shared by the simulation variants. `render` is not
/// part of it: the renderer consumes `positions()` on its own, strictly
/// after `update` returns.
pub trait ParticleSystem: Send + Sync {
    /// Reallocates buffers and seeds a fresh particle cloud. On error the
    /// previous state (possibly never-initialized) is kept.
    fn reset(&mut self, count: usize, seed: u32) -> Result<(), SimError>;

    /// Advances one frame. Never changes the particle count.
    fn update(&mut self, dt: f32);

    /// Render-side position snapshot, re-fetched by the renderer each
    /// frame.
    fn positions(&self) -> &[Vec4];

    /// Monotonic frame counter bumped on every released compute scope.
    fn frame(&self) -> u64;

    fn len(&self) -> usize {
        self.positions().len()
    }

    // effect/pause operations: meaningful for the fluid system only
    fn toggle_pause(&mut self) -> bool {
        false
    }
    fn toggle_drain(&mut self) -> bool {
        false
    }
    fn toggle_fountain(&mut self) -> bool {
        false
    }
    fn emit_wave(&mut self) {}
}

/// The active simulation variant. Only two exist, so a tagged variant
/// beats a trait-object hierarchy; the trait stays as the shared surface.
#[derive(Resource)]
pub enum Simulation {
    Fluid(FluidSystem),
    Test(TestSystem),
}

impl Simulation {
    fn inner(&self) -> &dyn ParticleSystem {
        match self {
            Simulation::Fluid(s) => s,
            Simulation::Test(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ParticleSystem {
        match self {
            Simulation::Fluid(s) => s,
            Simulation::Test(s) => s,
        }
    }
}

impl ParticleSystem for Simulation {
    fn reset(&mut self, count: usize, seed: u32) -> Result<(), SimError> {
        self.inner_mut().reset(count, seed)
    }

    fn update(&mut self, dt: f32) {
        self.inner_mut().update(dt);
    }

    fn positions(&self) -> &[Vec4] {
        self.inner().positions()
    }

    fn frame(&self) -> u64 {
        self.inner().frame()
    }

    fn toggle_pause(&mut self) -> bool {
        self.inner_mut().toggle_pause()
    }

    fn toggle_drain(&mut self) -> bool {
        self.inner_mut().toggle_drain()
    }

    fn toggle_fountain(&mut self) -> bool {
        self.inner_mut().toggle_fountain()
    }

    fn emit_wave(&mut self) {
        self.inner_mut().emit_wave();
    }
}

// ---------------------------------------------------------------------------

/// SPH fluid driver: owns the parameter set, the particle store and a
/// kernel-set backend, and sequences the per-frame dispatches through the
/// position channel's compute scope.
pub struct FluidSystem {
    params: FluidParams,
    store: ParticleStore,
    kernels: Box<dyn SphKernels>,
    volume_min: Vec3,
    volume_max: Vec3,
    time: f32,
    effects: EffectFlags,
    wave_start: f32,
    paused: bool,
}

impl FluidSystem {
    pub fn new(cfg: &FluidConfig) -> Self {
        Self::with_kernels(cfg, Box::new(CpuKernels))
    }

    /// Swaps the kernel backend; used by the dispatch-order tests and by
    /// anything that wants to observe the stage protocol.
    pub fn with_kernels(cfg: &FluidConfig, kernels: Box<dyn SphKernels>) -> Self {
        let params = FluidParams::derive(cfg);
        Self {
            volume_min: params.volume_min,
            volume_max: params.volume_max,
            params,
            store: ParticleStore::default(),
            kernels,
            time: 0.0,
            effects: EffectFlags::empty(),
            wave_start: 0.0,
            paused: false,
        }
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    pub fn effects(&self) -> EffectFlags {
        self.effects
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Field snapshots for diagnostics and tests.
    pub fn densities(&self) -> &[f32] {
        &self.store.fields.densities
    }

    pub fn pressures(&self) -> &[f32] {
        &self.store.fields.pressures
    }

    pub fn velocities(&self) -> &[Vec4] {
        &self.store.fields.velocities
    }

    pub fn activate_drain(&mut self) {
        self.effects.remove(EffectFlags::FOUNTAIN);
        self.effects.insert(EffectFlags::DRAIN);
    }

    pub fn activate_fountain(&mut self) {
        self.effects.remove(EffectFlags::DRAIN);
        self.effects.insert(EffectFlags::FOUNTAIN);
    }

    /// Advances the driver clock and effect lifetimes without touching the
    /// particle buffers. The GPU backend runs the kernel stages device-side
    /// and only needs the clock from the driver.
    pub fn advance_clock(&mut self, dt: f32) -> bool {
        if self.paused {
            return false;
        }
        self.time += dt;
        if self.effects.contains(EffectFlags::WAVE)
            && self.time - self.wave_start > WAVE_LIFETIME_STEPS * dt
        {
            self.effects.remove(EffectFlags::WAVE);
        }
        true
    }

    fn step_args(&self, dt: f32) -> StepArgs {
        StepArgs {
            time: self.time,
            dt,
            effects: self.effects,
            volume_min: self.volume_min,
            volume_max: self.volume_max,
        }
    }
}

impl ParticleSystem for FluidSystem {
    fn reset(&mut self, count: usize, seed: u32) -> Result<(), SimError> {
        let mut store = ParticleStore::allocate(count)?;
        {
            let mut scope = store.positions.acquire()?;
            self.kernels.reset(
                scope.positions_mut(),
                &mut store.fields,
                &self.params,
                self.volume_min,
                self.volume_max,
                seed,
            )?;
        }
        self.store = store;
        info!("fluid system reset with {count} particles (seed {seed})");
        Ok(())
    }

    fn update(&mut self, dt: f32) {
        if self.paused {
            return;
        }

        let args = self.step_args(dt);
        match self.store.positions.acquire() {
            Ok(mut scope) => {
                let fields = &mut self.store.fields;
                if let Err(e) = self
                    .kernels
                    .compute_pressure(scope.positions(), fields, &self.params)
                {
                    warn!("pressure stage skipped: {e}");
                } else if let Err(e) =
                    self.kernels.compute_force(scope.positions(), fields, &self.params)
                {
                    warn!("force stage skipped: {e}");
                } else if let Err(e) =
                    self.kernels
                        .integrate(scope.positions_mut(), fields, &self.params, &args)
                {
                    warn!("integrate stage skipped: {e}");
                }
            }
            Err(e) => warn!("compute scope unavailable, frame skipped: {e}"),
        }

        self.advance_clock(dt);
    }

    fn positions(&self) -> &[Vec4] {
        self.store.positions.render_side()
    }

    fn frame(&self) -> u64 {
        self.store.positions.frame()
    }

    fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    fn toggle_drain(&mut self) -> bool {
        self.effects.remove(EffectFlags::FOUNTAIN);
        self.effects.toggle(EffectFlags::DRAIN);
        self.effects.contains(EffectFlags::DRAIN)
    }

    fn toggle_fountain(&mut self) -> bool {
        self.effects.remove(EffectFlags::DRAIN);
        self.effects.toggle(EffectFlags::FOUNTAIN);
        self.effects.contains(EffectFlags::FOUNTAIN)
    }

    fn emit_wave(&mut self) {
        self.effects.insert(EffectFlags::WAVE);
        self.wave_start = self.time;
    }
}

// ---------------------------------------------------------------------------

/// Debug generator: a hash-seeded point cloud regenerated every update,
/// useful for exercising the buffer/draw path without any physics.
pub struct TestSystem {
    positions: PositionChannel,
    volume_min: Vec3,
    volume_max: Vec3,
    time: f32,
    seed: u32,
}

impl TestSystem {
    pub fn new(cfg: &FluidConfig) -> Self {
        Self {
            positions: PositionChannel::default(),
            volume_min: Vec3::from_array(cfg.volume_min),
            volume_max: Vec3::from_array(cfg.volume_max),
            time: 0.0,
            seed: 0,
        }
    }

    fn scatter(&mut self) -> Result<(), SimError> {
        let (min, span) = (self.volume_min, self.volume_max - self.volume_min);
        let round = self.seed.wrapping_add(self.time as u32);
        let mut scope = self.positions.acquire()?;
        for (i, pos) in scope.positions_mut().iter_mut().enumerate() {
            let mut state = particle_seed(round, i as u32);
            let p = min
                + Vec3::new(
                    rand01(&mut state) * span.x,
                    rand01(&mut state) * span.y,
                    rand01(&mut state) * span.z,
                );
            *pos = p.extend(1.0);
        }
        Ok(())
    }
}

impl ParticleSystem for TestSystem {
    fn reset(&mut self, count: usize, seed: u32) -> Result<(), SimError> {
        let positions = PositionChannel::allocate(count)?;
        self.positions = positions;
        self.seed = seed;
        self.time = 0.0;
        self.scatter()
    }

    fn update(&mut self, dt: f32) {
        if let Err(e) = self.scatter() {
            warn!("test system frame skipped: {e}");
        }
        self.time += dt;
    }

    fn positions(&self) -> &[Vec4] {
        self.positions.render_side()
    }

    fn frame(&self) -> u64 {
        self.positions.frame()
    }
}
