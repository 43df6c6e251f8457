use std::sync::{Arc, Mutex};

use fluidsim::cpu::sph3d::{CpuKernels, Fields, ParticleStore, SphKernels, StepArgs};
use fluidsim::effects::EffectFlags;
use fluidsim::params::{FluidConfig, FluidParams};
use fluidsim::system::{FluidSystem, ParticleSystem};
use glam::{Vec3, Vec4};

fn fluid() -> FluidSystem {
    FluidSystem::new(&FluidConfig::default())
}

#[test]
fn drain_and_fountain_are_mutually_exclusive() {
    let mut sys = fluid();

    sys.activate_drain();
    assert_eq!(sys.effects(), EffectFlags::DRAIN);

    sys.activate_fountain();
    assert_eq!(sys.effects(), EffectFlags::FOUNTAIN);

    sys.activate_drain();
    assert_eq!(sys.effects(), EffectFlags::DRAIN);
}

#[test]
fn toggling_drain_twice_returns_to_inactive() {
    let mut sys = fluid();
    assert!(sys.toggle_drain());
    assert!(!sys.toggle_drain());
    assert_eq!(sys.effects(), EffectFlags::empty());
}

#[test]
fn toggles_clear_the_opposite_effect() {
    let mut sys = fluid();
    assert!(sys.toggle_fountain());
    assert!(sys.toggle_drain());
    assert_eq!(sys.effects(), EffectFlags::DRAIN);
}

#[test]
fn wave_expires_after_fifty_steps() {
    let mut sys = fluid();
    sys.reset(4, 1).unwrap();
    sys.emit_wave();

    for step in 1..=51 {
        sys.update(1.0);
        let waving = sys.effects().contains(EffectFlags::WAVE);
        if step <= 50 {
            assert!(waving, "wave cleared too early at step {step}");
        } else {
            assert!(!waving, "wave still set at step {step}");
        }
    }
}

#[test]
fn emit_wave_restarts_the_countdown() {
    let mut sys = fluid();
    sys.reset(4, 1).unwrap();
    sys.emit_wave();
    for _ in 0..30 {
        sys.update(1.0);
    }
    sys.emit_wave(); // restart mid-flight
    for _ in 0..30 {
        sys.update(1.0);
        assert!(sys.effects().contains(EffectFlags::WAVE));
    }
}

#[test]
fn paused_update_mutates_nothing() {
    let mut sys = fluid();
    sys.reset(16, 9).unwrap();
    assert!(sys.toggle_pause());

    let positions: Vec<Vec4> = sys.positions().to_vec();
    let densities = sys.densities().to_vec();
    let frame = sys.frame();
    let time = sys.time();

    for _ in 0..3 {
        sys.update(1.0);
    }

    assert_eq!(sys.positions(), positions.as_slice());
    assert_eq!(sys.densities(), densities.as_slice());
    assert_eq!(sys.frame(), frame);
    assert_eq!(sys.time(), time);

    assert!(!sys.toggle_pause());
    sys.update(1.0);
    assert_ne!(sys.frame(), frame);
}

#[test]
fn particle_count_is_invariant_between_resets() {
    let mut sys = fluid();
    sys.reset(32, 3).unwrap();
    for _ in 0..5 {
        sys.update(1.0);
        assert_eq!(sys.len(), 32);
    }
    sys.reset(8, 3).unwrap();
    assert_eq!(sys.len(), 8);
}

#[test]
fn seeded_resets_are_deterministic() {
    let mut a = fluid();
    let mut b = fluid();
    a.reset(64, 7).unwrap();
    b.reset(64, 7).unwrap();
    assert_eq!(a.positions(), b.positions());

    let mut c = fluid();
    c.reset(64, 8).unwrap();
    assert_ne!(a.positions(), c.positions());
}

#[test]
fn reset_postconditions_hold() {
    let mut sys = fluid();
    sys.reset(128, 11).unwrap();

    let p = *sys.params();
    for pos in sys.positions() {
        let v = pos.truncate();
        assert!(v.cmpge(p.volume_min).all() && v.cmple(p.volume_max).all());
    }
    assert!(sys.densities().iter().all(|&d| d == 0.0));
    assert!(sys.pressures().iter().all(|&q| q == 0.0));
    assert!(sys.velocities().iter().all(|&v| v == Vec4::ZERO));
}

#[test]
fn failed_reset_keeps_previous_state() {
    let mut sys = fluid();
    sys.reset(16, 5).unwrap();
    let before: Vec<Vec4> = sys.positions().to_vec();

    // capacity overflow surfaces as an allocation error, not an abort
    assert!(sys.reset(usize::MAX / 8, 5).is_err());

    assert_eq!(sys.len(), 16);
    assert_eq!(sys.positions(), before.as_slice());
}

// ---------------------------------------------------------------------------
// dispatch-order protocol

#[derive(Default)]
struct RecordingKernels(Arc<Mutex<Vec<&'static str>>>);

impl RecordingKernels {
    fn log(&self, stage: &'static str) {
        self.0.lock().unwrap().push(stage);
    }
}

impl SphKernels for RecordingKernels {
    fn reset(
        &mut self,
        _positions: &mut [Vec4],
        _fields: &mut Fields,
        _params: &FluidParams,
        _volume_min: Vec3,
        _volume_max: Vec3,
        _seed: u32,
    ) -> Result<(), fluidsim::SimError> {
        self.log("reset");
        Ok(())
    }

    fn compute_pressure(
        &mut self,
        _positions: &[Vec4],
        _fields: &mut Fields,
        _params: &FluidParams,
    ) -> Result<(), fluidsim::SimError> {
        self.log("pressure");
        Ok(())
    }

    fn compute_force(
        &mut self,
        _positions: &[Vec4],
        _fields: &mut Fields,
        _params: &FluidParams,
    ) -> Result<(), fluidsim::SimError> {
        self.log("force");
        Ok(())
    }

    fn integrate(
        &mut self,
        _positions: &mut [Vec4],
        _fields: &mut Fields,
        _params: &FluidParams,
        _args: &StepArgs,
    ) -> Result<(), fluidsim::SimError> {
        self.log("integrate");
        Ok(())
    }
}

#[test]
fn stages_dispatch_in_strict_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sys = FluidSystem::with_kernels(
        &FluidConfig::default(),
        Box::new(RecordingKernels(log.clone())),
    );

    sys.reset(8, 1).unwrap();
    sys.update(1.0);
    sys.update(1.0);

    assert_eq!(
        *log.lock().unwrap(),
        [
            "reset", "pressure", "force", "integrate", "pressure", "force", "integrate",
        ]
    );
}

#[test]
fn no_dispatch_before_a_successful_reset() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sys = FluidSystem::with_kernels(
        &FluidConfig::default(),
        Box::new(RecordingKernels(log.clone())),
    );

    // channel not allocated yet: the whole frame is skipped
    sys.update(1.0);
    assert!(log.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// end-to-end: four isolated particles under gravity only

#[test]
fn isolated_particles_fall_under_gravity_alone() {
    let p = FluidParams::default();
    let mut kernels = CpuKernels;

    // separations of 2h leave no pairwise interaction
    let sep = 2.0 * p.smooth_radius / p.sim_scale;
    let mut store = ParticleStore::allocate(4).unwrap();
    let start: Vec<Vec4> = (0..4)
        .map(|i| Vec4::new((i as f32 - 1.5) * sep, 0.0, 0.0, 1.0))
        .collect();
    {
        let mut scope = store.positions.acquire().unwrap();
        scope.positions_mut().copy_from_slice(&start);

        kernels
            .compute_pressure(scope.positions(), &mut store.fields, &p)
            .unwrap();

        let rho_self = p.mass * p.poly6_coeff * p.radius2.powi(3);
        for i in 0..4 {
            let rho = store.fields.densities[i];
            assert!((rho - rho_self).abs() <= rho_self * 1e-5);
            let expected_pressure = p.stiffness * (rho - p.rest_density).max(0.0);
            assert_eq!(store.fields.pressures[i], expected_pressure);
        }

        kernels
            .compute_force(scope.positions(), &mut store.fields, &p)
            .unwrap();
        for i in 0..4 {
            assert_eq!(store.fields.forces[i], Vec4::ZERO);
        }

        let args = StepArgs {
            time: 0.0,
            dt: 1.0,
            effects: EffectFlags::empty(),
            volume_min: p.volume_min,
            volume_max: p.volume_max,
        };
        kernels
            .integrate(scope.positions_mut(), &mut store.fields, &p, &args)
            .unwrap();

        let dy = p.gravity.y * 1.0 * 1.0 * p.sim_scale;
        for (i, pos) in scope.positions().iter().enumerate() {
            assert!((pos.x - start[i].x).abs() <= 1e-6);
            assert!((pos.z - start[i].z).abs() <= 1e-6);
            assert!((pos.y - dy).abs() <= 1e-6);
        }
    }
}
