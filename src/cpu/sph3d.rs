// smoothed particle hydrodynamics in 3D (CPU kernel set)
use glam::{Vec3, Vec4};

use crate::SimError;
use crate::effects::{
    DRAIN_DEPTH, DRAIN_PULL, EFFECT_RADIUS, EffectFlags, FOUNTAIN_ACCEL, FOUNTAIN_HEIGHT,
    WAVE_ACCEL, WAVE_FREQ,
};
use crate::params::FluidParams;
use crate::sync::PositionChannel;

// ---------------------------------------------------------------------------
// smoothing kernels (precomputed normalization, see FluidParams::derive)

#[inline]
pub fn w_poly6(r2: f32, radius2: f32, coeff: f32) -> f32 {
    if r2 < radius2 {
        coeff * (radius2 - r2).powi(3)
    } else {
        0.0
    }
}

/// Spiky gradient magnitude factor; the caller multiplies by the pair
/// offset. Undefined at r = 0, so self-pairs must be skipped.
#[inline]
pub fn grad_spiky(r: f32, h: f32, coeff: f32) -> f32 {
    if r > 0.0 && r < h {
        coeff * (h - r).powi(2) / r
    } else {
        0.0
    }
}

#[inline]
pub fn laplacian_visc(r: f32, h: f32, coeff: f32) -> f32 {
    if r > 0.0 && r < h {
        coeff * (h - r)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// deterministic per-particle randomness, kept in lockstep with the WGSL
// reset kernel so both backends seed identical clouds

#[inline]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

#[inline]
pub fn rand01(state: &mut u32) -> f32 {
    *state = pcg_hash(*state);
    *state as f32 / u32::MAX as f32
}

#[inline]
pub fn particle_seed(seed: u32, index: u32) -> u32 {
    seed ^ index.wrapping_mul(2_654_435_769)
}

// ---------------------------------------------------------------------------
// particle storage: a column store, one slot per particle index

/// Compute-private per-particle arrays. Positions live apart in the
/// [`PositionChannel`] because they are the one buffer the render domain
/// also sees.
#[derive(Debug, Default)]
pub struct Fields {
    pub velocities: Vec<Vec4>,
    pub prev_velocities: Vec<Vec4>,
    pub densities: Vec<f32>,
    pub pressures: Vec<f32>,
    pub forces: Vec<Vec4>,
}

impl Fields {
    fn allocate(count: usize) -> Result<Self, SimError> {
        fn filled<T: Copy + Default>(count: usize) -> Result<Vec<T>, SimError> {
            let mut v = Vec::new();
            v.try_reserve_exact(count)
                .map_err(|_| SimError::Allocation { count })?;
            v.resize(count, T::default());
            Ok(v)
        }
        Ok(Self {
            velocities: filled(count)?,
            prev_velocities: filled(count)?,
            densities: filled(count)?,
            pressures: filled(count)?,
            forces: filled(count)?,
        })
    }
}

#[derive(Debug, Default)]
pub struct ParticleStore {
    pub positions: PositionChannel,
    pub fields: Fields,
}

impl ParticleStore {
    /// Allocates all six arrays for `count` particles. Failure leaves the
    /// caller's previous store untouched (the new one is simply dropped).
    pub fn allocate(count: usize) -> Result<Self, SimError> {
        Ok(Self {
            positions: PositionChannel::allocate(count)?,
            fields: Fields::allocate(count)?,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// kernel set

/// Per-dispatch arguments that change every frame, bound immediately
/// before the integrate stage runs.
#[derive(Debug, Clone, Copy)]
pub struct StepArgs {
    pub time: f32,
    pub dt: f32,
    pub effects: EffectFlags,
    pub volume_min: Vec3,
    pub volume_max: Vec3,
}

/// The four compute stages. The driver always invokes them in the order
/// reset | pressure -> force -> integrate; implementations may refuse a
/// dispatch (device error), in which case the driver logs and skips the
/// stage.
pub trait SphKernels: Send + Sync {
    fn reset(
        &mut self,
        positions: &mut [Vec4],
        fields: &mut Fields,
        params: &FluidParams,
        volume_min: Vec3,
        volume_max: Vec3,
        seed: u32,
    ) -> Result<(), SimError>;

    fn compute_pressure(
        &mut self,
        positions: &[Vec4],
        fields: &mut Fields,
        params: &FluidParams,
    ) -> Result<(), SimError>;

    fn compute_force(
        &mut self,
        positions: &[Vec4],
        fields: &mut Fields,
        params: &FluidParams,
    ) -> Result<(), SimError>;

    fn integrate(
        &mut self,
        positions: &mut [Vec4],
        fields: &mut Fields,
        params: &FluidParams,
        args: &StepArgs,
    ) -> Result<(), SimError>;
}

/// Reference CPU implementation of the kernel set. All-pairs neighbor
/// scan, no spatial acceleration structure; mirrors the WGSL kernels
/// stage for stage.
#[derive(Debug, Default)]
pub struct CpuKernels;

impl SphKernels for CpuKernels {
    fn reset(
        &mut self,
        positions: &mut [Vec4],
        fields: &mut Fields,
        _params: &FluidParams,
        volume_min: Vec3,
        volume_max: Vec3,
        seed: u32,
    ) -> Result<(), SimError> {
        let span = volume_max - volume_min;
        for (i, pos) in positions.iter_mut().enumerate() {
            let mut state = particle_seed(seed, i as u32);
            let p = volume_min
                + Vec3::new(
                    rand01(&mut state) * span.x,
                    rand01(&mut state) * span.y,
                    rand01(&mut state) * span.z,
                );
            *pos = p.extend(1.0);
        }
        fields.velocities.fill(Vec4::ZERO);
        fields.prev_velocities.fill(Vec4::ZERO);
        fields.densities.fill(0.0);
        fields.pressures.fill(0.0);
        fields.forces.fill(Vec4::ZERO);
        Ok(())
    }

    fn compute_pressure(
        &mut self,
        positions: &[Vec4],
        fields: &mut Fields,
        params: &FluidParams,
    ) -> Result<(), SimError> {
        let n = positions.len();
        for i in 0..n {
            let pi = positions[i].truncate();
            let mut rho = 0.0;
            for pj in positions {
                let d = (pi - pj.truncate()) * params.sim_scale;
                let r2 = d.length_squared();
                if r2 < params.radius2 {
                    rho += params.mass * params.poly6_coeff * (params.radius2 - r2).powi(3);
                }
            }
            fields.densities[i] = rho;
            fields.pressures[i] = params.stiffness * (rho - params.rest_density).max(0.0);
        }
        Ok(())
    }

    fn compute_force(
        &mut self,
        positions: &[Vec4],
        fields: &mut Fields,
        params: &FluidParams,
    ) -> Result<(), SimError> {
        let n = positions.len();
        let vterm = params.visc_lap_coeff * params.viscosity;
        for i in 0..n {
            let pi = positions[i].truncate();
            let press_i = fields.pressures[i];
            let vel_i = fields.velocities[i].truncate();
            let inv_rho_i = 1.0 / fields.densities[i].max(f32::EPSILON);

            let mut force = Vec3::ZERO;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dx = (pi - positions[j].truncate()) * params.sim_scale;
                let r2 = dx.length_squared();
                if r2 >= params.radius2 || r2 == 0.0 {
                    continue;
                }
                let r = r2.sqrt();
                let c = params.smooth_radius - r;
                let inv_rho_j = 1.0 / fields.densities[j].max(f32::EPSILON);

                // symmetrized pressure gradient along the pair offset
                let pterm =
                    -0.5 * c * params.spiky_coeff * (press_i + fields.pressures[j]) / r;
                let dterm = c * inv_rho_i * inv_rho_j;
                let dv = fields.velocities[j].truncate() - vel_i;

                force += (pterm * dx + vterm * dv) * dterm;
            }
            fields.forces[i] = force.extend(0.0);
        }
        Ok(())
    }

    fn integrate(
        &mut self,
        positions: &mut [Vec4],
        fields: &mut Fields,
        params: &FluidParams,
        args: &StepArgs,
    ) -> Result<(), SimError> {
        for (i, pos4) in positions.iter_mut().enumerate() {
            let mut pos = pos4.truncate();
            let prev = fields.prev_velocities[i].truncate();

            let mut accel = fields.forces[i].truncate() / params.mass;
            accel += params.gravity;
            accel += boundary_accel(pos, prev, params, args);
            accel += effect_accel(pos, args);

            let mut vel = prev + accel * args.dt;
            let speed = vel.length();
            if speed > params.speed_limit {
                vel *= params.speed_limit / speed;
            }
            pos += vel * args.dt * params.sim_scale;

            // drain recirculation: particles swallowed below the floor
            // re-enter at the top of the box
            if args.effects.contains(EffectFlags::DRAIN)
                && pos.y < args.volume_min.y - DRAIN_DEPTH
            {
                pos.y = args.volume_max.y;
                vel = Vec3::ZERO;
            }

            *pos4 = pos.extend(1.0);
            fields.velocities[i] = vel.extend(0.0);
            fields.prev_velocities[i] = vel.extend(0.0);
        }
        Ok(())
    }
}

/// Soft penalty keeping particles inside the boundary box: stiffness on
/// the penetration depth past the wall margin, damping on the approach
/// velocity. With the drain active, the floor opens inside the hole
/// radius around the bottom-center axis.
fn boundary_accel(pos: Vec3, vel: Vec3, params: &FluidParams, args: &StepArgs) -> Vec3 {
    let margin = params.smooth_radius;
    let ss = params.sim_scale;
    let mut accel = Vec3::ZERO;

    let mut wall = |dist: f32, norm: Vec3| {
        let diff = margin - dist * ss;
        if diff > 0.0 {
            accel += (params.ext_stiffness * diff - params.ext_damping * norm.dot(vel)) * norm;
        }
    };

    wall(pos.x - args.volume_min.x, Vec3::X);
    wall(args.volume_max.x - pos.x, Vec3::NEG_X);
    wall(args.volume_max.y - pos.y, Vec3::NEG_Y);
    wall(pos.z - args.volume_min.z, Vec3::Z);
    wall(args.volume_max.z - pos.z, Vec3::NEG_Z);

    let in_hole = args.effects.contains(EffectFlags::DRAIN)
        && pos.x * pos.x + pos.z * pos.z < EFFECT_RADIUS * EFFECT_RADIUS;
    if !in_hole {
        wall(pos.y - args.volume_min.y, Vec3::Y);
    }

    accel
}

fn effect_accel(pos: Vec3, args: &StepArgs) -> Vec3 {
    let mut accel = Vec3::ZERO;
    let axial2 = pos.x * pos.x + pos.z * pos.z;
    let in_column = axial2 < EFFECT_RADIUS * EFFECT_RADIUS;

    if args.effects.contains(EffectFlags::DRAIN) && in_column {
        accel.y -= DRAIN_PULL;
    } else if args.effects.contains(EffectFlags::DRAIN) {
        // gentle pull toward the hole axis so the box keeps draining
        let axial = Vec3::new(pos.x, 0.0, pos.z);
        accel -= axial.normalize_or_zero() * (DRAIN_PULL * 0.25);
    }

    if args.effects.contains(EffectFlags::FOUNTAIN)
        && in_column
        && pos.y < args.volume_min.y + FOUNTAIN_HEIGHT
    {
        accel.y += FOUNTAIN_ACCEL;
    }

    if args.effects.contains(EffectFlags::WAVE) {
        accel.x += WAVE_ACCEL * (args.time * WAVE_FREQ).sin();
    }

    accel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcg_sequences_are_deterministic_per_seed() {
        let mut a = particle_seed(42, 7);
        let mut b = particle_seed(42, 7);
        for _ in 0..16 {
            assert_eq!(rand01(&mut a).to_bits(), rand01(&mut b).to_bits());
        }
        let mut c = particle_seed(43, 7);
        assert_ne!(rand01(&mut a).to_bits(), rand01(&mut c).to_bits());
    }

    #[test]
    fn rand01_stays_in_unit_interval() {
        let mut state = particle_seed(1, 0);
        for _ in 0..1000 {
            let x = rand01(&mut state);
            assert!((0.0..=1.0).contains(&x));
        }
    }
}
