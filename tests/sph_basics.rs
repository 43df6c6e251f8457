use fluidsim::cpu::sph3d::{CpuKernels, ParticleStore, SphKernels, w_poly6};
use fluidsim::params::{FluidConfig, FluidParams};
use glam::Vec4;

fn params() -> FluidParams {
    FluidParams::default()
}

/// Physical separation -> simulation-unit coordinate along one axis.
fn sim_units(physical: f32, p: &FluidParams) -> f32 {
    physical / p.sim_scale
}

#[test]
fn poly6_support_cutoff_is_strict() {
    let p = params();
    let h = p.smooth_radius;

    // exactly at the support boundary: excluded
    assert_eq!(w_poly6(h * h, p.radius2, p.poly6_coeff), 0.0);
    // beyond the boundary: zero
    assert_eq!(w_poly6(h * h * 1.21, p.radius2, p.poly6_coeff), 0.0);

    // at half the radius: positive and equal to the closed form
    let r2 = (0.5 * h) * (0.5 * h);
    let w = w_poly6(r2, p.radius2, p.poly6_coeff);
    let expected = p.poly6_coeff * (p.radius2 - r2).powi(3);
    assert!(w > 0.0);
    assert!((w - expected).abs() <= expected * 1e-6);
}

#[test]
fn density_pair_contribution_matches_poly6() {
    let p = params();
    let mut kernels = CpuKernels;

    // one isolated particle: self contribution only
    let mut single = ParticleStore::allocate(1).unwrap();
    {
        let mut scope = single.positions.acquire().unwrap();
        scope.positions_mut()[0] = Vec4::new(0.0, 0.0, 0.0, 1.0);
        kernels
            .compute_pressure(scope.positions(), &mut single.fields, &p)
            .unwrap();
    }
    let rho_self = single.fields.densities[0];
    let expected_self = p.mass * p.poly6_coeff * p.radius2.powi(3);
    assert!((rho_self - expected_self).abs() <= expected_self * 1e-5);

    // a pair at half the smoothing radius: self plus one cross term
    let sep = sim_units(0.5 * p.smooth_radius, &p);
    let mut pair = ParticleStore::allocate(2).unwrap();
    {
        let mut scope = pair.positions.acquire().unwrap();
        scope.positions_mut()[0] = Vec4::new(0.0, 0.0, 0.0, 1.0);
        scope.positions_mut()[1] = Vec4::new(sep, 0.0, 0.0, 1.0);
        kernels
            .compute_pressure(scope.positions(), &mut pair.fields, &p)
            .unwrap();
    }
    let r2 = (0.5 * p.smooth_radius).powi(2);
    let expected_cross = p.mass * p.poly6_coeff * (p.radius2 - r2).powi(3);
    let cross = pair.fields.densities[0] - rho_self;
    assert!(cross > 0.0);
    assert!((cross - expected_cross).abs() <= expected_cross * 1e-4);
}

#[test]
fn density_pair_at_exact_radius_contributes_nothing() {
    let p = params();
    let mut kernels = CpuKernels;

    let mut store = ParticleStore::allocate(2).unwrap();
    let sep = sim_units(p.smooth_radius, &p);
    {
        let mut scope = store.positions.acquire().unwrap();
        scope.positions_mut()[0] = Vec4::new(0.0, 0.0, 0.0, 1.0);
        scope.positions_mut()[1] = Vec4::new(sep, 0.0, 0.0, 1.0);
        kernels
            .compute_pressure(scope.positions(), &mut store.fields, &p)
            .unwrap();
    }
    let expected_self = p.mass * p.poly6_coeff * p.radius2.powi(3);
    for &rho in &store.fields.densities {
        assert!((rho - expected_self).abs() <= expected_self * 1e-5);
    }
}

#[test]
fn equation_of_state_clamps_negative_pressure() {
    let p = params();
    let mut kernels = CpuKernels;

    // a lone particle is far below rest density, so pressure clamps to 0
    let mut store = ParticleStore::allocate(1).unwrap();
    {
        let mut scope = store.positions.acquire().unwrap();
        scope.positions_mut()[0] = Vec4::ZERO.with_w(1.0);
        kernels
            .compute_pressure(scope.positions(), &mut store.fields, &p)
            .unwrap();
    }
    assert!(store.fields.densities[0] < p.rest_density);
    assert_eq!(store.fields.pressures[0], 0.0);
}

#[test]
fn pair_forces_are_symmetric_finite_and_self_free() {
    // zero rest density so the pair actually develops pressure
    let cfg = FluidConfig {
        rest_density: 0.0,
        ..FluidConfig::default()
    };
    let p = FluidParams::derive(&cfg);
    let mut kernels = CpuKernels;

    let sep = sim_units(0.5 * p.smooth_radius, &p);
    let mut store = ParticleStore::allocate(2).unwrap();
    {
        let mut scope = store.positions.acquire().unwrap();
        scope.positions_mut()[0] = Vec4::new(0.0, 0.0, 0.0, 1.0);
        scope.positions_mut()[1] = Vec4::new(sep, 0.0, 0.0, 1.0);
        kernels
            .compute_pressure(scope.positions(), &mut store.fields, &p)
            .unwrap();
        kernels
            .compute_force(scope.positions(), &mut store.fields, &p)
            .unwrap();
    }

    let f0 = store.fields.forces[0];
    let f1 = store.fields.forces[1];
    assert!(f0.is_finite() && f1.is_finite());
    // repulsion along the pair axis, equal and opposite
    assert!(f0.x < 0.0);
    assert!(f1.x > 0.0);
    assert!((f0.x + f1.x).abs() <= f1.x.abs() * 1e-4);
    assert_eq!(f0.y, 0.0);
    assert_eq!(f0.z, 0.0);
}
