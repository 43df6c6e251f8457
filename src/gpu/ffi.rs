use bytemuck::{Pod, Zeroable};

/// Uniform block mirrored by `SimParams` in `sph_compute.wgsl`. Plain
/// arrays instead of glam types to pin the WGSL-compatible layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SimParams {
    pub volume_min: [f32; 4],
    pub volume_max: [f32; 4],
    pub gravity: [f32; 4],

    pub sim_scale: f32,
    pub smooth_radius: f32,
    pub radius2: f32,
    pub mass: f32,

    pub rest_density: f32,
    pub stiffness: f32,
    pub viscosity: f32,
    pub poly6_coeff: f32,

    pub spiky_coeff: f32,
    pub visc_lap_coeff: f32,
    pub ext_stiffness: f32,
    pub ext_damping: f32,

    pub speed_limit: f32,
    pub dt: f32,
    pub time: f32,
    pub effect_flags: u32,

    pub num_particles: u32,
    pub seed: u32,
    pub _pad: [u32; 2],
}

/// Uniform block for the instanced billboard draw, mirrored by
/// `DrawParams` in `particles_draw.wgsl`. View and projection are carried
/// separately so the vertex stage can billboard in view space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DrawParams {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub particle_size: f32,
    pub _pad: [f32; 3],
    pub color: [f32; 4],
}
