use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferDescriptor, BufferUsages, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::{Extract, ExtractSchedule, Render, RenderApp, RenderSet};

use crate::gpu::draw_buffers::{
    extract_draw_params_buffer, init_draw_bgl, init_draw_params, init_quad_vb, prepare_draw_bg,
    update_draw_params,
};
use crate::gpu::draw_pass::add_draw_node_to_graph;
use crate::gpu::draw_pipeline::prepare_draw_pipeline;
use crate::gpu::ffi::SimParams;
use crate::gpu::pipeline::{
    SphDispatchState, add_sph_node_to_graph, prepare_sph_pipelines, track_reset_epoch,
};
use crate::system::{ParticleSystem, Simulation};

// ==================== resources ======================================

/// Run the kernel stages on the GPU instead of the CPU backend. Off by
/// default; the CPU backend stays authoritative for tests.
#[derive(Resource, Clone, Copy, Default)]
pub struct UseGpuCompute(pub bool);

/// Bumped by the app whenever a device-side reset should run; the compute
/// node re-dispatches the reset stage when the epoch changes.
#[derive(Resource, Clone, Copy, Default)]
pub struct GpuResetEpoch {
    pub epoch: u32,
    pub seed: u32,
}

#[derive(Resource, Clone)]
pub struct SphBindGroupLayout(pub BindGroupLayout);

/// Device-side column store. The position buffer is the only one the draw
/// pipeline also binds; the rest stay private to the compute stages.
#[derive(Resource)]
pub struct FluidGpuBuffers {
    pub positions: Buffer,
    pub velocities: Buffer,
    pub prev_velocities: Buffer,
    pub densities: Buffer,
    pub pressures: Buffer,
    pub forces: Buffer,
    pub sim_params: Buffer,
    pub num_particles: u32,
}

// Rendering world copies
#[derive(Resource, Clone, ExtractResource)]
pub struct ExtractedFluidBuffers {
    pub positions: Buffer,
    pub velocities: Buffer,
    pub prev_velocities: Buffer,
    pub densities: Buffer,
    pub pressures: Buffer,
    pub forces: Buffer,
    pub sim_params: Buffer,
    pub num_particles: u32,
}

/// Per-frame dispatch control snapshot taken from the driver state.
#[derive(Resource, Clone, Copy, Default)]
pub struct GpuDispatch {
    pub run: bool,
    pub reset_epoch: u32,
    pub num_particles: u32,
}

#[derive(Resource)]
pub struct SphBindGroup(pub BindGroup);

// ========================== systems ==================================

// Startup systems that have to run only once

fn init_sph_bind_group_layout(mut commands: Commands, render_device: Res<RenderDevice>) {
    let storage_entry = |binding: u32| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    let layout = render_device.create_bind_group_layout(
        Some("sph_bind_group_layout"),
        &[
            storage_entry(0), // positions
            storage_entry(1), // velocities
            storage_entry(2), // prev velocities
            storage_entry(3), // densities
            storage_entry(4), // pressures
            storage_entry(5), // forces
            BindGroupLayoutEntry {
                binding: 6,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    );
    commands.insert_resource(SphBindGroupLayout(layout));
}

// Update systems that have to run per frame

/// (Re)allocates the device buffers whenever the particle count changes.
/// A reset is the only way the count changes, so this doubles as the
/// GPU-side `allocate`.
fn prepare_gpu_buffers(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    sim: Res<Simulation>,
    existing: Option<Res<FluidGpuBuffers>>,
) {
    let count = sim.len() as u32;
    if count == 0 {
        return;
    }
    if let Some(existing) = &existing {
        if existing.num_particles == count {
            return;
        }
    }
    commands.insert_resource(FluidGpuBuffers::allocate(&render_device, count));
}

/// Uploads the render-side position snapshot whenever the channel has
/// published a new frame. Skipped while the GPU backend integrates in
/// place.
fn queue_particle_positions(
    sim: Res<Simulation>,
    buffers: Option<Res<FluidGpuBuffers>>,
    use_gpu: Res<UseGpuCompute>,
    render_queue: Res<RenderQueue>,
    mut last_frame: Local<u64>,
) {
    let Some(buffers) = buffers else {
        return;
    };
    if use_gpu.0 || sim.frame() == *last_frame {
        return;
    }
    *last_frame = sim.frame();

    let positions = sim.positions();
    if positions.len() as u32 != buffers.num_particles {
        return; // buffers lag one frame behind a reset
    }
    let raw: Vec<[f32; 4]> = positions.iter().map(|p| p.to_array()).collect();
    render_queue.write_buffer(&buffers.positions, 0, bytemuck::cast_slice(&raw));
}

/// Rewrites the kernel-argument uniform from the driver state. The
/// time-varying fields (time, effect flags, seed) change every frame; the
/// rest are fixed per reset but cheap enough to rewrite together.
fn queue_sim_params(
    sim: Res<Simulation>,
    buffers: Option<Res<FluidGpuBuffers>>,
    reset_epoch: Res<GpuResetEpoch>,
    render_queue: Res<RenderQueue>,
) {
    let Some(buffers) = buffers else {
        return;
    };
    let Simulation::Fluid(fluid) = &*sim else {
        return;
    };
    let p = fluid.params();
    let value = SimParams {
        volume_min: p.volume_min.extend(1.0).to_array(),
        volume_max: p.volume_max.extend(1.0).to_array(),
        gravity: p.gravity.extend(0.0).to_array(),
        sim_scale: p.sim_scale,
        smooth_radius: p.smooth_radius,
        radius2: p.radius2,
        mass: p.mass,
        rest_density: p.rest_density,
        stiffness: p.stiffness,
        viscosity: p.viscosity,
        poly6_coeff: p.poly6_coeff,
        spiky_coeff: p.spiky_coeff,
        visc_lap_coeff: p.visc_lap_coeff,
        ext_stiffness: p.ext_stiffness,
        ext_damping: p.ext_damping,
        speed_limit: p.speed_limit,
        dt: p.time_step,
        time: fluid.time(),
        effect_flags: fluid.effects().bits(),
        num_particles: buffers.num_particles,
        seed: reset_epoch.seed,
        _pad: [0; 2],
    };
    render_queue.write_buffer(&buffers.sim_params, 0, bytemuck::bytes_of(&value));
}

// Extract systems that send from App to Render

fn extract_fluid_buffers(mut commands: Commands, buffers: Extract<Option<Res<FluidGpuBuffers>>>) {
    let Some(buffers) = buffers.as_ref() else {
        return;
    };
    commands.insert_resource(ExtractedFluidBuffers {
        positions: buffers.positions.clone(),
        velocities: buffers.velocities.clone(),
        prev_velocities: buffers.prev_velocities.clone(),
        densities: buffers.densities.clone(),
        pressures: buffers.pressures.clone(),
        forces: buffers.forces.clone(),
        sim_params: buffers.sim_params.clone(),
        num_particles: buffers.num_particles,
    });
}

fn extract_bind_group_layout(mut commands: Commands, layout: Extract<Res<SphBindGroupLayout>>) {
    commands.insert_resource(SphBindGroupLayout(layout.0.clone()));
}

fn extract_gpu_dispatch(
    mut commands: Commands,
    use_gpu: Extract<Res<UseGpuCompute>>,
    sim: Extract<Res<Simulation>>,
    reset_epoch: Extract<Res<GpuResetEpoch>>,
    buffers: Extract<Option<Res<FluidGpuBuffers>>>,
) {
    let run = use_gpu.0
        && buffers.is_some()
        && matches!(&**sim, Simulation::Fluid(f) if !f.is_paused() && f.len() > 0);
    commands.insert_resource(GpuDispatch {
        run,
        reset_epoch: reset_epoch.epoch,
        num_particles: sim.len() as u32,
    });
}

// Prepare systems that run in Render

fn prepare_sph_bind_group(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layout: Option<Res<SphBindGroupLayout>>,
    extracted: Option<Res<ExtractedFluidBuffers>>,
) {
    let (Some(layout), Some(extracted)) = (layout, extracted) else {
        return;
    };
    fn entry(binding: u32, buffer: &Buffer) -> BindGroupEntry<'_> {
        BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        }
    }
    let bind_group = render_device.create_bind_group(
        Some("sph_bind_group"),
        &layout.0,
        &[
            entry(0, &extracted.positions),
            entry(1, &extracted.velocities),
            entry(2, &extracted.prev_velocities),
            entry(3, &extracted.densities),
            entry(4, &extracted.pressures),
            entry(5, &extracted.forces),
            entry(6, &extracted.sim_params),
        ],
    );
    commands.insert_resource(SphBindGroup(bind_group));
}

// Implementations

impl FluidGpuBuffers {
    pub fn allocate(render_device: &RenderDevice, count: u32) -> Self {
        let vec4_size = (count as u64).max(1) * 16;
        let scalar_size = (count as u64).max(1) * 4;
        let storage = |label: &str, size: u64| {
            render_device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let sim_params = render_device.create_buffer(&BufferDescriptor {
            label: Some("sph_sim_params"),
            size: std::mem::size_of::<SimParams>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            positions: storage("particle_positions", vec4_size),
            velocities: storage("particle_velocities", vec4_size),
            prev_velocities: storage("particle_prev_velocities", vec4_size),
            densities: storage("particle_densities", scalar_size),
            pressures: storage("particle_pressures", scalar_size),
            forces: storage("particle_forces", vec4_size),
            sim_params,
            num_particles: count,
        }
    }

    /// The one buffer visible to both the compute and render domains.
    pub fn positions_handle(&self) -> &Buffer {
        &self.positions
    }
}

// =====================================================================

// Plugin

pub struct GpuFluidPlugin;

impl Plugin for GpuFluidPlugin {
    fn build(&self, app: &mut App) {
        // App
        app.init_resource::<UseGpuCompute>()
            .init_resource::<GpuResetEpoch>()
            .add_systems(
                Startup,
                (
                    init_sph_bind_group_layout,
                    init_draw_bgl,
                    init_quad_vb,
                    init_draw_params,
                ),
            )
            .add_systems(
                Update,
                (
                    prepare_gpu_buffers,
                    queue_particle_positions.after(prepare_gpu_buffers),
                    queue_sim_params.after(prepare_gpu_buffers),
                    update_draw_params,
                ),
            );

        // Render
        let render_app = app.sub_app_mut(RenderApp);
        render_app
            .init_resource::<SphDispatchState>()
            .add_systems(
                ExtractSchedule,
                (
                    extract_fluid_buffers,
                    extract_bind_group_layout,
                    extract_gpu_dispatch,
                    extract_draw_params_buffer,
                ),
            )
            .add_systems(
                Render,
                (
                    prepare_sph_bind_group.in_set(RenderSet::Prepare),
                    prepare_sph_pipelines.in_set(RenderSet::Prepare),
                    track_reset_epoch.in_set(RenderSet::Prepare),
                    prepare_draw_bg.in_set(RenderSet::Prepare),
                    prepare_draw_pipeline.in_set(RenderSet::Prepare),
                ),
            );

        add_sph_node_to_graph(render_app);
        add_draw_node_to_graph(render_app);
    }
}
