use bevy::prelude::*;
use bevy::render::Extract;
use bevy::render::camera::CameraProjection;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferInitDescriptor, BufferUsages, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};

use crate::gpu::buffers::ExtractedFluidBuffers;
use crate::gpu::ffi::DrawParams;

// ---------------- Types ----------------

#[derive(Resource)]
pub struct DrawParamsBuffer {
    pub buffer: Buffer,
}

#[derive(Resource, Clone)]
pub struct DrawBindGroupLayout(pub BindGroupLayout);

#[derive(Resource)]
pub struct DrawBindGroup(pub BindGroup);

#[derive(Resource, Clone)]
pub struct QuadVertexBuffer {
    pub buffer: Buffer,
}

#[derive(Resource, Clone, ExtractResource)]
pub struct ExtractedDrawParamsBuffer {
    pub buffer: Buffer,
}

const QUAD_VERTS: &[[f32; 2]] = &[
    [-0.5, -0.5],
    [0.5, -0.5],
    [0.5, 0.5],
    [-0.5, -0.5],
    [0.5, 0.5],
    [-0.5, 0.5],
];

const PARTICLE_SIZE: f32 = 0.45; // world units
const PARTICLE_COLOR: [f32; 4] = [0.35, 0.55, 1.0, 1.0];

fn default_draw_params() -> DrawParams {
    DrawParams {
        view: Mat4::IDENTITY.to_cols_array_2d(),
        proj: Mat4::IDENTITY.to_cols_array_2d(),
        particle_size: PARTICLE_SIZE,
        _pad: [0.0; 3],
        color: PARTICLE_COLOR,
    }
}

// ---------------- Systems (App world) ----------------

// Create a default DrawParams UBO
pub fn init_draw_params(mut commands: Commands, rd: Res<RenderDevice>) {
    let buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("draw_params_uniform"),
        contents: bytemuck::bytes_of(&default_draw_params()),
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    });
    commands.insert_resource(DrawParamsBuffer { buffer });
}

// Make a small quad VB for instancing
pub fn init_quad_vb(mut commands: Commands, rd: Res<RenderDevice>) {
    let vb = rd.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("instanced_quad_vb"),
        contents: bytemuck::cast_slice(QUAD_VERTS),
        usage: BufferUsages::VERTEX,
    });
    commands.insert_resource(QuadVertexBuffer { buffer: vb });
}

// Layout: 0 = positions SSBO (vertex pulls instances), 1 = draw params UBO
pub fn init_draw_bgl(mut commands: Commands, rd: Res<RenderDevice>) {
    let bgl = rd.create_bind_group_layout(
        Some("draw_bgl"),
        &[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    );
    commands.insert_resource(DrawBindGroupLayout(bgl));
}

/// Refreshes the draw UBO from the camera the orbit controller moves. The
/// renderer consumes only this matrix pair plus the position buffer.
pub fn update_draw_params(
    rq: Res<RenderQueue>,
    dp: Option<Res<DrawParamsBuffer>>,
    camera: Query<(&GlobalTransform, &Projection), With<Camera3d>>,
) {
    let Some(dp) = dp else {
        return;
    };
    let Ok((transform, projection)) = camera.single() else {
        return;
    };

    let view = transform.compute_matrix().inverse();
    let proj = projection.get_clip_from_view();

    let dp_cpu = DrawParams {
        view: view.to_cols_array_2d(),
        proj: proj.to_cols_array_2d(),
        particle_size: PARTICLE_SIZE,
        _pad: [0.0; 3],
        color: PARTICLE_COLOR,
    };
    rq.write_buffer(&dp.buffer, 0, bytemuck::bytes_of(&dp_cpu));
}

// ---------------- Systems (Render world) ----------------

pub fn extract_draw_params_buffer(
    mut commands: Commands,
    dp: Extract<Option<Res<DrawParamsBuffer>>>,
    bgl: Extract<Option<Res<DrawBindGroupLayout>>>,
    quad: Extract<Option<Res<QuadVertexBuffer>>>,
) {
    if let Some(dp) = dp.as_ref() {
        commands.insert_resource(ExtractedDrawParamsBuffer {
            buffer: dp.buffer.clone(),
        });
    }
    if let Some(bgl) = bgl.as_ref() {
        commands.insert_resource(DrawBindGroupLayout(bgl.0.clone()));
    }
    if let Some(quad) = quad.as_ref() {
        commands.insert_resource(QuadVertexBuffer {
            buffer: quad.buffer.clone(),
        });
    }
}

// Create the BG: positions SSBO + draw params UBO
pub fn prepare_draw_bg(
    mut commands: Commands,
    rd: Res<RenderDevice>,
    layout: Option<Res<DrawBindGroupLayout>>,
    particles: Option<Res<ExtractedFluidBuffers>>,
    dp: Option<Res<ExtractedDrawParamsBuffer>>,
) {
    let (Some(layout), Some(particles), Some(dp)) = (layout, particles, dp) else {
        return;
    };
    let bg = rd.create_bind_group(
        Some("draw_bg"),
        &layout.0,
        &[
            BindGroupEntry {
                binding: 0,
                resource: particles.positions.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 1,
                resource: dp.buffer.as_entire_binding(),
            },
        ],
    );
    commands.insert_resource(DrawBindGroup(bg));
}
