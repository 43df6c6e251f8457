use std::borrow::Cow;

use bevy::prelude::*;
use bevy::render::graph::CameraDriverLabel;
use bevy::render::render_graph::{
    Node, NodeRunError, RenderGraph, RenderGraphContext, RenderLabel,
};
use bevy::render::render_resource::{
    CachedComputePipelineId, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    PipelineCache, PushConstantRange, ShaderDefVal,
};
use bevy::render::renderer::RenderContext;

use crate::gpu::buffers::{GpuDispatch, SphBindGroup, SphBindGroupLayout};

const WORKGROUP_SIZE: u32 = 256;

/// The four kernel stages, compiled from one WGSL source. Dispatch order
/// is fixed: reset runs only on an epoch change, then every frame
/// pressure -> force -> integrate on the same in-order queue.
#[derive(Resource)]
pub struct SphPipelines {
    pub reset: ComputePipeline,
    pub pressure: ComputePipeline,
    pub force: ComputePipeline,
    pub integrate: ComputePipeline,
}

/// Tracks the last-seen reset epoch so the node knows when to run the
/// reset stage ahead of the frame's stages.
#[derive(Resource, Default)]
pub struct SphDispatchState {
    pub last_reset_epoch: u32,
    pub do_reset: bool,
}

pub fn track_reset_epoch(mut state: ResMut<SphDispatchState>, dispatch: Option<Res<GpuDispatch>>) {
    let Some(dispatch) = dispatch else {
        return;
    };
    state.do_reset = dispatch.reset_epoch != state.last_reset_epoch;
    state.last_reset_epoch = dispatch.reset_epoch;
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct SphComputePassLabel;

#[derive(Default)]
struct SphComputeNode;

impl Node for SphComputeNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let Some(pipelines) = world.get_resource::<SphPipelines>() else {
            return Ok(());
        };
        let Some(bind_group) = world.get_resource::<SphBindGroup>() else {
            return Ok(());
        };
        let Some(dispatch) = world.get_resource::<GpuDispatch>() else {
            return Ok(());
        };
        let Some(state) = world.get_resource::<SphDispatchState>() else {
            return Ok(());
        };
        if dispatch.num_particles == 0 {
            return Ok(());
        }

        let workgroups = dispatch.num_particles.div_ceil(WORKGROUP_SIZE);

        let mut pass = render_context
            .command_encoder()
            .begin_compute_pass(&ComputePassDescriptor::default());
        pass.set_bind_group(0, &bind_group.0, &[]);

        if state.do_reset {
            pass.set_pipeline(&pipelines.reset);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        if dispatch.run {
            // strict stage order; the in-order queue makes each stage's
            // writes visible to the next without host-side barriers
            pass.set_pipeline(&pipelines.pressure);
            pass.dispatch_workgroups(workgroups, 1, 1);
            pass.set_pipeline(&pipelines.force);
            pass.dispatch_workgroups(workgroups, 1, 1);
            pass.set_pipeline(&pipelines.integrate);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        Ok(())
    }
}

pub fn prepare_sph_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    layout: Option<Res<SphBindGroupLayout>>,
    mut pipeline_ids: Local<Option<[CachedComputePipelineId; 4]>>,
    assets: Res<AssetServer>,
) {
    let Some(layout) = layout else {
        return;
    };

    if pipeline_ids.is_none() {
        let shader: Handle<Shader> = assets.load("shaders/sph_compute.wgsl");
        let queue = |entry: &'static str| {
            pipeline_cache.queue_compute_pipeline(ComputePipelineDescriptor {
                label: Some(format!("sph_{entry}_pipeline").into()),
                layout: vec![layout.0.clone()],
                push_constant_ranges: Vec::<PushConstantRange>::new(),
                shader: shader.clone(),
                shader_defs: Vec::<ShaderDefVal>::new(),
                entry_point: Cow::from(entry),
                zero_initialize_workgroup_memory: false,
            })
        };
        *pipeline_ids = Some([
            queue("reset"),
            queue("compute_pressure"),
            queue("compute_force"),
            queue("integrate"),
        ]);
        return; // waits for compilation
    }

    if let Some([reset, pressure, force, integrate]) = *pipeline_ids {
        let get = |id| pipeline_cache.get_compute_pipeline(id).cloned();
        if let (Some(reset), Some(pressure), Some(force), Some(integrate)) =
            (get(reset), get(pressure), get(force), get(integrate))
        {
            commands.insert_resource(SphPipelines {
                reset,
                pressure,
                force,
                integrate,
            });
        }
    }
}

pub fn add_sph_node_to_graph(render_app: &mut bevy::app::SubApp) {
    let mut graph = render_app.world_mut().resource_mut::<RenderGraph>();
    graph.add_node(SphComputePassLabel, SphComputeNode::default());
    graph.add_node_edge(SphComputePassLabel, CameraDriverLabel);
}
