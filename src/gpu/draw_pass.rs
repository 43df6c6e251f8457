use bevy::core_pipeline::core_3d::graph::{Core3d, Node3d};
use bevy::prelude::*;
use bevy::render::render_graph::{
    NodeRunError, RenderGraphApp, RenderGraphContext, RenderLabel, ViewNode, ViewNodeRunner,
};
use bevy::render::renderer::RenderContext;
use bevy::render::view::ViewTarget;

use crate::gpu::buffers::ExtractedFluidBuffers;
use crate::gpu::draw_buffers::{DrawBindGroup, QuadVertexBuffer};
use crate::gpu::draw_pipeline::DrawPipeline;

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct ParticlesDrawPassLabel;

/// Instanced billboard draw over the shared position buffer. Runs after
/// the main pass of the camera's view; by then the compute node has
/// already been recorded, so positions are this frame's.
#[derive(Default)]
pub struct ParticlesDrawNode;

impl ViewNode for ParticlesDrawNode {
    type ViewQuery = (&'static ViewTarget,);

    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        rcx: &mut RenderContext,
        (view_target,): <Self::ViewQuery as bevy::ecs::query::QueryData>::Item<'_>,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let Some(dp) = world.get_resource::<DrawPipeline>() else {
            return Ok(());
        };
        let cache = world.resource::<bevy::render::render_resource::PipelineCache>();
        let Some(pipeline) = cache.get_render_pipeline(dp.0) else {
            return Ok(());
        };

        let Some(bg) = world.get_resource::<DrawBindGroup>() else {
            return Ok(());
        };
        let Some(vb) = world.get_resource::<QuadVertexBuffer>() else {
            return Ok(());
        };
        let Some(particles) = world.get_resource::<ExtractedFluidBuffers>() else {
            return Ok(());
        };
        if particles.num_particles == 0 {
            return Ok(());
        }

        let mut pass =
            rcx.begin_tracked_render_pass(bevy::render::render_resource::RenderPassDescriptor {
                label: Some("ParticlesDrawPass"),
                color_attachments: &[Some(view_target.get_color_attachment())],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        pass.set_render_pipeline(pipeline);
        pass.set_bind_group(0, &bg.0, &[]);
        pass.set_vertex_buffer(0, vb.buffer.slice(..));
        pass.draw(0..6, 0..particles.num_particles);
        Ok(())
    }
}

pub fn add_draw_node_to_graph(render_app: &mut bevy::app::SubApp) {
    render_app
        .add_render_graph_node::<ViewNodeRunner<ParticlesDrawNode>>(Core3d, ParticlesDrawPassLabel)
        .add_render_graph_edges(
            Core3d,
            (
                Node3d::MainTransparentPass,
                ParticlesDrawPassLabel,
                Node3d::EndMainPass,
            ),
        );
}
