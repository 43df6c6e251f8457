use bevy::prelude::*;
use thiserror::Error;

pub mod effects;
pub mod params;
pub mod sync;
pub mod system;

pub mod cpu {
    pub mod sph3d;
}

pub mod gpu {
    pub mod buffers;
    pub mod draw_buffers;
    pub mod draw_pass;
    pub mod draw_pipeline;
    pub mod ffi;
    pub mod pipeline;
}

/// Failures surfaced by the simulation core. Reset-time failures leave the
/// previous state untouched; per-frame failures are logged and the frame
/// renders with stale particle state.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("failed to allocate particle storage for {count} particles")]
    Allocation { count: usize },

    #[error("position channel is not allocated, reset the system first")]
    NotAllocated,

    #[error("kernel stage `{stage}` refused dispatch: {reason}")]
    Dispatch {
        stage: &'static str,
        reason: String,
    },

    #[error("failed to parse fluid config: {0}")]
    Config(#[from] toml::de::Error),
}

/// Orbit state for the view transform, driven by mouse drag. Consumed only
/// by the renderer; the simulation core never reads it.
#[derive(Resource, Debug, Copy, Clone)]
pub struct ViewOrbit {
    pub yaw: f32,   // radians around +Y
    pub pitch: f32, // radians around +X
    pub distance: f32,
}

impl Default for ViewOrbit {
    fn default() -> Self {
        Self {
            yaw: 0.78,
            pitch: 0.55,
            distance: 50.0,
        }
    }
}

/// Render-only toggle for the bounding volume wireframe.
#[derive(Resource, Debug, Copy, Clone, Default)]
pub struct ShowBounds(pub bool);
