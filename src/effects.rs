// transient effect flags and their tuning constants
use bitflags::bitflags;

bitflags! {
    /// Transient modifiers applied by the integrate stage. Drain and
    /// fountain are mutually exclusive (the driver enforces it); wave is
    /// orthogonal and self-expiring.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EffectFlags: u32 {
        const DRAIN    = 1 << 0;
        const FOUNTAIN = 1 << 1;
        const WAVE     = 1 << 2;
    }
}

/// Steps after which an emitted wave clears itself, in units of the
/// driver's time step.
pub const WAVE_LIFETIME_STEPS: f32 = 50.0;

/// Radius (simulation units) of the drain hole / fountain column around
/// the bottom-center axis of the boundary box.
pub const EFFECT_RADIUS: f32 = 3.0;

/// Downward suction inside the drain hole, physical acceleration.
pub const DRAIN_PULL: f32 = 60.0;

/// Particles falling this far below the box floor recirculate to the top.
pub const DRAIN_DEPTH: f32 = 5.0;

/// Upward jet acceleration inside the fountain column.
pub const FOUNTAIN_ACCEL: f32 = 90.0;

/// Height (simulation units) above the floor the fountain jet acts in.
pub const FOUNTAIN_HEIGHT: f32 = 4.0;

/// Lateral wave push amplitude and angular frequency (per step).
pub const WAVE_ACCEL: f32 = 25.0;
pub const WAVE_FREQ: f32 = 0.25;
