//! Exclusive handoff of the render-visible position buffer between the
//! compute and render domains.
//!
//! The channel keeps two copies of the position array. Kernel stages write
//! the compute-side copy through a scoped [`ComputeScope`]; when the scope
//! is dropped (every exit path) the contents are published to the
//! render-side copy and the frame counter advances. The renderer only ever
//! reads the render side, re-fetching it each frame, so the two domains
//! never observe a half-written buffer.

use glam::Vec4;

use crate::SimError;

#[derive(Debug, Default)]
pub struct PositionChannel {
    compute: Vec<Vec4>,
    render: Vec<Vec4>,
    frame: u64,
}

impl PositionChannel {
    /// (Re)allocates both sides for `count` particles, invalidating prior
    /// contents. Surfaces allocation failure instead of aborting so a
    /// failed reset can leave the previous state in place.
    pub fn allocate(count: usize) -> Result<Self, SimError> {
        let mut compute = Vec::new();
        let mut render = Vec::new();
        compute
            .try_reserve_exact(count)
            .and_then(|_| render.try_reserve_exact(count))
            .map_err(|_| SimError::Allocation { count })?;
        compute.resize(count, Vec4::ZERO);
        render.resize(count, Vec4::ZERO);
        Ok(Self {
            compute,
            render,
            frame: 0,
        })
    }

    /// Acquires exclusive compute access for one frame. Fails if the
    /// channel was never allocated; the caller must then skip every kernel
    /// dispatch for the frame.
    pub fn acquire(&mut self) -> Result<ComputeScope<'_>, SimError> {
        if self.compute.is_empty() {
            return Err(SimError::NotAllocated);
        }
        Ok(ComputeScope { chan: self })
    }

    /// The render-side snapshot, valid until the next scope release.
    pub fn render_side(&self) -> &[Vec4] {
        &self.render
    }

    /// Monotonic count of published compute scopes. The upload path uses
    /// it to skip frames where nothing was released.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.compute.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compute.is_empty()
    }
}

/// Scoped compute access to the shared position buffer. Dropping the scope
/// releases the buffer back to the render domain.
pub struct ComputeScope<'a> {
    chan: &'a mut PositionChannel,
}

impl ComputeScope<'_> {
    pub fn positions(&self) -> &[Vec4] {
        &self.chan.compute
    }

    pub fn positions_mut(&mut self) -> &mut [Vec4] {
        &mut self.chan.compute
    }
}

impl Drop for ComputeScope<'_> {
    fn drop(&mut self) {
        let (compute, render) = (&self.chan.compute, &mut self.chan.render);
        render.copy_from_slice(compute);
        self.chan.frame += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_on_unallocated_channel_fails() {
        let mut chan = PositionChannel::default();
        assert!(matches!(chan.acquire(), Err(SimError::NotAllocated)));
        assert_eq!(chan.frame(), 0);
    }

    #[test]
    fn render_side_unchanged_until_release() {
        let mut chan = PositionChannel::allocate(3).unwrap();
        {
            let mut scope = chan.acquire().unwrap();
            scope.positions_mut()[1] = Vec4::new(1.0, 2.0, 3.0, 1.0);
            // still inside the scope: nothing published yet
            assert_eq!(scope.chan.render[1], Vec4::ZERO);
        }
        assert_eq!(chan.render_side()[1], Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(chan.frame(), 1);
    }

    #[test]
    fn early_exit_still_releases() {
        let mut chan = PositionChannel::allocate(2).unwrap();
        let run = |chan: &mut PositionChannel, fail: bool| -> Result<(), SimError> {
            let mut scope = chan.acquire()?;
            scope.positions_mut()[0] = Vec4::splat(7.0);
            if fail {
                return Err(SimError::Dispatch {
                    stage: "force",
                    reason: "synthetic".into(),
                });
            }
            Ok(())
        };
        assert!(run(&mut chan, true).is_err());
        // the `?`/early-return path must still have published
        assert_eq!(chan.frame(), 1);
        assert_eq!(chan.render_side()[0], Vec4::splat(7.0));
    }
}
