//! Declarative patch tables.
//!
//! A [`Patch`] names a location in the host image, the bytes to put there
//! and the phase in which to do it. A [`PatchSet`] applies them as a
//! [`LifecycleHandlers`] implementation. Every patch scheduled for
//! DelayLoad runs on the single delay-load worker, in table order.

use tracing::{info, warn};

use crate::address::{HostImage, RelativeOffset};
use crate::error::Error;
use crate::lifecycle::{LifecycleHandlers, Phase};
use crate::memory::{MemoryPatcher, ProcessMemory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub name: &'static str,
    pub phase: Phase,
    pub offset: RelativeOffset,
    pub bytes: &'static [u8],
}

impl Patch {
    pub const fn new(
        name: &'static str,
        phase: Phase,
        offset: usize,
        bytes: &'static [u8],
    ) -> Self {
        Self {
            name,
            phase,
            offset: RelativeOffset::new(offset),
            bytes,
        }
    }
}

/// Outcome of applying one phase's patches
#[derive(Debug)]
pub struct PhaseReport {
    pub phase: Phase,
    pub applied: Vec<&'static str>,
    pub failed: Vec<(&'static str, Error)>,
}

impl PhaseReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            applied: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.applied.len() + self.failed.len()
    }
}

/// A host image, a patcher and the patches to apply to it
#[derive(Debug)]
pub struct PatchSet<M> {
    image: HostImage,
    patcher: MemoryPatcher<M>,
    patches: Vec<Patch>,
}

impl<M: ProcessMemory> PatchSet<M> {
    pub fn new(image: HostImage, memory: M) -> Self {
        Self {
            image,
            patcher: MemoryPatcher::new(memory),
            patches: Vec::new(),
        }
    }

    pub fn with_patches(mut self, patches: &[Patch]) -> Self {
        self.patches.extend_from_slice(patches);
        self
    }

    pub fn image(&self) -> &HostImage {
        &self.image
    }

    pub fn patcher(&self) -> &MemoryPatcher<M> {
        &self.patcher
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Apply every patch registered for `phase`, in order.
    ///
    /// A failed patch does not stop the ones after it.
    pub fn apply_phase(&self, phase: Phase) -> PhaseReport {
        let mut report = PhaseReport::new(phase);

        for patch in self.patches.iter().filter(|p| p.phase == phase) {
            let address = self.image.resolve(patch.offset);
            match self.patcher.write_bytes(address, patch.bytes) {
                Ok(()) => {
                    info!(
                        "Applied {} ({} bytes at {} = base{})",
                        patch.name,
                        patch.bytes.len(),
                        address,
                        patch.offset
                    );
                    report.applied.push(patch.name);
                }
                Err(e) => {
                    warn!("Failed to apply {}: {}", patch.name, e);
                    report.failed.push((patch.name, e));
                }
            }
        }

        if report.total() > 0 {
            info!(
                "{}: {} applied, {} failed",
                phase,
                report.applied.len(),
                report.failed.len()
            );
        }
        report
    }
}

impl<M: ProcessMemory + 'static> LifecycleHandlers for PatchSet<M> {
    fn on_preload(&self) {
        self.apply_phase(Phase::Preload);
    }

    fn on_post_load(&self) {
        self.apply_phase(Phase::PostLoad);
    }

    fn on_delay_load(&self) {
        self.apply_phase(Phase::DelayLoad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemory;

    const BASE: usize = 0x1_4000_0000;

    const PATCHES: &[Patch] = &[
        Patch::new("skip_intro", Phase::Preload, 0x10, &[0xEB, 0x05]),
        Patch::new("ret_early", Phase::Preload, 0x20, &[0xC3]),
        Patch::new("max_value", Phase::DelayLoad, 0x30, &[0xFF, 0xFF, 0xFF, 0x7F]),
        Patch::new("out_of_image", Phase::DelayLoad, 0x10_0000, &[0x90]),
        Patch::new("after_failure", Phase::DelayLoad, 0x40, &[0x01]),
    ];

    fn setup() -> PatchSet<MockMemory> {
        let memory = MockMemory::builder().base(BASE).size(0x100).build();
        PatchSet::new(HostImage::with_base(BASE), memory).with_patches(PATCHES)
    }

    #[test]
    fn test_apply_phase_only_touches_that_phase() {
        let set = setup();

        let report = set.apply_phase(Phase::Preload);
        assert!(report.is_clean());
        assert_eq!(report.applied, vec!["skip_intro", "ret_early"]);

        let memory = set.patcher().memory();
        assert_eq!(memory.snapshot(BASE + 0x10, 2), vec![0xEB, 0x05]);
        assert_eq!(memory.snapshot(BASE + 0x20, 1), vec![0xC3]);
        assert_eq!(memory.snapshot(BASE + 0x30, 4), vec![0; 4]);
    }

    #[test]
    fn test_failed_patch_does_not_stop_later_ones() {
        let set = setup();

        let report = set.apply_phase(Phase::DelayLoad);
        assert!(!report.is_clean());
        assert_eq!(report.applied, vec!["max_value", "after_failure"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "out_of_image");
        assert!(report.failed[0].1.is_write_failure());

        let memory = set.patcher().memory();
        assert_eq!(memory.snapshot(BASE + 0x40, 1), vec![0x01]);
    }

    #[test]
    fn test_phase_without_patches_is_empty() {
        let set = setup();
        let report = set.apply_phase(Phase::PostLoad);
        assert_eq!(report.total(), 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_base_captured_on_first_apply() {
        let memory = MockMemory::builder().base(BASE).size(0x100).build();
        let set = PatchSet::new(HostImage::with_source(|| BASE), memory).with_patches(PATCHES);
        assert!(!set.image().is_captured());

        set.apply_phase(Phase::Preload);
        assert!(set.image().is_captured());
    }

    #[test]
    fn test_handlers_apply_matching_phase() {
        let set = setup();

        set.on_post_load();
        assert_eq!(set.patcher().memory().write_count(), 0);

        set.on_preload();
        assert_eq!(set.patcher().memory().write_count(), 2);
    }
}
