//! The patch table this plugin applies.
//!
//! Offsets are relative to the game executable's image base for the
//! runtime listed in `SFSEPlugin_Version`. Add entries here; each one is
//! written in its phase and reported in the log.

use sfpatch::{CurrentProcess, HostImage, Patch, PatchSet};

pub const PATCHES: &[Patch] = &[];

/// Patch set over the running game's image
pub fn patch_set(memory: CurrentProcess) -> PatchSet<CurrentProcess> {
    PatchSet::new(HostImage::current(), memory).with_patches(PATCHES)
}
