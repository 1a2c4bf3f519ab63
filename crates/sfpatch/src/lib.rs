//! # sfpatch
//!
//! Runtime patching for plugins loaded into a running host process.
//!
//! This crate provides:
//! - Build-time offset to runtime address resolution against the host image
//! - Verified, all-or-nothing writes into the current process
//! - Preload / PostLoad / DelayLoad lifecycle sequencing
//! - The SFSE plugin loader ABI records
//!
//! Patch content itself is supplied by the integrator, usually as a
//! [`Patch`] table wrapped in a [`PatchSet`].

pub mod abi;
pub mod address;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod patch;
pub mod prelude;

pub use address::{AbsoluteAddress, HostImage, RelativeOffset};
pub use config::{LifecycleConfig, LifecycleConfigBuilder};
pub use error::{Error, Result};
pub use lifecycle::{
    CancellationToken, DelayTimer, Lifecycle, LifecycleHandlers, MessageBus, MessageOutcome,
    Phase, ScheduledTask, SystemTimer,
};
pub use memory::{CurrentProcess, MemoryPatcher, MemoryRegion, ProcessMemory};
pub use patch::{Patch, PatchSet, PhaseReport};
