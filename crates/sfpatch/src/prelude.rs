//! Prelude module for convenient imports
//!
//! ```ignore
//! use sfpatch::prelude::*;
//! ```
//!
//! Brings in the addressing types, the patcher, the lifecycle controller
//! and the patch table.

pub use crate::address::{AbsoluteAddress, HostImage, RelativeOffset};
pub use crate::config::LifecycleConfig;
pub use crate::error::{Error, Result};
pub use crate::lifecycle::{Lifecycle, LifecycleHandlers, MessageOutcome, Phase};
pub use crate::memory::{CurrentProcess, MemoryPatcher, ProcessMemory};
pub use crate::patch::{Patch, PatchSet};
