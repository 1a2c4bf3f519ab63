//! Host image addressing.
//!
//! Patch locations are known at build time as offsets from the start of the
//! host executable. The executable itself may be mapped anywhere, so every
//! offset is turned into an absolute address through a [`HostImage`], which
//! captures the module base once, on first use.

use std::fmt;
use std::sync::OnceLock;

use tracing::debug;

use crate::memory;

/// Distance from the host module base to a location of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RelativeOffset(usize);

impl RelativeOffset {
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl From<usize> for RelativeOffset {
    fn from(offset: usize) -> Self {
        Self(offset)
    }
}

impl fmt::Display for RelativeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:#x}", self.0)
    }
}

/// Runtime address inside the current process
///
/// Only produced by [`HostImage::resolve`]; never stored across phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsoluteAddress(usize);

impl AbsoluteAddress {
    pub const fn get(self) -> usize {
        self.0
    }

    /// Address `bytes` further along
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl fmt::Display for AbsoluteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

type BaseSource = Box<dyn Fn() -> usize + Send + Sync>;

/// The host's primary executable image
///
/// The base address is queried lazily: the first call to [`HostImage::base`]
/// or [`HostImage::resolve`] runs the query, every later call reuses the
/// captured value. Concurrent first use still runs the query only once.
pub struct HostImage {
    base: OnceLock<usize>,
    source: BaseSource,
}

impl HostImage {
    /// Image of the running executable, queried from the OS on first use
    pub fn current() -> Self {
        Self::with_source(memory::main_module_base)
    }

    /// Image with an already known base
    pub fn with_base(base: usize) -> Self {
        let image = Self::with_source(move || base);
        let _ = image.base.set(base);
        image
    }

    /// Image whose base comes from a custom query
    pub fn with_source<F>(source: F) -> Self
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        Self {
            base: OnceLock::new(),
            source: Box::new(source),
        }
    }

    /// Module base, capturing it if this is the first use
    pub fn base(&self) -> usize {
        *self.base.get_or_init(|| {
            let base = (self.source)();
            debug!("Captured host module base {:#x}", base);
            base
        })
    }

    /// Whether the base has been captured yet
    pub fn is_captured(&self) -> bool {
        self.base.get().is_some()
    }

    /// Convert a relative offset into an absolute address.
    ///
    /// Never fails. An offset that does not point into the host image
    /// yields a meaningless address.
    pub fn resolve(&self, offset: RelativeOffset) -> AbsoluteAddress {
        AbsoluteAddress(self.base().wrapping_add(offset.get()))
    }
}

impl fmt::Debug for HostImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostImage")
            .field("base", &self.base.get().map(|b| format!("{b:#x}")))
            .finish()
    }
}
