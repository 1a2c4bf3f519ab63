mod patcher;
pub mod regions;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod unsupported;
#[cfg(target_os = "windows")]
mod win32;

#[cfg(test)]
pub mod mock;

use crate::error::Result;

#[cfg(target_os = "linux")]
pub use linux::{CurrentProcess, main_module_base};
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
pub use unsupported::{CurrentProcess, main_module_base};
#[cfg(target_os = "windows")]
pub use win32::{CurrentProcess, main_module_base};

pub use patcher::MemoryPatcher;
pub use regions::MemoryRegion;

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};

/// Raw access to the memory of the process this module lives in.
///
/// Implementations report what the OS actually did; deciding whether that
/// counts as success is left to [`MemoryPatcher`].
pub trait ProcessMemory: Send + Sync {
    /// Copy `data` to `address`, returning how many bytes were transferred
    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<usize>;

    /// Read exactly `len` bytes from `address`
    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>>;

    /// Whether every byte of `address..address + len` is mapped and
    /// accessible to a patch write.
    ///
    /// Page protection may still be read-only or execute-only; the OS write
    /// path handles that for the current process.
    fn is_writable(&self, address: usize, len: usize) -> bool;

    /// Called after a successful write so patched code is re-fetched
    fn flush_instruction_cache(&self, _address: usize, _len: usize) {}
}

impl<M: ProcessMemory + ?Sized> ProcessMemory for &M {
    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<usize> {
        (**self).write_bytes(address, data)
    }

    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        (**self).read_bytes(address, len)
    }

    fn is_writable(&self, address: usize, len: usize) -> bool {
        (**self).is_writable(address, len)
    }

    fn flush_instruction_cache(&self, address: usize, len: usize) {
        (**self).flush_instruction_cache(address, len)
    }
}
