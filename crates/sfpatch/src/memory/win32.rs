//! Current-process memory access through the Win32 debug API.

use std::ffi::c_void;
use std::mem::size_of;

use tracing::{error, warn};
use windows::Win32::System::Diagnostics::Debug::{
    FlushInstructionCache, ReadProcessMemory, WriteProcessMemory,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_NOACCESS, VirtualQuery,
};
use windows::Win32::System::Threading::GetCurrentProcess;
use windows::core::PCWSTR;

use super::ProcessMemory;
use crate::error::{Error, Result};

/// Load address of the executable that created this process.
///
/// Returns 0 (and logs) if the loader refuses the query.
pub fn main_module_base() -> usize {
    // SAFETY: a null module name asks for the process image; no pointer is retained.
    match unsafe { GetModuleHandleW(PCWSTR::null()) } {
        Ok(module) => module.0 as usize,
        Err(e) => {
            error!("GetModuleHandleW(NULL) failed: {}", e);
            0
        }
    }
}

/// Handle to this process's own memory.
///
/// Uses the `GetCurrentProcess` pseudo-handle, which never needs closing.
#[derive(Debug, Default)]
pub struct CurrentProcess;

impl CurrentProcess {
    pub fn open() -> Result<Self> {
        Ok(Self)
    }
}

impl ProcessMemory for CurrentProcess {
    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<usize> {
        let mut written = 0usize;
        // SAFETY: the target range was validated by the caller; WriteProcessMemory
        // reports access violations as errors instead of faulting.
        unsafe {
            WriteProcessMemory(
                GetCurrentProcess(),
                address as *mut c_void,
                data.as_ptr() as *const c_void,
                data.len(),
                Some(&mut written as *mut usize),
            )
        }
        .map_err(|e| Error::WriteRejected {
            address,
            message: e.to_string(),
        })?;
        Ok(written)
    }

    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut read = 0usize;
        // SAFETY: buffer holds exactly len bytes.
        unsafe {
            ReadProcessMemory(
                GetCurrentProcess(),
                address as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                len,
                Some(&mut read as *mut usize),
            )
        }
        .map_err(|e| Error::ReadFailed {
            address,
            message: e.to_string(),
        })?;

        if read != len {
            return Err(Error::ReadFailed {
                address,
                message: format!("read {read} of {len} bytes"),
            });
        }
        Ok(buffer)
    }

    fn is_writable(&self, address: usize, len: usize) -> bool {
        let Some(end) = address.checked_add(len) else {
            return false;
        };

        let mut cursor = address;
        while cursor < end {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            // SAFETY: VirtualQuery only fills the provided buffer.
            let filled = unsafe {
                VirtualQuery(
                    Some(cursor as *const c_void),
                    &mut info,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if filled == 0 {
                return false;
            }
            if info.State != MEM_COMMIT || info.Protect.0 & (PAGE_NOACCESS.0 | PAGE_GUARD.0) != 0
            {
                return false;
            }

            let region_end = (info.BaseAddress as usize).saturating_add(info.RegionSize);
            if region_end <= cursor {
                return false;
            }
            cursor = region_end;
        }
        true
    }

    fn flush_instruction_cache(&self, address: usize, len: usize) {
        // SAFETY: only invalidates cached instructions for the range.
        if let Err(e) = unsafe {
            FlushInstructionCache(GetCurrentProcess(), Some(address as *const c_void), len)
        } {
            warn!("FlushInstructionCache at {:#x} failed: {}", address, e);
        }
    }
}
