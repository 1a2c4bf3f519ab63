//! Current-process memory access through procfs.
//!
//! `/proc/self/mem` goes through the kernel's ptrace access path, so a write
//! lands even on read-only or execute-only pages, and an unmapped address
//! comes back as `EIO` instead of a fault.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;

use tracing::{error, warn};

use super::ProcessMemory;
use super::regions::{self, MemoryRegion};
use crate::error::{Error, Result};

const MEM_PATH: &str = "/proc/self/mem";
const MAPS_PATH: &str = "/proc/self/maps";

fn read_maps() -> std::io::Result<Vec<MemoryRegion>> {
    Ok(regions::parse_maps(&fs::read_to_string(MAPS_PATH)?))
}

/// Load address of the running executable.
///
/// Returns 0 (and logs) if the mappings cannot be read.
pub fn main_module_base() -> usize {
    let maps = match read_maps() {
        Ok(maps) => maps,
        Err(e) => {
            error!("Failed to read {}: {}", MAPS_PATH, e);
            return 0;
        }
    };

    let exe = std::env::current_exe()
        .ok()
        .map(|p| p.to_string_lossy().into_owned());

    let by_path = exe.as_deref().and_then(|exe| {
        maps.iter()
            .find(|r| r.offset == 0 && r.path.as_deref() == Some(exe))
    });

    // The executable is the first file-backed mapping when the path
    // comparison fails (e.g. the binary was replaced on disk)
    match by_path.or_else(|| maps.iter().find(|r| r.path.is_some())) {
        Some(region) => region.start,
        None => {
            warn!("No file-backed mapping found in {}", MAPS_PATH);
            0
        }
    }
}

/// Handle to this process's own memory
#[derive(Debug)]
pub struct CurrentProcess {
    mem: File,
}

impl CurrentProcess {
    pub fn open() -> Result<Self> {
        let mem = OpenOptions::new().read(true).write(true).open(MEM_PATH)?;
        Ok(Self { mem })
    }
}

impl ProcessMemory for CurrentProcess {
    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<usize> {
        self.mem
            .write_at(data, address as u64)
            .map_err(|e| Error::WriteRejected {
                address,
                message: e.to_string(),
            })
    }

    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.mem
            .read_exact_at(&mut buffer, address as u64)
            .map_err(|e| Error::ReadFailed {
                address,
                message: e.to_string(),
            })?;
        Ok(buffer)
    }

    fn is_writable(&self, address: usize, len: usize) -> bool {
        match read_maps() {
            Ok(maps) => regions::covers(&maps, address, len),
            Err(e) => {
                warn!("Failed to read {}: {}", MAPS_PATH, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{HostImage, RelativeOffset};
    use crate::memory::MemoryPatcher;

    #[test]
    fn test_write_then_read_heap_buffer() {
        let mut target = Box::new([0u8; 16]);
        let address = target.as_mut_ptr() as usize;

        let process = CurrentProcess::open().unwrap();
        assert!(process.is_writable(address, 16));

        let written = process.write_bytes(address + 4, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(written, 4);
        assert_eq!(
            process.read_bytes(address, 8).unwrap(),
            vec![0, 0, 0, 0, 0xDE, 0xAD, 0xBE, 0xEF]
        );

        // SAFETY: target is still alive and exclusively owned by this test.
        let seen = unsafe { std::ptr::read_volatile(target.as_ptr().add(4) as *const [u8; 4]) };
        assert_eq!(seen, [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_unmapped_address_is_not_writable() {
        let process = CurrentProcess::open().unwrap();
        assert!(!process.is_writable(0x10, 4));
        assert!(process.write_bytes(0x10, &[0x90]).is_err());
    }

    #[test]
    fn test_patcher_rejects_unmapped_target() {
        let process = CurrentProcess::open().unwrap();
        let patcher = MemoryPatcher::new(process);
        let image = HostImage::with_base(0);

        let err = patcher
            .write(image.resolve(RelativeOffset::new(0x10)), &0x9090_u16)
            .unwrap_err();
        assert!(matches!(err, Error::AddressNotWritable { address: 0x10, len: 2 }));
    }

    #[test]
    fn test_main_module_base_is_mapped() {
        let base = main_module_base();
        assert_ne!(base, 0);
        let process = CurrentProcess::open().unwrap();
        assert!(process.is_writable(base, 1));
    }
}
