use std::mem::size_of;

use tracing::{debug, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes};

use super::ProcessMemory;
use crate::address::AbsoluteAddress;
use crate::error::{Error, Result};

/// Verified, single-attempt writes into the current process.
///
/// A write succeeds only if the whole payload was transferred. Anything
/// less is reported as a failure; there is no retry and no rollback.
/// Nothing here synchronizes with host threads that may be executing or
/// reading the target bytes.
#[derive(Debug)]
pub struct MemoryPatcher<M> {
    memory: M,
}

impl<M: ProcessMemory> MemoryPatcher<M> {
    pub fn new(memory: M) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Install a fixed-size value at `address`.
    ///
    /// `size_of::<T>()` is the exact number of bytes overwritten.
    pub fn write<T>(&self, address: AbsoluteAddress, payload: &T) -> Result<()>
    where
        T: IntoBytes + Immutable + ?Sized,
    {
        self.write_bytes(address, payload.as_bytes())
    }

    /// Install raw bytes at `address`
    pub fn write_bytes(&self, address: AbsoluteAddress, bytes: &[u8]) -> Result<()> {
        let addr = address.get();
        let len = bytes.len();
        if len == 0 {
            return Ok(());
        }

        if !self.memory.is_writable(addr, len) {
            warn!("Refusing write of {} bytes at {:#x}: range not writable", len, addr);
            return Err(Error::AddressNotWritable { address: addr, len });
        }

        let written = self.memory.write_bytes(addr, bytes).inspect_err(|e| {
            warn!("Write of {} bytes at {:#x} failed: {}", len, addr, e);
        })?;

        if written != len {
            warn!(
                "Partial write at {:#x}: {} of {} bytes transferred",
                addr, written, len
            );
            return Err(Error::PartialWrite {
                address: addr,
                expected: len,
                written,
            });
        }

        self.memory.flush_instruction_cache(addr, len);
        debug!("Wrote {} bytes at {:#x}", len, addr);
        Ok(())
    }

    /// Read a fixed-size value from `address`
    pub fn read<T: FromBytes>(&self, address: AbsoluteAddress) -> Result<T> {
        let addr = address.get();
        let bytes = self.memory.read_bytes(addr, size_of::<T>())?;
        T::read_from_bytes(&bytes).map_err(|_| Error::ReadFailed {
            address: addr,
            message: format!("expected {} bytes, got {}", size_of::<T>(), bytes.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{HostImage, RelativeOffset};
    use crate::memory::MockMemory;

    const BASE: usize = 0x1_4000_0000;

    fn setup() -> (HostImage, MemoryPatcher<MockMemory>) {
        let memory = MockMemory::builder().base(BASE).size(0x100).build();
        (HostImage::with_base(BASE), MemoryPatcher::new(memory))
    }

    #[test]
    fn test_write_typed_value_reads_back() {
        let (image, patcher) = setup();
        let target = image.resolve(RelativeOffset::new(0x10));

        patcher.write(target, &0xDEAD_BEEF_u32).unwrap();

        assert_eq!(
            patcher.memory().snapshot(target.get(), 4),
            0xDEAD_BEEF_u32.to_le_bytes().to_vec()
        );
        assert_eq!(patcher.read::<u32>(target).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_write_only_touches_payload_size() {
        let (image, patcher) = setup();
        let target = image.resolve(RelativeOffset::new(0x20));

        patcher.write(target, &[0x90u8; 5]).unwrap();

        assert_eq!(patcher.memory().snapshot(target.get() - 1, 1), vec![0]);
        assert_eq!(patcher.memory().snapshot(target.get(), 5), vec![0x90; 5]);
        assert_eq!(patcher.memory().snapshot(target.get() + 5, 1), vec![0]);
    }

    #[test]
    fn test_write_byte_slice() {
        let (image, patcher) = setup();
        let target = image.resolve(RelativeOffset::new(0));
        let jmp: &[u8] = &[0xEB, 0x05];

        patcher.write(target, jmp).unwrap();
        assert_eq!(patcher.memory().snapshot(BASE, 2), vec![0xEB, 0x05]);
    }

    #[test]
    fn test_partial_write_is_failure() {
        let memory = MockMemory::builder()
            .base(BASE)
            .size(0x100)
            .partial_write(3)
            .build();
        let patcher = MemoryPatcher::new(memory);
        let image = HostImage::with_base(BASE);

        let err = patcher
            .write(image.resolve(RelativeOffset::new(0x8)), &u64::MAX)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::PartialWrite {
                expected: 8,
                written: 3,
                ..
            }
        ));
        assert_eq!(patcher.memory().write_count(), 1);
    }

    #[test]
    fn test_rejected_write_is_failure() {
        let memory = MockMemory::builder()
            .base(BASE)
            .size(0x100)
            .reject_writes()
            .build();
        let patcher = MemoryPatcher::new(memory);
        let image = HostImage::with_base(BASE);

        let err = patcher
            .write(image.resolve(RelativeOffset::new(0)), &1u8)
            .unwrap_err();
        assert!(matches!(err, Error::WriteRejected { .. }));
        assert!(err.is_write_failure());
        // single attempt, no retry
        assert_eq!(patcher.memory().write_count(), 1);
    }

    #[test]
    fn test_unmapped_target_is_never_written() {
        let (image, patcher) = setup();

        let err = patcher
            .write(image.resolve(RelativeOffset::new(0x1000)), &0u32)
            .unwrap_err();
        assert!(matches!(err, Error::AddressNotWritable { len: 4, .. }));
        assert_eq!(patcher.memory().write_count(), 0);
    }

    #[test]
    fn test_write_straddling_guard_region_is_rejected() {
        let memory = MockMemory::builder()
            .base(BASE)
            .size(0x100)
            .region(BASE, BASE + 0x80, "r-xp")
            .region(BASE + 0x80, BASE + 0x100, "---p")
            .build();
        let patcher = MemoryPatcher::new(memory);
        let image = HostImage::with_base(BASE);

        let err = patcher
            .write(image.resolve(RelativeOffset::new(0x7E)), &0xFFFF_FFFF_u32)
            .unwrap_err();
        assert!(matches!(err, Error::AddressNotWritable { .. }));
        assert_eq!(patcher.memory().snapshot(BASE + 0x7E, 2), vec![0, 0]);
    }

    #[test]
    fn test_successful_write_flushes_instruction_cache() {
        let (image, patcher) = setup();
        patcher
            .write(image.resolve(RelativeOffset::new(0x40)), &0xC3u8)
            .unwrap();
        assert_eq!(patcher.memory().flushes(), vec![(BASE + 0x40, 1)]);
    }

    #[test]
    fn test_empty_payload_is_noop() {
        let (image, patcher) = setup();
        let empty: &[u8] = &[];
        patcher
            .write(image.resolve(RelativeOffset::new(0x5000)), empty)
            .unwrap();
        assert_eq!(patcher.memory().write_count(), 0);
    }
}
