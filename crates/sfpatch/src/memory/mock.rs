//! In-memory stand-in for the current process, with fault injection.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ProcessMemory;
use super::regions::{self, MemoryRegion};
use crate::error::{Error, Result};

pub struct MockMemory {
    base: usize,
    data: Mutex<Vec<u8>>,
    regions: Vec<MemoryRegion>,
    partial_write: Option<usize>,
    reject_writes: bool,
    writes: AtomicUsize,
    flushes: Mutex<Vec<(usize, usize)>>,
}

impl MockMemory {
    pub fn builder() -> MockMemoryBuilder {
        MockMemoryBuilder::default()
    }

    /// Copy of the current contents, bypassing region checks
    pub fn snapshot(&self, address: usize, len: usize) -> Vec<u8> {
        let data = self.data.lock().unwrap();
        let start = address - self.base;
        data[start..start + len].to_vec()
    }

    /// Number of write attempts that reached the backend
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> Vec<(usize, usize)> {
        self.flushes.lock().unwrap().clone()
    }

    fn range(&self, address: usize, len: usize) -> Option<std::ops::Range<usize>> {
        let start = address.checked_sub(self.base)?;
        let end = start.checked_add(len)?;
        (end <= self.data.lock().unwrap().len()).then_some(start..end)
    }
}

impl ProcessMemory for MockMemory {
    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        if self.reject_writes {
            return Err(Error::WriteRejected {
                address,
                message: "access denied".to_string(),
            });
        }

        let Some(range) = self.range(address, data.len()) else {
            return Err(Error::WriteRejected {
                address,
                message: "address out of range".to_string(),
            });
        };

        let count = self
            .partial_write
            .map_or(data.len(), |limit| limit.min(data.len()));
        let mut memory = self.data.lock().unwrap();
        memory[range.start..range.start + count].copy_from_slice(&data[..count]);
        Ok(count)
    }

    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        let Some(range) = self.range(address, len) else {
            return Err(Error::ReadFailed {
                address,
                message: "address out of range".to_string(),
            });
        };
        Ok(self.data.lock().unwrap()[range].to_vec())
    }

    fn is_writable(&self, address: usize, len: usize) -> bool {
        regions::covers(&self.regions, address, len)
    }

    fn flush_instruction_cache(&self, address: usize, len: usize) {
        self.flushes.lock().unwrap().push((address, len));
    }
}

#[derive(Default)]
pub struct MockMemoryBuilder {
    base: usize,
    size: usize,
    regions: Vec<MemoryRegion>,
    partial_write: Option<usize>,
    reject_writes: bool,
}

impl MockMemoryBuilder {
    pub fn base(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Add an explicit region; without any, the whole buffer is one `r-xp` region
    pub fn region(mut self, start: usize, end: usize, perms: &str) -> Self {
        self.regions.push(MemoryRegion::new(start, end, perms));
        self
    }

    /// Transfer at most `limit` bytes per write
    pub fn partial_write(mut self, limit: usize) -> Self {
        self.partial_write = Some(limit);
        self
    }

    pub fn reject_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    pub fn build(self) -> MockMemory {
        let regions = if self.regions.is_empty() {
            vec![MemoryRegion::new(self.base, self.base + self.size, "r-xp")]
        } else {
            self.regions
        };

        MockMemory {
            base: self.base,
            data: Mutex::new(vec![0; self.size]),
            regions,
            partial_write: self.partial_write,
            reject_writes: self.reject_writes,
            writes: AtomicUsize::new(0),
            flushes: Mutex::new(Vec::new()),
        }
    }
}
