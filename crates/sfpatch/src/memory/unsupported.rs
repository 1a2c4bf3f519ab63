use tracing::warn;

use super::ProcessMemory;
use crate::error::{Error, Result};

pub fn main_module_base() -> usize {
    warn!("Module base lookup is only supported on Windows and Linux");
    0
}

#[derive(Debug)]
pub struct CurrentProcess;

impl CurrentProcess {
    pub fn open() -> Result<Self> {
        Err(Error::Unsupported("current-process memory access"))
    }
}

impl ProcessMemory for CurrentProcess {
    fn write_bytes(&self, _address: usize, _data: &[u8]) -> Result<usize> {
        Err(Error::Unsupported("memory writes"))
    }

    fn read_bytes(&self, _address: usize, _len: usize) -> Result<Vec<u8>> {
        Err(Error::Unsupported("memory reads"))
    }

    fn is_writable(&self, _address: usize, _len: usize) -> bool {
        false
    }
}
