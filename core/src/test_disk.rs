// In-memory BlockIo used by unit tests, with optional fault injection

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemDiskError {
    OutOfBounds,
    BadBuffer,
    Injected,
}

impl fmt::Display for MemDiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "access past end of disk"),
            Self::BadBuffer => write!(f, "buffer is not a whole number of blocks"),
            Self::Injected => write!(f, "injected failure"),
        }
    }
}

pub struct MemDisk {
    pub data: Vec<u8>,
    block_size: BlockSize,
    /// Number of successful write calls before every further write fails
    pub writes_left: Option<usize>,
    /// Reads touching any LBA at or above this value fail
    pub fail_reads_from: Option<u64>,
    pub write_calls: usize,
}

impl MemDisk {
    pub fn new(num_blocks: u64, block_size: BlockSize) -> Self {
        Self {
            data: vec![0u8; (num_blocks * block_size.to_u64()) as usize],
            block_size,
            writes_left: None,
            fail_reads_from: None,
            write_calls: 0,
        }
    }

    pub fn block(&self, lba: u64) -> &[u8] {
        let bs = self.block_size.to_u64() as usize;
        let start = lba as usize * bs;
        &self.data[start..start + bs]
    }

    fn range(&self, start_lba: Lba, len: usize) -> Result<core::ops::Range<usize>, MemDiskError> {
        let bs = self.block_size.to_u64() as usize;
        if len % bs != 0 {
            return Err(MemDiskError::BadBuffer);
        }
        let start = start_lba.0 as usize * bs;
        let end = start + len;
        if end > self.data.len() {
            return Err(MemDiskError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl BlockIo for MemDisk {
    type Error = MemDiskError;

    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok(self.data.len() as u64 / self.block_size.to_u64())
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(start_lba, dst.len())?;
        if let Some(limit) = self.fail_reads_from {
            let last = start_lba.0 + (dst.len() as u64 / self.block_size.to_u64());
            if last > limit {
                return Err(MemDiskError::Injected);
            }
        }
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(start_lba, src.len())?;
        if let Some(left) = self.writes_left {
            if left == 0 {
                return Err(MemDiskError::Injected);
            }
            self.writes_left = Some(left - 1);
        }
        self.write_calls += 1;
        self.data[range].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
