//! Disk image file as a block device.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use eyre::{bail, Result, WrapErr};
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

/// Map the `--lba-size` flag to a block size. Only 512 and 4096 are valid.
pub fn block_size_from_flag(lba_size: Option<u32>) -> Result<BlockSize> {
    match lba_size.unwrap_or(512) {
        512 => Ok(BlockSize::BS_512),
        4096 => Ok(BlockSize::BS_4096),
        other => bail!("unsupported LBA size {}, expected 512 or 4096", other),
    }
}

/// Image file addressed in whole blocks
pub struct ImageFile {
    file: File,
    block_size: BlockSize,
}

impl ImageFile {
    /// Create (or truncate) `path` and size it to `num_blocks` blocks.
    pub fn create(path: &Path, num_blocks: u64, block_size: BlockSize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create {}", path.display()))?;

        let len = num_blocks
            .checked_mul(block_size.to_u64())
            .ok_or_else(|| eyre::eyre!("image size overflows"))?;
        file.set_len(len)
            .wrap_err_with(|| format!("failed to resize {}", path.display()))?;

        Ok(Self { file, block_size })
    }

    /// Open an existing image for reading and writing.
    pub fn open(path: &Path, block_size: BlockSize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open {}", path.display()))?;

        let len = file.metadata()?.len();
        if len % block_size.to_u64() != 0 {
            bail!(
                "{} is {} bytes, not a multiple of the {}-byte block size",
                path.display(),
                len,
                block_size.to_u64()
            );
        }

        Ok(Self { file, block_size })
    }

    fn check_buffer(&self, len: usize) -> io::Result<()> {
        if len as u64 % self.block_size.to_u64() != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer is not a whole number of blocks",
            ));
        }
        Ok(())
    }

    fn seek_to(&mut self, lba: Lba) -> io::Result<()> {
        let offset = lba
            .0
            .checked_mul(self.block_size.to_u64())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "LBA out of range"))?;
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl BlockIo for ImageFile {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok(self.file.metadata()?.len() / self.block_size.to_u64())
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        self.check_buffer(dst.len())?;
        self.seek_to(start_lba)?;
        self.file.read_exact(dst)
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        self.check_buffer(src.len())?;
        // Writes never grow the image past the size chosen at creation
        let end = start_lba.0 + (src.len() as u64 / self.block_size.to_u64());
        if end > self.num_blocks()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "write past end of image",
            ));
        }
        self.seek_to(start_lba)?;
        self.file.write_all(src)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.file.flush()?;
        self.file.sync_data()
    }
}
