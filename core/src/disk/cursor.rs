// Sequential byte writer over a block device

use alloc::vec;
use alloc::vec::Vec;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

/// Byte-granular write cursor on top of whole-block I/O.
///
/// Bytes accumulate in a one-block buffer which is written out each time it
/// fills. A partially filled block only reaches the disk through
/// `pad_to_block` (or `finish`), which zero-fills the tail, so a structure
/// shorter than a block never leaves stale bytes behind it.
pub struct BlockCursor<'a, B: BlockIo> {
    block_io: &'a mut B,
    lba: u64,
    buf: Vec<u8>,
    fill: usize,
}

impl<'a, B: BlockIo> BlockCursor<'a, B> {
    pub fn new(block_io: &'a mut B, start_lba: u64) -> Self {
        let block_size = block_io.block_size().to_u64() as usize;
        Self {
            block_io,
            lba: start_lba,
            buf: vec![0u8; block_size],
            fill: 0,
        }
    }

    /// Block the next byte will land in.
    pub fn lba(&self) -> u64 {
        self.lba
    }

    /// Offset of the next byte inside the current block.
    pub fn offset_in_block(&self) -> usize {
        self.fill
    }

    /// Move to `lba`. Any pending partial block is padded out first.
    pub fn seek(&mut self, lba: u64) -> Result<(), B::Error> {
        self.pad_to_block()?;
        self.lba = lba;
        Ok(())
    }

    pub fn write(&mut self, mut data: &[u8]) -> Result<(), B::Error> {
        while !data.is_empty() {
            let room = self.buf.len() - self.fill;
            let take = room.min(data.len());
            self.buf[self.fill..self.fill + take].copy_from_slice(&data[..take]);
            self.fill += take;
            data = &data[take..];

            if self.fill == self.buf.len() {
                self.emit()?;
            }
        }
        Ok(())
    }

    /// Write `count` zero bytes.
    pub fn write_zeros(&mut self, mut count: u64) -> Result<(), B::Error> {
        // Whole zero blocks go straight to disk once the cursor is aligned
        while count > 0 {
            if self.fill == 0 && count >= self.buf.len() as u64 {
                self.buf.fill(0);
                self.emit()?;
                count -= self.buf.len() as u64;
                continue;
            }
            let room = (self.buf.len() - self.fill) as u64;
            let take = room.min(count) as usize;
            self.buf[self.fill..self.fill + take].fill(0);
            self.fill += take;
            count -= take as u64;
            if self.fill == self.buf.len() {
                self.emit()?;
            }
        }
        Ok(())
    }

    /// Zero-fill up to the next block boundary. No-op when already aligned.
    pub fn pad_to_block(&mut self) -> Result<(), B::Error> {
        if self.fill == 0 {
            return Ok(());
        }
        self.buf[self.fill..].fill(0);
        self.emit()
    }

    /// Pad the last block and flush the device.
    pub fn finish(mut self) -> Result<(), B::Error> {
        self.pad_to_block()?;
        self.block_io.flush()
    }

    fn emit(&mut self) -> Result<(), B::Error> {
        self.block_io.write_blocks(Lba(self.lba), &self.buf)?;
        self.lba += 1;
        self.fill = 0;
        Ok(())
    }
}
