use alloc::vec;
use alloc::vec::Vec;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use super::layout::{GptHeader, PartitionEntry, PartitionTable};
use super::types::{GptError, PRIMARY_HEADER_LBA};
use crate::log_warn;

fn read_header_at<B: BlockIo>(block_io: &mut B, lba: u64) -> Result<GptHeader, GptError> {
    let bs = block_io.block_size().to_u64() as usize;
    let mut block = vec![0u8; bs];
    block_io
        .read_blocks(Lba(lba), &mut block)
        .map_err(|_| GptError::IoError)?;

    let header = GptHeader::from_bytes(&block)?;
    if !header.verify_crc32() {
        log_warn!("GPT: header CRC mismatch");
        return Err(GptError::ChecksumMismatch);
    }
    if header.my_lba != lba {
        return Err(GptError::InvalidHeader);
    }
    Ok(header)
}

/// Read and validate the header at LBA 1 (signature, geometry, CRC).
pub fn read_primary_header<B: BlockIo>(block_io: &mut B) -> Result<GptHeader, GptError> {
    read_header_at(block_io, PRIMARY_HEADER_LBA)
}

/// Read and validate the backup header in the last LBA.
pub fn read_secondary_header<B: BlockIo>(block_io: &mut B) -> Result<GptHeader, GptError> {
    let total = block_io.num_blocks().map_err(|_| GptError::IoError)?;
    if total == 0 {
        return Err(GptError::DiskTooSmall);
    }
    read_header_at(block_io, total - 1)
}

/// Read the entry array `header` points at and check it against the
/// header's table CRC.
pub fn read_partition_table<B: BlockIo>(
    block_io: &mut B,
    header: &GptHeader,
) -> Result<PartitionTable, GptError> {
    let bs = block_io.block_size().to_u64() as usize;
    let len = header.table_byte_len();
    let blocks = (len + bs - 1) / bs;

    let mut bytes: Vec<u8> = vec![0u8; blocks * bs];
    block_io
        .read_blocks(Lba(header.partition_table_lba), &mut bytes)
        .map_err(|_| GptError::IoError)?;
    bytes.truncate(len);

    let table = PartitionTable::from_bytes(bytes);
    if table.crc32() != header.partition_table_crc32 {
        log_warn!("GPT: partition table CRC mismatch");
        return Err(GptError::ChecksumMismatch);
    }
    Ok(table)
}

/// Used partition entries of the primary GPT, in table order.
///
/// The first entry with a zero type GUID ends the list.
pub fn scan_partitions<B: BlockIo>(block_io: &mut B) -> Result<Vec<PartitionEntry>, GptError> {
    let header = read_primary_header(block_io)?;
    let table = read_partition_table(block_io, &header)?;
    Ok(table.used_entries().collect())
}
