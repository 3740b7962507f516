use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use uguid::Guid;

use super::guid::GuidGenerator;
use super::layout::{GptHeader, PartitionEntry, PartitionTable, ProtectiveMbr};
use super::scan::{read_partition_table, read_primary_header};
use super::types::{GptError, PARTITION_ENTRY_COUNT};
use super::utils::{align_up, alignment_lbas, table_blocks};
use crate::checksum::EMPTY_TABLE_CRC32;
use crate::disk::cursor::BlockCursor;
use crate::{log_error, log_info};

/// Write the protective MBR to LBA 0.
pub fn write_protective_mbr<B: BlockIo>(block_io: &mut B) -> Result<(), GptError> {
    let total = block_io.num_blocks().map_err(|_| GptError::IoError)?;
    let mbr = ProtectiveMbr::for_disk(total);

    let mut cursor = BlockCursor::new(block_io, 0);
    cursor.write(&mbr.to_bytes()).map_err(|_| GptError::IoError)?;
    cursor.finish().map_err(|_| GptError::IoError)?;

    log_info!("GPT: protective MBR written");
    Ok(())
}

fn write_table<B: BlockIo>(
    block_io: &mut B,
    lba: u64,
    table: &PartitionTable,
) -> Result<(), GptError> {
    let mut cursor = BlockCursor::new(block_io, lba);
    cursor.write(table.as_bytes()).map_err(|_| GptError::IoError)?;
    cursor.pad_to_block().map_err(|_| GptError::IoError)
}

fn write_header<B: BlockIo>(block_io: &mut B, header: &GptHeader) -> Result<(), GptError> {
    let bs = block_io.block_size().to_u64() as usize;
    block_io
        .write_blocks(Lba(header.my_lba), &header.to_block(bs))
        .map_err(|_| GptError::IoError)
}

/// Write `table` and both headers. `primary` must already carry the table
/// CRC and be sealed.
///
/// Order is primary table, primary header, secondary table, secondary
/// header. A crash between the two halves leaves a valid primary and a
/// stale secondary.
fn write_both_copies<B: BlockIo>(
    block_io: &mut B,
    primary: &GptHeader,
    table: &PartitionTable,
    table_blocks: u64,
) -> Result<(), GptError> {
    let secondary = primary.mirror(table_blocks)?;

    write_table(block_io, primary.partition_table_lba, table)?;
    write_header(block_io, primary)?;
    write_table(block_io, secondary.partition_table_lba, table)?;
    write_header(block_io, &secondary)?;

    block_io.flush().map_err(|_| GptError::IoError)
}

/// Write empty primary and secondary GPTs for the whole device.
///
/// Returns the sealed primary header.
pub fn write_gpt_headers<B: BlockIo>(
    block_io: &mut B,
    guids: &mut GuidGenerator,
) -> Result<GptHeader, GptError> {
    let total = block_io.num_blocks().map_err(|_| GptError::IoError)?;
    let tb = table_blocks(block_io.block_size());

    // MBR, two headers, two tables and at least one usable block
    if total < 2 * (tb + 1) + 2 {
        log_error!("GPT: disk too small");
        return Err(GptError::DiskTooSmall);
    }

    let mut primary =
        GptHeader::new_primary(total, tb, PARTITION_ENTRY_COUNT as u32, guids.next_guid());
    primary.partition_table_crc32 = EMPTY_TABLE_CRC32;
    primary.seal();

    let table = PartitionTable::empty(PARTITION_ENTRY_COUNT);
    write_both_copies(block_io, &primary, &table, tb)?;

    log_info!("GPT: headers written");
    Ok(primary)
}

/// Initialize a blank GPT disk: protective MBR plus both headers and tables.
pub fn create_gpt<B: BlockIo>(
    block_io: &mut B,
    guids: &mut GuidGenerator,
) -> Result<GptHeader, GptError> {
    write_protective_mbr(block_io)?;
    write_gpt_headers(block_io, guids)
}

/// Append a partition after the last used entry.
///
/// Returns the zero-based table index of the new entry. Nothing is written
/// unless the partition fits.
pub fn add_partition<B: BlockIo>(
    block_io: &mut B,
    size_blocks: u64,
    type_guid: Guid,
    name: &str,
    guids: &mut GuidGenerator,
) -> Result<usize, GptError> {
    if size_blocks == 0 {
        return Err(GptError::InvalidSize);
    }
    if type_guid.is_zero() {
        // Would read back as an unused slot
        return Err(GptError::UnknownType);
    }

    let mut primary = read_primary_header(block_io)?;
    let mut table = read_partition_table(block_io, &primary)?;

    let index = table.used_count();
    if index >= primary.number_of_entries as usize || index >= table.len() {
        log_error!("GPT: partition table full");
        return Err(GptError::TableFull);
    }

    let last_used_end = match index {
        0 => primary.first_usable_lba,
        i => table
            .entry(i - 1)
            .map(|e| e.ending_lba)
            .ok_or(GptError::InvalidHeader)?,
    };

    let align = alignment_lbas(block_io.block_size());
    if last_used_end > primary.last_usable_lba {
        log_error!("GPT: last partition ends past usable range");
        return Err(GptError::NoSpace {
            overflow: (last_used_end - primary.last_usable_lba).saturating_add(size_blocks),
        });
    }
    let new_start = match last_used_end.checked_add(align) {
        Some(_) => align_up(last_used_end, align) + 1,
        None => {
            return Err(GptError::NoSpace {
                overflow: size_blocks,
            })
        }
    };
    // Keep align_up clear of u64 wraparound for absurd sizes
    let new_end = match new_start.checked_add(size_blocks) {
        Some(end) if end <= u64::MAX - align => align_up(end, align),
        _ => {
            return Err(GptError::NoSpace {
                overflow: u64::MAX - primary.last_usable_lba,
            })
        }
    };

    if new_end > primary.last_usable_lba {
        log_error!("GPT: partition does not fit");
        return Err(GptError::NoSpace {
            overflow: new_end - primary.last_usable_lba,
        });
    }

    let mut entry = PartitionEntry::UNUSED;
    entry.type_guid = type_guid;
    entry.unique_guid = guids.next_guid();
    entry.starting_lba = new_start;
    entry.ending_lba = new_end;
    entry.set_name(name);
    table.set_entry(index, &entry);

    primary.partition_table_crc32 = table.crc32();
    primary.seal();

    let bs = block_io.block_size().to_u64();
    let tb = (primary.table_byte_len() as u64 + bs - 1) / bs;
    write_both_copies(block_io, &primary, &table, tb)?;

    log_info!("GPT: partition added");
    Ok(index)
}
