//! FAT32 volume formatter.
//!
//! Lays down a minimal FAT32 volume inside one GPT partition:
//! - boot sector + FSInfo at the partition start
//! - backup boot sector + FSInfo at start + 6
//! - two FATs starting at start + 32
//! - one zeroed cluster for the root directory right after the FATs
//!
//! Each structure is zero-padded to a whole block, so 4096-byte blocks get
//! the same sector images as 512-byte ones.

mod boot_sector;
mod verify;

pub use boot_sector::{build_boot_sector, build_fsinfo, fat_head};
pub use verify::verify_fat32;

use gpt_disk_io::BlockIo;

use super::{Fat32Error, FormatStage};
use crate::disk::cursor::BlockCursor;
use crate::disk::gpt_ops::{read_partition_table, read_primary_header, GptError, PartitionEntry};
use crate::{log_error, log_info};
use boot_sector::BACKUP_BOOT_SECTOR;

pub const RESERVED_SECTORS: u16 = 32;
pub const NUM_FATS: u8 = 2;
pub const ROOT_CLUSTER: u32 = 2;
pub const MAX_SECTORS_PER_CLUSTER: u64 = 128;

/// Geometry of a FAT32 volume, fixed at format time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat32Layout {
    pub partition_start_lba: u64,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    /// Sectors per FAT copy
    pub fat_size: u32,
    pub root_cluster: u32,
    pub total_sectors: u32,
    pub total_clusters: u32,
    /// Sectors in front of the volume, i.e. the partition start
    pub hidden_sectors: u32,
    pub data_start_lba: u64,
}

impl Fat32Layout {
    /// Work out the geometry for a partition of `partition_blocks` blocks.
    ///
    /// A `bytes_per_cluster` of 0 means one block per cluster.
    pub fn compute(
        partition_start_lba: u64,
        partition_blocks: u64,
        block_size: u64,
        bytes_per_cluster: u32,
    ) -> Result<Self, Fat32Error> {
        let spc = match bytes_per_cluster as u64 {
            0 => 1,
            bpc if bpc % block_size != 0 => return Err(Fat32Error::InvalidClusterSize),
            bpc => bpc / block_size,
        };
        if !spc.is_power_of_two() || spc > MAX_SECTORS_PER_CLUSTER {
            return Err(Fat32Error::InvalidClusterSize);
        }

        let total_sectors =
            u32::try_from(partition_blocks).map_err(|_| Fat32Error::PartitionTooLarge)?;
        let hidden_sectors =
            u32::try_from(partition_start_lba).map_err(|_| Fat32Error::PartitionTooLarge)?;

        let total_clusters = partition_blocks / spc;
        // Two reserved entries plus the root directory
        if total_clusters < 3 {
            return Err(Fat32Error::PartitionTooSmall);
        }
        let fat_size = (total_clusters * 4 + block_size - 1) / block_size;

        let metadata = RESERVED_SECTORS as u64 + NUM_FATS as u64 * fat_size;
        if metadata + spc > partition_blocks {
            return Err(Fat32Error::PartitionTooSmall);
        }

        Ok(Self {
            partition_start_lba,
            bytes_per_sector: block_size as u32,
            sectors_per_cluster: spc as u8,
            reserved_sectors: RESERVED_SECTORS,
            num_fats: NUM_FATS,
            fat_size: fat_size as u32,
            root_cluster: ROOT_CLUSTER,
            total_sectors,
            total_clusters: total_clusters as u32,
            hidden_sectors,
            data_start_lba: partition_start_lba + metadata,
        })
    }

    /// First LBA of FAT copy `copy`
    pub fn fat_lba(&self, copy: u8) -> u64 {
        self.partition_start_lba
            + self.reserved_sectors as u64
            + copy as u64 * self.fat_size as u64
    }

    /// First LBA of the root directory cluster
    pub fn root_cluster_lba(&self) -> u64 {
        self.data_start_lba + (self.root_cluster - 2) as u64 * self.sectors_per_cluster as u64
    }

    /// Free clusters on a fresh volume: everything but the root directory
    pub fn free_clusters(&self) -> u32 {
        self.total_clusters - 1
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.sectors_per_cluster as u64 * self.bytes_per_sector as u64
    }
}

fn write_stage<B: BlockIo>(
    cursor: &mut BlockCursor<'_, B>,
    stage: FormatStage,
    data: &[u8],
) -> Result<(), Fat32Error> {
    cursor
        .write(data)
        .and_then(|_| cursor.pad_to_block())
        .map_err(|_| {
            log_error!("FAT32: write failed");
            Fat32Error::WriteFailed(stage)
        })
}

/// Format the partition described by `entry` as FAT32.
pub fn format_fat32<B: BlockIo>(
    block_io: &mut B,
    entry: &PartitionEntry,
    bytes_per_cluster: u32,
) -> Result<Fat32Layout, Fat32Error> {
    let block_size = block_io.block_size().to_u64();
    let layout = Fat32Layout::compute(
        entry.starting_lba,
        entry.size_blocks(),
        block_size,
        bytes_per_cluster,
    )?;

    let boot = build_boot_sector(&layout);
    let fsinfo = build_fsinfo(&layout);
    let start = layout.partition_start_lba;

    let mut cursor = BlockCursor::new(block_io, start);
    write_stage(&mut cursor, FormatStage::BootSector, &boot)?;
    write_stage(&mut cursor, FormatStage::FsInfo, &fsinfo)?;

    cursor
        .seek(start + BACKUP_BOOT_SECTOR as u64)
        .map_err(|_| Fat32Error::WriteFailed(FormatStage::BackupBootSector))?;
    write_stage(&mut cursor, FormatStage::BackupBootSector, &boot)?;
    write_stage(&mut cursor, FormatStage::BackupFsInfo, &fsinfo)?;

    let head = fat_head();
    let tail_bytes = (layout.total_clusters as u64 - 3) * 4;
    for copy in 0..layout.num_fats {
        let stage = FormatStage::Fat(copy);
        cursor
            .seek(layout.fat_lba(copy))
            .and_then(|_| cursor.write(&head))
            .and_then(|_| cursor.write_zeros(tail_bytes))
            .and_then(|_| cursor.pad_to_block())
            .map_err(|_| Fat32Error::WriteFailed(stage))?;
    }

    cursor
        .seek(layout.root_cluster_lba())
        .and_then(|_| cursor.write_zeros(layout.bytes_per_cluster()))
        .map_err(|_| Fat32Error::WriteFailed(FormatStage::RootCluster))?;

    cursor
        .finish()
        .map_err(|_| Fat32Error::WriteFailed(FormatStage::Flush))?;

    log_info!("FAT32: volume formatted");
    Ok(layout)
}

/// Format the used GPT entry at zero-based `index` as FAT32.
pub fn format_partition<B: BlockIo>(
    block_io: &mut B,
    index: usize,
    bytes_per_cluster: u32,
) -> Result<Fat32Layout, Fat32Error> {
    let header = read_primary_header(block_io)?;
    let table = read_partition_table(block_io, &header)?;

    if index >= table.used_count() {
        return Err(GptError::PartitionNotFound.into());
    }
    let entry = table.entry(index).ok_or(GptError::PartitionNotFound)?;

    format_fat32(block_io, &entry, bytes_per_cluster)
}
