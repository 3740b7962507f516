// Read-back check of a freshly formatted volume

use alloc::vec;
use alloc::vec::Vec;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use super::boot_sector::{
    fat_head, BACKUP_BOOT_SECTOR, FSINFO_LEAD_SIG, FSINFO_SECTOR, FSINFO_STRUCT_SIG,
    FSINFO_TRAIL_SIG, FS_TYPE, OEM_NAME,
};
use super::{NUM_FATS, RESERVED_SECTORS, ROOT_CLUSTER};
use crate::fs::Fat32Error;
use crate::log_warn;

fn read_block<B: BlockIo>(block_io: &mut B, lba: u64) -> Result<Vec<u8>, Fat32Error> {
    let bs = block_io.block_size().to_u64() as usize;
    let mut buf = vec![0u8; bs];
    block_io
        .read_blocks(Lba(lba), &mut buf)
        .map_err(|_| Fat32Error::IoError)?;
    Ok(buf)
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Check the boot sector, FSInfo, backup copy and FAT markers of the volume
/// starting at `partition_lba_start`.
pub fn verify_fat32<B: BlockIo>(
    block_io: &mut B,
    partition_lba_start: u64,
) -> Result<(), Fat32Error> {
    let block_size = block_io.block_size().to_u64();
    let boot = read_block(block_io, partition_lba_start)?;

    if boot[510] != 0x55 || boot[511] != 0xAA || &boot[3..11] != OEM_NAME {
        log_warn!("FAT32: bad boot sector signature");
        return Err(Fat32Error::InvalidBootSector);
    }
    if u16_at(&boot, 11) as u64 != block_size
        || u16_at(&boot, 14) != RESERVED_SECTORS
        || boot[16] != NUM_FATS
        || u32_at(&boot, 44) != ROOT_CLUSTER
        || u16_at(&boot, 48) != FSINFO_SECTOR
        || u16_at(&boot, 50) != BACKUP_BOOT_SECTOR
        || &boot[82..90] != FS_TYPE
    {
        log_warn!("FAT32: unexpected BPB values");
        return Err(Fat32Error::InvalidBootSector);
    }
    let fat_size = u32_at(&boot, 36) as u64;

    let fsinfo = read_block(block_io, partition_lba_start + FSINFO_SECTOR as u64)?;
    if u32_at(&fsinfo, 0) != FSINFO_LEAD_SIG
        || u32_at(&fsinfo, 484) != FSINFO_STRUCT_SIG
        || u32_at(&fsinfo, 508) != FSINFO_TRAIL_SIG
    {
        return Err(Fat32Error::InvalidFsInfo);
    }

    let backup_lba = partition_lba_start + BACKUP_BOOT_SECTOR as u64;
    if read_block(block_io, backup_lba)? != boot {
        return Err(Fat32Error::InvalidBootSector);
    }
    if read_block(block_io, backup_lba + 1)? != fsinfo {
        return Err(Fat32Error::InvalidFsInfo);
    }

    let head = fat_head();
    for copy in 0..NUM_FATS as u64 {
        let fat_lba = partition_lba_start + RESERVED_SECTORS as u64 + copy * fat_size;
        let fat = read_block(block_io, fat_lba)?;
        if fat[..head.len()] != head {
            return Err(Fat32Error::InvalidFat);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::gpt_ops::guid::BASIC_DATA;
    use crate::disk::gpt_ops::PartitionEntry;
    use crate::fs::fat32_format::format_fat32;
    use crate::test_disk::MemDisk;
    use gpt_disk_types::BlockSize;

    fn formatted() -> MemDisk {
        let mut disk = MemDisk::new(8192, BlockSize::BS_512);
        let mut e = PartitionEntry::UNUSED;
        e.type_guid = BASIC_DATA;
        e.starting_lba = 2048;
        e.ending_lba = 6143;
        format_fat32(&mut disk, &e, 4096).unwrap();
        disk
    }

    #[test]
    fn test_fresh_volume_verifies() {
        let mut disk = formatted();
        assert_eq!(verify_fat32(&mut disk, 2048), Ok(()));
    }

    #[test]
    fn test_blank_partition_fails() {
        let mut disk = MemDisk::new(64, BlockSize::BS_512);
        assert_eq!(verify_fat32(&mut disk, 0), Err(Fat32Error::InvalidBootSector));
    }

    #[test]
    fn test_damaged_backup_is_caught() {
        let mut disk = formatted();
        disk.data[(2048 + 6) * 512 + 71] = b'X';
        assert_eq!(verify_fat32(&mut disk, 2048), Err(Fat32Error::InvalidBootSector));
    }

    #[test]
    fn test_damaged_second_fat_is_caught() {
        let mut disk = formatted();
        let fat_size = u32_at(disk.block(2048), 36) as usize;
        disk.data[(2048 + 32 + fat_size) * 512] = 0;
        assert_eq!(verify_fat32(&mut disk, 2048), Err(Fat32Error::InvalidFat));
    }

    #[test]
    fn test_damaged_fsinfo_is_caught() {
        let mut disk = formatted();
        disk.data[2049 * 512 + 484] = 0;
        assert_eq!(verify_fat32(&mut disk, 2048), Err(Fat32Error::InvalidFsInfo));
    }

    #[test]
    fn test_read_failure() {
        let mut disk = formatted();
        disk.fail_reads_from = Some(2049);
        assert_eq!(verify_fat32(&mut disk, 2048), Err(Fat32Error::IoError));
    }
}
