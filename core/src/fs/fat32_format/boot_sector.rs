// FAT32 reserved-region sector images

use super::Fat32Layout;

pub const SECTOR_SIZE: usize = 512;

pub const OEM_NAME: &[u8; 8] = b"MSWIN4.1";
pub const VOLUME_LABEL: &[u8; 11] = b"NO NAME    ";
pub const FS_TYPE: &[u8; 8] = b"FAT32   ";
pub const MEDIA_FIXED: u8 = 0xF8;

pub const FSINFO_SECTOR: u16 = 1;
pub const BACKUP_BOOT_SECTOR: u16 = 6;

pub const FSINFO_LEAD_SIG: u32 = 0x4161_5252;
pub const FSINFO_STRUCT_SIG: u32 = 0x6141_7272;
pub const FSINFO_TRAIL_SIG: u32 = 0xAA55_0000;

/// FAT[0]: media byte in the low 8 bits
pub const FAT_MEDIA_ENTRY: u32 = 0x0FFF_FFF8;
/// End-of-chain marker, used for FAT[1] and the root directory cluster
pub const FAT_END_OF_CHAIN: u32 = 0x0FFF_FFFF;

const HALT: u8 = 0xF4;

/// Build the volume boot record for `layout`
pub fn build_boot_sector(layout: &Fat32Layout) -> [u8; SECTOR_SIZE] {
    let mut bs = [0u8; SECTOR_SIZE];

    // Jump instruction
    bs[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
    bs[3..11].copy_from_slice(OEM_NAME);

    // BPB
    bs[11..13].copy_from_slice(&(layout.bytes_per_sector as u16).to_le_bytes());
    bs[13] = layout.sectors_per_cluster;
    bs[14..16].copy_from_slice(&layout.reserved_sectors.to_le_bytes());
    bs[16] = layout.num_fats;
    // Root entries, 16-bit total sectors: 0 on FAT32
    bs[21] = MEDIA_FIXED;
    // 16-bit FAT size: 0 on FAT32
    bs[24..26].copy_from_slice(&63u16.to_le_bytes()); // Sectors per track
    bs[26..28].copy_from_slice(&255u16.to_le_bytes()); // Heads
    bs[28..32].copy_from_slice(&layout.hidden_sectors.to_le_bytes());
    bs[32..36].copy_from_slice(&layout.total_sectors.to_le_bytes());

    // FAT32 extended BPB
    bs[36..40].copy_from_slice(&layout.fat_size.to_le_bytes());
    // Ext flags 0 = FATs mirrored, FS version 0.0
    bs[44..48].copy_from_slice(&layout.root_cluster.to_le_bytes());
    bs[48..50].copy_from_slice(&FSINFO_SECTOR.to_le_bytes());
    bs[50..52].copy_from_slice(&BACKUP_BOOT_SECTOR.to_le_bytes());
    bs[64] = 0x80; // First hard disk
    bs[66] = 0x29; // Extended boot signature
    // Volume ID left zero
    bs[71..82].copy_from_slice(VOLUME_LABEL);
    bs[82..90].copy_from_slice(FS_TYPE);

    bs[90] = HALT;
    bs[510] = 0x55;
    bs[511] = 0xAA;

    bs
}

/// Build the FSInfo sector with the free count left after the root cluster
pub fn build_fsinfo(layout: &Fat32Layout) -> [u8; SECTOR_SIZE] {
    let mut fs = [0u8; SECTOR_SIZE];

    fs[0..4].copy_from_slice(&FSINFO_LEAD_SIG.to_le_bytes());
    fs[484..488].copy_from_slice(&FSINFO_STRUCT_SIG.to_le_bytes());
    fs[488..492].copy_from_slice(&layout.free_clusters().to_le_bytes());
    // Next free: first cluster after the root directory
    fs[492..496].copy_from_slice(&(layout.root_cluster + 1).to_le_bytes());
    fs[508..512].copy_from_slice(&FSINFO_TRAIL_SIG.to_le_bytes());

    fs
}

/// The three reserved/allocated entries every fresh FAT starts with
pub fn fat_head() -> [u8; 12] {
    let mut head = [0u8; 12];
    head[0..4].copy_from_slice(&FAT_MEDIA_ENTRY.to_le_bytes());
    head[4..8].copy_from_slice(&FAT_END_OF_CHAIN.to_le_bytes());
    head[8..12].copy_from_slice(&FAT_END_OF_CHAIN.to_le_bytes());
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Fat32Layout {
        Fat32Layout::compute(2048, 65536, 512, 4096).unwrap()
    }

    #[test]
    fn test_boot_sector_fields() {
        let l = layout();
        let bs = build_boot_sector(&l);

        assert_eq!(&bs[0..3], &[0xEB, 0x58, 0x90]);
        assert_eq!(&bs[3..11], b"MSWIN4.1");
        assert_eq!(u16::from_le_bytes([bs[11], bs[12]]), 512);
        assert_eq!(bs[13], 8);
        assert_eq!(u16::from_le_bytes([bs[14], bs[15]]), 32);
        assert_eq!(bs[16], 2);
        assert_eq!(&bs[17..21], &[0; 4]);
        assert_eq!(bs[21], 0xF8);
        assert_eq!(&bs[22..24], &[0; 2]);
        assert_eq!(&bs[28..32], &2048u32.to_le_bytes());
        assert_eq!(&bs[32..36], &65536u32.to_le_bytes());
        assert_eq!(&bs[36..40], &l.fat_size.to_le_bytes());
        assert_eq!(&bs[44..48], &2u32.to_le_bytes());
        assert_eq!(&bs[48..50], &1u16.to_le_bytes());
        assert_eq!(&bs[50..52], &6u16.to_le_bytes());
        assert_eq!(bs[64], 0x80);
        assert_eq!(bs[66], 0x29);
        assert_eq!(&bs[71..82], b"NO NAME    ");
        assert_eq!(&bs[82..90], b"FAT32   ");
        assert_eq!(bs[90], 0xF4);
        assert_eq!(&bs[510..512], &[0x55, 0xAA]);
    }

    #[test]
    fn test_fsinfo_fields() {
        let l = layout();
        let fs = build_fsinfo(&l);
        assert_eq!(&fs[0..4], &[0x52, 0x52, 0x61, 0x41]);
        assert_eq!(&fs[484..488], &[0x72, 0x72, 0x41, 0x61]);
        assert_eq!(&fs[488..492], &(l.total_clusters - 1).to_le_bytes());
        assert_eq!(&fs[492..496], &3u32.to_le_bytes());
        assert_eq!(&fs[508..512], &[0x00, 0x00, 0x55, 0xAA]);
        assert!(fs[4..484].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fat_head() {
        assert_eq!(
            fat_head(),
            [0xF8, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F]
        );
    }
}
