//! On-disk layout of the protective MBR, GPT header and partition entries.
//!
//! Every partitioning offset used by the image tool and by the boot-time
//! reader lives in this file. Structures are encoded field by field in little-endian order,
//! nothing depends on in-memory struct layout.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use uguid::Guid;

use super::types::{
    GptError, GPT_HEADER_SIZE, GPT_REVISION, GPT_SIGNATURE, PARTITION_ENTRY_SIZE,
    PRIMARY_HEADER_LBA, PRIMARY_TABLE_LBA,
};
use crate::checksum::crc32;

/// Legacy MBR sector size; the record is zero-padded to a full block
pub const MBR_SIZE: usize = 512;
pub const MBR_SIGNATURE: u16 = 0xAA55;
/// Partition type marking the disk as GPT-only
pub const MBR_PROTECTIVE_TYPE: u8 = 0xEE;

const MBR_PARTITION_OFFSET: usize = 446;
const MBR_SIGNATURE_OFFSET: usize = 510;

/// Upper bound on entries accepted from a foreign header
const MAX_READ_ENTRIES: u32 = 1024;

/// Number of UTF-16 code units in a partition name
pub const PARTITION_NAME_LEN: usize = 36;

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

fn read_guid(buf: &[u8], off: usize) -> Guid {
    let mut b = [0u8; 16];
    b.copy_from_slice(&buf[off..off + 16]);
    Guid::from_bytes(b)
}

/// Protective MBR: one 0xEE partition covering the whole disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectiveMbr {
    /// Blocks covered by the protective partition (starts at LBA 1)
    pub size_lba: u32,
}

impl ProtectiveMbr {
    /// Size the record for a disk, clamped to what 32-bit LBA fields hold.
    pub fn for_disk(total_blocks: u64) -> Self {
        let clamped = total_blocks.min(0x1_0000_0000);
        Self {
            size_lba: (clamped.saturating_sub(1)) as u32,
        }
    }

    pub fn to_bytes(&self) -> [u8; MBR_SIZE] {
        let mut mbr = [0u8; MBR_SIZE];
        // Boot code, disk signature and the unknown word stay zero

        let p = MBR_PARTITION_OFFSET;
        mbr[p] = 0x00; // Not bootable
        mbr[p + 1..p + 4].copy_from_slice(&[0x00, 0x02, 0x00]); // CHS of LBA 1
        mbr[p + 4] = MBR_PROTECTIVE_TYPE;
        mbr[p + 5..p + 8].copy_from_slice(&[0xFF, 0xFF, 0xFF]); // CHS saturated
        mbr[p + 8..p + 12].copy_from_slice(&1u32.to_le_bytes());
        mbr[p + 12..p + 16].copy_from_slice(&self.size_lba.to_le_bytes());

        mbr[MBR_SIGNATURE_OFFSET..].copy_from_slice(&MBR_SIGNATURE.to_le_bytes());
        mbr
    }

    /// Decode a protective MBR; `None` for anything else.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < MBR_SIZE || read_u16(buf, MBR_SIGNATURE_OFFSET) != MBR_SIGNATURE {
            return None;
        }
        let p = MBR_PARTITION_OFFSET;
        if buf[p + 4] != MBR_PROTECTIVE_TYPE || read_u32(buf, p + 8) != 1 {
            return None;
        }
        Some(Self {
            size_lba: read_u32(buf, p + 12),
        })
    }
}

/// GPT header (92 bytes, zero-padded to a block on disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub my_lba: u64,
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Guid,
    pub partition_table_lba: u64,
    pub number_of_entries: u32,
    pub size_of_entry: u32,
    pub partition_table_crc32: u32,
}

impl GptHeader {
    /// Unsealed primary header for a disk of `total_blocks` blocks whose
    /// entry array takes `table_blocks` blocks.
    pub fn new_primary(
        total_blocks: u64,
        table_blocks: u64,
        entry_count: u32,
        disk_guid: Guid,
    ) -> Self {
        Self {
            revision: GPT_REVISION,
            header_size: GPT_HEADER_SIZE,
            header_crc32: 0,
            my_lba: PRIMARY_HEADER_LBA,
            alternate_lba: total_blocks - 1,
            // MBR + header + table
            first_usable_lba: PRIMARY_TABLE_LBA + table_blocks,
            // Secondary table and header at the end
            last_usable_lba: total_blocks - 1 - table_blocks - 1,
            disk_guid,
            partition_table_lba: PRIMARY_TABLE_LBA,
            number_of_entries: entry_count,
            size_of_entry: PARTITION_ENTRY_SIZE as u32,
            partition_table_crc32: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; GPT_HEADER_SIZE as usize] {
        let mut h = [0u8; GPT_HEADER_SIZE as usize];
        h[0..8].copy_from_slice(GPT_SIGNATURE);
        h[8..12].copy_from_slice(&self.revision.to_le_bytes());
        h[12..16].copy_from_slice(&self.header_size.to_le_bytes());
        h[16..20].copy_from_slice(&self.header_crc32.to_le_bytes());
        // 20..24 reserved, must be zero
        h[24..32].copy_from_slice(&self.my_lba.to_le_bytes());
        h[32..40].copy_from_slice(&self.alternate_lba.to_le_bytes());
        h[40..48].copy_from_slice(&self.first_usable_lba.to_le_bytes());
        h[48..56].copy_from_slice(&self.last_usable_lba.to_le_bytes());
        h[56..72].copy_from_slice(&self.disk_guid.to_bytes());
        h[72..80].copy_from_slice(&self.partition_table_lba.to_le_bytes());
        h[80..84].copy_from_slice(&self.number_of_entries.to_le_bytes());
        h[84..88].copy_from_slice(&self.size_of_entry.to_le_bytes());
        h[88..92].copy_from_slice(&self.partition_table_crc32.to_le_bytes());
        h
    }

    /// Header encoded at the start of a zeroed block.
    pub fn to_block(&self, block_size: usize) -> Vec<u8> {
        let mut block = vec![0u8; block_size];
        block[..GPT_HEADER_SIZE as usize].copy_from_slice(&self.to_bytes());
        block
    }

    /// Decode and sanity-check a header. The CRC is not checked here, see
    /// `verify_crc32`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, GptError> {
        if buf.len() < GPT_HEADER_SIZE as usize {
            return Err(GptError::InvalidHeader);
        }
        if &buf[0..8] != GPT_SIGNATURE {
            return Err(GptError::InvalidSignature);
        }

        let header = Self {
            revision: read_u32(buf, 8),
            header_size: read_u32(buf, 12),
            header_crc32: read_u32(buf, 16),
            my_lba: read_u64(buf, 24),
            alternate_lba: read_u64(buf, 32),
            first_usable_lba: read_u64(buf, 40),
            last_usable_lba: read_u64(buf, 48),
            disk_guid: read_guid(buf, 56),
            partition_table_lba: read_u64(buf, 72),
            number_of_entries: read_u32(buf, 80),
            size_of_entry: read_u32(buf, 84),
            partition_table_crc32: read_u32(buf, 88),
        };

        if header.header_size != GPT_HEADER_SIZE
            || header.size_of_entry as usize != PARTITION_ENTRY_SIZE
            || header.number_of_entries == 0
            || header.number_of_entries > MAX_READ_ENTRIES
            || header.first_usable_lba > header.last_usable_lba
            // Usable space sits below whichever header is at the end
            || header.last_usable_lba >= header.my_lba.max(header.alternate_lba)
        {
            return Err(GptError::InvalidHeader);
        }

        Ok(header)
    }

    /// CRC32 over the header with the `header_crc32` field zeroed.
    pub fn compute_crc32(&self) -> u32 {
        let mut unsealed = *self;
        unsealed.header_crc32 = 0;
        crc32(&unsealed.to_bytes())
    }

    pub fn seal(&mut self) {
        self.header_crc32 = self.compute_crc32();
    }

    pub fn verify_crc32(&self) -> bool {
        self.compute_crc32() == self.header_crc32
    }

    /// Bytes in the partition entry array this header describes.
    pub fn table_byte_len(&self) -> usize {
        self.number_of_entries as usize * self.size_of_entry as usize
    }

    /// Whether `entry` lies inside the usable range, start before end.
    pub fn contains(&self, entry: &PartitionEntry) -> bool {
        self.first_usable_lba <= entry.starting_lba
            && entry.starting_lba <= entry.ending_lba
            && entry.ending_lba <= self.last_usable_lba
    }

    /// Secondary copy of a primary header: positions swapped, table placed
    /// right before the last LBA. The result is sealed.
    ///
    /// Fails when the secondary table would overlap the usable range.
    pub fn mirror(&self, table_blocks: u64) -> Result<Self, GptError> {
        let table_lba = self
            .alternate_lba
            .checked_sub(table_blocks)
            .filter(|&lba| lba > self.last_usable_lba)
            .ok_or(GptError::InvalidHeader)?;

        let mut secondary = *self;
        secondary.my_lba = self.alternate_lba;
        secondary.alternate_lba = self.my_lba;
        secondary.partition_table_lba = table_lba;
        secondary.seal();
        Ok(secondary)
    }
}

/// One 128-byte partition table record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub type_guid: Guid,
    pub unique_guid: Guid,
    pub starting_lba: u64,
    /// Inclusive
    pub ending_lba: u64,
    pub attributes: u64,
    pub name: [u16; PARTITION_NAME_LEN],
}

impl PartitionEntry {
    pub const UNUSED: Self = Self {
        type_guid: Guid::ZERO,
        unique_guid: Guid::ZERO,
        starting_lba: 0,
        ending_lba: 0,
        attributes: 0,
        name: [0; PARTITION_NAME_LEN],
    };

    pub fn is_used(&self) -> bool {
        !self.type_guid.is_zero()
    }

    pub fn size_blocks(&self) -> u64 {
        self.ending_lba.saturating_sub(self.starting_lba) + 1
    }

    /// Store `name` as UTF-16, truncated to 36 code units.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; PARTITION_NAME_LEN];
        for (slot, unit) in self.name.iter_mut().zip(name.encode_utf16()) {
            *slot = unit;
        }
    }

    /// Name up to the first NUL; invalid UTF-16 becomes U+FFFD.
    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&u| u == 0)
            .unwrap_or(PARTITION_NAME_LEN);
        char::decode_utf16(self.name[..end].iter().copied())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    pub fn to_bytes(&self) -> [u8; PARTITION_ENTRY_SIZE] {
        let mut e = [0u8; PARTITION_ENTRY_SIZE];
        e[0..16].copy_from_slice(&self.type_guid.to_bytes());
        e[16..32].copy_from_slice(&self.unique_guid.to_bytes());
        e[32..40].copy_from_slice(&self.starting_lba.to_le_bytes());
        e[40..48].copy_from_slice(&self.ending_lba.to_le_bytes());
        e[48..56].copy_from_slice(&self.attributes.to_le_bytes());
        for (i, unit) in self.name.iter().enumerate() {
            e[56 + i * 2..58 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        e
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut name = [0u16; PARTITION_NAME_LEN];
        for (i, unit) in name.iter_mut().enumerate() {
            *unit = read_u16(buf, 56 + i * 2);
        }
        Self {
            type_guid: read_guid(buf, 0),
            unique_guid: read_guid(buf, 16),
            starting_lba: read_u64(buf, 32),
            ending_lba: read_u64(buf, 40),
            attributes: read_u64(buf, 48),
            name,
        }
    }
}

/// In-memory image of a partition entry array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    bytes: Vec<u8>,
}

impl PartitionTable {
    /// All-unused table of `count` entries
    pub fn empty(count: usize) -> Self {
        Self {
            bytes: vec![0u8; count * PARTITION_ENTRY_SIZE],
        }
    }

    /// Wrap raw table bytes; trailing bytes past the last whole entry are dropped.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        let whole = bytes.len() / PARTITION_ENTRY_SIZE * PARTITION_ENTRY_SIZE;
        bytes.truncate(whole);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / PARTITION_ENTRY_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<PartitionEntry> {
        let off = index.checked_mul(PARTITION_ENTRY_SIZE)?;
        let raw = self.bytes.get(off..off + PARTITION_ENTRY_SIZE)?;
        Some(PartitionEntry::from_bytes(raw))
    }

    pub fn set_entry(&mut self, index: usize, entry: &PartitionEntry) {
        let off = index * PARTITION_ENTRY_SIZE;
        self.bytes[off..off + PARTITION_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
    }

    /// Index of the first unused slot. Entries are packed from index 0, so
    /// this is also the number of partitions.
    pub fn used_count(&self) -> usize {
        (0..self.len())
            .find(|&i| self.bytes[i * PARTITION_ENTRY_SIZE..i * PARTITION_ENTRY_SIZE + 16] == [0u8; 16])
            .unwrap_or(self.len())
    }

    /// Used entries, stopping at the first unused slot
    pub fn used_entries(&self) -> impl Iterator<Item = PartitionEntry> + '_ {
        (0..self.used_count()).filter_map(move |i| self.entry(i))
    }

    pub fn crc32(&self) -> u32 {
        crc32(&self.bytes)
    }
}
