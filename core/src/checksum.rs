//! CRC32 (IEEE 802.3, reflected) used by GPT headers and partition tables.
//!
//! The 256-entry table is built at compile time, so the checksum needs no
//! initialisation call and no heap.

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// CRC32 of a 128 x 128 byte all-zero partition table.
///
/// A freshly created disk has no partitions, so its headers can be sealed
/// with this value without hashing 16 KiB of zeros.
pub const EMPTY_TABLE_CRC32: u32 = 0xAB54_D286;

static CRC32_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0, data)
}

/// Continue a CRC32 from a previous result (pass 0 to start fresh).
pub fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    let mut crc = !crc;
    for &byte in data {
        crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize];
    }
    !crc
}

pub fn crc32_verify(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}
