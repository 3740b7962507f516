use super::types::{ALIGNMENT_BYTES, PARTITION_TABLE_SIZE};
use gpt_disk_types::BlockSize;

/// Number of blocks in one alignment unit (1 MiB)
pub fn alignment_lbas(block_size: BlockSize) -> u64 {
    ALIGNMENT_BYTES / block_size.to_u64()
}

/// Blocks occupied by one copy of the partition entry array
pub fn table_blocks(block_size: BlockSize) -> u64 {
    let bs = block_size.to_u64();
    (PARTITION_TABLE_SIZE as u64 + bs - 1) / bs
}

/// Round `lba` up to an alignment boundary and step back one block.
///
/// The result is the LAST block of the aligned unit, not the first block of
/// the next one; add 1 to get a start address. An already aligned `lba`
/// still moves forward a whole unit.
pub fn align_up(lba: u64, align: u64) -> u64 {
    lba - (lba % align) + align - 1
}

/// Parse a size such as `"64M"`, `"2k"` or `"4096"` into a block count.
///
/// Units are K, M, G and T (powers of 1024, case-insensitive); no unit means
/// bytes. Returns 0 for anything that does not parse, which callers must
/// treat as invalid.
pub fn parse_size(text: &str, block_size: BlockSize) -> u64 {
    let text = text.trim_start();
    let digits_end = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    if digits_end == 0 {
        return 0;
    }

    let mut number: u64 = 0;
    for b in text[..digits_end].bytes() {
        number = match number
            .checked_mul(10)
            .and_then(|n| n.checked_add((b - b'0') as u64))
        {
            Some(n) => n,
            None => return 0,
        };
    }

    let rest = text[digits_end..].trim();
    let multiplier: u64 = match rest {
        "" => 1,
        "k" | "K" => 1 << 10,
        "m" | "M" => 1 << 20,
        "g" | "G" => 1 << 30,
        "t" | "T" => 1 << 40,
        _ => return 0,
    };

    match number.checked_mul(multiplier) {
        Some(bytes) => bytes / block_size.to_u64(),
        None => 0,
    }
}
