// Partition type registry and random GUID generation

use uguid::{guid, Guid};

/// EFI System Partition
pub const EFI_SYSTEM: Guid = guid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b");

/// Microsoft Basic Data (used for FAT32 data partitions)
pub const BASIC_DATA: Guid = guid!("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7");

/// Linux filesystem
pub const LINUX_FS: Guid = guid!("0fc63daf-8483-4772-8e79-3d69d8477de4");

const TYPE_REGISTRY: &[(&str, Guid)] = &[
    ("efi", EFI_SYSTEM),
    ("basic-data", BASIC_DATA),
    ("linux", LINUX_FS),
];

/// Look up the type GUID for a symbolic partition type name.
///
/// Never returns the zero GUID; that value marks an unused table slot.
pub fn guid_for_type(name: &str) -> Option<Guid> {
    TYPE_REGISTRY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, g)| *g)
}

/// Symbolic name for a known type GUID.
pub fn type_name(guid: &Guid) -> &'static str {
    TYPE_REGISTRY
        .iter()
        .find(|(_, g)| g == guid)
        .map(|(n, _)| *n)
        .unwrap_or("unknown")
}

/// Source of version 4 GUIDs for disks and partitions.
///
/// xorshift64* seeded by the caller: the host tool seeds from the clock,
/// tests use fixed seeds for reproducible images.
pub struct GuidGenerator {
    state: u64,
}

impl GuidGenerator {
    pub fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Random GUID with the version 4 and RFC 4122 variant bits forced.
    pub fn next_guid(&mut self) -> Guid {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.next_u64().to_le_bytes());
        bytes[8..].copy_from_slice(&self.next_u64().to_le_bytes());
        Guid::from_random_bytes(bytes)
    }
}
