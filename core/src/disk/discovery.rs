//! Boot-time disk and partition discovery.
//!
//! Walks every block device, reads its GPT, classifies each used partition
//! and lets a [`BootOperator`] pick the boot volume. The walk is an explicit
//! state machine so a firmware main loop can drive it one step at a time:
//!
//! ```text
//! EnumDevices -> ReadGpt -> ValidateSignature -> ReadTable -> Classify
//!             -> Present -> Select
//! ```
//!
//! A device that cannot be read or carries no valid GPT is reported to the
//! operator and skipped.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::mem;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use uguid::Guid;

use super::gpt_ops::{read_partition_table, GptError, GptHeader, PartitionTable, PRIMARY_HEADER_LBA};
use crate::fs::{detect, FsKind};
use crate::{log_info, log_warn};

/// Partitions kept per device
pub const MAX_PARTITIONS: usize = 128;

/// One used GPT entry as presented to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Zero-based table index
    pub index: usize,
    pub name: String,
    pub fs: FsKind,
    pub starting_lba: u64,
    pub size_bytes: u64,
    pub offset_bytes: u64,
    pub type_guid: Guid,
    pub unique_guid: Guid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Position in the presented list
    Index(usize),
    /// Reject this device and move to the next one
    StartOver,
}

/// Why a device was passed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ReadFailed,
    InvalidGpt(GptError),
    /// Valid GPT without a usable partition
    NoPartitions,
    NoMatchingPartitions,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "read failed"),
            Self::InvalidGpt(err) => write!(f, "no valid GPT ({})", err),
            Self::NoPartitions => write!(f, "no partitions"),
            Self::NoMatchingPartitions => write!(f, "no matching partitions"),
        }
    }
}

/// The interactive side of discovery (menu, keyboard, or a script)
pub trait BootOperator {
    /// Show the partitions found on `device`
    fn present(&mut self, device: usize, partitions: &[PartitionInfo]);

    /// Ask for a choice among the presented partitions. Called again when
    /// the answer is out of range.
    fn select(&mut self, device: usize, partitions: &[PartitionInfo]) -> Selection;

    /// `device` was skipped
    fn skip(&mut self, device: usize, reason: SkipReason);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootTarget {
    /// Index into the device list
    pub device: usize,
    pub partition: PartitionInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoveryConfig {
    /// Only offer partitions of this filesystem
    pub filter: Option<FsKind>,
    /// Pick the partition without asking when exactly one is offered
    pub auto_select_single: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryError {
    NoDevices,
    /// Every device was declined
    NoSelection,
    /// No device carried a readable GPT
    NoBootableDevice,
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevices => write!(f, "no block devices found"),
            Self::NoSelection => write!(f, "no partition selected"),
            Self::NoBootableDevice => write!(f, "no device with a valid GPT"),
        }
    }
}

/// Result of a single discovery step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Moved to another phase, keep stepping
    Continue,
    Done(BootTarget),
    Failed(DiscoveryError),
}

enum Phase {
    EnumDevices,
    ReadGpt { device: usize },
    ValidateSignature { device: usize, block: Vec<u8> },
    ReadTable { device: usize, header: GptHeader },
    Classify { device: usize, header: GptHeader, table: PartitionTable },
    Present { device: usize, partitions: Vec<PartitionInfo> },
    Select { device: usize, partitions: Vec<PartitionInfo> },
    Finished,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::EnumDevices => "EnumDevices",
            Phase::ReadGpt { .. } => "ReadGpt",
            Phase::ValidateSignature { .. } => "ValidateSignature",
            Phase::ReadTable { .. } => "ReadTable",
            Phase::Classify { .. } => "Classify",
            Phase::Present { .. } => "Present",
            Phase::Select { .. } => "Select",
            Phase::Finished => "Finished",
        }
    }
}

/// Resolve a selection index against the presented list.
pub fn select_partition(partitions: &[PartitionInfo], index: usize) -> Option<&PartitionInfo> {
    partitions.get(index)
}

/// Describe the used entries of `table` on `block_io`, probing each one for
/// a filesystem.
///
/// Entries outside the usable range of `header` are left out; `index` still
/// refers to the table slot.
pub fn classify_partitions<B: BlockIo>(
    block_io: &mut B,
    header: &GptHeader,
    table: &PartitionTable,
) -> Vec<PartitionInfo> {
    let bs = block_io.block_size().to_u64();
    let mut partitions = Vec::new();

    for (index, entry) in table.used_entries().take(MAX_PARTITIONS).enumerate() {
        let bytes = entry
            .size_blocks()
            .checked_mul(bs)
            .zip(entry.starting_lba.checked_mul(bs));
        let (size_bytes, offset_bytes) = match bytes {
            Some(bytes) if header.contains(&entry) => bytes,
            _ => {
                log_warn!("Discovery: partition outside usable range ignored");
                continue;
            }
        };

        partitions.push(PartitionInfo {
            index,
            name: entry.name(),
            fs: detect(block_io, entry.starting_lba),
            starting_lba: entry.starting_lba,
            size_bytes,
            offset_bytes,
            type_guid: entry.type_guid,
            unique_guid: entry.unique_guid,
        });
    }
    partitions
}

/// Discovery state machine over a fixed device list
pub struct Discovery<'a, B: BlockIo, O: BootOperator> {
    devices: &'a mut [B],
    operator: &'a mut O,
    config: DiscoveryConfig,
    phase: Phase,
    found_gpt: bool,
}

impl<'a, B: BlockIo, O: BootOperator> Discovery<'a, B, O> {
    pub fn new(devices: &'a mut [B], operator: &'a mut O, config: DiscoveryConfig) -> Self {
        Self {
            devices,
            operator,
            config,
            phase: Phase::EnumDevices,
            found_gpt: false,
        }
    }

    /// Name of the current phase
    pub fn phase_name(&self) -> &'static str {
        self.phase.name()
    }

    fn skip(&mut self, device: usize, reason: SkipReason) -> Phase {
        log_warn!("Discovery: device skipped");
        self.operator.skip(device, reason);
        Phase::ReadGpt { device: device + 1 }
    }

    /// Run one step
    pub fn step(&mut self) -> StepResult {
        let (next, result) = match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::EnumDevices => {
                if self.devices.is_empty() {
                    (Phase::Finished, StepResult::Failed(DiscoveryError::NoDevices))
                } else {
                    log_info!("Discovery: enumerating devices");
                    (Phase::ReadGpt { device: 0 }, StepResult::Continue)
                }
            }

            Phase::ReadGpt { device } => {
                if device >= self.devices.len() {
                    let err = if self.found_gpt {
                        DiscoveryError::NoSelection
                    } else {
                        DiscoveryError::NoBootableDevice
                    };
                    (Phase::Finished, StepResult::Failed(err))
                } else {
                    let io = &mut self.devices[device];
                    let mut block = vec![0u8; io.block_size().to_u64() as usize];
                    match io.read_blocks(Lba(PRIMARY_HEADER_LBA), &mut block) {
                        Ok(()) => (Phase::ValidateSignature { device, block }, StepResult::Continue),
                        Err(_) => (self.skip(device, SkipReason::ReadFailed), StepResult::Continue),
                    }
                }
            }

            Phase::ValidateSignature { device, block } => {
                let checked = GptHeader::from_bytes(&block).and_then(|h| {
                    if !h.verify_crc32() {
                        Err(GptError::ChecksumMismatch)
                    } else if h.my_lba != PRIMARY_HEADER_LBA {
                        Err(GptError::InvalidHeader)
                    } else {
                        Ok(h)
                    }
                });
                match checked {
                    Ok(header) => {
                        self.found_gpt = true;
                        (Phase::ReadTable { device, header }, StepResult::Continue)
                    }
                    Err(err) => (
                        self.skip(device, SkipReason::InvalidGpt(err)),
                        StepResult::Continue,
                    ),
                }
            }

            Phase::ReadTable { device, header } => {
                match read_partition_table(&mut self.devices[device], &header) {
                    Ok(table) => (
                        Phase::Classify { device, header, table },
                        StepResult::Continue,
                    ),
                    Err(GptError::IoError) => {
                        (self.skip(device, SkipReason::ReadFailed), StepResult::Continue)
                    }
                    Err(err) => (
                        self.skip(device, SkipReason::InvalidGpt(err)),
                        StepResult::Continue,
                    ),
                }
            }

            Phase::Classify { device, header, table } => {
                let mut partitions =
                    classify_partitions(&mut self.devices[device], &header, &table);
                if partitions.is_empty() {
                    (self.skip(device, SkipReason::NoPartitions), StepResult::Continue)
                } else if let Some(kind) = self.config.filter {
                    partitions.retain(|p| p.fs == kind);
                    if partitions.is_empty() {
                        (
                            self.skip(device, SkipReason::NoMatchingPartitions),
                            StepResult::Continue,
                        )
                    } else {
                        (Phase::Present { device, partitions }, StepResult::Continue)
                    }
                } else {
                    (Phase::Present { device, partitions }, StepResult::Continue)
                }
            }

            Phase::Present { device, mut partitions } => {
                if self.config.auto_select_single && partitions.len() == 1 {
                    log_info!("Discovery: single match selected");
                    let partition = partitions.remove(0);
                    (Phase::Finished, StepResult::Done(BootTarget { device, partition }))
                } else {
                    self.operator.present(device, &partitions);
                    (Phase::Select { device, partitions }, StepResult::Continue)
                }
            }

            Phase::Select { device, partitions } => {
                match self.operator.select(device, &partitions) {
                    Selection::Index(i) => match select_partition(&partitions, i) {
                        Some(p) => {
                            log_info!("Discovery: partition selected");
                            let partition = p.clone();
                            (Phase::Finished, StepResult::Done(BootTarget { device, partition }))
                        }
                        None => (Phase::Select { device, partitions }, StepResult::Continue),
                    },
                    Selection::StartOver => {
                        (Phase::ReadGpt { device: device + 1 }, StepResult::Continue)
                    }
                }
            }

            Phase::Finished => (Phase::Finished, StepResult::Failed(DiscoveryError::NoSelection)),
        };

        self.phase = next;
        result
    }

    /// Step until a boot target is chosen or discovery fails.
    pub fn run(mut self) -> Result<BootTarget, DiscoveryError> {
        loop {
            match self.step() {
                StepResult::Continue => continue,
                StepResult::Done(target) => return Ok(target),
                StepResult::Failed(err) => return Err(err),
            }
        }
    }
}

/// Walk `devices` and return the partition the operator picks.
pub fn find_boot_target<B: BlockIo, O: BootOperator>(
    devices: &mut [B],
    operator: &mut O,
    config: DiscoveryConfig,
) -> Result<BootTarget, DiscoveryError> {
    Discovery::new(devices, operator, config).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::gpt_ops::guid::{GuidGenerator, BASIC_DATA, EFI_SYSTEM};
    use crate::disk::gpt_ops::{
        add_partition, create_gpt, read_primary_header, PartitionEntry,
    };
    use crate::fs::format_partition;
    use crate::test_disk::MemDisk;
    use alloc::collections::VecDeque;
    use gpt_disk_types::BlockSize;

    #[derive(Default)]
    struct ScriptedOperator {
        answers: VecDeque<Selection>,
        presented: Vec<(usize, usize)>,
        skipped: Vec<(usize, SkipReason)>,
        prompts: usize,
    }

    impl ScriptedOperator {
        fn answering(answers: &[Selection]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl BootOperator for ScriptedOperator {
        fn present(&mut self, device: usize, partitions: &[PartitionInfo]) {
            self.presented.push((device, partitions.len()));
        }

        fn select(&mut self, _device: usize, _partitions: &[PartitionInfo]) -> Selection {
            self.prompts += 1;
            self.answers.pop_front().unwrap_or(Selection::StartOver)
        }

        fn skip(&mut self, device: usize, reason: SkipReason) {
            self.skipped.push((device, reason));
        }
    }

    /// GPT disk with a FAT32 ESP and an unformatted data partition
    fn boot_disk(seed: u64) -> MemDisk {
        let mut disk = MemDisk::new(32768, BlockSize::BS_512);
        let mut guids = GuidGenerator::new(seed);
        create_gpt(&mut disk, &mut guids).unwrap();
        add_partition(&mut disk, 2048, EFI_SYSTEM, "ESP", &mut guids).unwrap();
        add_partition(&mut disk, 4096, BASIC_DATA, "DATA", &mut guids).unwrap();
        format_partition(&mut disk, 0, 4096).unwrap();
        disk
    }

    /// Write `table` at LBA 2 and a resealed primary header pointing at it
    fn install_primary(disk: &mut MemDisk, header: &mut GptHeader, table: &PartitionTable) {
        header.partition_table_crc32 = table.crc32();
        header.seal();
        let bytes = table.as_bytes();
        disk.data[2 * 512..2 * 512 + bytes.len()].copy_from_slice(bytes);
        disk.data[512..1024].copy_from_slice(&header.to_block(512));
    }

    #[test]
    fn test_no_devices() {
        let mut devices: Vec<MemDisk> = Vec::new();
        let mut op = ScriptedOperator::default();
        assert_eq!(
            find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()),
            Err(DiscoveryError::NoDevices)
        );
    }

    #[test]
    fn test_skips_blank_device_and_selects() {
        let mut devices = vec![MemDisk::new(256, BlockSize::BS_512), boot_disk(1)];
        let mut op = ScriptedOperator::answering(&[Selection::Index(0)]);

        let target = find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()).unwrap();
        assert_eq!(target.device, 1);
        assert_eq!(target.partition.name, "ESP");
        assert_eq!(target.partition.fs, FsKind::Fat32);
        assert_eq!(target.partition.type_guid, EFI_SYSTEM);
        assert_eq!(
            op.skipped,
            vec![(0, SkipReason::InvalidGpt(GptError::InvalidSignature))]
        );
        assert_eq!(op.presented, vec![(1, 2)]);
    }

    #[test]
    fn test_partition_info_sizes() {
        let mut devices = vec![boot_disk(2)];
        let mut op = ScriptedOperator::answering(&[Selection::Index(1)]);

        let target = find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()).unwrap();
        let p = target.partition;
        assert_eq!(p.index, 1);
        assert_eq!(p.fs, FsKind::None);
        assert_eq!(p.starting_lba, 6144);
        assert_eq!(p.offset_bytes, 6144 * 512);
        // 6144..=12287 inclusive
        assert_eq!(p.size_bytes, 6144 * 512);
        assert!(!p.unique_guid.is_zero());
    }

    #[test]
    fn test_out_of_range_reprompts() {
        let mut devices = vec![boot_disk(3)];
        let mut op = ScriptedOperator::answering(&[Selection::Index(7), Selection::Index(0)]);

        let target = find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()).unwrap();
        assert_eq!(target.partition.index, 0);
        assert_eq!(op.prompts, 2);
        assert_eq!(op.presented.len(), 1);
    }

    #[test]
    fn test_start_over_moves_to_next_device() {
        let mut devices = vec![boot_disk(4), boot_disk(5)];
        let mut op = ScriptedOperator::answering(&[Selection::StartOver, Selection::Index(0)]);

        let target = find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()).unwrap();
        assert_eq!(target.device, 1);
        assert_eq!(op.presented, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_all_declined_is_no_selection() {
        let mut devices = vec![boot_disk(6)];
        let mut op = ScriptedOperator::default();
        assert_eq!(
            find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()),
            Err(DiscoveryError::NoSelection)
        );
    }

    #[test]
    fn test_no_gpt_anywhere() {
        let mut devices = vec![
            MemDisk::new(64, BlockSize::BS_512),
            MemDisk::new(64, BlockSize::BS_4096),
        ];
        let mut op = ScriptedOperator::default();
        assert_eq!(
            find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()),
            Err(DiscoveryError::NoBootableDevice)
        );
        assert_eq!(op.skipped.len(), 2);
    }

    #[test]
    fn test_corrupt_and_unreadable_devices_are_skipped() {
        let mut corrupt = boot_disk(7);
        corrupt.data[512 + 48] ^= 0x10;
        let mut unreadable = boot_disk(8);
        unreadable.fail_reads_from = Some(0);
        let mut bad_table = boot_disk(9);
        bad_table.data[2 * 512 + 1] ^= 0xFF;

        let mut devices = vec![corrupt, unreadable, bad_table, boot_disk(10)];
        let mut op = ScriptedOperator::answering(&[Selection::Index(0)]);

        let target = find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()).unwrap();
        assert_eq!(target.device, 3);
        assert_eq!(
            op.skipped,
            vec![
                (0, SkipReason::InvalidGpt(GptError::ChecksumMismatch)),
                (1, SkipReason::ReadFailed),
                (2, SkipReason::InvalidGpt(GptError::ChecksumMismatch)),
            ]
        );
    }

    #[test]
    fn test_filter_with_auto_select() {
        let mut devices = vec![boot_disk(11)];
        let mut op = ScriptedOperator::default();
        let config = DiscoveryConfig {
            filter: Some(FsKind::Fat32),
            auto_select_single: true,
        };

        let target = find_boot_target(&mut devices, &mut op, config).unwrap();
        assert_eq!(target.partition.name, "ESP");
        assert!(op.presented.is_empty());
        assert_eq!(op.prompts, 0);
    }

    #[test]
    fn test_filter_without_matches_skips_device() {
        let mut devices = vec![boot_disk(12)];
        let mut op = ScriptedOperator::default();
        let config = DiscoveryConfig {
            filter: Some(FsKind::Ext4),
            auto_select_single: true,
        };

        assert_eq!(
            find_boot_target(&mut devices, &mut op, config),
            Err(DiscoveryError::NoSelection)
        );
        assert_eq!(op.skipped, vec![(0, SkipReason::NoMatchingPartitions)]);
    }

    #[test]
    fn test_step_by_step_phases() {
        let mut devices = vec![boot_disk(13)];
        let mut op = ScriptedOperator::answering(&[Selection::Index(0)]);
        let mut discovery = Discovery::new(&mut devices, &mut op, DiscoveryConfig::default());

        let mut seen = Vec::new();
        loop {
            seen.push(discovery.phase_name());
            match discovery.step() {
                StepResult::Continue => continue,
                StepResult::Done(target) => {
                    assert_eq!(target.partition.index, 0);
                    break;
                }
                StepResult::Failed(err) => panic!("discovery failed: {}", err),
            }
        }
        assert_eq!(
            seen,
            vec![
                "EnumDevices",
                "ReadGpt",
                "ValidateSignature",
                "ReadTable",
                "Classify",
                "Present",
                "Select"
            ]
        );
    }

    #[test]
    fn test_empty_gpt_is_skipped() {
        let mut empty = MemDisk::new(32768, BlockSize::BS_512);
        create_gpt(&mut empty, &mut GuidGenerator::new(14)).unwrap();

        let mut devices = vec![empty, boot_disk(15)];
        let mut op = ScriptedOperator::answering(&[Selection::Index(0)]);
        let target = find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()).unwrap();

        assert_eq!(target.device, 1);
        assert_eq!(op.skipped, vec![(0, SkipReason::NoPartitions)]);
        assert_eq!(op.presented, vec![(1, 2)]);
        assert_eq!(op.prompts, 1);
    }

    #[test]
    fn test_only_empty_gpt_is_no_selection() {
        let mut empty = MemDisk::new(32768, BlockSize::BS_512);
        create_gpt(&mut empty, &mut GuidGenerator::new(16)).unwrap();

        let mut devices = vec![empty];
        let mut op = ScriptedOperator::answering(&[Selection::Index(0); 4]);
        assert_eq!(
            find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()),
            Err(DiscoveryError::NoSelection)
        );
        assert!(op.presented.is_empty());
        assert_eq!(op.prompts, 0);
    }

    #[test]
    fn test_entry_outside_usable_range_is_ignored() {
        let mut disk = boot_disk(17);
        let mut header = read_primary_header(&mut disk).unwrap();
        let mut table = read_partition_table(&mut disk, &header).unwrap();

        let mut bogus = PartitionEntry::UNUSED;
        bogus.type_guid = BASIC_DATA;
        bogus.starting_lba = 1 << 60;
        bogus.ending_lba = (1 << 60) + 7;
        table.set_entry(2, &bogus);
        install_primary(&mut disk, &mut header, &table);

        let partitions = classify_partitions(&mut disk, &header, &table);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[1].index, 1);

        // Past the last entry but still counted as a slot
        bogus.starting_lba = 20000;
        bogus.ending_lba = 21000;
        table.set_entry(3, &bogus);
        install_primary(&mut disk, &mut header, &table);

        let partitions = classify_partitions(&mut disk, &header, &table);
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[2].index, 3);
        assert_eq!(partitions[2].offset_bytes, 20000 * 512);
    }

    #[test]
    fn test_keeps_at_most_128_partitions() {
        const ENTRIES: u32 = 200;
        let table_blocks = (ENTRIES as u64 * 128) / 512;
        let mut disk = MemDisk::new(32768, BlockSize::BS_512);
        let mut header = GptHeader::new_primary(32768, table_blocks, ENTRIES, BASIC_DATA);

        let mut table = PartitionTable::empty(ENTRIES as usize);
        let mut entry = PartitionEntry::UNUSED;
        entry.type_guid = BASIC_DATA;
        for i in 0..ENTRIES as usize {
            entry.starting_lba = header.first_usable_lba + 8 * i as u64;
            entry.ending_lba = entry.starting_lba + 7;
            table.set_entry(i, &entry);
        }
        install_primary(&mut disk, &mut header, &table);

        let mut devices = vec![disk];
        let mut op = ScriptedOperator::answering(&[Selection::Index(128), Selection::Index(127)]);
        let target = find_boot_target(&mut devices, &mut op, DiscoveryConfig::default()).unwrap();

        assert_eq!(op.presented, vec![(0, MAX_PARTITIONS)]);
        assert_eq!(target.partition.index, 127);
        assert_eq!(op.prompts, 2);
    }
}
