mod create_modify;
pub mod guid;
pub mod layout;
mod scan;
mod types;
pub mod utils;

pub use create_modify::{add_partition, create_gpt, write_gpt_headers, write_protective_mbr};
pub use guid::{guid_for_type, type_name, GuidGenerator};
pub use layout::{GptHeader, PartitionEntry, PartitionTable, ProtectiveMbr};
pub use scan::{read_partition_table, read_primary_header, read_secondary_header, scan_partitions};
pub use types::*;
pub use utils::{align_up, alignment_lbas, parse_size, table_blocks};
