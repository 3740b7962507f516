use std::path::PathBuf;

xflags::xflags! {
    /// Create and edit GPT disk images.
    cmd gptimg {
        /// Print the core log ring to stderr when done
        optional -v, --verbose

        /// Create a blank GPT image (overwrites an existing file)
        cmd create {
            required image: PathBuf
            /// Image size, e.g. 64M
            required --size size: String
            /// Logical block size, 512 (default) or 4096
            optional --lba-size lba_size: u32
        }

        /// Append a partition after the last one
        cmd add-partition {
            required image: PathBuf
            required --size size: String
            /// Partition type: efi, basic-data or linux
            required --part-type part_type: String
            required --name name: String
            optional --lba-size lba_size: u32
        }

        /// Format a partition as FAT32
        cmd format-partition {
            required image: PathBuf
            /// Partition number as printed by add-partition (starts at 1)
            required --partition partition: usize
            required --cluster-size cluster_size: String
            optional --lba-size lba_size: u32
        }

        /// Show the partitions of an image and what they contain
        cmd list {
            required image: PathBuf
            optional --lba-size lba_size: u32
        }
    }
}
