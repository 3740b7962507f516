//! Candy boot storage core
//!
//! On-disk formats shared by the host image tool (`gptimg`) and the boot
//! loader. Both sides go through the same encode/decode code, so an image
//! written by one is always readable by the other.
//!
//! # Layout
//!
//! - `checksum` - table-driven CRC32 used to seal GPT headers and tables
//! - `disk` - GPT codec, partition allocator, boot-time discovery
//! - `fs` - filesystem signature detection and the FAT32 formatter
//! - `logger` - fixed-size ring of log messages
//!
//! Every operation is written against `gpt_disk_io::BlockIo`; the block size
//! is read from the device and never stored globally.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod checksum;
pub mod disk;
pub mod fs;
pub mod logger;

#[cfg(test)]
pub(crate) mod test_disk;
