mod flags;
mod image;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use candy_core::disk::discovery::classify_partitions;
use candy_core::disk::gpt_ops::{
    add_partition, create_gpt, guid_for_type, parse_size, read_partition_table,
    read_primary_header, scan_partitions, type_name, GuidGenerator,
};
use candy_core::fs::format_partition;
use candy_core::logger;
use eyre::{bail, eyre, Result, WrapErr};
use flags::GptimgCmd;
use gpt_disk_types::BlockSize;
use image::{block_size_from_flag, ImageFile};

fn main() -> Result<()> {
    color_eyre::install()?;

    let flags = flags::Gptimg::from_env_or_exit();
    let result = match flags.subcommand {
        GptimgCmd::Create(cmd) => create(&cmd.image, &cmd.size, cmd.lba_size),
        GptimgCmd::AddPartition(cmd) => add(
            &cmd.image,
            &cmd.size,
            &cmd.part_type,
            &cmd.name,
            cmd.lba_size,
        ),
        GptimgCmd::FormatPartition(cmd) => format(
            &cmd.image,
            cmd.partition,
            &cmd.cluster_size,
            cmd.lba_size,
        ),
        GptimgCmd::List(cmd) => list(&cmd.image, cmd.lba_size),
    };

    if flags.verbose {
        for entry in logger::get_logs_iter() {
            eprintln!("[{}] {}", entry.level.tag(), entry.message);
        }
    }

    result
}

fn guid_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos ^ ((std::process::id() as u64) << 32)
}

fn parse_blocks(text: &str, block_size: BlockSize) -> Result<u64> {
    match parse_size(text, block_size) {
        0 => bail!(
            "invalid size {:?}: expected a number with an optional K, M, G or T unit, at least one {}-byte block",
            text,
            block_size.to_u64()
        ),
        blocks => Ok(blocks),
    }
}

fn create(path: &Path, size: &str, lba_size: Option<u32>) -> Result<()> {
    let block_size = block_size_from_flag(lba_size)?;
    let blocks = parse_blocks(size, block_size)?;

    let mut image = ImageFile::create(path, blocks, block_size)?;
    let header = create_gpt(&mut image, &mut GuidGenerator::new(guid_seed()))
        .map_err(|e| eyre!("failed to write GPT to {}: {}", path.display(), e))?;

    println!(
        "Created {} ({} blocks of {} bytes, usable LBAs {}..={}, disk GUID {})",
        path.display(),
        blocks,
        block_size.to_u64(),
        header.first_usable_lba,
        header.last_usable_lba,
        header.disk_guid
    );
    Ok(())
}

fn add(
    path: &Path,
    size: &str,
    part_type: &str,
    name: &str,
    lba_size: Option<u32>,
) -> Result<()> {
    let block_size = block_size_from_flag(lba_size)?;
    let blocks = parse_blocks(size, block_size)?;
    let type_guid = guid_for_type(part_type).ok_or_else(|| {
        eyre!(
            "unknown partition type {:?} (known: efi, basic-data, linux)",
            part_type
        )
    })?;

    let mut image = ImageFile::open(path, block_size)?;
    let index = add_partition(
        &mut image,
        blocks,
        type_guid,
        name,
        &mut GuidGenerator::new(guid_seed()),
    )
    .map_err(|e| eyre!("could not add partition {:?}: {}", name, e))?;

    let entries = scan_partitions(&mut image).map_err(|e| eyre!("{}", e))?;
    let entry = entries
        .get(index)
        .ok_or_else(|| eyre!("partition {} missing after write", index + 1))?;
    println!(
        "Added partition {} {:?} at LBAs {}..={}",
        index + 1,
        name,
        entry.starting_lba,
        entry.ending_lba
    );
    Ok(())
}

fn format(
    path: &Path,
    partition: usize,
    cluster_size: &str,
    lba_size: Option<u32>,
) -> Result<()> {
    if partition == 0 {
        bail!("partition numbers start at 1");
    }
    let block_size = block_size_from_flag(lba_size)?;
    // Anything under one block formats with one block per cluster
    let cluster_blocks = parse_size(cluster_size, block_size);
    let bytes_per_cluster = u32::try_from(cluster_blocks * block_size.to_u64())
        .wrap_err("cluster size too large")?;

    let mut image = ImageFile::open(path, block_size)?;
    let layout = format_partition(&mut image, partition - 1, bytes_per_cluster)
        .map_err(|e| eyre!("could not format partition {}: {}", partition, e))?;

    println!(
        "Formatted partition {} as FAT32: {} clusters of {} bytes, FAT size {} sectors",
        partition,
        layout.total_clusters,
        layout.bytes_per_cluster(),
        layout.fat_size
    );
    Ok(())
}

fn list(path: &Path, lba_size: Option<u32>) -> Result<()> {
    let block_size = block_size_from_flag(lba_size)?;
    let mut image = ImageFile::open(path, block_size)?;

    let header = read_primary_header(&mut image).map_err(|e| eyre!("{}: {}", path.display(), e))?;
    let table =
        read_partition_table(&mut image, &header).map_err(|e| eyre!("{}: {}", path.display(), e))?;
    let partitions = classify_partitions(&mut image, &header, &table);

    println!("Disk GUID {}", header.disk_guid);
    println!(
        "{:>3} | {:<24} | {:>9} | {:<6} | {:<10} | GUID",
        "id", "Name", "Size (MB)", "FS", "Type"
    );
    for p in &partitions {
        println!(
            "{:>3} | {:<24} | {:>9} | {:<6} | {:<10} | {}",
            p.index + 1,
            p.name,
            p.size_bytes / (1024 * 1024),
            p.fs.name(),
            type_name(&p.type_guid),
            p.unique_guid
        );
    }
    Ok(())
}
