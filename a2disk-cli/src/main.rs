//! a2disk CLI - Inspect and stage Apple II disk images.
//!
//! Usage:
//!   a2disk --root DIR|BUNDLE.zip <command>
//!
//! Examples:
//!   a2disk --root /media/sd scan              # List images under /apple or /
//!   a2disk --root /media/sd scan --json       # Same, as JSON
//!   a2disk --root games.zip mount -i 3        # Stage image 3 in drive 1
//!   a2disk --root /media/sd mount -d 2 -i 0   # Stage image 0 in drive 2

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use a2disk_core::{
    ArchiveStorage, Disk2Card, DiskConfig, DiskSystem, HostStorage, Storage,
};

/// Apple II disk image staging
#[derive(Parser, Debug)]
#[command(name = "a2disk")]
#[command(about = "Scan and mount Apple II disk images")]
struct Args {
    /// Storage root: a directory, or a ZIP bundle of images
    #[arg(short, long)]
    root: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Preferred image directory (overrides the config)
    #[arg(long)]
    image_dir: Option<String>,

    /// Disk II slot (overrides the config)
    #[arg(long)]
    slot: Option<u8>,

    /// Enable debug logging
    #[arg(short, long)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the disk images found on the storage root
    Scan {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load an image into a drive and mount it in a Disk II card
    Mount {
        /// Drive number (1 or 2)
        #[arg(short, long, default_value_t = 1)]
        drive: usize,

        /// Catalog index (as printed by `scan`)
        #[arg(short, long)]
        index: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.trace {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let mut config = match &args.config {
        Some(path) => DiskConfig::from_path(path)?,
        None => DiskConfig::default(),
    };
    if let Some(dir) = &args.image_dir {
        config.image_dir = dir.clone();
    }
    if let Some(slot) = args.slot {
        config.slot = slot;
    }

    if is_bundle(&args.root) {
        let storage = ArchiveStorage::from_path(&args.root)?;
        run(DiskSystem::new(storage, config), &args.command)
    } else {
        if !args.root.is_dir() {
            return Err(format!("{} is not a directory", args.root.display()).into());
        }
        run(DiskSystem::new(HostStorage::new(&args.root), config), &args.command)
    }
}

fn is_bundle(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn run<S: Storage>(
    mut disks: DiskSystem<S>,
    command: &Command,
) -> Result<(), Box<dyn std::error::Error>> {
    disks.init();

    match command {
        Command::Scan { json } => {
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(disks.catalog().entries())?
                );
                return Ok(());
            }
            match disks.catalog().scanned_dir() {
                Some(dir) => println!("{} ({} images)", dir, disks.catalog().len()),
                None => println!("No image directory found"),
            }
            for (i, entry) in disks.catalog().entries().iter().enumerate() {
                println!(
                    "  [{:2}] {:<32} {:>8} bytes  {:?}",
                    i, entry.filename, entry.size, entry.kind
                );
            }
        }
        Command::Mount { drive, index } => {
            let drive = drive
                .checked_sub(1)
                .ok_or("drive numbers start at 1")?;
            let slot = disks.config().slot;
            let mut card = Disk2Card::new(slot);

            if let Err(e) = disks.load(drive, *index) {
                if e.is_validation() {
                    eprintln!("Run `a2disk scan` to list drive images and their indices");
                }
                return Err(e.into());
            }
            let result = disks.mount(drive, &mut card, slot);
            if let Err(e) = result {
                disks.unload(drive)?;
                return Err(e.into());
            }

            let tracks = card.drive(drive).map_or(0, |f| f.tracks().len());
            let slot_info = disks.slot(drive);
            println!(
                "Drive {}: {} ({} bytes, {} tracks, bootable: {})",
                drive + 1,
                slot_info.and_then(|s| s.filename()).unwrap_or("-"),
                slot_info.map_or(0, |s| s.size()),
                tracks,
                card.is_bootable()
            );

            disks.eject(drive, &mut card, slot)?;
            disks.unload(drive)?;
        }
    }

    disks.shutdown()?;
    Ok(())
}
