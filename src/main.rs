use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use fatblock::device::format_size;
use fatblock::{FatblockConfig, Volume, VolumeReader};

const USAGE: &str = "usage: fatblock <root-dir> <size-mb> <output.img> [config.json]";

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("fatblock {}", env!("APP_VERSION"));
        return Ok(());
    }
    if args.len() < 3 || args.len() > 4 {
        bail!("{USAGE}");
    }

    let root = PathBuf::from(&args[0]);
    let size_mb: u64 = args[1]
        .parse()
        .with_context(|| format!("invalid size in MiB: {}", args[1]))?;
    let output = PathBuf::from(&args[2]);
    let config = match args.get(3) {
        Some(path) => FatblockConfig::load_from_path(path)?,
        None => FatblockConfig::load(),
    };

    let mut volume = Volume::import(&root, size_mb, &config)
        .with_context(|| format!("failed to import {}", root.display()))?;
    eprintln!(
        "Imported {} files and {} directories into a {} volume",
        volume.tree().files.len(),
        volume.tree().dirs.len(),
        format_size(volume.size())
    );

    let file = File::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut reader = VolumeReader::new(&mut volume);
    let written = io::copy(&mut reader, &mut writer)
        .with_context(|| format!("failed to write {}", output.display()))?;
    writer.flush()?;

    eprintln!("Wrote {} to {}", format_size(written), output.display());
    Ok(())
}
