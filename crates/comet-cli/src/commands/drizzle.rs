use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comet_core::drizzle::read_drizzle_file;

#[derive(Args)]
pub struct DrizzleArgs {
    /// Drizzle data file (.drz)
    pub file: PathBuf,
}

pub fn run(args: &DrizzleArgs) -> Result<()> {
    let record = read_drizzle_file(&args.file)
        .with_context(|| format!("Failed to read drizzle data {}", args.file.display()))?;

    println!("File:        {}", args.file.display());
    println!("Source:      {}", record.source.display());
    println!("Target:      {}", record.target.display());
    println!("Reference:   {}x{}", record.width, record.height);
    println!("Matrix:");
    for row in record.matrix.matrix() {
        println!(
            "    {:>14.6} {:>14.6} {:>14.6}",
            row[0], row[1], row[2]
        );
    }

    Ok(())
}
