use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comet_core::config::{AlignmentConfig, OperandConfig};
use comet_core::frame::FrameDescriptor;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a default AlignmentConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = AlignmentConfig {
        targets: vec![
            FrameDescriptor::new("light_001.fit", 1024.0, 768.0),
            FrameDescriptor::new("light_002.fit", 1026.5, 769.25),
        ],
        operand: Some(OperandConfig::new("comet_integration.fit")),
        ..Default::default()
    };
    let toml_str = toml::to_string_pretty(&config)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
