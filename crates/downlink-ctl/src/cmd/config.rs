//! `config init` / `config show`.

use anyhow::{Context, Result};

use downlink_core::config::DownlinkConfig;

pub fn cmd_init() -> Result<()> {
    let path = DownlinkConfig::write_default_if_missing().context("failed to write config")?;
    println!("Config file: {}", path.display());
    Ok(())
}

/// Print the effective config: file and environment resolved over defaults.
pub fn cmd_show(config: &DownlinkConfig) -> Result<()> {
    println!("# {}", DownlinkConfig::file_path().display());
    print!("{}", config.to_toml()?);
    Ok(())
}
