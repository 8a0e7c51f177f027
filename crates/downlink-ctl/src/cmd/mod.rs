//! CLI command modules.

pub mod config;
pub mod generate;
pub mod run;

use anyhow::{Context, Result};

/// Value following flag `args[i]`.
pub(crate) fn flag_value<'a>(args: &[&'a str], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .copied()
        .with_context(|| format!("{flag} requires a value"))
}

pub(crate) fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("{flag} must be a number, got '{value}'"))
}
