//! Show-config command for printing the effective configuration.

use std::io::Write;

use anyhow::Result;

use crate::Config;

/// Writes the configuration with secrets redacted.
pub fn run(config: &Config, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{config:#?}")?;
    Ok(())
}
