//! ---
//! ws_section: "05-operator-interface"
//! ws_subsection: "binary"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Operator CLI driving update sessions and lifecycle commands."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;

use crate::OutputFormat;

/// Write `value` to stdout in the requested format.
pub fn emit<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(value)?;
            json.push('\n');
            json
        }
    };
    let mut stdout = io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
