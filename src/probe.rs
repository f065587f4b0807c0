//! Platform probe (C7).
//!
//! One code unit, run once per session (and again after any reset) to learn
//! what the device can do before the transfer pipeline or command layer
//! makes any decisions that depend on it: whether `deflate` is present, how
//! much RAM is free, and a stable identifier for the board.

use crate::commands::{helpers, literal::Literal};
use crate::error::{Error, Result};
use crate::repl::ReplEngine;
use crate::transport::Transport;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a probe learned about the device, decoded from `_bl.probe()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub platform: String,
    pub version: String,
    pub impl_name: String,
    pub machine: String,
    pub unique_id: Vec<u8>,
    pub free_ram: i64,
    pub has_deflate: bool,
    pub has_hashlib: bool,
    pub bytecode_version: i64,
}

/// Run the probe over `engine`, requiring the helper surface to already be
/// installed (see [`crate::commands::install_helpers`]).
pub fn probe<T: Transport>(engine: &mut ReplEngine<T>) -> Result<Capabilities> {
    let out = engine.exec_raw(helpers::probe().as_bytes(), DEFAULT_TIMEOUT)?;
    let text = String::from_utf8_lossy(&out.stdout);
    let lit = crate::commands::literal::parse(text.trim())
        .map_err(|e| Error::desync(format!("{e} (raw: {text:?})")))?;
    let pairs = lit
        .as_pairs()
        .ok_or_else(|| Error::desync("probe: expected a dict literal"))?;

    let mut platform = String::new();
    let mut version = String::new();
    let mut impl_name = String::new();
    let mut machine = String::new();
    let mut unique_id = Vec::new();
    let mut free_ram = -1i64;
    let mut has_deflate = false;
    let mut has_hashlib = false;
    let mut bytecode_version = 0i64;

    for (key, value) in pairs {
        let key = key
            .as_str()
            .ok_or_else(|| Error::desync("probe: non-string key"))?;
        match key {
            "platform" => platform = string_field(value)?,
            "version" => version = string_field(value)?,
            "impl" => impl_name = string_field(value)?,
            "machine" => machine = string_field(value)?,
            "unique_id" => unique_id = bytes_field(value)?,
            "free_ram" => free_ram = value.as_int().unwrap_or(-1),
            "has_deflate" => has_deflate = matches!(value, Literal::Bool(true)),
            "has_hashlib" => has_hashlib = matches!(value, Literal::Bool(true)),
            "bytecode_version" => bytecode_version = value.as_int().unwrap_or(0),
            _ => {}
        }
    }

    Ok(Capabilities {
        platform,
        version,
        impl_name,
        machine,
        unique_id,
        free_ram,
        has_deflate,
        has_hashlib,
        bytecode_version,
    })
}

fn string_field(value: &Literal) -> Result<String> {
    Ok(value.as_str().unwrap_or_default().to_string())
}

fn bytes_field(value: &Literal) -> Result<Vec<u8>> {
    Ok(value.as_bytes().map(|b| b.to_vec()).unwrap_or_default())
}
