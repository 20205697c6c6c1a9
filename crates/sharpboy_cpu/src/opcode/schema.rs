//! Serde shapes of the declarative opcode document.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawTable {
    pub unprefixed: BTreeMap<String, RawEntry>,
    pub prefixed: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RawEntry {
    pub mnemonic: Option<String>,
    pub bytes: u8,
    pub cycles: Vec<u32>,
    /// Kept optional so a missing array is reported by name rather than
    /// as a generic parse failure.
    pub operands: Option<Vec<RawOperand>>,
    pub flags: RawFlags,
}

#[derive(Debug, Deserialize)]
pub struct RawOperand {
    pub name: String,
    #[serde(default)]
    pub bytes: Option<u8>,
    pub immediate: bool,
    #[serde(default)]
    pub increment: bool,
    #[serde(default)]
    pub decrement: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct RawFlags {
    pub z: String,
    pub n: String,
    pub h: String,
    pub c: String,
}

impl RawTable {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse opcode table")
    }
}

/// Parse a `"0x3E"` style key.
pub fn parse_key(key: &str) -> Result<u8> {
    let Some(hex) = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) else {
        bail!("opcode key {key:?} lacks 0x prefix");
    };
    if hex.len() != 2 {
        bail!("opcode key {key:?} must have two hex digits");
    }
    u8::from_str_radix(hex, 16).with_context(|| format!("opcode key {key:?}"))
}
