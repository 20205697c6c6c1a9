//! Data-driven opcode table.
//!
//! The table is loaded once from the declarative JSON document, validated
//! entry by entry and compiled into micro-op schedules. It is immutable
//! afterwards and handed to the CPU explicitly.

mod operand;
mod schema;

use std::fmt;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};

pub use operand::{Condition, Mnemonic, Operand, PointerStep};

use crate::cpu::flags::FlagPolicy;
use crate::cpu::Flag;
use crate::micro::{self, Schedule};
use schema::{RawEntry, RawTable};

/// Opcode byte selecting the prefixed (CB) table.
pub const PREFIX_BYTE: u8 = 0xCB;

/// Opcode document bundled with the crate.
pub const DEFAULT_TABLE_JSON: &str = include_str!("../data/opcodes.json");

/// Immutable description of one opcode.
#[derive(Clone, Debug)]
pub struct OpcodeInfo {
    pub code: u8,
    pub prefixed: bool,
    pub mnemonic: Mnemonic,
    /// Length including the opcode byte (and the prefix).
    pub bytes: u8,
    /// `[taken]`, or `[taken, not taken]` for conditional branches.
    pub cycles: Vec<u32>,
    pub operands: Vec<Operand>,
    pub flags: FlagPolicy,
    pub schedule: Schedule,
}

impl OpcodeInfo {
    fn from_raw(code: u8, prefixed: bool, raw: RawEntry) -> Result<Self> {
        let Some(name) = raw.mnemonic else {
            bail!("missing mnemonic");
        };
        let mnemonic: Mnemonic = name.parse()?;
        let Some(raw_operands) = raw.operands else {
            bail!("{mnemonic}: missing operand array");
        };

        let count = raw_operands.len();
        let operands = raw_operands
            .iter()
            .enumerate()
            .map(|(index, operand)| Operand::parse(operand, mnemonic, index, count))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("{mnemonic} operands"))?;

        let flags = FlagPolicy([
            FlagPolicy::parse_effect(Flag::Z, &raw.flags.z)?,
            FlagPolicy::parse_effect(Flag::N, &raw.flags.n)?,
            FlagPolicy::parse_effect(Flag::H, &raw.flags.h)?,
            FlagPolicy::parse_effect(Flag::C, &raw.flags.c)?,
        ]);

        let prefix_len = u8::from(prefixed);
        let needed = 1
            + usize::from(prefix_len)
            + operands
                .iter()
                .map(|operand| usize::from(operand.immediate_bytes()))
                .sum::<usize>();
        ensure!(
            usize::from(raw.bytes) == needed,
            "{mnemonic}: declares {} bytes, operands need {needed}",
            raw.bytes
        );

        let schedule = micro::compile(
            mnemonic,
            &operands,
            &raw.cycles,
            flags,
            1 + u32::from(prefix_len),
        )
        .with_context(|| format!("{mnemonic} schedule"))?;

        Ok(Self {
            code,
            prefixed,
            mnemonic,
            bytes: raw.bytes,
            cycles: raw.cycles,
            operands,
            flags,
            schedule,
        })
    }

    pub fn is_conditional(&self) -> bool {
        self.cycles.len() == 2
    }
}

impl fmt::Display for OpcodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{operand}")?;
        }
        Ok(())
    }
}

/// Both halves of the instruction set, indexed by opcode byte.
#[derive(Debug)]
pub struct OpcodeTable {
    unprefixed: Vec<Option<OpcodeInfo>>,
    prefixed: Vec<Option<OpcodeInfo>>,
}

impl OpcodeTable {
    /// Load the bundled table.
    pub fn load_default() -> Result<Self> {
        Self::from_json(DEFAULT_TABLE_JSON).context("bundled opcode table")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read opcode table {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("opcode table {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw = RawTable::from_json(text)?;
        let unprefixed = build_half("unprefixed", false, raw.unprefixed)?;
        let prefixed = build_half("prefixed", true, raw.prefixed)?;

        let table = Self {
            unprefixed,
            prefixed,
        };
        log::info!(
            "opcode table loaded: {} unprefixed, {} prefixed",
            table.unprefixed.iter().flatten().count(),
            table.prefixed.iter().flatten().count(),
        );
        Ok(table)
    }

    #[inline]
    pub fn unprefixed(&self, code: u8) -> Option<&OpcodeInfo> {
        self.unprefixed[code as usize].as_ref()
    }

    #[inline]
    pub fn prefixed(&self, code: u8) -> Option<&OpcodeInfo> {
        self.prefixed[code as usize].as_ref()
    }

    /// Number of mapped opcodes across both halves.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every mapped opcode, unprefixed first.
    pub fn iter(&self) -> impl Iterator<Item = &OpcodeInfo> {
        self.unprefixed.iter().chain(self.prefixed.iter()).flatten()
    }
}

fn build_half(
    half: &str,
    prefixed: bool,
    entries: std::collections::BTreeMap<String, RawEntry>,
) -> Result<Vec<Option<OpcodeInfo>>> {
    let mut slots: Vec<Option<OpcodeInfo>> = (0..256).map(|_| None).collect();
    for (key, raw) in entries {
        let code = schema::parse_key(&key).with_context(|| format!("{half} {key}"))?;
        let slot = &mut slots[code as usize];
        if slot.is_some() {
            bail!("{half} {key}: duplicate entry");
        }
        let info =
            OpcodeInfo::from_raw(code, prefixed, raw).with_context(|| format!("{half} {key}"))?;
        *slot = Some(info);
    }
    Ok(slots)
}
