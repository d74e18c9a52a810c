use std::collections::HashSet;
use std::ops::{Add, AddAssign};

use pallas::ledger::primitives::conway::NativeScript;

pub use pallas::ledger::primitives::conway::RedeemerTag;

use super::PubKeyHash;

/// Plutus language of a script payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    PlutusV1,
    PlutusV2,
    PlutusV3,
}

/// A Plutus script destined for the witness set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub kind: ScriptKind,
    pub bytes: Vec<u8>,
}

impl Script {
    pub fn new(kind: ScriptKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }
}

/// Plutus execution budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExUnits {
    pub fn new(mem: u64, steps: u64) -> Self {
        Self { mem, steps }
    }
}

impl AddAssign for ExUnits {
    fn add_assign(&mut self, rhs: ExUnits) {
        self.mem += rhs.mem;
        self.steps += rhs.steps;
    }
}

impl Add for ExUnits {
    type Output = ExUnits;

    fn add(mut self, rhs: ExUnits) -> ExUnits {
        self += rhs;
        self
    }
}

/// A redeemer whose index is assigned late, once the final order of the
/// transaction inputs is known.
#[derive(Debug, Clone, PartialEq)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    pub index: u32,
    /// Raw PlutusData CBOR.
    pub data: Vec<u8>,
    pub ex_units: ExUnits,
}

impl Redeemer {
    pub fn new(tag: RedeemerTag, data: Vec<u8>, ex_units: ExUnits) -> Self {
        Self {
            tag,
            index: 0,
            data,
            ex_units,
        }
    }
}

/// Collect every key hash a native script may demand a signature from,
/// walking nested combinators depth-first.
pub fn native_script_vkey_hashes(script: &NativeScript, hashes: &mut HashSet<PubKeyHash>) {
    match script {
        NativeScript::ScriptPubkey(hash) => {
            hashes.insert(*hash);
        }
        NativeScript::ScriptAll(children) | NativeScript::ScriptAny(children) => {
            for child in children {
                native_script_vkey_hashes(child, hashes);
            }
        }
        NativeScript::ScriptNOfK(_, children) => {
            for child in children {
                native_script_vkey_hashes(child, hashes);
            }
        }
        NativeScript::InvalidBefore(_) | NativeScript::InvalidHereafter(_) => {}
    }
}
