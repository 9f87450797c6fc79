//! The six possible selection inputs (three 1X2 strings, two OU strings,
//! plus their keccak pre-images) are a closed set; modeled here as a tagged
//! variant with codecs to both the human-readable and hashed-bytes forms.

use std::sync::OnceLock;

use sha3::{Digest, Keccak256};

use crate::error::{OddysseyError, PredicateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneylinePick {
    Home,
    Draw,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverUnderPick {
    Over,
    Under,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Moneyline(MoneylinePick),
    OverUnder(OverUnderPick),
}

impl Selection {
    /// The canonical selection string: `"1"`, `"X"`, `"2"`, `"Over"`,
    /// `"Under"`.
    pub fn canonical(&self) -> &'static str {
        match self {
            Selection::Moneyline(MoneylinePick::Home) => "1",
            Selection::Moneyline(MoneylinePick::Draw) => "X",
            Selection::Moneyline(MoneylinePick::Away) => "2",
            Selection::OverUnder(OverUnderPick::Over) => "Over",
            Selection::OverUnder(OverUnderPick::Under) => "Under",
        }
    }

    /// `0` for Moneyline, `1` for OverUnder — matches the on-chain
    /// `betType` field.
    pub fn bet_type(&self) -> u8 {
        match self {
            Selection::Moneyline(_) => 0,
            Selection::OverUnder(_) => 1,
        }
    }

    /// Parses a human-readable selection. Accepted case-insensitively on the
    /// canonical alphabet only — no locale-aware folding.
    pub fn from_human(raw: &str) -> Result<Self, OddysseyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PredicateError::EmptySelection.into());
        }
        let selection = match trimmed {
            s if s == "1" => Selection::Moneyline(MoneylinePick::Home),
            s if s.eq_ignore_ascii_case("X") => Selection::Moneyline(MoneylinePick::Draw),
            s if s == "2" => Selection::Moneyline(MoneylinePick::Away),
            s if s.eq_ignore_ascii_case("Over") => Selection::OverUnder(OverUnderPick::Over),
            s if s.eq_ignore_ascii_case("Under") => Selection::OverUnder(OverUnderPick::Under),
            _ => return Err(PredicateError::EmptySelection.into()),
        };
        Ok(selection)
    }

    /// `canonicalSelection ↔ keccakHash(canonicalSelection)` is a bijection
    /// over the canonical strings; this is the inverse.
    pub fn from_hash(hash: &[u8; 32]) -> Result<Self, OddysseyError> {
        hash_table()
            .iter()
            .find(|(h, _)| h == hash)
            .map(|(_, s)| *s)
            .ok_or_else(|| PredicateError::EmptySelection.into())
    }

    pub fn keccak(&self) -> [u8; 32] {
        keccak_of(self.canonical())
    }
}

fn keccak_of(s: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(s.as_bytes());
    hasher.finalize().into()
}

fn hash_table() -> &'static [([u8; 32], Selection)] {
    static TABLE: OnceLock<Vec<([u8; 32], Selection)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        const ALL: [Selection; 5] = [
            Selection::Moneyline(MoneylinePick::Home),
            Selection::Moneyline(MoneylinePick::Draw),
            Selection::Moneyline(MoneylinePick::Away),
            Selection::OverUnder(OverUnderPick::Over),
            Selection::OverUnder(OverUnderPick::Under),
        ];
        ALL.iter().map(|s| (keccak_of(s.canonical()), *s)).collect()
    })
}

/// What a caller actually submits for one prediction: either the
/// human-readable canonical string or its pre-hashed on-chain form.
#[derive(Debug, Clone)]
pub enum SelectionInput {
    Human(String),
    Hashed([u8; 32]),
}

impl SelectionInput {
    pub fn resolve(&self) -> Result<Selection, OddysseyError> {
        match self {
            SelectionInput::Human(s) => Selection::from_human(s),
            SelectionInput::Hashed(h) => Selection::from_hash(h),
        }
    }
}
