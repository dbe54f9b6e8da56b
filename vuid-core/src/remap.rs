//! Operator-supplied forced remapping of fresh sequence numbers onto old ones
//!
//! Expression grammar: `<new>-<old>[,<count>]`, several joined with `:`.
//! `5-2,3` remaps new sequences 5, 6, 7 onto old sequences 2, 3, 4.

use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

use crate::models::MAX_SEQUENCE;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemapError {
    #[error("remap expression is empty")]
    Empty,

    #[error("remap '{0}' must have the form <new>-<old>[,<count>]")]
    MissingSeparator(String),

    #[error("'{0}' is not a valid sequence number or count")]
    InvalidNumber(String),

    #[error("remap '{0}' has a count of zero")]
    ZeroCount(String),

    #[error("remap '{0}' runs past the largest sequence number")]
    Overflow(String),

    #[error("new sequence {new:05} is remapped to both {first:05} and {second:05}")]
    Conflict { new: u32, first: u32, second: u32 },
}

/// Forced remaps from a fresh entry's default sequence to an old sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemapTable {
    map: BTreeMap<u32, u32>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a remap expression
    pub fn parse(expression: &str) -> Result<Self, RemapError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(RemapError::Empty);
        }

        let mut table = RemapTable::new();
        for part in expression.split(':') {
            let part = part.trim();
            let (pair, count) = match part.split_once(',') {
                Some((pair, count)) => (pair, parse_number(count)?),
                None => (part, 1),
            };
            if count == 0 {
                return Err(RemapError::ZeroCount(part.to_string()));
            }

            let (new, old) = pair
                .split_once('-')
                .ok_or_else(|| RemapError::MissingSeparator(part.to_string()))?;
            let (new, old) = (parse_number(new)?, parse_number(old)?);

            for offset in 0..count {
                let in_range = |base: u32| {
                    base.checked_add(offset)
                        .filter(|sequence| *sequence <= MAX_SEQUENCE)
                };
                let (Some(from), Some(to)) = (in_range(new), in_range(old)) else {
                    return Err(RemapError::Overflow(part.to_string()));
                };
                table.insert(from, to)?;
            }
        }

        Ok(table)
    }

    /// Adds a single remap; remapping the same new sequence twice to
    /// different targets is rejected
    pub fn insert(&mut self, new: u32, old: u32) -> Result<(), RemapError> {
        match self.map.insert(new, old) {
            Some(first) if first != old => Err(RemapError::Conflict {
                new,
                first,
                second: old,
            }),
            _ => Ok(()),
        }
    }

    /// Old sequence that a fresh sequence is forced onto, if any
    pub fn get(&self, new: u32) -> Option<u32> {
        self.map.get(&new).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// (new, old) pairs in ascending order of the new sequence
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.map.iter().map(|(new, old)| (*new, *old))
    }
}

impl FromStr for RemapTable {
    type Err = RemapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RemapTable::parse(s)
    }
}

fn parse_number(value: &str) -> Result<u32, RemapError> {
    let value = value.trim();
    value
        .parse()
        .map_err(|_| RemapError::InvalidNumber(value.to_string()))
}
