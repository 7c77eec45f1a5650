//! Query predicates
//!
//! A predicate selects which stored records a cursor yields. Engines consume
//! predicates exhaustively in their `find` implementations.

use std::cmp::Ordering;

use crate::codec::RecordInfo;
use crate::error::{CairnError, Result};
use crate::types::KeyType;

/// A single-condition query over stored keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Keys equal to the given key
    Equality(Vec<u8>),
    /// Keys in the inclusive range `[lower, upper]`
    Range(Vec<u8>, Vec<u8>),
    /// Every stored record
    AllRecords,
}

impl Predicate {
    pub fn equality(key: impl Into<Vec<u8>>) -> Self {
        Predicate::Equality(key.into())
    }

    pub fn range(lower: impl Into<Vec<u8>>, upper: impl Into<Vec<u8>>) -> Self {
        Predicate::Range(lower.into(), upper.into())
    }

    /// Check key widths and, for ranges, that `lower <= upper`
    pub fn validate(&self, info: &RecordInfo) -> Result<()> {
        match self {
            Predicate::Equality(key) => info.check_key(key),
            Predicate::Range(lower, upper) => {
                info.check_key(lower)?;
                info.check_key(upper)?;
                if info.key_type.compare(lower, upper) == Ordering::Greater {
                    return Err(CairnError::invalid("range lower bound exceeds upper bound"));
                }
                Ok(())
            }
            Predicate::AllRecords => Ok(()),
        }
    }

    /// Does `key` satisfy this predicate?
    pub fn matches(&self, key_type: KeyType, key: &[u8]) -> bool {
        match self {
            Predicate::Equality(target) => key_type.compare(key, target) == Ordering::Equal,
            Predicate::Range(lower, upper) => {
                key_type.compare(key, lower) != Ordering::Less
                    && key_type.compare(key, upper) != Ordering::Greater
            }
            Predicate::AllRecords => true,
        }
    }

    /// Smallest key a match can have, if bounded below
    pub fn lower_bound(&self) -> Option<&[u8]> {
        match self {
            Predicate::Equality(key) => Some(key),
            Predicate::Range(lower, _) => Some(lower),
            Predicate::AllRecords => None,
        }
    }

    /// True once an ordered scan has passed every possible match
    pub fn is_past_end(&self, key_type: KeyType, key: &[u8]) -> bool {
        match self {
            Predicate::Equality(target) => key_type.compare(key, target) == Ordering::Greater,
            Predicate::Range(_, upper) => key_type.compare(key, upper) == Ordering::Greater,
            Predicate::AllRecords => false,
        }
    }
}
