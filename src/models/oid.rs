// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cmp::Ordering, fmt, str::FromStr};

use thiserror::Error;

use crate::error::{ErrorKind, SnmpError, SnmpResult};

/// Maximum number of subidentifiers an OID may carry.
pub const MAX_OID_LEN: usize = 128;

/// Object identifier: an ordered sequence of 32-bit subidentifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Oid {
    subids: Vec<u32>,
}

#[derive(Debug, Error)]
#[error("invalid OID component: {0}")]
pub struct OidParseError(pub String);

impl Oid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(subids: &[u32]) -> SnmpResult<Self> {
        if subids.len() > MAX_OID_LEN {
            return Err(SnmpError::with_detail(
                ErrorKind::GenErr,
                format!("OID of {} subids exceeds {MAX_OID_LEN}", subids.len()),
            ));
        }
        Ok(Self {
            subids: subids.to_vec(),
        })
    }

    pub fn from_vec(subids: Vec<u32>) -> SnmpResult<Self> {
        if subids.len() > MAX_OID_LEN {
            return Err(SnmpError::with_detail(
                ErrorKind::GenErr,
                format!("OID of {} subids exceeds {MAX_OID_LEN}", subids.len()),
            ));
        }
        Ok(Self { subids })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.subids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subids.is_empty()
    }

    /// Append one subidentifier (used to build instance OIDs).
    pub fn push(&mut self, subid: u32) -> SnmpResult<()> {
        if self.subids.len() >= MAX_OID_LEN {
            return Err(SnmpError::with_detail(
                ErrorKind::GenErr,
                "OID already at maximum length",
            ));
        }
        self.subids.push(subid);
        Ok(())
    }

    /// True when `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Oid) -> bool {
        other.subids.starts_with(&self.subids)
    }

    /// Lexicographic-by-subid ordering with length as tiebreak: the
    /// shorter OID sorts first when one is a prefix of the other.
    pub fn compare(&self, other: &Oid) -> Ordering {
        for (a, b) in self.subids.iter().zip(other.subids.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {},
                non_eq => return non_eq,
            }
        }
        self.subids.len().cmp(&other.subids.len())
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for subid in &self.subids {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{subid}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Ok(Oid::new());
        }
        let mut subids = Vec::new();
        for part in trimmed.split('.') {
            let subid: u32 = part
                .parse()
                .map_err(|_| OidParseError(part.to_string()))?;
            subids.push(subid);
        }
        Oid::from_vec(subids).map_err(|_| OidParseError(s.to_string()))
    }
}
