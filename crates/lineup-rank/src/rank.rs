//! The [`Rank`] value type.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RankError;
use crate::alphabet::{BASE, digit_of, symbol};

/// Number of leading symbols that contribute to [`Rank::as_fraction`].
/// 62^-10 is already below f64 resolution for values near 1.0.
const FRACTION_DIGITS: usize = 10;

/// An immutable, totally ordered position key.
///
/// Ordering is byte-wise, with a prefix sorting before any of its extensions.
/// That is exactly the derived `Ord` on the inner string, and exactly what
/// [`compare`] exposes for stores and tests.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rank(String);

impl Rank {
    /// Parse and validate a rank string.
    pub fn parse(s: &str) -> Result<Self, RankError> {
        validate(s)?;
        Ok(Self(s.to_string()))
    }

    /// The first rank handed out in an empty scope.
    pub fn initial() -> Self {
        Self("V".to_string())
    }

    /// The rank as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key length in symbols.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: ranks are never empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The rank read as a base-62 fraction in `(0, 1)`.
    ///
    /// Used for spacing metrics only. Ranks that differ past the tenth symbol
    /// may map to the same value.
    pub fn as_fraction(&self) -> f64 {
        let base = f64::from(BASE);
        let mut scale = 1.0 / base;
        let mut value = 0.0;
        for d in self.digits().into_iter().take(FRACTION_DIGITS) {
            value += f64::from(d) * scale;
            scale /= base;
        }
        value
    }

    /// Alphabet positions of each symbol.
    pub(crate) fn digits(&self) -> Vec<u8> {
        // Validated on construction, so every byte maps.
        self.0.bytes().filter_map(digit_of).collect()
    }

    /// Build from alphabet positions. Callers guarantee a non-empty digit
    /// string without a trailing zero.
    pub(crate) fn from_digits(digits: &[u8]) -> Self {
        let bytes: Vec<u8> = digits.iter().map(|&d| symbol(d)).collect();
        Self(bytes.into_iter().map(char::from).collect())
    }
}

fn validate(s: &str) -> Result<(), RankError> {
    let invalid = |reason| RankError::Invalid {
        rank: s.to_string(),
        reason,
    };
    let bytes = s.as_bytes();
    let Some(&last) = bytes.last() else {
        return Err(invalid("empty"));
    };
    if bytes.iter().any(|&c| digit_of(c).is_none()) {
        return Err(invalid("symbol outside base-62 alphabet"));
    }
    if last == b'0' {
        return Err(invalid("trailing minimum symbol"));
    }
    Ok(())
}

/// Byte-wise total order over ranks.
pub fn compare(a: &Rank, b: &Rank) -> Ordering {
    a.0.as_bytes().cmp(b.0.as_bytes())
}

impl FromStr for Rank {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Rank {
    type Error = RankError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate(&s)?;
        Ok(Self(s))
    }
}

impl From<Rank> for String {
    fn from(rank: Rank) -> String {
        rank.0
    }
}

impl AsRef<str> for Rank {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank({:?})", self.0)
    }
}
