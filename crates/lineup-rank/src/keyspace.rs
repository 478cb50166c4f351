//! Midpoint generation and even spreading.

use serde::{Deserialize, Serialize};

use crate::alphabet::BASE;
use crate::{Rank, RankError};

/// Default maximum key length.
pub const DEFAULT_MAX_LEN: usize = 64;

/// Key generation policy.
///
/// Only the maximum key length is configurable; the alphabet is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySpace {
    /// Longest key [`KeySpace::midpoint`] and [`KeySpace::spread`] may return.
    pub max_len: usize,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

/// [`KeySpace::midpoint`] with the default key space.
pub fn midpoint(lower: Option<&Rank>, upper: Option<&Rank>) -> Result<Rank, RankError> {
    KeySpace::default().midpoint(lower, upper)
}

impl KeySpace {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Compute a rank strictly between `lower` and `upper`.
    ///
    /// A missing bound is an open end of the scope: `(None, None)` yields
    /// [`Rank::initial`], `(None, Some(u))` something below `u`, and
    /// `(Some(l), None)` something above `l`.
    ///
    /// When the first differing symbols are adjacent and the upper key
    /// continues past that position, the result is the upper key's prefix
    /// through that symbol: `("a", "bV")` gives `"b"`, not `"aV"`. The
    /// prefix sorts strictly between the bounds and keeps keys one symbol
    /// shorter than appending the middle symbol would.
    ///
    /// The result is a pure function of the inputs, so a retried request
    /// proposes the same key.
    pub fn midpoint(&self, lower: Option<&Rank>, upper: Option<&Rank>) -> Result<Rank, RankError> {
        if let (Some(l), Some(u)) = (lower, upper) {
            if l >= u {
                return Err(invalid_range(l, u));
            }
        }

        let lo = lower.map(Rank::digits).unwrap_or_default();
        let hi = upper.map(Rank::digits);

        let digits = self
            .midpoint_digits(&lo, hi.as_deref())?
            .ok_or_else(|| RankError::InvalidRange {
                lower: lower.map(Rank::to_string).unwrap_or_default(),
                upper: upper.map(Rank::to_string).unwrap_or_default(),
            })?;
        Ok(Rank::from_digits(&digits))
    }

    /// Digit-level midpoint. `lo` is zero-padded on the right; `hi = None`
    /// stands for one past the largest key.
    ///
    /// Returns `Ok(None)` when `hi` does not sort above `lo`.
    fn midpoint_digits(&self, mut lo: &[u8], mut hi: Option<&[u8]>) -> Result<Option<Vec<u8>>, RankError> {
        let mut out = Vec::new();
        loop {
            if let Some(h) = hi {
                let common = h
                    .iter()
                    .enumerate()
                    .take_while(|&(i, &d)| lo.get(i).copied().unwrap_or(0) == d)
                    .count();
                out.extend_from_slice(&h[..common]);
                lo = &lo[common.min(lo.len())..];
                let rest = &h[common..];
                if rest.is_empty() {
                    return Ok(None);
                }
                hi = Some(rest);
            }
            if out.len() >= self.max_len {
                return Err(RankError::Exhausted {
                    max_len: self.max_len,
                });
            }

            let dl = lo.first().copied().unwrap_or(0);
            let dh = hi.map(|h| h[0]).unwrap_or(BASE);
            if dh <= dl {
                return Ok(None);
            }

            if dh - dl > 1 {
                // Room at this position: take the middle symbol, rounding down.
                out.push((dl + dh) / 2);
                return Ok(Some(out));
            }

            // Adjacent symbols.
            if let Some(h) = hi.filter(|h| h.len() > 1) {
                // `h[0]` alone is a proper prefix of the upper key.
                out.push(h[0]);
                return Ok(Some(out));
            }
            out.push(dl);
            lo = lo.get(1..).unwrap_or(&[]);
            hi = None;
        }
    }

    /// `n` strictly increasing ranks evenly dividing the key space.
    ///
    /// All keys share one width: the smallest that leaves at least a full
    /// alphabet of room between neighbours. Trailing minimum symbols are
    /// trimmed, which keeps both validity and order.
    pub fn spread(&self, n: usize) -> Result<Vec<Rank>, RankError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let exhausted = RankError::Exhausted {
            max_len: self.max_len,
        };
        let base = u128::from(BASE);
        let slots = n as u128 + 1;

        let mut width = 1usize;
        let mut space = base;
        while space / slots < base {
            width += 1;
            space = space.checked_mul(base).ok_or_else(|| exhausted.clone())?;
        }
        if width > self.max_len {
            return Err(exhausted);
        }

        let step = space / slots;
        let remainder = space % slots;
        (1..=n as u128)
            .map(|i| {
                let offset = remainder
                    .checked_mul(i)
                    .map(|r| r / slots)
                    .ok_or_else(|| exhausted.clone())?;
                let value = step
                    .checked_mul(i)
                    .and_then(|v| v.checked_add(offset))
                    .ok_or_else(|| exhausted.clone())?;
                Ok(Rank::from_digits(&fixed_width_digits(value, width)))
            })
            .collect()
    }
}

/// Base-62 digits of `value`, left-padded to `width`, trailing zeros trimmed.
fn fixed_width_digits(mut value: u128, width: usize) -> Vec<u8> {
    let base = u128::from(BASE);
    let mut digits = vec![0u8; width];
    for slot in digits.iter_mut().rev() {
        *slot = (value % base) as u8;
        value /= base;
    }
    while digits.last() == Some(&0) {
        digits.pop();
    }
    digits
}

fn invalid_range(lower: &Rank, upper: &Rank) -> RankError {
    RankError::InvalidRange {
        lower: lower.to_string(),
        upper: upper.to_string(),
    }
}
