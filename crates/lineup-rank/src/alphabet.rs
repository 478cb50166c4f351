//! The base-62 symbol set.

/// Base-62 charset (0-9, A-Z, a-z).
/// Lexicographically ordered: '0' < '9' < 'A' < 'Z' < 'a' < 'z'.
pub const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of symbols in the alphabet.
pub const BASE: u8 = 62;

/// Midpoint of the alphabet, used as the first rank of an empty scope.
pub const MID_SYMBOL: u8 = b'V';

/// Alphabet position of a symbol, or `None` if it is not in the alphabet.
pub(crate) fn digit_of(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'Z' => Some(c - b'A' + 10),
        b'a'..=b'z' => Some(c - b'a' + 36),
        _ => None,
    }
}

/// Symbol at an alphabet position. Positions are always `< BASE`.
pub(crate) fn symbol(digit: u8) -> u8 {
    BASE62[digit as usize]
}
