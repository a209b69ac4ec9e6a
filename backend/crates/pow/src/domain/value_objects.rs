//! Domain Value Objects
//!
//! Immutable value types for the PoW domain.

/// Difficulty in leading zero bits of the solution hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Difficulty(u8);

impl Difficulty {
    pub const DEFAULT: Difficulty = Difficulty(16);
    pub const MAX: u8 = 63;

    pub fn new(bits: u8) -> Option<Self> {
        (bits <= Self::MAX).then_some(Self(bits))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn target(&self) -> DifficultyTarget {
        DifficultyTarget::from_bits(self.0)
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<Difficulty> for u8 {
    fn from(d: Difficulty) -> Self {
        d.0
    }
}

/// Difficulty expressed over the hex digest
///
/// `bits / 4` leading hex digits must be `0`; when `bits % 4 != 0` the next
/// digit must not exceed `2^(4 - bits % 4) - 1`. Together these require
/// exactly `bits` leading zero bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyTarget {
    pub zero_digits: usize,
    /// Largest value allowed for the digit after the zero run
    pub partial_max: Option<u8>,
}

impl DifficultyTarget {
    pub fn from_bits(bits: u8) -> Self {
        let remainder = bits % 4;
        Self {
            zero_digits: usize::from(bits / 4),
            partial_max: (remainder != 0).then(|| (1u8 << (4 - remainder)) - 1),
        }
    }

    /// Prefix upper bound, e.g. `00003` for 18 bits
    pub fn prefix(&self) -> String {
        let mut prefix = "0".repeat(self.zero_digits);
        if let Some(max) = self.partial_max {
            prefix.push(char::from_digit(u32::from(max), 16).unwrap_or('f'));
        }
        prefix
    }

    /// Check a lowercase or uppercase hex digest against the target
    pub fn is_met_by(&self, hash_hex: &str) -> bool {
        let digits = hash_hex.as_bytes();
        if digits.len() < self.zero_digits + usize::from(self.partial_max.is_some()) {
            return false;
        }
        if !digits[..self.zero_digits].iter().all(|&d| d == b'0') {
            return false;
        }
        match self.partial_max {
            None => true,
            Some(max) => char::from(digits[self.zero_digits])
                .to_digit(16)
                .is_some_and(|value| value <= u32::from(max)),
        }
    }
}
