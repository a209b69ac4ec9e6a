//! Application Configuration
//!
//! Configuration for the PoW application layer.

use std::time::Duration;

use crate::domain::value_objects::Difficulty;
use crate::error::{PowError, PowResult};

/// PoW application configuration
#[derive(Debug, Clone)]
pub struct PowConfig {
    /// Difficulty for challenges issued in normal operation
    pub difficulty: Difficulty,
    /// Difficulty while under-attack mode is on
    pub attack_difficulty: Difficulty,
    /// Challenge lifetime
    pub challenge_ttl: Duration,
    /// Work token lifetime
    pub work_token_ttl: Duration,
    /// Wall-clock budget for the nonce search
    pub solve_timeout: Duration,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::DEFAULT,
            attack_difficulty: Difficulty::new(20).unwrap_or_default(),
            challenge_ttl: Duration::from_secs(10 * 60),
            work_token_ttl: Duration::from_secs(30 * 60),
            solve_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl PowConfig {
    /// Defaults with `POW_DIFFICULTY` / `POW_ATTACK_DIFFICULTY` overrides
    pub fn from_env() -> PowResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PowResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            difficulty: parse_difficulty(lookup("POW_DIFFICULTY"), defaults.difficulty)?,
            attack_difficulty: parse_difficulty(
                lookup("POW_ATTACK_DIFFICULTY"),
                defaults.attack_difficulty,
            )?,
            ..defaults
        })
    }

    pub fn challenge_ttl_ms(&self) -> i64 {
        self.challenge_ttl.as_millis() as i64
    }

    pub fn work_token_ttl_ms(&self) -> i64 {
        self.work_token_ttl.as_millis() as i64
    }

    /// Difficulty to issue given the current attack state
    pub fn difficulty_for(&self, under_attack: bool) -> Difficulty {
        if under_attack {
            self.attack_difficulty.max(self.difficulty)
        } else {
            self.difficulty
        }
    }
}

fn parse_difficulty(raw: Option<String>, default: Difficulty) -> PowResult<Difficulty> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let bits = raw
        .trim()
        .parse::<u8>()
        .map_err(|_| PowError::Internal(format!("difficulty is not a number: {raw:?}")))?;
    Difficulty::new(bits).ok_or(PowError::InvalidDifficulty(bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup() {
        let config = PowConfig::from_lookup(|name| match name {
            "POW_DIFFICULTY" => Some("12".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.difficulty.bits(), 12);
        assert_eq!(config.attack_difficulty.bits(), 20);

        assert!(PowConfig::from_lookup(|_| Some("64".into())).is_err());
        assert!(PowConfig::from_lookup(|_| Some("hard".into())).is_err());
    }

    #[test]
    fn test_difficulty_for() {
        let config = PowConfig::default();
        assert_eq!(config.difficulty_for(false).bits(), 16);
        assert_eq!(config.difficulty_for(true).bits(), 20);

        let inverted = PowConfig {
            attack_difficulty: Difficulty::new(4).unwrap(),
            ..PowConfig::default()
        };
        assert_eq!(inverted.difficulty_for(true).bits(), 16);
    }
}
