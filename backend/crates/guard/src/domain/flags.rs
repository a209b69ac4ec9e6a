//! Feature Flags
//!
//! The fixed set of boolean policy switches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureFlag {
    UnderAttack,
    CaptchaAlwaysOn,
    PowEnforceHighRisk,
    CloseSignups,
    ReadOnlyMode,
    MaintenanceMode,
}

impl FeatureFlag {
    pub const ALL: [FeatureFlag; 6] = [
        FeatureFlag::UnderAttack,
        FeatureFlag::CaptchaAlwaysOn,
        FeatureFlag::PowEnforceHighRisk,
        FeatureFlag::CloseSignups,
        FeatureFlag::ReadOnlyMode,
        FeatureFlag::MaintenanceMode,
    ];

    /// Row name in the store, also the environment variable for the default
    pub const fn name(&self) -> &'static str {
        match self {
            FeatureFlag::UnderAttack => "UNDER_ATTACK",
            FeatureFlag::CaptchaAlwaysOn => "CAPTCHA_ALWAYS_ON",
            FeatureFlag::PowEnforceHighRisk => "POW_ENFORCE_HIGH_RISK",
            FeatureFlag::CloseSignups => "CLOSE_SIGNUPS",
            FeatureFlag::ReadOnlyMode => "READ_ONLY_MODE",
            FeatureFlag::MaintenanceMode => "MAINTENANCE_MODE",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            FeatureFlag::UnderAttack => {
                "Challenge every request with medium or higher risk during an active attack"
            }
            FeatureFlag::CaptchaAlwaysOn => "Require a CAPTCHA on every gated request",
            FeatureFlag::PowEnforceHighRisk => "Require proof-of-work from high-risk requests",
            FeatureFlag::CloseSignups => "Reject new account registrations",
            FeatureFlag::ReadOnlyMode => "Reject requests that modify data",
            FeatureFlag::MaintenanceMode => "Serve the maintenance page to all visitors",
        }
    }
}

impl fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFlag(pub String);

impl fmt::Display for UnknownFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown feature flag: {}", self.0)
    }
}

impl std::error::Error for UnknownFlag {}

impl FromStr for FeatureFlag {
    type Err = UnknownFlag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureFlag::ALL
            .into_iter()
            .find(|flag| flag.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFlag(s.to_string()))
    }
}

/// A resolved value for every flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FeatureFlagSet {
    pub under_attack: bool,
    pub captcha_always_on: bool,
    pub pow_enforce_high_risk: bool,
    pub close_signups: bool,
    pub read_only_mode: bool,
    pub maintenance_mode: bool,
}

impl FeatureFlagSet {
    pub fn get(&self, flag: FeatureFlag) -> bool {
        match flag {
            FeatureFlag::UnderAttack => self.under_attack,
            FeatureFlag::CaptchaAlwaysOn => self.captcha_always_on,
            FeatureFlag::PowEnforceHighRisk => self.pow_enforce_high_risk,
            FeatureFlag::CloseSignups => self.close_signups,
            FeatureFlag::ReadOnlyMode => self.read_only_mode,
            FeatureFlag::MaintenanceMode => self.maintenance_mode,
        }
    }

    pub fn set(&mut self, flag: FeatureFlag, enabled: bool) {
        let slot = match flag {
            FeatureFlag::UnderAttack => &mut self.under_attack,
            FeatureFlag::CaptchaAlwaysOn => &mut self.captcha_always_on,
            FeatureFlag::PowEnforceHighRisk => &mut self.pow_enforce_high_risk,
            FeatureFlag::CloseSignups => &mut self.close_signups,
            FeatureFlag::ReadOnlyMode => &mut self.read_only_mode,
            FeatureFlag::MaintenanceMode => &mut self.maintenance_mode,
        };
        *slot = enabled;
    }

    pub fn with(mut self, flag: FeatureFlag, enabled: bool) -> Self {
        self.set(flag, enabled);
        self
    }

    /// Defaults from an environment-style lookup (`UNDER_ATTACK=true`, ...);
    /// unset or unparsable means off
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        FeatureFlag::ALL
            .into_iter()
            .fold(Self::default(), |set, flag| {
                let enabled = lookup(flag.name()).is_some_and(|raw| parse_bool(&raw));
                set.with(flag, enabled)
            })
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
