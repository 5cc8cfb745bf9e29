/*
[INPUT]:  Tier strings reported by the auth backend
[OUTPUT]: Ordered subscription tiers with lenient deserialization
[POS]:    Data layer - enums shared by session and entitlements
[UPDATE]: When the backend adds a tier
*/

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Subscription tier attached to a session.
///
/// Ordered `Free < Premium < Pro`, matching the backend's minimum-tier gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Pro => "pro",
        }
    }

    /// Lenient parse: anything unrecognised degrades to `Free`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "premium" => Tier::Premium,
            "pro" => Tier::Pro,
            _ => Tier::Free,
        }
    }

    /// True when this tier grants at least `min`.
    pub fn satisfies(&self, min: Tier) -> bool {
        *self >= min
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Tier::from_wire).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Pro.satisfies(Tier::Premium));
        assert!(Tier::Premium.satisfies(Tier::Premium));
        assert!(!Tier::Free.satisfies(Tier::Premium));
    }

    #[test]
    fn test_unknown_tier_degrades_to_free() {
        let tier: Tier = serde_json::from_str("\"platinum\"").unwrap();
        assert_eq!(tier, Tier::Free);

        let tier: Tier = serde_json::from_str("null").unwrap();
        assert_eq!(tier, Tier::Free);

        let tier: Tier = serde_json::from_str("\"PRO\"").unwrap();
        assert_eq!(tier, Tier::Pro);
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Premium).unwrap(), "\"premium\"");
    }
}
