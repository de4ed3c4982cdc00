//! Account permission flags and the action applied to them.
//!
//! The bot only validates names and forwards the resolved bit; the account
//! service owns the meaning of each flag.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// A single account permission bit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum UserFlag {
    Admin,
    BetaTester,
    Vinetrimmer,
    KeyAdding,
    Suspended,
    BlacklistExempt,
}

impl UserFlag {
    pub fn bit(self) -> u32 {
        match self {
            Self::Admin => 1 << 0,
            Self::BetaTester => 1 << 1,
            Self::Vinetrimmer => 1 << 2,
            Self::KeyAdding => 1 << 3,
            Self::Suspended => 1 << 4,
            Self::BlacklistExempt => 1 << 5,
        }
    }

    /// All flag names, in bit order.
    pub fn names() -> Vec<&'static str> {
        Self::iter().map(<&'static str>::from).collect()
    }
}

/// Whether a flag is granted or revoked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum FlagAction {
    Add,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_bits_are_distinct_powers_of_two() {
        let mut seen = 0u32;
        for flag in UserFlag::iter() {
            let bit = flag.bit();
            assert_eq!(bit.count_ones(), 1, "{} is not a single bit", flag);
            assert_eq!(seen & bit, 0, "{} overlaps another flag", flag);
            seen |= bit;
        }
        assert_eq!(seen, 0b11_1111);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(UserFlag::from_str("beta_tester").unwrap(), UserFlag::BetaTester);
        assert_eq!(UserFlag::from_str("KEY_ADDING").unwrap(), UserFlag::KeyAdding);
        assert!(UserFlag::from_str("superuser").is_err());
    }

    #[test]
    fn test_names_in_bit_order() {
        assert_eq!(
            UserFlag::names(),
            vec![
                "ADMIN",
                "BETA_TESTER",
                "VINETRIMMER",
                "KEY_ADDING",
                "SUSPENDED",
                "BLACKLIST_EXEMPT"
            ]
        );
    }

    #[test]
    fn test_display_matches_names() {
        for (flag, name) in UserFlag::iter().zip(UserFlag::names()) {
            assert_eq!(flag.to_string(), name);
            assert_eq!(flag.as_ref(), name);
        }
    }

    #[test]
    fn test_flag_action_parse_and_wire() {
        assert_eq!(FlagAction::from_str("add").unwrap(), FlagAction::Add);
        assert_eq!(FlagAction::from_str("REMOVE").unwrap(), FlagAction::Remove);
        assert!(FlagAction::from_str("toggle").is_err());
        assert_eq!(serde_json::to_string(&FlagAction::Add).unwrap(), "\"add\"");
        assert_eq!(FlagAction::Remove.to_string(), "REMOVE");
    }
}
