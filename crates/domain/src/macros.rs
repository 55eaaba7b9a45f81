//! String conversions for the status enums stored in SQLite columns.
//!
//! # Example
//!
//! ```rust
//! use synclane_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum LeaseState {
//!     Held,
//!     Expired,
//! }
//!
//! impl_domain_status_conversions!(LeaseState {
//!     Held => "held",
//!     Expired => "expired",
//! });
//!
//! assert_eq!(LeaseState::Held.to_string(), "held");
//! assert_eq!("EXPIRED".parse::<LeaseState>(), Ok(LeaseState::Expired));
//! ```

/// Maps each variant to its persisted lowercase name.
///
/// `Display` writes the mapped name; `FromStr` accepts it in any case and
/// rejects anything else with `"Invalid <Enum>: <input>"`.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Waiting,
        InFlight,
        Settled,
    }

    impl_domain_status_conversions!(Phase {
        Waiting => "waiting",
        InFlight => "in_flight",
        Settled => "settled",
    });

    #[test]
    fn display_uses_mapped_strings() {
        assert_eq!(Phase::Waiting.to_string(), "waiting");
        assert_eq!(Phase::InFlight.to_string(), "in_flight");
        assert_eq!(Phase::Settled.to_string(), "settled");
    }

    #[test]
    fn parsing_ignores_case() {
        assert_eq!(Phase::from_str("IN_FLIGHT").unwrap(), Phase::InFlight);
        assert_eq!(Phase::from_str("Settled").unwrap(), Phase::Settled);
    }

    #[test]
    fn unknown_value_names_the_enum() {
        let err = Phase::from_str("done").unwrap_err();
        assert!(err.contains("Invalid Phase: done"));
        assert!(Phase::from_str("").is_err());
    }

    #[test]
    fn display_then_parse_is_identity() {
        for phase in [Phase::Waiting, Phase::InFlight, Phase::Settled] {
            assert_eq!(Phase::from_str(&phase.to_string()).unwrap(), phase);
        }
    }
}
