//! Macro for implementing Display and FromStr for status enums
//!
//! Provider APIs report states as lowercase strings; this keeps the mapping
//! for each enum in one place.
//!
//! # Example
//!
//! ```rust
//! use servertide_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum ActionStatus {
//!     Running,
//!     Success,
//!     Error,
//! }
//!
//! impl_domain_status_conversions!(ActionStatus {
//!     Running => "running",
//!     Success => "success",
//!     Error => "error",
//! });
//!
//! assert_eq!(ActionStatus::Success.to_string(), "success");
//! assert_eq!("ERROR".parse::<ActionStatus>(), Ok(ActionStatus::Error));
//! ```

/// Implements Display and FromStr traits for status enums
///
/// - Display writes the mapped lowercase string
/// - FromStr parses case-insensitively and reports the enum name on failure
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
    enum PowerState {
        On,
        Off,
    }

    impl_domain_status_conversions!(PowerState {
        On => "on",
        Off => "off",
    });

    #[test]
    fn display_uses_mapped_string() {
        assert_eq!(PowerState::On.to_string(), "on");
        assert_eq!(PowerState::Off.to_string(), "off");
    }

    #[test]
    fn parsing_ignores_case() {
        assert_eq!(PowerState::from_str("OFF").unwrap(), PowerState::Off);
        assert_eq!(PowerState::from_str("On").unwrap(), PowerState::On);
    }

    #[test]
    fn unknown_value_names_the_enum() {
        let err = PowerState::from_str("standby").unwrap_err();
        assert!(err.contains("PowerState"));
        assert!(err.contains("standby"));
    }
}
