//! Barcode framing rules.
//!
//! Scanners are usually configured to bracket their payload: an optional
//! fixed prefix (header), a terminator suffix (trailer, most commonly a
//! carriage return), or a fixed payload length for readers that cannot send
//! a trailer at all. When none of the three is configured, the framer falls
//! back to timeout-based segmentation.

use serde::{Deserialize, Serialize};

/// Framing rules for one logical scanner stream.
///
/// Immutable once supplied to a framer. Deserializes from the `[framing]`
/// section of the demo binary's TOML config; every field has a default so a
/// partial (or absent) config section still works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Fixed prefix the scanner emits before the payload. Empty = no header.
    #[serde(default)]
    pub header: String,
    /// Fixed suffix the scanner emits after the payload. Empty = no trailer.
    #[serde(default = "default_trailer")]
    pub trailer: String,
    /// When > 0, the payload is complete once this many characters have
    /// accumulated, regardless of trailer content. 0 = no length check.
    #[serde(default)]
    pub fixed_length: usize,
}

fn default_trailer() -> String {
    "\r".to_string()
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            header: String::new(),
            trailer: default_trailer(),
            fixed_length: 0,
        }
    }
}

impl FramingConfig {
    /// `true` when no delimiter is configured at all, which switches the
    /// framer into trailer-timeout auto-segmentation mode.
    pub fn is_auto_terminated(&self) -> bool {
        self.header.is_empty() && self.trailer.is_empty() && self.fixed_length == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_carriage_return_trailer() {
        let config = FramingConfig::default();
        assert_eq!(config.header, "");
        assert_eq!(config.trailer, "\r");
        assert_eq!(config.fixed_length, 0);
        assert!(!config.is_auto_terminated());
    }

    #[test]
    fn test_auto_terminated_requires_all_three_unset() {
        let auto = FramingConfig {
            header: String::new(),
            trailer: String::new(),
            fixed_length: 0,
        };
        assert!(auto.is_auto_terminated());

        let with_length = FramingConfig {
            fixed_length: 10,
            ..auto.clone()
        };
        assert!(!with_length.is_auto_terminated());
    }

    #[test]
    fn test_missing_toml_fields_fall_back_to_defaults() {
        let config: FramingConfig = toml::from_str("").expect("empty table must parse");
        assert_eq!(config, FramingConfig::default());

        let config: FramingConfig =
            toml::from_str("header = \"^\"").expect("partial table must parse");
        assert_eq!(config.header, "^");
        assert_eq!(config.trailer, "\r");
    }
}
