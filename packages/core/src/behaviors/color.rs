//! Color filter
//!
//! Every declared color is its own space row, so a single color can be edited
//! and the children pointing at it follow. Colors are stored as `[r,g,b,a]` with
//! integer channels and an alpha rounded to two decimals.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::{BehaviorError, MatrixFilterBehavior, SpaceContext, SpaceInput};
use crate::models::{EncodedSpace, MatrixFilterType, Rgba};

static HEX_COLOR: OnceLock<Regex> = OnceLock::new();

fn hex_color_regex() -> &'static Regex {
    HEX_COLOR.get_or_init(|| {
        Regex::new(r"^#([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})?$")
            .unwrap_or_else(|e| panic!("invalid hex color pattern: {}", e))
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct ColorFilterBehavior;

impl ColorFilterBehavior {
    /// `#RRGGBB` → alpha 1, `#RRGGBBAA` → alpha `round(AA / 255, 2)`
    pub fn encode_from_hex(hex: &str) -> Result<Rgba, BehaviorError> {
        let caps = hex_color_regex().captures(hex.trim()).ok_or_else(|| {
            BehaviorError::invalid(MatrixFilterType::Color, format!("'{}' is not a hex color", hex))
        })?;

        // the pattern guarantees two hex digits per group
        let channel = |i: usize| {
            caps.get(i)
                .and_then(|m| u8::from_str_radix(m.as_str(), 16).ok())
        };

        let (Some(r), Some(g), Some(b)) = (channel(1), channel(2), channel(3)) else {
            return Err(BehaviorError::invalid(
                MatrixFilterType::Color,
                format!("'{}' is not a hex color", hex),
            ));
        };
        let a = channel(4).map_or(1.0, |alpha| round2(alpha as f64 / 255.0));

        Ok(Rgba::new(r, g, b, a))
    }

    /// `#rrggbbaa`, alpha scaled back to a byte
    pub fn to_hex(rgba: &Rgba) -> String {
        let alpha = (rgba.a * 255.0).round().clamp(0.0, 255.0) as u8;
        format!("#{:02x}{:02x}{:02x}{:02x}", rgba.r, rgba.g, rgba.b, alpha)
    }

    /// CSS form `rgba(r,g,b,a)`
    pub fn to_rgba_str(rgba: &Rgba) -> String {
        format!("rgba({},{},{},{})", rgba.r, rgba.g, rgba.b, rgba.a)
    }

    fn parse(space: &Value) -> Result<Rgba, String> {
        let parts = space
            .as_array()
            .filter(|p| p.len() == 4)
            .ok_or_else(|| format!("expected [r,g,b,a], got {}", space))?;

        let mut channels = [0u8; 3];
        for (slot, part) in channels.iter_mut().zip(parts.iter()) {
            *slot = part
                .as_u64()
                .and_then(|c| u8::try_from(c).ok())
                .ok_or_else(|| format!("channel {} must be an integer between 0 and 255", part))?;
        }

        let alpha = parts[3]
            .as_f64()
            .filter(|a| (0.0..=1.0).contains(a))
            .ok_or_else(|| format!("alpha {} must be a number between 0 and 1", parts[3]))?;

        Ok(Rgba::new(channels[0], channels[1], channels[2], round2(alpha)))
    }
}

impl MatrixFilterBehavior for ColorFilterBehavior {
    fn filter_type(&self) -> MatrixFilterType {
        MatrixFilterType::Color
    }

    fn validate_encoded_space(&self, space: &Value) -> bool {
        Self::parse(space).is_ok()
    }

    fn parse_encoded_space(&self, space: &Value) -> Result<EncodedSpace, BehaviorError> {
        Self::parse(space)
            .map(EncodedSpace::Color)
            .map_err(|reason| BehaviorError::invalid(MatrixFilterType::Color, reason))
    }

    fn encode_space_from_form(
        &self,
        input: &SpaceInput,
        _ctx: &SpaceContext<'_>,
    ) -> Result<EncodedSpace, BehaviorError> {
        match input {
            SpaceInput::Hex(hex) => Self::encode_from_hex(hex).map(EncodedSpace::Color),
            other => Err(BehaviorError::UnsupportedInput {
                filter_type: MatrixFilterType::Color,
                input: other.kind(),
            }),
        }
    }

    fn decode_for_display(&self, space: &EncodedSpace) -> String {
        match space {
            EncodedSpace::Color(rgba) => Self::to_rgba_str(rgba),
            other => other.to_value().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_from_hex() {
        assert_eq!(
            ColorFilterBehavior::encode_from_hex("#ff0000").unwrap(),
            Rgba::new(255, 0, 0, 1.0)
        );
        assert_eq!(
            ColorFilterBehavior::encode_from_hex("#00FF0080").unwrap(),
            Rgba::new(0, 255, 0, 0.5)
        );
        assert!(ColorFilterBehavior::encode_from_hex("ff0000").is_err());
        assert!(ColorFilterBehavior::encode_from_hex("#ff00").is_err());
        assert!(ColorFilterBehavior::encode_from_hex("#gg0000").is_err());
    }

    #[test]
    fn test_hex_roundtrip_for_two_decimal_alpha() {
        for step in 0..=100u32 {
            let alpha = step as f64 / 100.0;
            let rgba = Rgba::new(12, 200, 7, alpha);
            let decoded = ColorFilterBehavior::encode_from_hex(&ColorFilterBehavior::to_hex(&rgba))
                .unwrap();
            assert_eq!(decoded, rgba, "alpha {}", alpha);
        }
    }

    #[test]
    fn test_rgba_string() {
        assert_eq!(
            ColorFilterBehavior.decode_for_display(&EncodedSpace::Color(Rgba::new(1, 2, 3, 0.25))),
            "rgba(1,2,3,0.25)"
        );
        assert_eq!(
            ColorFilterBehavior::to_rgba_str(&Rgba::new(255, 255, 255, 1.0)),
            "rgba(255,255,255,1)"
        );
    }

    #[test]
    fn test_validate_encoded_space() {
        let behavior = ColorFilterBehavior;
        assert!(behavior.validate_encoded_space(&json!([255, 0, 0, 1])));
        assert!(behavior.validate_encoded_space(&json!([0, 0, 0, 0.35])));
        assert!(!behavior.validate_encoded_space(&json!([255, 0, 0])));
        assert!(!behavior.validate_encoded_space(&json!([255.5, 0, 0, 1])));
        assert!(!behavior.validate_encoded_space(&json!([256, 0, 0, 1])));
        assert!(!behavior.validate_encoded_space(&json!([255, 0, 0, "1"])));
        assert!(!behavior.validate_encoded_space(&json!([255, 0, 0, 1.5])));
    }
}
