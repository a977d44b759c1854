//! Drawing primitives and word hints.
//!
//! Primitives are relayed and logged verbatim: coordinates and widths are
//! kept as the exact JSON numbers the drawer sent (`serde_json::Number`),
//! so a stored stroke re-serializes to the same bytes it arrived as. The
//! server never checks them against a canvas.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

/// An RGB color. Components are relayed as sent, without range checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: Number,
    pub g: Number,
    pub b: Number,
}

/// A straight stroke between two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub from_x: Number,
    pub from_y: Number,
    pub to_x: Number,
    pub to_y: Number,
    pub color: RgbColor,
    pub line_width: Number,
}

/// A flood fill starting at a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub x: Number,
    pub y: Number,
    pub color: RgbColor,
}

/// One entry of the per-round drawing log.
///
/// Adjacently tagged, matching the envelope the drawer sent:
/// `{"type":"line","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum DrawingPrimitive {
    Line(Line),
    Fill(Fill),
}

impl DrawingPrimitive {
    /// The envelope type tag this primitive travels under.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Line(_) => "line",
            Self::Fill(_) => "fill",
        }
    }
}

/// One character slot of the secret word as shown to a client.
///
/// On the wire the character is a Unicode code point, with `0` meaning
/// "not revealed yet": `{"character": 0, "underline": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordHint {
    #[serde(with = "code_point")]
    pub character: Option<char>,
    pub underline: bool,
}

impl WordHint {
    /// A hidden, underlined slot.
    pub fn hidden() -> Self {
        Self {
            character: None,
            underline: true,
        }
    }

    /// A visible slot. Spaces are never underlined.
    pub fn shown(c: char) -> Self {
        Self {
            character: Some(c),
            underline: c != ' ',
        }
    }

    /// Whether this slot still hides its character.
    pub fn is_hidden(&self) -> bool {
        self.character.is_none()
    }
}

mod code_point {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<char>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(value.map_or(0, u32::from))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<char>, D::Error> {
        let raw = u32::deserialize(d)?;
        if raw == 0 {
            return Ok(None);
        }
        char::from_u32(raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid code point {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_keeps_exact_numbers() {
        let raw = r#"{"type":"line","data":{"fromX":1,"fromY":2.5,"toX":3,"toY":4,"color":{"r":255,"g":127,"b":0},"lineWidth":1}}"#;
        let primitive: DrawingPrimitive = serde_json::from_str(raw).unwrap();
        assert_eq!(primitive.kind(), "line");
        assert_eq!(serde_json::to_string(&primitive).unwrap(), raw);
    }

    #[test]
    fn test_fill_is_adjacently_tagged() {
        let fill = DrawingPrimitive::Fill(Fill {
            x: 10.into(),
            y: 20.into(),
            color: RgbColor {
                r: 1.into(),
                g: 2.into(),
                b: 3.into(),
            },
        });
        let json: serde_json::Value = serde_json::to_value(&fill).unwrap();
        assert_eq!(json["type"], "fill");
        assert_eq!(json["data"]["x"], 10);
    }

    #[test]
    fn test_line_color_out_of_byte_range_relayed_unchanged() {
        let raw = r#"{"type":"line","data":{"fromX":1,"fromY":2,"toX":3,"toY":4,"color":{"r":300,"g":-1,"b":0.5},"lineWidth":2}}"#;
        let line: DrawingPrimitive = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_string(&line).unwrap(), raw);
    }

    #[test]
    fn test_word_hint_hidden_is_code_point_zero() {
        let json = serde_json::to_string(&WordHint::hidden()).unwrap();
        assert_eq!(json, r#"{"character":0,"underline":true}"#);
    }

    #[test]
    fn test_word_hint_shown_uses_code_point() {
        let json = serde_json::to_string(&WordHint::shown('a')).unwrap();
        assert_eq!(json, r#"{"character":97,"underline":true}"#);
        let back: WordHint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.character, Some('a'));
    }

    #[test]
    fn test_word_hint_space_is_not_underlined() {
        assert!(!WordHint::shown(' ').underline);
    }

    #[test]
    fn test_word_hint_rejects_surrogate_code_point() {
        let result: Result<WordHint, _> =
            serde_json::from_str(r#"{"character":55296,"underline":true}"#);
        assert!(result.is_err());
    }
}
