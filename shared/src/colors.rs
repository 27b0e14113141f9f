use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fill colors offered in the annotation palette.
pub const PALETTE: [&str; 8] = [
    "#FF5252", "#FF9800", "#FFD400", "#4CAF50", "#00BCD4", "#2979FF", "#7C4DFF", "#795548",
];

/// Default fill for parcels entering the map through a search hit.
pub const SEARCH_HIGHLIGHT: &str = "#FFD400";

/// Boundary color for uncolored (transparent) parcels.
const TRANSPARENT_OUTLINE: &str = "#FF6D00";

const FILL_ALPHA: f64 = 0.6;
const STROKE_ALPHA: f64 = 0.9;

/// Fill state of a tracked parcel: either no fill at all, or one fixed
/// palette color. Serialized as the CSS string form (`"transparent"` /
/// `"#RRGGBB"`), which is also the on-disk snapshot representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParcelColor {
    #[default]
    Transparent,
    Hex(String),
}

impl ParcelColor {
    /// Parse a CSS-ish color string. Unknown or malformed input normalizes
    /// to `Transparent` rather than failing: snapshot data written by older
    /// builds must never abort a restore.
    pub fn from_css(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("transparent") || trimmed.is_empty() {
            return ParcelColor::Transparent;
        }
        match parse_hex(trimmed) {
            Some(_) => ParcelColor::Hex(trimmed.to_ascii_uppercase()),
            None => ParcelColor::Transparent,
        }
    }

    pub fn as_css(&self) -> &str {
        match self {
            ParcelColor::Transparent => "transparent",
            ParcelColor::Hex(hex) => hex,
        }
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, ParcelColor::Transparent)
    }
}

impl Serialize for ParcelColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_css())
    }
}

impl<'de> Deserialize<'de> for ParcelColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ParcelColor::from_css(&raw))
    }
}

/// `#RRGGBB` → RGB components.
pub fn parse_hex(value: &str) -> Option<(u8, u8, u8)> {
    let digits = value.strip_prefix('#')?;
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
    Some((r, g, b))
}

pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r}, {g}, {b}, {a})")
}

/// Pre-formatted CSS strings for one polygon artifact. Derived once per
/// styling pass so the per-frame draw loop never allocates.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonStyle {
    pub fill: String,
    pub stroke: String,
    pub stroke_width: f64,
}

impl PolygonStyle {
    /// Style mapping for a parcel fill color. Transparent parcels keep a
    /// visible boundary with a zero-alpha fill; colored parcels use the same
    /// color for fill and stroke, stroke more opaque and heavier.
    pub fn for_color(color: &ParcelColor) -> Self {
        match color {
            ParcelColor::Transparent => {
                let (r, g, b) = parse_hex(TRANSPARENT_OUTLINE).unwrap_or((255, 109, 0));
                Self {
                    fill: rgba_css(0, 0, 0, 0.0),
                    stroke: rgba_css(r, g, b, STROKE_ALPHA),
                    stroke_width: 1.5,
                }
            }
            ParcelColor::Hex(hex) => match parse_hex(hex) {
                Some((r, g, b)) => Self {
                    fill: rgba_css(r, g, b, FILL_ALPHA),
                    stroke: rgba_css(r, g, b, STROKE_ALPHA),
                    stroke_width: 2.0,
                },
                None => Self::for_color(&ParcelColor::Transparent),
            },
        }
    }

    pub fn has_visible_fill(&self) -> bool {
        !self.fill.ends_with(" 0)")
    }
}

#[cfg(test)]
mod tests {
    use super::{PALETTE, ParcelColor, PolygonStyle, SEARCH_HIGHLIGHT, parse_hex};

    #[test]
    fn from_css_normalizes_hex_to_uppercase() {
        assert_eq!(
            ParcelColor::from_css("#ff5252"),
            ParcelColor::Hex("#FF5252".to_string())
        );
    }

    #[test]
    fn from_css_treats_unknown_input_as_transparent() {
        assert_eq!(ParcelColor::from_css("red"), ParcelColor::Transparent);
        assert_eq!(ParcelColor::from_css("#12"), ParcelColor::Transparent);
        assert_eq!(ParcelColor::from_css(""), ParcelColor::Transparent);
        assert_eq!(ParcelColor::from_css("Transparent"), ParcelColor::Transparent);
    }

    #[test]
    fn serde_uses_css_string_form() {
        let json = serde_json::to_string(&ParcelColor::Hex("#FF5252".to_string()))
            .expect("color should serialize");
        assert_eq!(json, r##""#FF5252""##);

        let back: ParcelColor =
            serde_json::from_str(r#""transparent""#).expect("color should deserialize");
        assert_eq!(back, ParcelColor::Transparent);
    }

    #[test]
    fn transparent_style_has_zero_alpha_fill_and_visible_stroke() {
        let style = PolygonStyle::for_color(&ParcelColor::Transparent);
        assert_eq!(style.fill, "rgba(0, 0, 0, 0)");
        assert!(!style.has_visible_fill());
        assert!(style.stroke.starts_with("rgba(255, 109, 0"));
    }

    #[test]
    fn colored_style_uses_color_for_fill_and_stroke() {
        let style = PolygonStyle::for_color(&ParcelColor::Hex("#FF5252".to_string()));
        assert_eq!(style.fill, "rgba(255, 82, 82, 0.6)");
        assert_eq!(style.stroke, "rgba(255, 82, 82, 0.9)");
        assert!(style.stroke_width > PolygonStyle::for_color(&ParcelColor::Transparent).stroke_width);
        assert!(style.has_visible_fill());
    }

    #[test]
    fn palette_and_highlight_are_valid_hex() {
        for hex in PALETTE {
            assert!(parse_hex(hex).is_some(), "palette entry {hex} should parse");
        }
        assert!(parse_hex(SEARCH_HIGHLIGHT).is_some());
    }
}
