//! Immutable drawing-context value.
//!
//! A drawing context bundles every stroke, fill and font parameter that a
//! draw call needs.  Callers create many contexts with identical fields, so
//! both sides of the wire deduplicate them by *value*: two contexts are the
//! same context when all of their fields are equal.
//!
//! # Why cache the hash? (for beginners)
//!
//! The server looks contexts up in a `HashMap<DrawingContextValue, _>` on
//! every CREATE_DRAWING_CONTEXT request.  Hashing a dash pattern plus a font
//! family string each time would be wasted work for a value that can never
//! change, so [`DrawingContextValue`] computes its hash once in
//! [`DrawingContextBuilder::build`] and [`Hash`] just feeds the stored number
//! to the hasher.
//!
//! Doubles are compared by bit pattern so that `Eq` and `Hash` stay
//! consistent (`NaN` equals itself, `0.0` and `-0.0` differ).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::protocol::codec::{ProtocolError, WireDecoder, WireEncoder};

/// Points per inch; device coordinates are in inches.
pub const INCH_TO_POINTS_FACTOR: f64 = 72.0;

// ── Colour ────────────────────────────────────────────────────────────────────

/// 32-bit ARGB colour, sent on the wire as its raw `int` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(u32);

impl Color {
    pub const BLACK: Color = Color::from_rgba(0, 0, 0, 255);
    pub const WHITE: Color = Color::from_rgba(255, 255, 255, 255);
    pub const TRANSPARENT: Color = Color::from_rgba(255, 255, 255, 0);

    pub const fn from_rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Color((alpha as u32) << 24 | (red as u32) << 16 | (green as u32) << 8 | blue as u32)
    }

    /// Reinterprets the wire `int` as an ARGB value.
    pub const fn from_raw(raw: i32) -> Self {
        Color(raw as u32)
    }

    pub const fn raw(self) -> i32 {
        self.0 as i32
    }

    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }
}

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Dash pattern of stroked lines.
///
/// On the wire a blank line is a null `byte[]`, a solid line an empty one,
/// and a dashed line the alternating on/off segment lengths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LineType {
    Blank,
    Solid,
    Pattern(Vec<u8>),
}

impl LineType {
    /// Builds a line type from its wire form, normalising an empty pattern to `Solid`.
    pub fn from_wire(raw: Option<Vec<u8>>) -> Self {
        match raw {
            None => LineType::Blank,
            Some(p) if p.is_empty() => LineType::Solid,
            Some(p) => LineType::Pattern(p),
        }
    }

    pub fn to_wire(&self) -> Option<&[u8]> {
        match self {
            LineType::Blank => None,
            LineType::Solid => Some(&[]),
            LineType::Pattern(p) => Some(p),
        }
    }
}

/// Shape drawn where two line segments meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LineJoin {
    Round = 0,
    Mitre = 1,
    Bevel = 2,
}

impl TryFrom<i32> for LineJoin {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        match value {
            0 => Ok(LineJoin::Round),
            1 => Ok(LineJoin::Mitre),
            2 => Ok(LineJoin::Bevel),
            _ => Err(()),
        }
    }
}

/// Shape drawn at the open ends of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LineEnd {
    Round = 0,
    Butt = 1,
    Square = 2,
}

impl TryFrom<i32> for LineEnd {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        match value {
            0 => Ok(LineEnd::Round),
            1 => Ok(LineEnd::Butt),
            2 => Ok(LineEnd::Square),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FontStyle {
    Plain = 0,
    Bold = 1,
    Italic = 2,
    BoldItalic = 3,
    Symbol = 4,
}

impl FontStyle {
    pub fn is_bold(self) -> bool {
        matches!(self, FontStyle::Bold | FontStyle::BoldItalic)
    }

    pub fn is_italic(self) -> bool {
        matches!(self, FontStyle::Italic | FontStyle::BoldItalic)
    }
}

impl TryFrom<i32> for FontStyle {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        match value {
            0 => Ok(FontStyle::Plain),
            1 => Ok(FontStyle::Bold),
            2 => Ok(FontStyle::Italic),
            3 => Ok(FontStyle::BoldItalic),
            4 => Ok(FontStyle::Symbol),
            _ => Err(()),
        }
    }
}

// ── DrawingContextValue ───────────────────────────────────────────────────────

/// Immutable bundle of stroke, fill and font parameters.
///
/// Construct one with [`DrawingContextValue::builder`].
#[derive(Debug, Clone)]
pub struct DrawingContextValue {
    line_type: LineType,
    line_width: f64,
    line_join: LineJoin,
    line_end: LineEnd,
    line_mitre: f64,
    color: Color,
    font_size: f64,
    font_style: FontStyle,
    font_family: String,
    line_height: f64,
    fill_color: Color,
    hash: u64,
}

impl DrawingContextValue {
    pub fn builder() -> DrawingContextBuilder {
        DrawingContextBuilder::default()
    }

    pub fn line_type(&self) -> &LineType {
        &self.line_type
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    pub fn line_join(&self) -> LineJoin {
        self.line_join
    }

    pub fn line_end(&self) -> LineEnd {
        self.line_end
    }

    pub fn line_mitre(&self) -> f64 {
        self.line_mitre
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    pub fn font_style(&self) -> FontStyle {
        self.font_style
    }

    pub fn font_family(&self) -> &str {
        &self.font_family
    }

    pub fn line_height(&self) -> f64 {
        self.line_height
    }

    pub fn fill_color(&self) -> Color {
        self.fill_color
    }

    /// Writes the CREATE_DRAWING_CONTEXT payload (everything after the opcode).
    pub fn encode(&self, encoder: &mut WireEncoder) {
        encoder.write_byte_array(self.line_type.to_wire());
        encoder.write_double(self.line_width);
        encoder.write_int(self.line_join as i32);
        encoder.write_int(self.line_end as i32);
        encoder.write_double(self.line_mitre);
        encoder.write_int(self.color.raw());
        encoder.write_double(self.font_size);
        encoder.write_int(self.font_style as i32);
        encoder.write_string(Some(&self.font_family));
        encoder.write_double(self.line_height);
        encoder.write_int(self.fill_color.raw());
    }

    /// Reads a CREATE_DRAWING_CONTEXT payload.  A null font family decodes as empty.
    pub fn decode(decoder: &mut WireDecoder) -> Result<Self, ProtocolError> {
        let line_type = LineType::from_wire(decoder.read_byte_array()?);
        let line_width = decoder.read_double()?;
        let line_join = read_enum::<LineJoin>(decoder, "line join")?;
        let line_end = read_enum::<LineEnd>(decoder, "line end")?;
        let line_mitre = decoder.read_double()?;
        let color = Color::from_raw(decoder.read_int()?);
        let font_size = decoder.read_double()?;
        let font_style = read_enum::<FontStyle>(decoder, "font style")?;
        let font_family = decoder.read_string()?.unwrap_or_default();
        let line_height = decoder.read_double()?;
        let fill_color = Color::from_raw(decoder.read_int()?);

        Ok(DrawingContextBuilder {
            line_type,
            line_width,
            line_join,
            line_end,
            line_mitre,
            color,
            font_size,
            font_style,
            font_family,
            line_height,
            fill_color,
        }
        .build())
    }

    fn same_fields(&self, other: &Self) -> bool {
        self.line_type == other.line_type
            && self.line_width.to_bits() == other.line_width.to_bits()
            && self.line_join == other.line_join
            && self.line_end == other.line_end
            && self.line_mitre.to_bits() == other.line_mitre.to_bits()
            && self.color == other.color
            && self.font_size.to_bits() == other.font_size.to_bits()
            && self.font_style == other.font_style
            && self.font_family == other.font_family
            && self.line_height.to_bits() == other.line_height.to_bits()
            && self.fill_color == other.fill_color
    }
}

impl PartialEq for DrawingContextValue {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.same_fields(other)
    }
}

impl Eq for DrawingContextValue {}

impl Hash for DrawingContextValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

fn read_enum<T: TryFrom<i32>>(decoder: &mut WireDecoder, what: &str) -> Result<T, ProtocolError> {
    let raw = decoder.read_int()?;
    T::try_from(raw).map_err(|_| ProtocolError::MalformedPayload(format!("unknown {what}: {raw}")))
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Mutable staging area for a [`DrawingContextValue`].
///
/// Defaults: solid black 1pt line, round joins and ends, mitre limit 10,
/// plain 12pt font with no family, line height 1.2, transparent fill.
#[derive(Debug, Clone)]
pub struct DrawingContextBuilder {
    line_type: LineType,
    line_width: f64,
    line_join: LineJoin,
    line_end: LineEnd,
    line_mitre: f64,
    color: Color,
    font_size: f64,
    font_style: FontStyle,
    font_family: String,
    line_height: f64,
    fill_color: Color,
}

impl Default for DrawingContextBuilder {
    fn default() -> Self {
        Self {
            line_type: LineType::Solid,
            line_width: 1.0,
            line_join: LineJoin::Round,
            line_end: LineEnd::Round,
            line_mitre: 10.0,
            color: Color::BLACK,
            font_size: 12.0,
            font_style: FontStyle::Plain,
            font_family: String::new(),
            line_height: 1.2,
            fill_color: Color::TRANSPARENT,
        }
    }
}

impl DrawingContextBuilder {
    pub fn line_type(mut self, line_type: LineType) -> Self {
        self.line_type = line_type;
        self
    }

    pub fn line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }

    pub fn line_join(mut self, join: LineJoin) -> Self {
        self.line_join = join;
        self
    }

    pub fn line_end(mut self, end: LineEnd) -> Self {
        self.line_end = end;
        self
    }

    pub fn line_mitre(mut self, mitre: f64) -> Self {
        self.line_mitre = mitre;
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn font_size(mut self, size: f64) -> Self {
        self.font_size = size;
        self
    }

    pub fn font_style(mut self, style: FontStyle) -> Self {
        self.font_style = style;
        self
    }

    pub fn font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    pub fn line_height(mut self, height: f64) -> Self {
        self.line_height = height;
        self
    }

    pub fn fill_color(mut self, color: Color) -> Self {
        self.fill_color = color;
        self
    }

    /// Freezes the fields and computes the hash once.
    pub fn build(self) -> DrawingContextValue {
        let mut hasher = DefaultHasher::new();
        self.line_type.hash(&mut hasher);
        self.line_width.to_bits().hash(&mut hasher);
        self.line_join.hash(&mut hasher);
        self.line_end.hash(&mut hasher);
        self.line_mitre.to_bits().hash(&mut hasher);
        self.color.hash(&mut hasher);
        self.font_size.to_bits().hash(&mut hasher);
        self.font_style.hash(&mut hasher);
        self.font_family.hash(&mut hasher);
        self.line_height.to_bits().hash(&mut hasher);
        self.fill_color.hash(&mut hasher);

        DrawingContextValue {
            line_type: self.line_type,
            line_width: self.line_width,
            line_join: self.line_join,
            line_end: self.line_end,
            line_mitre: self.line_mitre,
            color: self.color,
            font_size: self.font_size,
            font_style: self.font_style,
            font_family: self.font_family,
            line_height: self.line_height,
            fill_color: self.fill_color,
            hash: hasher.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> DrawingContextBuilder {
        DrawingContextValue::builder()
            .line_type(LineType::Pattern(vec![4, 2]))
            .line_width(2.5)
            .color(Color::from_rgba(200, 10, 20, 255))
            .font_family("sans")
            .fill_color(Color::WHITE)
    }

    #[test]
    fn test_identical_fields_are_equal_and_hash_equal() {
        // Arrange
        let a = sample().build();
        let b = sample().build();

        // Act
        let mut map = HashMap::new();
        map.insert(a.clone(), 1);

        // Assert
        assert_eq!(a, b);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn test_changing_any_single_field_breaks_equality() {
        let base = sample().build();
        let variants = [
            sample().line_type(LineType::Solid).build(),
            sample().line_width(2.6).build(),
            sample().line_join(LineJoin::Bevel).build(),
            sample().line_end(LineEnd::Square).build(),
            sample().line_mitre(4.0).build(),
            sample().color(Color::BLACK).build(),
            sample().font_size(13.0).build(),
            sample().font_style(FontStyle::Italic).build(),
            sample().font_family("serif").build(),
            sample().line_height(1.0).build(),
            sample().fill_color(Color::TRANSPARENT).build(),
        ];
        for variant in &variants {
            assert_ne!(&base, variant, "variant {variant:?} should differ");
        }
    }

    #[test]
    fn test_line_type_wire_forms() {
        assert_eq!(LineType::from_wire(None), LineType::Blank);
        assert_eq!(LineType::from_wire(Some(vec![])), LineType::Solid);
        assert_eq!(LineType::from_wire(Some(vec![1, 3])), LineType::Pattern(vec![1, 3]));
        assert_eq!(LineType::Solid.to_wire(), Some(&[][..]));
        assert_eq!(LineType::Blank.to_wire(), None);
    }

    #[test]
    fn test_color_channels_follow_argb_layout() {
        let c = Color::from_rgba(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.raw(), 0x4411_2233);
        assert_eq!((c.red(), c.green(), c.blue(), c.alpha()), (0x11, 0x22, 0x33, 0x44));
        assert_eq!(Color::from_raw(c.raw()), c);
    }

    #[test]
    fn test_context_survives_wire_encoding() {
        // Arrange
        let original = sample().font_style(FontStyle::BoldItalic).build();
        let mut encoder = WireEncoder::new();

        // Act
        original.encode(&mut encoder);
        let mut decoder = WireDecoder::new(encoder.reset_write());
        let decoded = DrawingContextValue::decode(&mut decoder).unwrap();

        // Assert
        assert_eq!(decoded, original);
        assert!(decoder.is_read_finished());
    }

    #[test]
    fn test_decode_rejects_unknown_enum_ordinal() {
        let mut encoder = WireEncoder::new();
        encoder.write_byte_array(None);
        encoder.write_double(1.0);
        encoder.write_int(9); // no such line join
        let mut decoder = WireDecoder::new(encoder.reset_write());
        assert!(matches!(
            DrawingContextValue::decode(&mut decoder),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_font_style_flags() {
        assert!(FontStyle::BoldItalic.is_bold());
        assert!(FontStyle::BoldItalic.is_italic());
        assert!(!FontStyle::Plain.is_bold());
        assert!(!FontStyle::Symbol.is_italic());
    }
}
