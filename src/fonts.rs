//! Font metrics and text measurement for the native backend.
//!
//! By default text is set in the PDF builtin Helvetica and Courier families,
//! measured with approximate metrics. A TrueType/OpenType face can be
//! supplied instead; its glyph advances are then read with `ttf-parser` and
//! the same bytes are embedded by the renderer.

/// Font selection for one run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontKey {
    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
}

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

/// Measures text for layout.
#[derive(Clone, Default)]
pub struct FontManager {
    /// Body face used for all proportional text when present.
    custom: Option<FontData>,
}

/// Courier advance, in em.
const MONO_ADVANCE: f32 = 0.6;
/// Helvetica ascender, in em.
const BUILTIN_ASCENDER: f32 = 0.718;

impl FontManager {
    /// Builtin fonts only.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Use `bytes` (TTF/OTF) for proportional text.
    pub fn with_font(bytes: Vec<u8>) -> Result<Self, String> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| format!("Failed to parse font: {e}"))?;
        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes,
        };
        Ok(Self { custom: Some(data) })
    }

    /// Bytes of the custom face, for embedding.
    pub fn custom_font(&self) -> Option<&[u8]> {
        self.custom.as_ref().map(|d| d.bytes.as_slice())
    }

    /// True when `key` is drawn with the custom face.
    pub fn uses_custom(&self, key: FontKey) -> bool {
        self.custom.is_some() && !key.monospace
    }

    /// Width of `text` in points at `font_size`.
    pub fn measure(&self, text: &str, font_size: f32, key: FontKey) -> f32 {
        if key.monospace {
            return text.chars().count() as f32 * font_size * MONO_ADVANCE;
        }
        if let Some(data) = &self.custom {
            if let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) {
                let scale = font_size / data.units_per_em;
                return text
                    .chars()
                    .map(|ch| {
                        face.glyph_index(ch)
                            .and_then(|gid| face.glyph_hor_advance(gid))
                            .map(|adv| adv as f32 * scale)
                            .unwrap_or(font_size * 0.5)
                    })
                    .sum();
            }
        }
        text.chars()
            .map(|ch| builtin_advance(ch, key.bold) * font_size)
            .sum()
    }

    /// Distance from the top of a line box to the baseline.
    pub fn ascender(&self, font_size: f32, key: FontKey) -> f32 {
        match &self.custom {
            Some(data) if !key.monospace => {
                let total = data.ascender - data.descender;
                if total > 0.0 {
                    font_size * data.ascender / total
                } else {
                    font_size * BUILTIN_ASCENDER
                }
            }
            _ => font_size * BUILTIN_ASCENDER,
        }
    }
}

/// Approximate Helvetica advance in em. Narrow and wide glyphs are
/// bucketed; everything else uses the average width.
fn builtin_advance(ch: char, bold: bool) -> f32 {
    let base = match ch {
        'i' | 'j' | 'l' | '\'' | '|' | '.' | ',' | ':' | ';' | '!' => 0.24,
        'f' | 't' | 'r' | 'I' | ' ' | '(' | ')' | '[' | ']' | '-' | '/' => 0.32,
        'm' | 'w' | 'M' | 'W' | '@' | '%' => 0.84,
        'A'..='Z' => 0.68,
        '0'..='9' => 0.556,
        _ => 0.52,
    };
    if bold {
        base * 1.07
    } else {
        base
    }
}
