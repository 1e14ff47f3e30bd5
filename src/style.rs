//! Style resolver – maps tag defaults and inline `style` attributes to a
//! flat [`ComputedStyle`] consumed by the layout engine.
//!
//! Stylesheets linked from the template are written for browser backends
//! and are not interpreted here; the native backend relies on the built-in
//! document typography below plus whatever the markup sets inline.

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};

/// Base body font size in points.
pub const BASE_FONT_SIZE: f32 = 11.0;

/// Fully resolved style for a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,

    // Sizing (images and explicit inline styles only)
    pub width: Dimension,
    pub height: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Borders
    pub border_width: f32,
    pub border_color: Color,
    /// Vertical rule on the left edge (block quotes).
    pub rule_left: f32,
    /// Horizontal rule along the top edge (`<hr>`).
    pub rule_top: f32,

    // Typography (inherited)
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub monospace: bool,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub underline: bool,
    pub strike: bool,
    pub preformatted: bool,

    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            width: Dimension::Auto,
            height: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::GREY,
            rule_left: 0.0,
            rule_top: 0.0,
            font_size: BASE_FONT_SIZE,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            monospace: false,
            color: Color::TEXT,
            text_align: TextAlign::Left,
            line_height: 1.4,
            underline: false,
            strike: false,
            preformatted: false,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

impl ComputedStyle {
    pub fn bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }

    /// Horizontal space consumed by margins, padding and borders.
    pub fn horizontal_extra(&self) -> f32 {
        self.margin_left
            + self.margin_right
            + self.padding_left
            + self.padding_right
            + 2.0 * self.border_width
            + self.rule_left
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Inline,
    ListItem,
    Table,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Pt(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const TEXT: Self = Self::rgb(0.14, 0.16, 0.18);
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const GREY: Self = Self::rgb(0.82, 0.84, 0.87);
    pub const MUTED: Self = Self::rgb(0.40, 0.43, 0.47);
    pub const LINK: Self = Self::rgb(0.04, 0.41, 0.85);
    pub const CODE_BG: Self = Self::rgb(0.965, 0.973, 0.98);
    pub const HEADER_BG: Self = Self::rgb(0.94, 0.95, 0.96);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)` or a handful of names.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with('#') {
            return Self::from_hex(value);
        }
        if let Some(args) = value
            .strip_prefix("rgb(")
            .or_else(|| value.strip_prefix("rgba("))
            .and_then(|v| v.strip_suffix(')'))
        {
            let parts: Vec<f32> = args
                .split(',')
                .filter_map(|p| p.trim().parse::<f32>().ok())
                .collect();
            return match parts.as_slice() {
                [r, g, b] => Some(Self::rgb(r / 255.0, g / 255.0, b / 255.0)),
                [r, g, b, a] => Some(Self {
                    r: r / 255.0,
                    g: g / 255.0,
                    b: b / 255.0,
                    a: *a,
                }),
                _ => None,
            };
        }
        match value.to_ascii_lowercase().as_str() {
            "black" => Some(Self::BLACK),
            "white" => Some(Self::WHITE),
            "red" => Some(Self::rgb(1.0, 0.0, 0.0)),
            "green" => Some(Self::rgb(0.0, 0.5, 0.0)),
            "blue" => Some(Self::rgb(0.0, 0.0, 1.0)),
            "gray" | "grey" => Some(Self::rgb(0.5, 0.5, 0.5)),
            "transparent" => Some(Self::TRANSPARENT),
            _ => None,
        }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(element: &ElementNode, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = ComputedStyle::default();
    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.font_weight = p.font_weight;
        style.font_style = p.font_style;
        style.monospace = p.monospace;
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        style.underline = p.underline;
        style.strike = p.strike;
        style.preformatted = p.preformatted;
    }

    apply_tag_defaults(&mut style, &element.tag, parent);

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }
    if element.attr("hidden").is_some() {
        style.display = Display::None;
    }
    style
}

fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag, parent: Option<&ComputedStyle>) {
    match tag {
        Tag::H(level) => {
            let (scale, top) = match level {
                1 => (2.0, 18.0),
                2 => (1.6, 16.0),
                3 => (1.3, 14.0),
                4 => (1.1, 12.0),
                5 => (1.0, 10.0),
                _ => (0.9, 10.0),
            };
            s.font_size = BASE_FONT_SIZE * scale;
            s.font_weight = FontWeight::Bold;
            s.line_height = 1.25;
            s.margin_top = top;
            s.margin_bottom = 8.0;
            if *level <= 2 {
                s.padding_bottom = 4.0;
            }
            if *level == 6 {
                s.color = Color::MUTED;
            }
            s.page_break_inside_avoid = true;
        }
        Tag::P => {
            s.margin_bottom = 8.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 8.0;
            s.padding_left = 18.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = 2.0;
        }
        Tag::Dl => {
            s.margin_bottom = 8.0;
        }
        Tag::Dt => {
            s.font_weight = FontWeight::Bold;
            s.margin_top = 4.0;
        }
        Tag::Dd => {
            s.margin_left = 18.0;
            s.margin_bottom = 4.0;
        }
        Tag::Blockquote => {
            s.margin_bottom = 8.0;
            s.padding_left = 10.0;
            s.rule_left = 3.0;
            s.border_color = Color::GREY;
            s.color = Color::MUTED;
        }
        Tag::Pre => {
            s.monospace = true;
            s.preformatted = true;
            s.font_size = BASE_FONT_SIZE * 0.85;
            s.line_height = 1.35;
            s.background_color = Color::CODE_BG;
            s.padding_top = 6.0;
            s.padding_right = 8.0;
            s.padding_bottom = 6.0;
            s.padding_left = 8.0;
            s.margin_bottom = 8.0;
        }
        Tag::Hr => {
            s.margin_top = 8.0;
            s.margin_bottom = 8.0;
            s.rule_top = 1.0;
            s.border_color = Color::GREY;
        }
        Tag::Table => {
            s.display = Display::Table;
            s.margin_bottom = 8.0;
        }
        Tag::Thead | Tag::Tbody | Tag::Tfoot => {
            s.display = Display::Block;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 3.0;
            s.padding_right = 6.0;
            s.padding_bottom = 3.0;
            s.padding_left = 6.0;
            s.border_width = 0.5;
            s.border_color = Color::GREY;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.background_color = Color::HEADER_BG;
            }
        }
        Tag::A => {
            s.display = Display::Inline;
            s.color = Color::LINK;
            s.underline = true;
        }
        Tag::Em => {
            s.display = Display::Inline;
            s.font_style = FontStyle::Italic;
        }
        Tag::Strong => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Code => {
            s.display = Display::Inline;
            s.monospace = true;
            // Code inside <pre> keeps the block size.
            if !parent.is_some_and(|p| p.preformatted) {
                s.font_size *= 0.9;
            }
        }
        Tag::Del => {
            s.display = Display::Inline;
            s.strike = true;
        }
        Tag::U => {
            s.display = Display::Inline;
            s.underline = true;
        }
        Tag::Sup | Tag::Sub => {
            s.display = Display::Inline;
            s.font_size *= 0.75;
        }
        Tag::Span | Tag::Br | Tag::Input | Tag::Unknown(_) => {
            s.display = Display::Inline;
        }
        Tag::Img => {
            s.display = Display::Block;
            s.margin_bottom = 4.0;
        }
        Tag::Head | Tag::Title | Tag::Style | Tag::Script | Tag::Meta | Tag::Link => {
            s.display = Display::None;
        }
        Tag::Div | Tag::Body | Tag::Html => {}
    }
}

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        let Some((prop, val)) = decl.split_once(':') else {
            continue;
        };
        let val = val.trim().trim_end_matches("!important").trim();
        apply_css_property(s, &prop.trim().to_ascii_lowercase(), val);
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    let font_size = s.font_size;
    let length = |v: &str| parse_length(v, font_size);
    match prop {
        "display" => {
            s.display = match val {
                "block" | "flex" | "grid" => Display::Block,
                "inline" | "inline-block" => Display::Inline,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "font-size" => {
            if let Some(v) = length(val) {
                s.font_size = v;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "font-family" => {
            s.monospace = val.contains("mono") || val.contains("courier");
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "text-decoration" | "text-decoration-line" => {
            s.underline = val.contains("underline");
            s.strike = val.contains("line-through");
        }
        "white-space" => {
            s.preformatted = val.starts_with("pre");
        }
        "width" => s.width = parse_dimension(val, font_size),
        "height" => s.height = parse_dimension(val, font_size),
        "margin" => apply_shorthand_spacing(
            val,
            font_size,
            [
                &mut s.margin_top,
                &mut s.margin_right,
                &mut s.margin_bottom,
                &mut s.margin_left,
            ],
        ),
        "margin-top" => set_length(&mut s.margin_top, length(val)),
        "margin-right" => set_length(&mut s.margin_right, length(val)),
        "margin-bottom" => set_length(&mut s.margin_bottom, length(val)),
        "margin-left" => set_length(&mut s.margin_left, length(val)),
        "padding" => apply_shorthand_spacing(
            val,
            font_size,
            [
                &mut s.padding_top,
                &mut s.padding_right,
                &mut s.padding_bottom,
                &mut s.padding_left,
            ],
        ),
        "padding-top" => set_length(&mut s.padding_top, length(val)),
        "padding-right" => set_length(&mut s.padding_right, length(val)),
        "padding-bottom" => set_length(&mut s.padding_bottom, length(val)),
        "padding-left" => set_length(&mut s.padding_left, length(val)),
        "border-width" => set_length(&mut s.border_width, length(val)),
        "border" => {
            for part in val.split_whitespace() {
                if let Some(w) = length(part) {
                    s.border_width = w;
                } else if let Some(c) = Color::parse(part) {
                    s.border_color = c;
                }
            }
            if val == "none" || val == "0" {
                s.border_width = 0.0;
            }
        }
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(v) = length(val) {
                s.line_height = v / s.font_size;
            }
        }
        "break-before" | "page-break-before" => {
            s.page_break_before = matches!(val, "always" | "page");
        }
        "break-after" | "page-break-after" => {
            s.page_break_after = matches!(val, "always" | "page");
        }
        "break-inside" | "page-break-inside" => {
            s.page_break_inside_avoid = val == "avoid" || val == "avoid-page";
        }
        _ => {}
    }
}

fn set_length(field: &mut f32, value: Option<f32>) {
    if let Some(v) = value {
        *field = v;
    }
}

/// Parse a CSS length into points. One CSS pixel is 0.75pt.
fn parse_length(s: &str, font_size: f32) -> Option<f32> {
    let s = s.trim();
    if s == "0" {
        return Some(0.0);
    }
    let units: [(&str, f32); 7] = [
        ("px", 0.75),
        ("pt", 1.0),
        ("rem", BASE_FONT_SIZE),
        ("em", font_size),
        ("mm", 72.0 / 25.4),
        ("cm", 72.0 / 2.54),
        ("in", 72.0),
    ];
    for (suffix, factor) in units {
        if let Some(num) = s.strip_suffix(suffix) {
            return num.trim().parse::<f32>().ok().map(|v| v * factor);
        }
    }
    s.parse().ok()
}

fn parse_dimension(s: &str, font_size: f32) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(pct) = s.strip_suffix('%') {
        pct.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_length(s, font_size)
            .map(Dimension::Pt)
            .unwrap_or(Dimension::Auto)
    }
}

fn apply_shorthand_spacing(val: &str, font_size: f32, [top, right, bottom, left]: [&mut f32; 4]) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .filter_map(|p| parse_length(p, font_size))
        .collect();
    let (t, r, b, l) = match parts.as_slice() {
        [a] => (*a, *a, *a, *a),
        [v, h] => (*v, *h, *v, *h),
        [t, h, b] => (*t, *h, *b, *h),
        [t, r, b, l] => (*t, *r, *b, *l),
        _ => return,
    };
    *top = t;
    *right = r;
    *bottom = b;
    *left = l;
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (image `src`, checkbox state, ...).
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

impl StyledNode {
    pub fn style(&self) -> &ComputedStyle {
        match self {
            StyledNode::Element { style, .. } | StyledNode::Text { style, .. } => style,
        }
    }

    /// True for text and inline-level elements.
    pub fn is_inline(&self) -> bool {
        match self {
            StyledNode::Text { .. } => true,
            StyledNode::Element { style, .. } => style.display == Display::Inline,
        }
    }
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
/// Elements with `display: none` are dropped.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style);
                if style.display == Display::None {
                    continue;
                }
                let children = build_styled_tree(&e.children, Some(&style));
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                let parent = parent_style.cloned().unwrap_or_default();
                // Text carries the inherited typography only.
                let style = ComputedStyle {
                    display: Display::Inline,
                    font_size: parent.font_size,
                    font_weight: parent.font_weight,
                    font_style: parent.font_style,
                    monospace: parent.monospace,
                    color: parent.color,
                    text_align: parent.text_align,
                    line_height: parent.line_height,
                    underline: parent.underline,
                    strike: parent.strike,
                    preformatted: parent.preformatted,
                    ..ComputedStyle::default()
                };
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
        }
    }
    result
}
