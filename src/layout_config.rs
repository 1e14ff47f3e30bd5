//! Layout config – the frozen page description passed from pagination to
//! the PDF renderer. Every coordinate is in points from the top-left corner
//! of the physical page.

use serde::Serialize;

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,
    /// Vertical rule drawn along the left edge.
    pub rule_left: Option<BorderStyle>,
    /// Horizontal rule drawn along the top edge.
    pub rule_top: Option<BorderStyle>,

    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,
    /// Bullet or number drawn in the gutter left of the box.
    pub list_marker: Option<ListMarker>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

/// Pre-wrapped lines of mixed-style text.
#[derive(Debug, Clone, Serialize)]
pub struct TextContent {
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextLine {
    /// Top of the line relative to the box.
    pub y_offset: f32,
    pub height: f32,
    /// Baseline relative to the top of the line.
    pub baseline: f32,
    pub segments: Vec<TextSegment>,
}

/// A run of text sharing one font and colour.
#[derive(Debug, Clone, Serialize)]
pub struct TextSegment {
    pub text: String,
    /// Offset from the left edge of the box.
    pub x_offset: f32,
    pub width: f32,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
    pub underline: bool,
    pub strike: bool,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListMarker {
    pub text: String,
    pub font_size: f32,
    pub baseline: f32,
    pub color: [f32; 4],
}

impl LayoutConfig {
    pub fn new(title: impl Into<String>, page_width_pt: f32, page_height_pt: f32) -> Self {
        Self {
            title: title.into(),
            page_width_pt,
            page_height_pt,
            pages: Vec::new(),
        }
    }

    /// Pretty JSON dump of the layout, for debugging page breaks.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// All text on `page`, one entry per line, in paint order.
    pub fn page_text(&self, page: usize) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(p) = self.pages.get(page) {
            for b in &p.boxes {
                b.collect_lines(&mut out);
            }
        }
        out
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            rule_left: None,
            rule_top: None,
            text: None,
            image: None,
            list_marker: None,
            children: Vec::new(),
        }
    }

    fn collect_lines(&self, out: &mut Vec<String>) {
        if let Some(text) = &self.text {
            for line in &text.lines {
                out.push(line.segments.iter().map(|s| s.text.as_str()).collect());
            }
        }
        for child in &self.children {
            child.collect_lines(out);
        }
    }
}
