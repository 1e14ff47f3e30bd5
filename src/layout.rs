//! Layout engine – uses Taffy to stack blocks, lay out table rows and size
//! images, and wraps inline content into styled lines.
//!
//! The result is a tree of [`PositionedBox`]es in document coordinates
//! (one endless page); [`crate::pagination`] cuts it into real pages.

use std::collections::HashMap;
use std::path::Path;

use taffy::prelude::*;

use crate::dom::Tag;
use crate::fonts::{FontKey, FontManager};
use crate::layout_config::{TextLine, TextSegment};
use crate::style::{self, ComputedStyle, StyledNode, TextAlign};

/// CSS pixels to points.
const PX_TO_PT: f32 = 0.75;
const TAB_WIDTH: usize = 4;

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    /// List bullet or number for `<li>` boxes.
    pub marker: Option<String>,
    pub children: Vec<PositionedBox>,
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    /// Wrapped lines; offsets are relative to the box's border edge.
    Text { lines: Vec<TextLine> },
    Image { src: String },
}

// ---------------------------------------------------------------------------
// Inline content
// ---------------------------------------------------------------------------

enum InlineItem<'s> {
    Text(&'s str, &'s ComputedStyle),
    Owned(String, &'s ComputedStyle),
    Break,
}

enum Token<'s> {
    Word(String, &'s ComputedStyle),
    Space(&'s ComputedStyle),
    Break,
}

fn font_key(s: &ComputedStyle) -> FontKey {
    FontKey {
        bold: s.bold(),
        italic: s.italic(),
        monospace: s.monospace,
    }
}

/// True when `node` and all of its descendants flow inline.
fn is_inline_tree(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element { style, children, .. } => {
            style.display == style::Display::Inline && children.iter().all(is_inline_tree)
        }
    }
}

fn collect_inline<'s>(node: &'s StyledNode, out: &mut Vec<InlineItem<'s>>) {
    match node {
        StyledNode::Text { text, style } => out.push(InlineItem::Text(text, style)),
        StyledNode::Element {
            tag,
            style,
            children,
            attrs,
        } => match tag {
            Tag::Br => out.push(InlineItem::Break),
            Tag::Input if attrs.get("type").is_some_and(|t| t == "checkbox") => {
                let mark = if attrs.contains_key("checked") { "[x]" } else { "[ ]" };
                out.push(InlineItem::Owned(format!("{mark} "), style));
            }
            _ => {
                for child in children {
                    collect_inline(child, out);
                }
            }
        },
    }
}

fn has_visible_text(items: &[InlineItem<'_>]) -> bool {
    items.iter().any(|item| match item {
        InlineItem::Text(t, _) => !t.trim().is_empty(),
        InlineItem::Owned(t, _) => !t.trim().is_empty(),
        InlineItem::Break => true,
    })
}

fn tokenize<'s>(items: &[InlineItem<'s>], preformatted: bool) -> Vec<Token<'s>> {
    let mut tokens = Vec::new();
    for item in items {
        let (text, style): (&str, &ComputedStyle) = match item {
            InlineItem::Text(t, s) => (*t, *s),
            InlineItem::Owned(t, s) => (t.as_str(), *s),
            InlineItem::Break => {
                tokens.push(Token::Break);
                continue;
            }
        };
        if preformatted {
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    tokens.push(Token::Break);
                }
                if !line.is_empty() {
                    let expanded = line.replace('\t', &" ".repeat(TAB_WIDTH));
                    tokens.push(Token::Word(expanded, style));
                }
            }
            continue;
        }
        let mut word = String::new();
        for ch in text.chars() {
            if ch.is_whitespace() && ch != '\u{00A0}' {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word), style));
                }
                if !matches!(tokens.last(), Some(Token::Space(_)) | None) {
                    tokens.push(Token::Space(style));
                }
            } else {
                word.push(ch);
            }
        }
        if !word.is_empty() {
            tokens.push(Token::Word(word, style));
        }
    }
    // A trailing newline in a code block does not open an empty line.
    if preformatted && matches!(tokens.last(), Some(Token::Break)) {
        tokens.pop();
    }
    tokens
}

/// Accumulates segments into lines of at most `max_width`.
struct LineBreaker<'f> {
    fonts: &'f FontManager,
    max_width: f32,
    align: TextAlign,
    line_height: f32,
    base_size: f32,
    lines: Vec<TextLine>,
    segments: Vec<TextSegment>,
    x: f32,
    y: f32,
    pending_space: Option<f32>,
}

impl<'f> LineBreaker<'f> {
    fn same_run(seg: &TextSegment, style: &ComputedStyle) -> bool {
        seg.font_size == style.font_size
            && seg.bold == style.bold()
            && seg.italic == style.italic()
            && seg.monospace == style.monospace
            && seg.underline == style.underline
            && seg.strike == style.strike
            && seg.color == style.color.to_array()
    }

    fn place_word(&mut self, word: &str, style: &ComputedStyle) {
        let key = font_key(style);
        let width = self.fonts.measure(word, style.font_size, key);
        let space = self.pending_space.take().unwrap_or(0.0);

        if !self.segments.is_empty() && self.x + space + width > self.max_width {
            self.finish_line();
            return self.place_word(word, style);
        }
        if self.segments.is_empty() && width > self.max_width {
            return self.place_long_word(word, style);
        }

        let text = if space > 0.0 {
            format!(" {word}")
        } else {
            word.to_string()
        };
        match self.segments.last_mut() {
            Some(last) if Self::same_run(last, style) => {
                last.text.push_str(&text);
                last.width += space + width;
            }
            _ => self.segments.push(TextSegment {
                text,
                x_offset: self.x,
                width: space + width,
                font_size: style.font_size,
                bold: style.bold(),
                italic: style.italic(),
                monospace: style.monospace,
                underline: style.underline,
                strike: style.strike,
                color: style.color.to_array(),
            }),
        }
        self.x += space + width;
    }

    /// Break a word wider than a whole line at character boundaries.
    fn place_long_word(&mut self, word: &str, style: &ComputedStyle) {
        let key = font_key(style);
        let mut chunk = String::new();
        for ch in word.chars() {
            chunk.push(ch);
            let w = self.fonts.measure(&chunk, style.font_size, key);
            if w > self.max_width && chunk.chars().count() > 1 {
                chunk.pop();
                let head = std::mem::take(&mut chunk);
                self.push_fitting(&head, style);
                self.finish_line();
                chunk.push(ch);
            }
        }
        if !chunk.is_empty() {
            self.push_fitting(&chunk, style);
        }
    }

    fn push_fitting(&mut self, text: &str, style: &ComputedStyle) {
        let width = self.fonts.measure(text, style.font_size, font_key(style));
        self.segments.push(TextSegment {
            text: text.to_string(),
            x_offset: self.x,
            width,
            font_size: style.font_size,
            bold: style.bold(),
            italic: style.italic(),
            monospace: style.monospace,
            underline: style.underline,
            strike: style.strike,
            color: style.color.to_array(),
        });
        self.x += width;
    }

    fn finish_line(&mut self) {
        let size = self
            .segments
            .iter()
            .map(|s| s.font_size)
            .fold(0.0f32, f32::max);
        let size = if size > 0.0 { size } else { self.base_size };
        let height = size * self.line_height;
        let key = self
            .segments
            .first()
            .map(|s| FontKey {
                bold: s.bold,
                italic: s.italic,
                monospace: s.monospace,
            })
            .unwrap_or(FontKey {
                bold: false,
                italic: false,
                monospace: false,
            });
        let baseline = (height - size) / 2.0 + self.fonts.ascender(size, key);

        let shift = match self.align {
            TextAlign::Left => 0.0,
            TextAlign::Center => ((self.max_width - self.x) / 2.0).max(0.0),
            TextAlign::Right => (self.max_width - self.x).max(0.0),
        };
        let mut segments = std::mem::take(&mut self.segments);
        for seg in &mut segments {
            seg.x_offset += shift;
        }

        self.lines.push(TextLine {
            y_offset: self.y,
            height,
            baseline,
            segments,
        });
        self.y += height;
        self.x = 0.0;
        self.pending_space = None;
    }

    fn finish(mut self) -> Vec<TextLine> {
        if !self.segments.is_empty() {
            self.finish_line();
        }
        self.lines
    }
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    base_dir: Option<&'a Path>,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    node_markers: HashMap<NodeId, String>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, base_dir: Option<&'a Path>) -> Self {
        // Coordinates are points; whole-unit rounding would skew columns.
        let mut taffy = TaffyTree::new();
        taffy.disable_rounding();
        Self {
            taffy,
            fonts,
            base_dir,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            node_markers: HashMap::new(),
        }
    }

    /// Wrap inline items into lines for a box of content width `max_width`.
    fn wrap(&self, items: &[InlineItem<'_>], block: &ComputedStyle, max_width: f32) -> Vec<TextLine> {
        let mut breaker = LineBreaker {
            fonts: self.fonts,
            max_width: max_width.max(1.0),
            align: block.text_align,
            line_height: block.line_height,
            base_size: block.font_size,
            lines: Vec::new(),
            segments: Vec::new(),
            x: 0.0,
            y: 0.0,
            pending_space: None,
        };
        for token in tokenize(items, block.preformatted) {
            match token {
                Token::Word(word, style) => breaker.place_word(&word, style),
                Token::Space(style) => {
                    if !breaker.segments.is_empty() {
                        breaker.pending_space =
                            Some(self.fonts.measure(" ", style.font_size, font_key(style)));
                    }
                }
                Token::Break => breaker.finish_line(),
            }
        }
        breaker.finish()
    }

    /// Build the children of a block container, grouping consecutive inline
    /// children into anonymous paragraphs.
    fn build_block_children(
        &mut self,
        children: &[StyledNode],
        parent_tag: &Tag,
        parent_style: &ComputedStyle,
        inner_width: f32,
        list_start: u32,
    ) -> Result<Vec<NodeId>, String> {
        let mut nodes = Vec::new();
        let mut pending: Vec<InlineItem<'_>> = Vec::new();
        let mut counter = list_start;

        for child in children {
            if is_inline_tree(child) {
                collect_inline(child, &mut pending);
                continue;
            }
            if has_visible_text(&pending) {
                nodes.push(self.build_anonymous(&pending, parent_style, inner_width)?);
            }
            pending.clear();

            let id = self.build_node(child, inner_width)?;
            if let StyledNode::Element { tag: Tag::Li, .. } = child {
                let marker = if *parent_tag == Tag::Ol {
                    format!("{counter}.")
                } else {
                    "\u{2022}".to_string()
                };
                counter += 1;
                self.node_markers.insert(id, marker);
            }
            nodes.push(id);
        }
        if has_visible_text(&pending) {
            nodes.push(self.build_anonymous(&pending, parent_style, inner_width)?);
        }
        Ok(nodes)
    }

    /// Paragraph without box decoration, inheriting `parent`'s typography.
    fn build_anonymous(
        &mut self,
        items: &[InlineItem<'_>],
        parent: &ComputedStyle,
        width: f32,
    ) -> Result<NodeId, String> {
        let style = ComputedStyle {
            display: style::Display::Block,
            font_size: parent.font_size,
            line_height: parent.line_height,
            text_align: parent.text_align,
            preformatted: parent.preformatted,
            color: parent.color,
            ..ComputedStyle::default()
        };
        self.build_text_leaf(items, &style, width, false)
    }

    /// A leaf carrying wrapped text, sized to its lines.
    fn build_text_leaf(
        &mut self,
        items: &[InlineItem<'_>],
        style: &ComputedStyle,
        outer_width: f32,
        table_cell: bool,
    ) -> Result<NodeId, String> {
        let border_width = (outer_width - style.margin_left - style.margin_right).max(1.0);
        let content_left = style.padding_left + style.border_width + style.rule_left;
        let content_top = style.padding_top + style.border_width + style.rule_top;
        let content_width = border_width
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width
            - style.rule_left;

        let mut lines = self.wrap(items, style, content_width);
        for line in &mut lines {
            line.y_offset += content_top;
            for seg in &mut line.segments {
                seg.x_offset += content_left;
            }
        }
        let text_height: f32 = lines.iter().map(|l| l.height).sum();
        let height = text_height + content_top + style.padding_bottom + style.border_width;

        let mut ts = self.box_style(style);
        if table_cell {
            // Fixed column width; the row stretches the height.
            ts.flex_shrink = 0.0;
            ts.size.width = taffy::Dimension::Length(border_width);
            ts.min_size.height = taffy::Dimension::Length(height);
        } else {
            ts.size = Size {
                width: taffy::Dimension::Length(border_width),
                height: taffy::Dimension::Length(height),
            };
        }

        let node = self.taffy.new_leaf(ts).map_err(|e| e.to_string())?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(node, BoxContent::Text { lines });
        Ok(node)
    }

    fn build_node(&mut self, styled: &StyledNode, outer_width: f32) -> Result<NodeId, String> {
        let (tag, style, children, attrs) = match styled {
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => (tag, style, children, attrs),
            StyledNode::Text { style, .. } => {
                let mut items = Vec::new();
                collect_inline(styled, &mut items);
                return self.build_text_leaf(&items, style, outer_width, false);
            }
        };

        if style.display == style::Display::Table {
            return self.build_table(style, children, outer_width);
        }
        if *tag == Tag::Img {
            let src = attrs.get("src").map(String::as_str).unwrap_or("");
            let alt = attrs.get("alt").map(String::as_str).unwrap_or("");
            return self.build_image(src, alt, style, outer_width);
        }

        let inner_width = (outer_width - style.horizontal_extra()).max(1.0);
        if children.iter().all(is_inline_tree) {
            let mut items = Vec::new();
            for child in children {
                collect_inline(child, &mut items);
            }
            if !has_visible_text(&items) {
                items.clear();
            }
            return self.build_text_leaf(&items, style, outer_width, false);
        }

        let list_start = attrs
            .get("start")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(1);
        let child_nodes = self.build_block_children(children, tag, style, inner_width, list_start)?;
        let mut ts = self.box_style(style);
        ts.size.width = self.dim_to_taffy(style.width);
        let node = self
            .taffy
            .new_with_children(ts, &child_nodes)
            .map_err(|e| e.to_string())?;
        self.node_styles.insert(node, style.clone());
        Ok(node)
    }

    /// Tables: a column of rows, each row a flex row of equal-width cells.
    fn build_table(
        &mut self,
        style: &ComputedStyle,
        children: &[StyledNode],
        outer_width: f32,
    ) -> Result<NodeId, String> {
        let mut rows: Vec<&StyledNode> = Vec::new();
        for child in children {
            match child {
                StyledNode::Element { tag, children, .. } if tag.is_table_section() => {
                    rows.extend(children.iter().filter(|c| matches!(c, StyledNode::Element { tag: Tag::Tr, .. })));
                }
                StyledNode::Element { tag: Tag::Tr, .. } => rows.push(child),
                _ => {}
            }
        }

        let cell_count = |row: &StyledNode| match row {
            StyledNode::Element { children, .. } => children
                .iter()
                .filter(|c| matches!(c, StyledNode::Element { tag: Tag::Td | Tag::Th, .. }))
                .count(),
            StyledNode::Text { .. } => 0,
        };
        let columns = rows.iter().map(|r| cell_count(*r)).max().unwrap_or(0).max(1);
        let inner_width = (outer_width - style.horizontal_extra()).max(1.0);
        let cell_width = inner_width / columns as f32;

        let mut row_nodes = Vec::new();
        for row in rows {
            let StyledNode::Element { style: row_style, children, .. } = row else {
                continue;
            };
            let mut cells = Vec::new();
            for cell in children {
                let StyledNode::Element { tag: Tag::Td | Tag::Th, style: cell_style, children: content, .. } = cell else {
                    continue;
                };
                cells.push(self.build_cell(cell_style, content, cell_width)?);
            }
            let mut ts = self.box_style(row_style);
            ts.flex_direction = taffy::FlexDirection::Row;
            ts.align_items = Some(taffy::AlignItems::Stretch);
            ts.size.width = taffy::Dimension::Percent(1.0);
            let node = self.taffy.new_with_children(ts, &cells).map_err(|e| e.to_string())?;
            let mut rs = row_style.clone();
            rs.page_break_inside_avoid = true;
            self.node_styles.insert(node, rs);
            row_nodes.push(node);
        }

        let ts = self.box_style(style);
        let node = self
            .taffy
            .new_with_children(ts, &row_nodes)
            .map_err(|e| e.to_string())?;
        self.node_styles.insert(node, style.clone());
        Ok(node)
    }

    fn build_cell(
        &mut self,
        style: &ComputedStyle,
        children: &[StyledNode],
        width: f32,
    ) -> Result<NodeId, String> {
        if children.iter().all(is_inline_tree) {
            let mut items = Vec::new();
            for child in children {
                collect_inline(child, &mut items);
            }
            if !has_visible_text(&items) {
                items.clear();
            }
            return self.build_text_leaf(&items, style, width, true);
        }
        let inner = (width - style.horizontal_extra()).max(1.0);
        let kids = self.build_block_children(children, &Tag::Td, style, inner, 1)?;
        let mut ts = self.box_style(style);
        ts.flex_shrink = 0.0;
        ts.size.width = taffy::Dimension::Length(width);
        let node = self.taffy.new_with_children(ts, &kids).map_err(|e| e.to_string())?;
        self.node_styles.insert(node, style.clone());
        Ok(node)
    }

    /// Images are sized from their intrinsic dimensions and scaled down to
    /// fit the line. Unloadable images fall back to their alt text.
    fn build_image(
        &mut self,
        src: &str,
        alt: &str,
        style: &ComputedStyle,
        outer_width: f32,
    ) -> Result<NodeId, String> {
        let max_width = (outer_width - style.margin_left - style.margin_right).max(1.0);
        let intrinsic = crate::render::load_image(src, self.base_dir)
            .and_then(|bytes| ::image::load_from_memory(&bytes).map_err(|e| e.to_string()))
            .map(|img| (img.width() as f32 * PX_TO_PT, img.height() as f32 * PX_TO_PT));

        let (px_w, px_h) = match intrinsic {
            Ok((w, h)) if w > 0.0 && h > 0.0 => (w, h),
            other => {
                if let Err(e) = other {
                    log::warn!("Image '{}' not rendered: {e}", preview(src));
                }
                let mut fallback = style.clone();
                fallback.font_style = style::FontStyle::Italic;
                fallback.color = style::Color::MUTED;
                let text = if alt.is_empty() { String::new() } else { format!("[{alt}]") };
                let items = [InlineItem::Owned(text, &fallback)];
                let items: &[InlineItem<'_>] = if alt.is_empty() { &[] } else { &items };
                return self.build_text_leaf(items, &fallback, outer_width, false);
            }
        };
        let aspect = px_w / px_h;

        let width = match style.width {
            style::Dimension::Pt(w) => Some(w),
            style::Dimension::Percent(p) => Some(max_width * p / 100.0),
            style::Dimension::Auto => None,
        };
        let height = match style.height {
            style::Dimension::Pt(h) => Some(h),
            _ => None,
        };
        let (mut w, mut h) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w / aspect),
            (None, Some(h)) => (h * aspect, h),
            (None, None) => (px_w, px_h),
        };
        if w > max_width {
            h *= max_width / w;
            w = max_width;
        }

        let mut ts = self.box_style(style);
        ts.size = Size {
            width: taffy::Dimension::Length(w.max(1.0)),
            height: taffy::Dimension::Length(h.max(1.0)),
        };
        ts.align_self = Some(taffy::AlignSelf::Start);
        let node = self.taffy.new_leaf(ts).map_err(|e| e.to_string())?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(
            node,
            BoxContent::Image {
                src: src.to_string(),
            },
        );
        Ok(node)
    }

    /// Flex-column box with the element's margins, padding and borders.
    fn box_style(&self, s: &ComputedStyle) -> Style {
        Style {
            display: taffy::Display::Flex,
            flex_direction: taffy::FlexDirection::Column,
            margin: Rect {
                top: LengthPercentageAuto::Length(s.margin_top),
                right: LengthPercentageAuto::Length(s.margin_right),
                bottom: LengthPercentageAuto::Length(s.margin_bottom),
                left: LengthPercentageAuto::Length(s.margin_left),
            },
            padding: Rect {
                top: LengthPercentage::Length(s.padding_top),
                right: LengthPercentage::Length(s.padding_right),
                bottom: LengthPercentage::Length(s.padding_bottom),
                left: LengthPercentage::Length(s.padding_left),
            },
            border: Rect {
                top: LengthPercentage::Length(s.border_width + s.rule_top),
                right: LengthPercentage::Length(s.border_width),
                bottom: LengthPercentage::Length(s.border_width),
                left: LengthPercentage::Length(s.border_width + s.rule_left),
            },
            ..Default::default()
        }
    }

    fn dim_to_taffy(&self, d: style::Dimension) -> taffy::Dimension {
        match d {
            style::Dimension::Auto => taffy::Dimension::Auto,
            style::Dimension::Pt(v) => taffy::Dimension::Length(v),
            style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
        }
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox, String> {
        let layout = self.taffy.layout(node).map_err(|e| e.to_string())?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)
            .map_err(|e| e.to_string())?
            .iter()
            .map(|&child| self.extract(child, x, y))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            page_break_before: style.page_break_before,
            page_break_after: style.page_break_after,
            page_break_inside_avoid: style.page_break_inside_avoid,
            marker: self.node_markers.get(&node).cloned(),
            style,
            content,
            children,
        })
    }
}

fn preview(src: &str) -> &str {
    match src.char_indices().nth(60) {
        Some((i, _)) => &src[..i],
        None => src,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a styled tree, returning the top-level positioned
/// boxes in document coordinates. `base_dir` resolves relative image paths.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    page_width: f32,
    page_margin: f32,
    fonts: &FontManager,
    base_dir: Option<&Path>,
) -> Result<Vec<PositionedBox>, String> {
    let content_width = (page_width - 2.0 * page_margin).max(1.0);
    let mut builder = LayoutBuilder::new(fonts, base_dir);

    let root_style = ComputedStyle::default();
    let child_ids =
        builder.build_block_children(styled_nodes, &Tag::Body, &root_style, content_width, 1)?;

    let root = builder
        .taffy
        .new_with_children(
            Style {
                display: taffy::Display::Flex,
                flex_direction: taffy::FlexDirection::Column,
                size: Size {
                    width: taffy::Dimension::Length(content_width),
                    height: taffy::Dimension::Auto,
                },
                ..Default::default()
            },
            &child_ids,
        )
        .map_err(|e| e.to_string())?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(content_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(|e| e.to_string())?;

    Ok(builder.extract(root, page_margin, 0.0)?.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::style::build_styled_tree;

    fn layout(html: &str) -> Vec<PositionedBox> {
        let styled = build_styled_tree(&parse_html(html), None);
        compute_layout(&styled, 595.0, 40.0, &FontManager::builtin(), None).unwrap()
    }

    fn lines(pbox: &PositionedBox) -> Vec<String> {
        match &pbox.content {
            BoxContent::Text { lines } => lines
                .iter()
                .map(|l| l.segments.iter().map(|s| s.text.as_str()).collect())
                .collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn paragraph_has_size_and_text() {
        let boxes = layout("<p>Hello world</p>");
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].width > 0.0 && boxes[0].height > 0.0);
        assert_eq!(lines(&boxes[0]), vec!["Hello world"]);
    }

    #[test]
    fn blocks_stack_vertically() {
        let boxes = layout("<h1>Title</h1>\n<p>Body</p>\n");
        assert_eq!(boxes.len(), 2);
        assert!(boxes[1].y >= boxes[0].y + boxes[0].height);
    }

    #[test]
    fn mixed_styles_become_segments() {
        let boxes = layout("<p>plain <strong>bold</strong> <code>mono</code></p>");
        let BoxContent::Text { lines } = &boxes[0].content else {
            panic!("expected text");
        };
        let segs = &lines[0].segments;
        assert_eq!(segs.len(), 3);
        assert!(segs[1].bold);
        assert!(segs[2].monospace);
        assert!(segs[1].x_offset > segs[0].x_offset);
    }

    #[test]
    fn long_paragraph_wraps() {
        let text = "word ".repeat(200);
        let boxes = layout(&format!("<p>{text}</p>"));
        assert!(lines(&boxes[0]).len() > 5);
    }

    #[test]
    fn preformatted_keeps_lines() {
        let boxes = layout("<pre><code>fn a() {\n    1\n}\n</code></pre>");
        assert_eq!(lines(&boxes[0]), vec!["fn a() {", "    1", "}"]);
    }

    #[test]
    fn list_items_get_markers() {
        let boxes = layout("<ol start=\"3\"><li>a</li><li>b</li></ol><ul><li>c</li></ul>");
        let ol = &boxes[0];
        assert_eq!(ol.children[0].marker.as_deref(), Some("3."));
        assert_eq!(ol.children[1].marker.as_deref(), Some("4."));
        assert_eq!(boxes[1].children[0].marker.as_deref(), Some("\u{2022}"));
    }

    #[test]
    fn table_cells_share_row_width() {
        let boxes = layout(
            "<table><thead><tr><th>A</th><th>B</th></tr></thead><tbody><tr><td>1</td><td>2</td></tr></tbody></table>",
        );
        let table = &boxes[0];
        // Sections are flattened: the table's children are its rows.
        assert_eq!(table.children.len(), 2);
        for row in &table.children {
            assert_eq!(row.children.len(), 2);
            let (a, b) = (&row.children[0], &row.children[1]);
            assert!((a.width - b.width).abs() < 0.5, "{} vs {}", a.width, b.width);
            assert!((a.width + b.width - table.width).abs() < 0.5);
            assert!(b.x > a.x);
            assert!(row.page_break_inside_avoid);
        }
        assert!(table.children[1].y > table.children[0].y);
    }

    #[test]
    fn unloadable_image_falls_back_to_alt() {
        let boxes = layout("<p><img src=\"missing.png\" alt=\"diagram\"></p>");
        let img = &boxes[0].children[0];
        assert_eq!(lines(img), vec!["[diagram]"]);
    }

    #[test]
    fn mixed_block_and_inline_children() {
        let boxes = layout("<li>intro<ul><li>nested</li></ul></li>");
        // The li becomes a container: anonymous paragraph + nested list.
        assert_eq!(boxes[0].children.len(), 2);
        assert_eq!(lines(&boxes[0].children[0]), vec!["intro"]);
    }
}
