//! Pagination – cuts the document-space box tree into pages.
//!
//! Handles:
//! - page boundaries for the configured page size and margin
//! - `page-break-before` / `page-break-after` hints
//! - descending into containers (lists, tables, quotes) that overflow
//! - splitting long paragraphs and code blocks between lines

use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;

/// Slack for float rounding when testing whether a box fits.
const FIT_EPSILON: f32 = 0.01;

/// Convert positioned boxes into a paginated [`LayoutConfig`].
pub fn paginate(
    boxes: &[PositionedBox],
    page_width: f32,
    page_height: f32,
    page_margin: f32,
) -> LayoutConfig {
    let mut paginator = Paginator {
        config: LayoutConfig::new(String::new(), page_width, page_height),
        current: Vec::new(),
        page_start_doc_y: 0.0,
        content_height: (page_height - 2.0 * page_margin).max(1.0),
        page_margin,
    };
    for pbox in boxes {
        paginator.place(pbox);
    }
    paginator.finish()
}

struct Paginator {
    config: LayoutConfig,
    current: Vec<LayoutBox>,
    /// Document-space y at which the current page begins. Every
    /// `PositionedBox.y` is absolute, so `y - page_start_doc_y` is the
    /// offset on the page.
    page_start_doc_y: f32,
    content_height: f32,
    page_margin: f32,
}

impl Paginator {
    fn y_on_page(&self, pbox: &PositionedBox) -> f32 {
        (pbox.y - self.page_start_doc_y).max(0.0)
    }

    /// Close the current page; the next one starts at `doc_y`. A page with
    /// nothing on it is never emitted.
    fn break_page(&mut self, doc_y: f32) {
        if self.current.is_empty() {
            return;
        }
        let boxes = std::mem::take(&mut self.current);
        self.config.pages.push(PageLayout {
            page_index: self.config.pages.len(),
            boxes,
        });
        self.page_start_doc_y = doc_y;
    }

    fn place(&mut self, pbox: &PositionedBox) {
        if pbox.page_break_before {
            self.break_page(pbox.y);
        }

        let fits = self.y_on_page(pbox) + pbox.height <= self.content_height + FIT_EPSILON;
        let is_container = matches!(pbox.content, BoxContent::None) && !pbox.children.is_empty();
        let multi_line = matches!(&pbox.content, BoxContent::Text { lines } if lines.len() > 1);

        if fits {
            self.push(pbox);
        } else if is_container && !pbox.page_break_inside_avoid {
            // Decoration of the container itself is dropped; its bullet
            // still has to appear next to the first child.
            if pbox.marker.is_some() {
                let mut marker_only = build_layout_box(pbox, self.page_abs_y(pbox), false);
                marker_only.height = 0.0;
                self.current.push(marker_only);
            }
            for child in &pbox.children {
                self.place(child);
            }
        } else if multi_line && !pbox.page_break_inside_avoid {
            self.split_text(pbox);
        } else {
            self.break_page(pbox.y);
            self.push(pbox);
        }

        if pbox.page_break_after {
            self.break_page(pbox.y + pbox.height);
        }
    }

    fn page_abs_y(&self, pbox: &PositionedBox) -> f32 {
        self.page_margin + self.y_on_page(pbox)
    }

    fn push(&mut self, pbox: &PositionedBox) {
        let lb = build_layout_box(pbox, self.page_abs_y(pbox), true);
        self.current.push(lb);
    }

    /// Place a text box line by line, continuing on new pages as needed.
    fn split_text(&mut self, pbox: &PositionedBox) {
        let mut part = build_layout_box(pbox, self.page_abs_y(pbox), true);
        loop {
            let space = self.page_margin + self.content_height - part.y;
            let Some(text) = &part.text else {
                self.current.push(part);
                return;
            };
            let fitting = text
                .lines
                .iter()
                .take_while(|l| l.y_offset + l.height <= space + FIT_EPSILON)
                .count();

            if fitting >= text.lines.len() {
                self.current.push(part);
                return;
            }
            if fitting == 0 {
                if self.current.is_empty() {
                    // Not even one line fits on an empty page; let it overflow.
                    self.current.push(part);
                    return;
                }
                let remaining = part.height;
                self.break_page(pbox.y + pbox.height - remaining);
                part.y = self.page_margin;
                continue;
            }

            let (head, tail) = split_lines(part, fitting);
            self.current.push(head);
            part = tail;
            let remaining = part.height;
            self.break_page(pbox.y + pbox.height - remaining);
            part.y = self.page_margin;
        }
    }

    fn finish(mut self) -> LayoutConfig {
        if !self.current.is_empty() {
            let boxes = std::mem::take(&mut self.current);
            self.config.pages.push(PageLayout {
                page_index: self.config.pages.len(),
                boxes,
            });
        }
        if self.config.pages.is_empty() {
            self.config.pages.push(PageLayout {
                page_index: 0,
                boxes: Vec::new(),
            });
        }
        self.config
    }
}

/// Split a text box after `at` lines. The tail keeps the box decoration and
/// loses the list marker.
fn split_lines(mut lb: LayoutBox, at: usize) -> (LayoutBox, LayoutBox) {
    let mut tail = lb.clone();
    tail.list_marker = None;
    tail.rule_top = None;

    let Some(text) = lb.text.as_mut() else {
        return (lb, tail);
    };
    let top_pad = text.lines.first().map(|l| l.y_offset).unwrap_or(0.0);
    let rest = text.lines.split_off(at);
    let cut = rest.first().map(|l| l.y_offset).unwrap_or(lb.height);

    // Head ends where the first moved line started.
    let head_height = cut;
    let shift = cut - top_pad;
    let mut tail_lines = rest;
    for line in &mut tail_lines {
        line.y_offset -= shift;
    }
    tail.height = (lb.height - shift).max(0.0);
    tail.text = Some(TextContent { lines: tail_lines });
    lb.height = head_height;
    (lb, tail)
}

/// Build a [`LayoutBox`] tree with page-absolute coordinates.
///
/// Children keep their offset from the parent: `child_abs_y = abs_y +
/// (child.y - parent.y)`, since `PositionedBox.y` values are document-space
/// absolutes.
fn build_layout_box(pbox: &PositionedBox, abs_y: f32, with_children: bool) -> LayoutBox {
    let s = &pbox.style;
    let mut lb = LayoutBox::new(pbox.x, abs_y, pbox.width, pbox.height);

    if !s.background_color.is_transparent() {
        lb.background_color = Some(s.background_color.to_array());
    }
    if s.border_width > 0.0 {
        lb.border = Some(BorderStyle {
            width: s.border_width,
            color: s.border_color.to_array(),
        });
    }
    if s.rule_left > 0.0 {
        lb.rule_left = Some(BorderStyle {
            width: s.rule_left,
            color: s.border_color.to_array(),
        });
    }
    if s.rule_top > 0.0 {
        lb.rule_top = Some(BorderStyle {
            width: s.rule_top,
            color: s.border_color.to_array(),
        });
    }

    if let Some(marker) = &pbox.marker {
        let first_line = match &pbox.content {
            BoxContent::Text { lines } => lines.first().map(|l| l.y_offset + l.baseline),
            _ => None,
        };
        lb.list_marker = Some(ListMarker {
            text: marker.clone(),
            font_size: s.font_size,
            baseline: first_line.unwrap_or(s.font_size * 1.05),
            color: s.color.to_array(),
        });
    }

    match &pbox.content {
        BoxContent::Text { lines } => {
            lb.text = Some(TextContent {
                lines: lines.clone(),
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::None => {}
    }

    if with_children {
        for child in &pbox.children {
            let child_abs_y = abs_y + (child.y - pbox.y);
            lb.children.push(build_layout_box(child, child_abs_y, true));
        }
    }
    lb
}
