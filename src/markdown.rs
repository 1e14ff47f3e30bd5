//! Markdown renderer – body text in, HTML fragment out.
//!
//! The pipeline only depends on [`MarkdownRenderer`]; [`ComrakRenderer`] is
//! the stock implementation.

use comrak::{markdown_to_html, Options};

/// Pure text → HTML conversion of a document body.
pub trait MarkdownRenderer {
    fn render(&self, body: &str) -> String;
}

/// CommonMark + GFM renderer backed by `comrak`.
///
/// Enabled extensions: tables, strikethrough, autolinks, task lists,
/// footnotes, description lists and superscript. Raw HTML in the source is
/// passed through, since documents are authored by the person running the
/// conversion.
pub struct ComrakRenderer {
    options: Options<'static>,
}

impl ComrakRenderer {
    pub fn new() -> Self {
        let mut options = Options::default();
        let ext = &mut options.extension;
        ext.table = true;
        ext.strikethrough = true;
        ext.autolink = true;
        ext.tasklist = true;
        ext.footnotes = true;
        ext.description_lists = true;
        ext.superscript = true;

        let render = &mut options.render;
        render.r#unsafe = true;
        render.github_pre_lang = false;

        Self { options }
    }

    /// Treat single newlines inside paragraphs as `<br>`.
    pub fn with_hard_breaks(mut self, enabled: bool) -> Self {
        self.options.render.hardbreaks = enabled;
        self
    }
}

impl Default for ComrakRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer for ComrakRenderer {
    fn render(&self, body: &str) -> String {
        markdown_to_html(body, &self.options)
    }
}
