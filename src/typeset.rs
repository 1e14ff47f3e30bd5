//! Typesetting – ties together parsing, styling, layout, pagination, and
//! rendering for the native backend.

use std::path::PathBuf;

use crate::backend::PageSetup;
use crate::dom::{body_children, document_title, parse_html};
use crate::fonts::FontManager;
use crate::layout::compute_layout;
use crate::layout_config::LayoutConfig;
use crate::pagination::paginate;
use crate::render::{render_pdf, RenderOptions};
use crate::style::build_styled_tree;

/// Title used when neither the caller nor the document supplies one.
pub const FALLBACK_TITLE: &str = "Document";

/// Configuration for one native render.
#[derive(Debug, Clone, Default)]
pub struct TypesetConfig {
    /// PDF title; defaults to the document's `<title>`.
    pub title: Option<String>,
    pub page: PageSetup,
    /// Directory relative image paths are resolved against.
    pub base_dir: Option<PathBuf>,
    /// TTF/OTF bytes for body text instead of the builtin Helvetica.
    pub font: Option<Vec<u8>>,
}

impl TypesetConfig {
    fn fonts(&self) -> Result<FontManager, String> {
        match &self.font {
            Some(bytes) => FontManager::with_font(bytes.clone()),
            None => Ok(FontManager::builtin()),
        }
    }
}

/// Lay out `html` into pages without rendering.
pub fn compute_layout_config(html: &str, config: &TypesetConfig) -> Result<LayoutConfig, String> {
    let fonts = config.fonts()?;
    layout_with(html, config, &fonts)
}

fn layout_with(html: &str, config: &TypesetConfig, fonts: &FontManager) -> Result<LayoutConfig, String> {
    let dom = parse_html(html);
    let title = config
        .title
        .clone()
        .or_else(|| document_title(&dom))
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let styled = build_styled_tree(&body_children(&dom), None);

    let width = config.page.width_pt();
    let height = config.page.height_pt();
    let margin = config.page.margin_pt();
    let boxes = compute_layout(&styled, width, margin, fonts, config.base_dir.as_deref())?;

    let mut layout = paginate(&boxes, width, height, margin);
    layout.title = title;
    Ok(layout)
}

/// Full typesetting: HTML string → PDF bytes, plus the layout it was
/// rendered from.
pub fn generate_pdf(html: &str, config: &TypesetConfig) -> Result<(Vec<u8>, LayoutConfig), String> {
    let fonts = config.fonts()?;
    let layout = layout_with(html, config, &fonts)?;
    log::trace!("Native layout: {}", layout.to_json());

    let options = RenderOptions {
        print_background: config.page.print_background,
        base_dir: config.base_dir.clone(),
    };
    let bytes = render_pdf(&layout, &fonts, &options)?;
    Ok((bytes, layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeset_basic() {
        let (bytes, layout) =
            generate_pdf("<h1>Hello</h1><p>World</p>", &TypesetConfig::default()).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
        assert_eq!(layout.pages.len(), 1);
        assert_eq!(layout.title, FALLBACK_TITLE);
    }

    #[test]
    fn title_comes_from_document() {
        let layout = compute_layout_config(
            "<html><head><title>Quarterly</title></head><body><p>x</p></body></html>",
            &TypesetConfig::default(),
        )
        .unwrap();
        assert_eq!(layout.title, "Quarterly");
        assert_eq!(layout.page_text(0), vec!["x"]);
    }

    #[test]
    fn page_setup_drives_geometry() {
        let config = TypesetConfig {
            page: PageSetup {
                size: crate::backend::PageSize::Letter,
                landscape: true,
                ..PageSetup::default()
            },
            ..TypesetConfig::default()
        };
        let layout = compute_layout_config("<p>x</p>", &config).unwrap();
        assert!((layout.page_width_pt - 792.0).abs() < 0.1);
        assert!((layout.page_height_pt - 612.0).abs() < 0.1);
    }
}
