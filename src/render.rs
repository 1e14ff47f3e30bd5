//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::fonts::{FontKey, FontManager};
use crate::layout_config::{
    BorderStyle, ImageContent, LayoutBox, LayoutConfig, ListMarker, TextLine, TextSegment,
};

/// Gap between a list marker and the item text, in points.
const MARKER_GAP: f32 = 5.0;

/// Options that do not change the layout, only how it is painted.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Paint background fills (code blocks, table headers, inline styles).
    pub print_background: bool,
    /// Directory that relative image paths are resolved against.
    pub base_dir: Option<PathBuf>,
}

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Fonts available while emitting ops.
struct FontSet<'a> {
    metrics: &'a FontManager,
    custom: Option<FontId>,
}

/// Render a LayoutConfig into PDF bytes.
///
/// Images that cannot be loaded or decoded are skipped with a warning; the
/// layout already reserved their alt text in that case.
pub fn render_pdf(
    config: &LayoutConfig,
    fonts: &FontManager,
    options: &RenderOptions,
) -> Result<Vec<u8>, String> {
    let page_w = Mm(config.page_width_pt * 0.352778); // pt → mm
    let page_h = Mm(config.page_height_pt * 0.352778);

    let mut doc = PdfDocument::new(&config.title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();

    let custom = match fonts.custom_font() {
        Some(bytes) => {
            let parsed = ParsedFont::from_bytes(bytes, 0, &mut warnings)
                .ok_or_else(|| "embedded font could not be parsed".to_string())?;
            Some(doc.add_font(&parsed))
        }
        None => None,
    };
    let font_set = FontSet {
        metrics: fonts,
        custom,
    };

    // ── Pre-register all images ────────────────────────────────────────────
    let mut all_srcs: HashSet<&str> = HashSet::new();
    for page_layout in &config.pages {
        for lbox in &page_layout.boxes {
            collect_image_srcs(lbox, &mut all_srcs);
        }
    }

    let mut image_resources: HashMap<String, ImageResource> = HashMap::new();
    for src in all_srcs {
        let bytes = match load_image(src, options.base_dir.as_deref()) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Skipping image: {e}");
                continue;
            }
        };
        let dyn_img = match ::image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Skipping image: decode error: {e}");
                continue;
            }
        };
        let raw = match RawImage::decode_from_bytes(&bytes, &mut warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Skipping image: PDF encode error: {e}");
                continue;
            }
        };
        let xobj_id = doc.add_image(&raw);
        image_resources.insert(
            src.to_string(),
            ImageResource {
                xobj_id,
                px_width: dyn_img.width(),
                px_height: dyn_img.height(),
            },
        );
    }

    // ── Render pages ──────────────────────────────────────────────────────
    let mut pages = Vec::new();
    let mut unmapped = 0;
    for page_layout in &config.pages {
        let mut ops = Vec::new();
        let mut painter = Painter {
            ops: &mut ops,
            page_height: config.page_height_pt,
            images: &image_resources,
            fonts: &font_set,
            print_background: options.print_background,
            unmapped: 0,
        };
        for lbox in &page_layout.boxes {
            painter.paint(lbox);
        }
        unmapped += painter.unmapped;
        pages.push(PdfPage::new(page_w, page_h, ops));
    }
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    if unmapped > 0 {
        log::warn!(
            "{unmapped} character(s) have no glyph in the builtin fonts and were printed as '?'; \
             set `native_font` in the profile to a TTF that covers them"
        );
    }

    doc.with_pages(pages);
    // Raw `Tj` operands are only written when the save is not `secure`.
    let save_options = PdfSaveOptions {
        secure: false,
        ..PdfSaveOptions::default()
    };
    let bytes = doc.save(&save_options, &mut warnings);
    Ok(bytes)
}

/// Load the bytes behind an image `src`: a base64 `data:` URI, a `file:`
/// URL, or a path relative to `base_dir` (or the working directory).
/// Remote URLs are not fetched.
pub fn load_image(src: &str, base_dir: Option<&Path>) -> Result<Vec<u8>, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("image has no src".to_string());
    }
    if src.starts_with("data:") {
        return parse_data_uri(src);
    }
    if src.starts_with("http://") || src.starts_with("https://") || src.starts_with("//") {
        return Err(format!("remote image {src} is not fetched by the native backend"));
    }

    let base = match base_dir {
        Some(dir) => fs::canonicalize(dir).map_err(|e| format!("{}: {e}", dir.display()))?,
        None => std::env::current_dir().map_err(|e| e.to_string())?,
    };
    let base_url = url::Url::from_directory_path(&base)
        .map_err(|()| format!("cannot express {} as a URL", base.display()))?;
    let path = base_url
        .join(src)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| format!("unsupported image reference {src}"))?;
    fs::read(&path).map_err(|e| format!("{}: {e}", path.display()))
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = &src["data:".len()..];
    let comma_pos = rest
        .find(',')
        .ok_or_else(|| "invalid data URI: missing `,` between header and data".to_string())?;
    let header = &rest[..comma_pos];
    if !header.contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(rest[comma_pos + 1..].trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

/// Encode `s` for the builtin fonts, which use WinAnsiEncoding (one byte
/// per glyph). Characters outside that table become `?`; the second value
/// counts them.
fn to_winansi(s: &str) -> (Vec<u8>, usize) {
    let mut unmapped = 0;
    let bytes = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => {
                unmapped += 1;
                b'?'
            }
        })
        .collect();
    (bytes, unmapped)
}

fn builtin_font(key: FontKey) -> BuiltinFont {
    match (key.monospace, key.bold, key.italic) {
        (true, true, true) => BuiltinFont::CourierBoldOblique,
        (true, true, false) => BuiltinFont::CourierBold,
        (true, false, true) => BuiltinFont::CourierOblique,
        (true, false, false) => BuiltinFont::Courier,
        (false, true, true) => BuiltinFont::HelveticaBoldOblique,
        (false, true, false) => BuiltinFont::HelveticaBold,
        (false, false, true) => BuiltinFont::HelveticaOblique,
        (false, false, false) => BuiltinFont::Helvetica,
    }
}

/// Recursively collect all unique `image.src` strings from a [`LayoutBox`] tree.
fn collect_image_srcs<'a>(lbox: &'a LayoutBox, srcs: &mut HashSet<&'a str>) {
    if let Some(img) = &lbox.image {
        srcs.insert(img.src.as_str());
    }
    for child in &lbox.children {
        collect_image_srcs(child, srcs);
    }
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Emits ops for one page. Layout coordinates have their origin at the top
/// left; PDF's is at the bottom left.
struct Painter<'a> {
    ops: &'a mut Vec<Op>,
    page_height: f32,
    images: &'a HashMap<String, ImageResource>,
    fonts: &'a FontSet<'a>,
    print_background: bool,
    /// Characters the builtin fonts could not encode.
    unmapped: usize,
}

impl Painter<'_> {
    fn paint(&mut self, lbox: &LayoutBox) {
        if let (Some(bg), true) = (lbox.background_color, self.print_background) {
            self.fill_rect(lbox.x, lbox.y, lbox.width, lbox.height, bg);
        }
        if let Some(border) = lbox.border {
            self.stroke_rect(lbox, border);
        }
        if let Some(rule) = lbox.rule_left {
            self.fill_rect(lbox.x, lbox.y, rule.width, lbox.height, rule.color);
        }
        if let Some(rule) = lbox.rule_top {
            self.fill_rect(lbox.x, lbox.y, lbox.width, rule.width, rule.color);
        }
        if let Some(marker) = &lbox.list_marker {
            self.paint_marker(lbox, marker);
        }
        if let Some(text) = &lbox.text {
            for line in &text.lines {
                for seg in &line.segments {
                    self.paint_segment(lbox, line, seg);
                }
            }
        }
        if let Some(img) = &lbox.image {
            self.paint_image(lbox, img);
        }
        for child in &lbox.children {
            self.paint(child);
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: [f32; 4]) {
        let top = self.page_height - y;
        let bottom = top - h;
        self.ops.push(Op::SetFillColor { col: rgb(color) });
        self.ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: vec![
                        point(x, bottom),
                        point(x + w, bottom),
                        point(x + w, top),
                        point(x, top),
                    ],
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    fn stroke_rect(&mut self, lbox: &LayoutBox, border: BorderStyle) {
        let top = self.page_height - lbox.y;
        let bottom = top - lbox.height;
        let (x1, x2) = (lbox.x, lbox.x + lbox.width);
        self.ops.push(Op::SetOutlineColor {
            col: rgb(border.color),
        });
        self.ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        self.ops.push(Op::DrawLine {
            line: Line {
                points: vec![
                    point(x1, top),
                    point(x2, top),
                    point(x2, bottom),
                    point(x1, bottom),
                ],
                is_closed: true,
            },
        });
    }

    fn stroke_line(&mut self, x1: f32, x2: f32, y: f32, width: f32, color: [f32; 4]) {
        self.ops.push(Op::SetOutlineThickness { pt: Pt(width) });
        self.ops.push(Op::SetOutlineColor { col: rgb(color) });
        self.ops.push(Op::DrawLine {
            line: Line {
                points: vec![point(x1, y), point(x2, y)],
                is_closed: false,
            },
        });
    }

    fn write_text(&mut self, text: &str, x: f32, baseline_y: f32, size: f32, key: FontKey, color: [f32; 4]) {
        self.ops.push(Op::StartTextSection);
        self.ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(x),
                y: Pt(baseline_y),
            },
        });
        self.ops.push(Op::SetFillColor { col: rgb(color) });
        match self.fonts.custom.as_ref() {
            Some(font) if self.fonts.metrics.uses_custom(key) => {
                self.ops.push(Op::SetFontSize {
                    size: Pt(size),
                    font: font.clone(),
                });
                self.ops.push(Op::WriteText {
                    items: vec![TextItem::Text(text.to_string())],
                    font: font.clone(),
                });
            }
            _ => {
                let font = builtin_font(key);
                let (bytes, unmapped) = to_winansi(text);
                self.unmapped += unmapped;
                self.ops.push(Op::SetFontSizeBuiltinFont {
                    size: Pt(size),
                    font,
                });
                // An empty run registers the font in the page resources; the
                // encoded bytes go out as a hex string operand of `Tj`.
                self.ops.push(Op::WriteTextBuiltinFont {
                    items: Vec::new(),
                    font,
                });
                self.ops.push(Op::Unknown {
                    key: "Tj".to_string(),
                    value: vec![DictItem::String {
                        data: bytes,
                        literal: false,
                    }],
                });
            }
        }
        self.ops.push(Op::EndTextSection);
    }

    fn paint_segment(&mut self, lbox: &LayoutBox, line: &TextLine, seg: &TextSegment) {
        if seg.text.trim().is_empty() && !seg.underline {
            return;
        }
        let key = FontKey {
            bold: seg.bold,
            italic: seg.italic,
            monospace: seg.monospace,
        };
        let x = lbox.x + seg.x_offset;
        let baseline_y = self.page_height - (lbox.y + line.y_offset + line.baseline);
        self.write_text(&seg.text, x, baseline_y, seg.font_size, key, seg.color);

        let thickness = (seg.font_size * 0.05).max(0.5);
        if seg.underline {
            let y = baseline_y - seg.font_size * 0.12;
            self.stroke_line(x, x + seg.width, y, thickness, seg.color);
        }
        if seg.strike {
            let y = baseline_y + seg.font_size * 0.3;
            self.stroke_line(x, x + seg.width, y, thickness, seg.color);
        }
    }

    fn paint_marker(&mut self, lbox: &LayoutBox, marker: &ListMarker) {
        let key = FontKey {
            bold: false,
            italic: false,
            monospace: false,
        };
        let width = self.fonts.metrics.measure(&marker.text, marker.font_size, key);
        let x = lbox.x - width - MARKER_GAP;
        let baseline_y = self.page_height - (lbox.y + marker.baseline);
        self.write_text(&marker.text, x, baseline_y, marker.font_size, key, marker.color);
    }

    fn paint_image(&mut self, lbox: &LayoutBox, img: &ImageContent) {
        let Some(res) = self.images.get(&img.src) else {
            return;
        };
        let img_bottom_y = self.page_height - lbox.y - img.height;
        // At dpi=72 printpdf maps 1 px to 1 pt, so scale = target pt / px.
        let scale_x = if res.px_width > 0 {
            img.width / res.px_width as f32
        } else {
            1.0
        };
        let scale_y = if res.px_height > 0 {
            img.height / res.px_height as f32
        } else {
            1.0
        };
        self.ops.push(Op::UseXobject {
            id: res.xobj_id.clone(),
            transform: XObjectTransform {
                translate_x: Some(Pt(lbox.x)),
                translate_y: Some(Pt(img_bottom_y)),
                dpi: Some(72.0),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                rotate: None,
            },
        });
    }
}
