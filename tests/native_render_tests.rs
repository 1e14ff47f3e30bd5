//! Integration tests for the native print backend.
//!
//! These tests validate:
//! - DOM parsing of the HTML comrak produces
//! - layout positions stay inside the page
//! - pagination follows the page geometry
//! - PDF output exists and has a valid header

use std::io::Cursor;

use base64::Engine;
use md_forge::backend::{PageSetup, PageSize};
use md_forge::dom::{body_children, parse_html, DomNode, Tag};
use md_forge::layout_config::{LayoutBox, LayoutConfig};
use md_forge::markdown::{ComrakRenderer, MarkdownRenderer};
use md_forge::typeset::{compute_layout_config, generate_pdf, TypesetConfig};

// =====================================================================
// Helper
// =====================================================================

fn default_config() -> TypesetConfig {
    TypesetConfig::default()
}

fn layout(html: &str) -> LayoutConfig {
    compute_layout_config(html, &default_config()).unwrap()
}

fn markdown(md: &str) -> String {
    ComrakRenderer::new().render(md)
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn visit_box(lbox: &LayoutBox, f: &mut dyn FnMut(&LayoutBox)) {
    f(lbox);
    for child in &lbox.children {
        visit_box(child, f);
    }
}

fn visit_all(config: &LayoutConfig, f: &mut dyn FnMut(&LayoutBox)) {
    for page in &config.pages {
        for lbox in &page.boxes {
            visit_box(lbox, f);
        }
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

const SAMPLE_MD: &str = "\
# Weekly report

Some **bold** and *italic* text with `inline code` and a [link](https://example.com).

## Tasks

- first
- second
  - nested

1. one
2. two

> A quoted remark.

```rust
fn main() {
    println!(\"hi\");
}
```

| Name | Score |
|------|------:|
| Ada  | 10    |
| Bob  | 7     |

---

Final paragraph.
";

// =====================================================================
// DOM parsing of rendered Markdown
// =====================================================================

#[test]
fn parse_heading_elements() {
    let dom = parse_html(&markdown("# A\n\n## B\n\n### C\n"));
    let tags: Vec<Tag> = dom
        .iter()
        .filter_map(|n| match n {
            DomNode::Element(e) => Some(e.tag.clone()),
            DomNode::Text(_) => None,
        })
        .collect();
    assert_eq!(tags, vec![Tag::H(1), Tag::H(2), Tag::H(3)]);
}

#[test]
fn parse_table_structure() {
    let dom = parse_html(&markdown("| a | b |\n|---|---|\n| 1 | 2 |\n"));
    let table = dom
        .iter()
        .find_map(|n| match n {
            DomNode::Element(e) if e.tag == Tag::Table => Some(e),
            _ => None,
        })
        .expect("table element");
    assert!(table.text_content().contains('1'));
}

#[test]
fn composed_document_body_skips_head() {
    let html = "<html><head><title>T</title><style>p { color: red }</style>\
                <script>var x = 1;</script></head><body><p>only this</p></body></html>";
    let body = body_children(&parse_html(html));
    let text: String = body
        .iter()
        .map(|n| match n {
            DomNode::Element(e) => e.text_content(),
            DomNode::Text(t) => t.clone(),
        })
        .collect();
    assert_eq!(text.trim(), "only this");
}

// =====================================================================
// Layout config position tests
// =====================================================================

#[test]
fn layout_positions_are_within_page() {
    let config = layout(&markdown(SAMPLE_MD));
    let page_w = config.page_width_pt;
    let page_h = config.page_height_pt;

    visit_all(&config, &mut |lbox| {
        assert!(
            lbox.x >= 0.0 && lbox.x < page_w,
            "Box x={} outside page width={}",
            lbox.x,
            page_w
        );
        assert!(
            lbox.y >= 0.0 && lbox.y < page_h,
            "Box y={} outside page height={}",
            lbox.y,
            page_h
        );
    });
}

#[test]
fn layout_boxes_have_positive_dimensions() {
    let config = layout(&markdown(SAMPLE_MD));
    visit_all(&config, &mut |lbox| {
        assert!(lbox.width >= 0.0, "Negative width: {}", lbox.width);
        assert!(lbox.height >= 0.0, "Negative height: {}", lbox.height);
    });
}

#[test]
fn layout_content_width_matches_page() {
    let cfg = default_config();
    let config = layout("<div><p>Full width</p></div>");
    let content_width = cfg.page.width_pt() - 2.0 * cfg.page.margin_pt();

    for page in &config.pages {
        for lbox in &page.boxes {
            assert!(
                lbox.width <= content_width + 1.0,
                "Box width {} exceeds content width {}",
                lbox.width,
                content_width
            );
            assert!((lbox.x - cfg.page.margin_pt()).abs() < 0.5);
        }
    }
}

#[test]
fn sample_document_keeps_reading_order() {
    let config = layout(&markdown(SAMPLE_MD));
    let text: Vec<String> = (0..config.pages.len())
        .flat_map(|p| config.page_text(p))
        .collect();
    let pos = |needle: &str| {
        text.iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("'{needle}' missing from {text:?}"))
    };
    assert!(pos("Weekly report") < pos("Tasks"));
    assert!(pos("Tasks") < pos("A quoted remark."));
    assert!(pos("println!") < pos("Final paragraph."));
}

// =====================================================================
// Pagination tests
// =====================================================================

#[test]
fn single_paragraph_fits_one_page() {
    assert_eq!(layout("<p>Short</p>").pages.len(), 1);
}

#[test]
fn many_paragraphs_create_multiple_pages() {
    let md: String = (0..80)
        .map(|i| format!("Paragraph {i} with enough text to take up some vertical space.\n\n"))
        .collect();
    let config = layout(&markdown(&md));
    assert!(
        config.pages.len() > 1,
        "Expected multiple pages, got {}",
        config.pages.len()
    );
}

#[test]
fn smaller_page_needs_more_pages() {
    let md: String = (0..60).map(|i| format!("Line {i}\n\n")).collect();
    let html = markdown(&md);
    let a4 = compute_layout_config(&html, &default_config()).unwrap();
    let a5 = compute_layout_config(
        &html,
        &TypesetConfig {
            page: PageSetup {
                size: PageSize::A5,
                ..PageSetup::default()
            },
            ..default_config()
        },
    )
    .unwrap();
    assert!(a5.pages.len() > a4.pages.len());
}

#[test]
fn page_break_before() {
    let html = r#"<p>Page 1 content</p><p style="page-break-before: always">Page 2 content</p>"#;
    let config = layout(html);
    assert_eq!(config.pages.len(), 2);
    assert_eq!(config.page_text(1), vec!["Page 2 content"]);
}

// =====================================================================
// PDF generation tests
// =====================================================================

#[test]
fn generate_pdf_from_sample_markdown() {
    let (bytes, config) = generate_pdf(&markdown(SAMPLE_MD), &default_config()).unwrap();
    assert_valid_pdf(&bytes);
    assert!(!config.pages.is_empty());
}

#[test]
fn generate_pdf_from_empty_body() {
    let (bytes, config) = generate_pdf("", &default_config()).unwrap();
    assert_valid_pdf(&bytes);
    assert_eq!(config.pages.len(), 1);
}

#[test]
fn generate_pdf_without_backgrounds() {
    let config = TypesetConfig {
        page: PageSetup {
            print_background: false,
            ..PageSetup::default()
        },
        ..default_config()
    };
    let (bytes, _) = generate_pdf(&markdown(SAMPLE_MD), &config).unwrap();
    assert_valid_pdf(&bytes);
}

#[test]
fn text_outside_builtin_encoding_still_renders() {
    let (bytes, config) = generate_pdf("<p>\u{4F60}\u{597D} \u{4E16}\u{754C} caf\u{E9}</p>", &default_config()).unwrap();
    assert_valid_pdf(&bytes);
    let text = config.page_text(0).join(" ");
    assert!(text.contains("\u{4F60}\u{597D}"), "{text:?}");
    assert!(text.contains("caf\u{E9}"), "{text:?}");
}

#[test]
fn layout_config_serializes_to_json() {
    let config = layout(&markdown(SAMPLE_MD));
    let json: serde_json::Value = serde_json::from_str(&config.to_json()).unwrap();
    assert_eq!(
        json["pages"].as_array().map(Vec::len),
        Some(config.pages.len())
    );
}

#[test]
fn pdf_output_is_deterministic_in_size() {
    let html = markdown(SAMPLE_MD);
    let (bytes1, _) = generate_pdf(&html, &default_config()).unwrap();
    let (bytes2, _) = generate_pdf(&html, &default_config()).unwrap();

    // printpdf embeds timestamps and ids, so byte-exact equality isn't
    // guaranteed.
    let diff = (bytes1.len() as i64 - bytes2.len() as i64).unsigned_abs();
    assert!(
        diff < 200,
        "PDF outputs differ significantly: {} vs {} bytes",
        bytes1.len(),
        bytes2.len()
    );
}

// =====================================================================
// Text / inline tests
// =====================================================================

#[test]
fn inline_styles_produce_styled_segments() {
    let config = layout(&markdown("Hello **bold** and `code`"));
    let mut bold = false;
    let mut mono = false;
    visit_all(&config, &mut |b| {
        if let Some(text) = &b.text {
            for seg in text.lines.iter().flat_map(|l| &l.segments) {
                bold |= seg.bold && seg.text.contains("bold");
                mono |= seg.monospace && seg.text.contains("code");
            }
        }
    });
    assert!(bold, "bold segment missing");
    assert!(mono, "monospace segment missing");
}

// =====================================================================
// Table layout tests
// =====================================================================

#[test]
fn table_produces_grid_layout() {
    let config = layout(&markdown("| A | B |\n|---|---|\n| 1 | 2 |\n"));
    let mut cells = Vec::new();
    visit_all(&config, &mut |b| {
        if let Some(text) = &b.text {
            if let Some(line) = text.lines.first() {
                let s: String = line.segments.iter().map(|s| s.text.as_str()).collect();
                cells.push((s, b.x, b.y));
            }
        }
    });
    let find = |t: &str| cells.iter().find(|c| c.0 == t).cloned().unwrap();
    let (a, b, one) = (find("A"), find("B"), find("1"));
    assert!(b.1 > a.1, "columns side by side");
    assert!((a.2 - b.2).abs() < 0.5, "same row");
    assert!(one.2 > a.2, "body row below header");
}

// =====================================================================
// Image handling tests
// =====================================================================

#[test]
fn data_uri_image_produces_image_content() {
    let uri = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png_bytes(40, 20))
    );
    let html = format!(r#"<img src="{uri}" style="width: 100px">"#);
    let config = layout(&html);

    let mut found = None;
    visit_all(&config, &mut |b| {
        if let Some(img) = &b.image {
            found = Some((img.width, img.height));
        }
    });
    let (w, h) = found.expect("image content");
    assert!((w - 75.0).abs() < 0.5, "width {w}");
    assert!((w / h - 2.0).abs() < 0.05, "aspect kept");

    let (bytes, _) = generate_pdf(&html, &default_config()).unwrap();
    assert_valid_pdf(&bytes);
}

#[test]
fn relative_image_resolves_against_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("img")).unwrap();
    std::fs::write(dir.path().join("img").join("dot.png"), png_bytes(8, 8)).unwrap();

    let config = TypesetConfig {
        base_dir: Some(dir.path().to_path_buf()),
        ..default_config()
    };
    let html = markdown("![dot](img/dot.png)");
    let layout = compute_layout_config(&html, &config).unwrap();
    let mut found = false;
    visit_all(&layout, &mut |b| found |= b.image.is_some());
    assert!(found, "image should load from base_dir");
}

#[test]
fn missing_image_falls_back_to_alt_text() {
    let config = layout(r#"<p><img src="nowhere.png" alt="diagram"></p>"#);
    let text: Vec<String> = config.page_text(0);
    assert!(text.iter().any(|l| l.contains("[diagram]")), "{text:?}");
}

// =====================================================================
// List layout tests
// =====================================================================

#[test]
fn ordered_list_numbers_items() {
    let config = layout(&markdown("3. c\n4. d\n"));
    let mut markers = Vec::new();
    visit_all(&config, &mut |b| {
        if let Some(m) = &b.list_marker {
            markers.push(m.text.clone());
        }
    });
    assert_eq!(markers, vec!["3.", "4."]);
}

#[test]
fn unordered_list_uses_bullets() {
    let config = layout(&markdown("- a\n- b\n"));
    let mut markers = Vec::new();
    visit_all(&config, &mut |b| {
        if let Some(m) = &b.list_marker {
            markers.push(m.text.clone());
        }
    });
    assert_eq!(markers, vec!["•", "•"]);
}
