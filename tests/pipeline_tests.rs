//! End-to-end conversions through [`Pipeline`] with the shipped resource
//! home and the native backend.

use std::fs;
use std::path::{Path, PathBuf};

use md_forge::{ConversionRequest, Pipeline, ProfileStore, SubstitutionMode};
use sha2::{Digest, Sha256};

const REPORT_MD: &str = "\
---
title: Report
author: A. N.
date: 2024-01-01
role: Reviewer
subject: Infra
---
# Findings

The cluster is **healthy**.
";

fn resources() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("resources")
}

fn shipped_pipeline() -> Pipeline {
    let home = resources();
    let store = ProfileStore::load(&home.join("config.toml")).unwrap();
    Pipeline::new(store, home)
}

fn pipeline_with(toml: &str) -> Pipeline {
    Pipeline::new(ProfileStore::from_toml_str(toml).unwrap(), resources())
}

fn write_input(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Digest over every file name and its contents, in name order.
fn fingerprint(dir: &Path) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for name in entries(dir) {
        hasher.update(name.as_bytes());
        hasher.update(fs::read(dir.join(&name)).unwrap());
    }
    hasher.finalize().to_vec()
}

#[test]
fn report_scenario_names_pdf_and_cleans_up() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "report.md", REPORT_MD);

    let report = shipped_pipeline()
        .convert(&ConversionRequest::new(&input, "DEFAULT"))
        .unwrap();

    let expected = out.path().join("Reviewer-Report-2024-01-01-A. N.-Infra.pdf");
    assert_eq!(report.pdf.as_deref(), Some(expected.as_path()));
    let bytes = fs::read(&expected).unwrap();
    assert_eq!(&bytes[0..5], b"%PDF-");

    assert!(!out.path().join("report.html").exists());
    assert!(!out.path().join("report_style").exists());
    assert!(report.cleanup.failures.is_empty());
    assert_eq!(
        entries(out.path()),
        vec!["Reviewer-Report-2024-01-01-A. N.-Infra.pdf", "report.md"]
    );
}

#[test]
fn html_only_profile_keeps_html_and_assets() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "report.md", REPORT_MD);

    let report = shipped_pipeline()
        .convert(&ConversionRequest::new(&input, "draft"))
        .unwrap();

    assert!(report.pdf.is_none());
    let html = fs::read_to_string(out.path().join("report.html")).unwrap();
    assert!(html.contains("<title>Report</title>"));
    assert!(html.contains("<strong>healthy</strong>"));
    assert!(html.contains(r#"href="report_style/github-markdown.css""#));
    assert!(html.contains(r#"src="report_style/highlight.min.js""#));
    assert!(html.contains("@page { size: A4 portrait; margin: 15mm; }"));
    assert!(!html.contains("${content}"));

    let staged = entries(&out.path().join("report_style"));
    assert_eq!(
        staged,
        vec![
            "custom.css",
            "github-markdown.css",
            "highlight.css",
            "highlight.min.js",
            "template.css",
        ]
    );
    assert!(!entries(out.path()).iter().any(|n| n.ends_with(".pdf")));
}

#[test]
fn keep_html_with_pdf_retains_everything() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "report.md", REPORT_MD);

    let report = pipeline_with("[DEFAULT]\ngenerate_html = true\ngenerate_pdf = true\n")
        .convert(&ConversionRequest::new(&input, "DEFAULT"))
        .unwrap();

    assert!(report.pdf.as_deref().is_some_and(Path::exists));
    assert!(report.html_retained());
    assert!(out.path().join("report.html").exists());
    assert!(out.path().join("report_style").is_dir());
}

#[test]
fn content_appears_exactly_once() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "plain.md", "A unique sentence here.\n");

    pipeline_with("[DEFAULT]\ngenerate_html = true\ngenerate_pdf = false\n")
        .convert(&ConversionRequest::new(&input, "DEFAULT"))
        .unwrap();

    let html = fs::read_to_string(out.path().join("plain.html")).unwrap();
    assert_eq!(html.matches("A unique sentence here.").count(), 1);
    assert!(!html.contains("${content}"));
    // No front matter, so the title placeholder survives in safe mode.
    assert!(html.contains("${title}"));
}

#[test]
fn strict_mode_rejects_missing_title() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "plain.md", "text\n");

    let err = pipeline_with("[DEFAULT]\ngenerate_html = true\ngenerate_pdf = false\n")
        .with_mode(SubstitutionMode::Strict)
        .convert(&ConversionRequest::new(&input, "DEFAULT"))
        .unwrap_err();
    assert_eq!(err.kind(), "UnresolvedPlaceholder");
    assert!(!out.path().join("plain.html").exists());
}

#[test]
fn metadata_overrides_profile_keys() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(
        out.path(),
        "note.md",
        "---\norganization: From Document\ncontent: hijack\n---\nbody text\n",
    );

    let request = ConversionRequest::new(&input, "coach");
    let ctx = shipped_pipeline().context(&request).unwrap();
    assert_eq!(ctx.get("organization"), Some("From Document"));
    assert_eq!(ctx.get("template_name"), Some("coach"));
    assert!(ctx.get("content").is_some_and(|c| c.contains("body text")));
}

#[test]
fn restaging_is_idempotent() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "report.md", REPORT_MD);
    let pipeline = pipeline_with(
        "[DEFAULT]\ngenerate_html = true\ngenerate_pdf = false\n\
         markdown_css = \"github-markdown.css\"\nhighlight_js = \"highlight.min.js\"\n",
    );
    let request = ConversionRequest::new(&input, "DEFAULT");

    pipeline.convert(&request).unwrap();
    let first = fingerprint(&out.path().join("report_style"));
    pipeline.convert(&request).unwrap();
    let second = fingerprint(&out.path().join("report_style"));
    assert_eq!(first, second);
}

#[test]
fn malformed_front_matter_writes_nothing() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "broken.md", "---\ntitle: Never closed\n\nbody\n");

    let err = shipped_pipeline()
        .convert(&ConversionRequest::new(&input, "DEFAULT"))
        .unwrap_err();
    assert_eq!(err.kind(), "MalformedFrontMatter");
    assert_eq!(entries(out.path()), vec!["broken.md"]);
}

#[test]
fn unknown_profile_lists_known_names_and_writes_nothing() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "report.md", REPORT_MD);

    let err = shipped_pipeline()
        .convert(&ConversionRequest::new(&input, "nonexistent"))
        .unwrap_err();
    assert_eq!(err.kind(), "UnknownProfile");
    let msg = err.to_string();
    assert!(msg.contains("nonexistent"));
    assert!(msg.contains("coach"));
    assert_eq!(entries(out.path()), vec!["report.md"]);
}

#[test]
fn missing_asset_leaves_html_for_diagnosis() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "report.md", REPORT_MD);

    let err = pipeline_with("[DEFAULT]\nmarkdown_css = \"github-markdown.css\"\nhighlight_css = \"absent.css\"\n")
        .convert(&ConversionRequest::new(&input, "DEFAULT"))
        .unwrap_err();
    assert_eq!(err.kind(), "AssetMissing");
    assert!(out.path().join("report.html").exists());
    assert!(out
        .path()
        .join("report_style")
        .join("github-markdown.css")
        .exists());
    assert!(!entries(out.path()).iter().any(|n| n.ends_with(".pdf")));
}

#[test]
fn separate_output_dir_receives_artifacts() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let input = write_input(src.path(), "report.md", REPORT_MD);

    let request = ConversionRequest::new(&input, "draft").output_dir(out.path());
    shipped_pipeline().convert(&request).unwrap();
    assert!(out.path().join("report.html").exists());
    assert_eq!(entries(src.path()), vec!["report.md"]);
}

#[test]
fn html_input_beside_its_output_is_left_untouched() {
    let out = tempfile::tempdir().unwrap();
    let input = write_input(out.path(), "report.html", REPORT_MD);

    let err = shipped_pipeline()
        .convert(&ConversionRequest::new(&input, "draft"))
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
    assert_eq!(fs::read_to_string(&input).unwrap(), REPORT_MD);
    assert_eq!(entries(out.path()), vec!["report.html"]);
}

#[test]
fn html_input_converts_into_another_directory() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let input = write_input(src.path(), "report.html", REPORT_MD);

    let request = ConversionRequest::new(&input, "draft").output_dir(out.path());
    shipped_pipeline().convert(&request).unwrap();
    assert_eq!(fs::read_to_string(&input).unwrap(), REPORT_MD);
    assert!(fs::read_to_string(out.path().join("report.html"))
        .unwrap()
        .contains("<strong>healthy</strong>"));
}
