//! Artifact lifecycle – names every file the pipeline creates and removes
//! the intermediate ones once the PDF is safely on disk.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::frontmatter::Metadata;
use crate::profile::Profile;

/// Separator between filename segments of the PDF.
pub const PDF_NAME_SEPARATOR: &str = "-";

/// Suffix appended to the document stem to name the staged asset directory.
pub const ASSETS_DIR_SUFFIX: &str = "_style";

/// Paths of the artifacts created for one input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Base name of the input file without extension.
    pub stem: String,
    /// `<output_dir>/<stem>.html`
    pub html: PathBuf,
    /// `<output_dir>/<stem>_style`
    pub assets_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(input: &Path, output_dir: &Path) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Self {
            html: output_dir.join(format!("{stem}.html")),
            assets_dir: output_dir.join(format!("{stem}{ASSETS_DIR_SUFFIX}")),
            output_dir: output_dir.to_path_buf(),
            stem,
        }
    }

    /// File name of the staged directory, as referenced from the HTML.
    pub fn assets_dir_name(&self) -> String {
        format!("{}{ASSETS_DIR_SUFFIX}", self.stem)
    }

    /// Full path of the PDF for `metadata`.
    pub fn pdf(&self, metadata: &Metadata) -> PathBuf {
        self.output_dir.join(pdf_file_name(metadata, &self.stem))
    }
}

/// Build the PDF file name from document metadata.
///
/// Segments, in order: `role`, `title` (or `document`), `date`, `author`,
/// `subject`, each kept as an empty segment when absent, then `task` only
/// when present (spaces become hyphens). When every segment is empty the
/// input stem is used instead.
pub fn pdf_file_name(metadata: &Metadata, fallback_stem: &str) -> String {
    let field = |keys: &[&str]| -> String {
        keys.iter()
            .filter_map(|k| metadata.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(sanitize_segment)
            .unwrap_or_default()
    };

    let mut segments = vec![
        field(&["role"]),
        field(&["title", "document"]),
        field(&["date"]),
        field(&["author"]),
        field(&["subject"]),
    ];
    let task = field(&["task"]);
    if !task.is_empty() {
        segments.push(task.split_whitespace().collect::<Vec<_>>().join("-"));
    }

    for (key, value) in ["role", "title", "date", "author", "subject"]
        .iter()
        .zip(&segments)
    {
        if value.is_empty() {
            log::warn!("Front matter has no '{key}'; its PDF filename segment is empty");
        }
    }

    if segments.iter().all(String::is_empty) {
        return format!("{fallback_stem}.pdf");
    }
    format!("{}.pdf", segments.join(PDF_NAME_SEPARATOR))
}

fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

/// Outcome of the cleanup step.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Paths removed.
    pub removed: Vec<PathBuf>,
    /// Paths that could not be removed; never fatal.
    pub failures: Vec<Error>,
    /// True when the HTML and assets were left on disk.
    pub retained: bool,
}

/// Decide what happens to the HTML document and staged directory.
///
/// Only called after every requested render has succeeded. When the
/// profile keeps HTML, or no PDF was produced (the HTML is then the only
/// deliverable), nothing is removed.
pub fn finalize(paths: &ArtifactPaths, profile: &Profile, pdf_rendered: bool) -> CleanupReport {
    let mut report = CleanupReport::default();

    if profile.keep_html {
        report.retained = true;
        return report;
    }
    if !pdf_rendered {
        log::warn!(
            "Profile '{}' neither keeps HTML nor generates a PDF; keeping '{}'",
            profile.name,
            paths.html.display()
        );
        report.retained = true;
        return report;
    }

    log::info!("Deleting {}", paths.html.display());
    match fs::remove_file(&paths.html) {
        Ok(()) => report.removed.push(paths.html.clone()),
        Err(e) => report.failures.push(Error::fs("remove", &paths.html, e)),
    }

    log::info!("Deleting {}", paths.assets_dir.display());
    match fs::remove_dir_all(&paths.assets_dir) {
        Ok(()) => report.removed.push(paths.assets_dir.clone()),
        // Nothing was staged (profile without assets).
        Err(e) if e.kind() == ErrorKind::NotFound && !paths.assets_dir.exists() => {}
        Err(e) => report.failures.push(Error::fs("remove", &paths.assets_dir, e)),
    }

    for failure in &report.failures {
        log::warn!("Cleanup: {failure}");
    }
    report
}
