//! PDF render backends.
//!
//! The pipeline talks to every backend through [`PdfBackend`]. Backends are
//! picked from a closed set ([`BackendKind`]) so an unsupported selector is
//! rejected before any file is written:
//!
//! - `native`      – built-in engine (layout with Taffy, output with printpdf)
//! - `chromium`    – headless Chrome/Chromium `--print-to-pdf`
//! - `wkhtmltopdf` – the wkhtmltopdf command-line tool
//! - `weasyprint`  – the WeasyPrint command-line tool

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::typeset::{self, TypesetConfig};

const MM_PER_INCH: f32 = 25.4;
const PT_PER_INCH: f32 = 72.0;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Convert millimetres to PDF points.
pub fn mm_to_pt(mm: f32) -> f32 {
    mm / MM_PER_INCH * PT_PER_INCH
}

// ---------------------------------------------------------------------------
// Page geometry
// ---------------------------------------------------------------------------

/// Paper sizes understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
}

impl PageSize {
    /// Portrait `(width, height)` in millimetres.
    pub fn dimensions_mm(self) -> (f32, f32) {
        match self {
            PageSize::A3 => (297.0, 420.0),
            PageSize::A4 => (210.0, 297.0),
            PageSize::A5 => (148.0, 210.0),
            PageSize::Letter => (215.9, 279.4),
            PageSize::Legal => (215.9, 355.6),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
        }
    }
}

impl FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(PageSize::A3),
            "a4" => Ok(PageSize::A4),
            "a5" => Ok(PageSize::A5),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            other => Err(format!(
                "page_size '{other}' is not one of A3, A4, A5, Letter, Legal"
            )),
        }
    }
}

/// Fixed page geometry for one render.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub size: PageSize,
    /// Uniform margin on all four sides.
    pub margin_mm: f32,
    pub landscape: bool,
    /// Paint background colours and images.
    pub print_background: bool,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            size: PageSize::A4,
            margin_mm: 15.0,
            landscape: false,
            print_background: true,
        }
    }
}

impl PageSetup {
    /// Effective `(width, height)` in millimetres after orientation.
    pub fn dimensions_mm(&self) -> (f32, f32) {
        let (w, h) = self.size.dimensions_mm();
        if self.landscape {
            (h, w)
        } else {
            (w, h)
        }
    }

    pub fn width_pt(&self) -> f32 {
        mm_to_pt(self.dimensions_mm().0)
    }

    pub fn height_pt(&self) -> f32 {
        mm_to_pt(self.dimensions_mm().1)
    }

    pub fn margin_pt(&self) -> f32 {
        mm_to_pt(self.margin_mm)
    }

    /// CSS carrying the same geometry, for browser-based backends.
    pub fn css_rule(&self) -> String {
        let orientation = if self.landscape { "landscape" } else { "portrait" };
        let mut css = format!(
            "@page {{ size: {} {}; margin: {}mm; }}",
            self.size.as_str(),
            orientation,
            self.margin_mm
        );
        if self.print_background {
            css.push_str(" html { -webkit-print-color-adjust: exact; print-color-adjust: exact; }");
        }
        css
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// The closed set of supported render backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Native,
    Chromium,
    Wkhtmltopdf,
    Weasyprint,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Native,
        BackendKind::Chromium,
        BackendKind::Wkhtmltopdf,
        BackendKind::Weasyprint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Chromium => "chromium",
            BackendKind::Wkhtmltopdf => "wkhtmltopdf",
            BackendKind::Weasyprint => "weasyprint",
        }
    }

    /// Program names searched on `PATH` when no executable is configured.
    fn default_programs(self) -> &'static [&'static str] {
        match self {
            BackendKind::Native => &[],
            BackendKind::Chromium => &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
            ],
            BackendKind::Wkhtmltopdf => &["wkhtmltopdf"],
            BackendKind::Weasyprint => &["weasyprint"],
        }
    }

    fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| Error::RenderBackendUnavailable {
                backend: s.to_string(),
                reason: format!("supported backends are {}", Self::supported_list()),
            })
    }
}

/// Rasterises a finished HTML document to a paginated PDF.
pub trait PdfBackend {
    fn kind(&self) -> BackendKind;

    /// Render `html` into `pdf` with the given page geometry. Returns once
    /// the PDF is fully written.
    fn render(&self, html: &Path, pdf: &Path, page: &PageSetup) -> Result<()>;
}

/// Overrides applied on top of the profile when picking a backend.
#[derive(Debug, Clone, Default)]
pub struct BackendOverrides {
    pub selector: Option<String>,
    pub timeout: Option<Duration>,
}

/// Build the backend a profile asks for, validating the selector and
/// locating any external executable up front.
pub fn select(
    profile: &Profile,
    home: &Path,
    overrides: &BackendOverrides,
) -> Result<Box<dyn PdfBackend>> {
    let selector = overrides.selector.as_deref().unwrap_or(&profile.backend);
    let kind: BackendKind = selector.parse()?;
    let timeout = overrides.timeout.or_else(|| {
        (profile.render_timeout_secs > 0).then(|| Duration::from_secs(profile.render_timeout_secs))
    });

    let backend: Box<dyn PdfBackend> = match kind {
        BackendKind::Native => {
            let font = profile
                .fields
                .get("native_font")
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(|f| home.join(f));
            Box::new(NativeBackend::new(font)?)
        }
        external => Box::new(ProcessBackend::locate(
            external,
            profile.backend_path.as_deref(),
            timeout,
        )?),
    };
    log::debug!("Selected render backend '{}'", backend.kind());
    Ok(backend)
}

// ---------------------------------------------------------------------------
// Native backend
// ---------------------------------------------------------------------------

/// Built-in renderer; needs no external program.
pub struct NativeBackend {
    font: Option<Vec<u8>>,
}

impl NativeBackend {
    /// `font` optionally names a TTF/OTF file used for measuring and
    /// embedding body text instead of the builtin Helvetica family.
    pub fn new(font: Option<PathBuf>) -> Result<Self> {
        let font = match font {
            Some(path) => Some(fs::read(&path).map_err(|e| Error::RenderBackendUnavailable {
                backend: BackendKind::Native.to_string(),
                reason: format!("cannot read font {}: {e}", path.display()),
            })?),
            None => None,
        };
        Ok(Self { font })
    }
}

impl PdfBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn render(&self, html: &Path, pdf: &Path, page: &PageSetup) -> Result<()> {
        let source = fs::read_to_string(html).map_err(|e| Error::fs("read", html, e))?;
        let config = TypesetConfig {
            title: None,
            page: page.clone(),
            base_dir: html.parent().map(Path::to_path_buf),
            font: self.font.clone(),
        };
        let (bytes, layout) =
            typeset::generate_pdf(&source, &config).map_err(|reason| Error::RenderFailed {
                backend: self.kind().to_string(),
                reason,
            })?;
        fs::write(pdf, &bytes).map_err(|e| Error::fs("write", pdf, e))?;
        let pages = layout.pages.len();
        log::info!(
            "Wrote '{}' ({} bytes, {} page{})",
            pdf.display(),
            bytes.len(),
            pages,
            if pages == 1 { "" } else { "s" }
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// External-process backends
// ---------------------------------------------------------------------------

/// A backend driven through a command-line program.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    kind: BackendKind,
    program: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessBackend {
    /// Resolve the executable for `kind`: the configured path when given,
    /// otherwise the first default program name found on `PATH`.
    pub fn locate(
        kind: BackendKind,
        configured: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let unavailable = |reason: String| Error::RenderBackendUnavailable {
            backend: kind.to_string(),
            reason,
        };

        let program = match configured {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) if path.components().count() == 1 => which::which(path)
                .map_err(|e| unavailable(format!("'{}' not found on PATH: {e}", path.display())))?,
            Some(path) => {
                return Err(unavailable(format!(
                    "no executable at {}",
                    path.display()
                )))
            }
            None => kind
                .default_programs()
                .iter()
                .find_map(|name| which::which(name).ok())
                .ok_or_else(|| {
                    unavailable(format!(
                        "none of {} found on PATH",
                        kind.default_programs().join(", ")
                    ))
                })?,
        };

        Ok(Self {
            kind,
            program,
            timeout,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for one render.
    fn args(&self, html: &Path, pdf: &Path, page: &PageSetup) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = Vec::new();
        match self.kind {
            BackendKind::Chromium => {
                args.push("--headless".into());
                args.push("--disable-gpu".into());
                args.push("--no-pdf-header-footer".into());
                let mut print_to = OsString::from("--print-to-pdf=");
                print_to.push(pdf);
                args.push(print_to);
                args.push(file_uri(html)?.into());
            }
            BackendKind::Wkhtmltopdf => {
                let margin = format!("{}mm", page.margin_mm);
                args.push("--quiet".into());
                args.push("--encoding".into());
                args.push("utf-8".into());
                args.push("--page-size".into());
                args.push(page.size.as_str().into());
                args.push("--orientation".into());
                args.push(if page.landscape { "Landscape" } else { "Portrait" }.into());
                for side in ["--margin-top", "--margin-right", "--margin-bottom", "--margin-left"] {
                    args.push(side.into());
                    args.push(margin.clone().into());
                }
                args.push(if page.print_background { "--background" } else { "--no-background" }.into());
                args.push("--enable-local-file-access".into());
                args.push("--no-outline".into());
                args.push(html.into());
                args.push(pdf.into());
            }
            BackendKind::Weasyprint => {
                args.push(html.into());
                args.push(pdf.into());
            }
            BackendKind::Native => unreachable!("native backend never spawns a process"),
        }
        Ok(args)
    }

    fn failed(&self, reason: String) -> Error {
        Error::RenderFailed {
            backend: self.kind.to_string(),
            reason,
        }
    }
}

impl PdfBackend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn render(&self, html: &Path, pdf: &Path, page: &PageSetup) -> Result<()> {
        let args = self.args(html, pdf, page)?;
        let started_at = Instant::now();
        log::debug!("Running {} {:?}", self.program.display(), args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::PermissionDenied {
                    Error::RenderBackendUnavailable {
                        backend: self.kind.to_string(),
                        reason: format!("cannot launch {}: {e}", self.program.display()),
                    }
                } else {
                    self.failed(format!("cannot launch {}: {e}", self.program.display()))
                }
            })?;

        // Drain stderr on its own thread so a chatty backend cannot block on
        // a full pipe while we wait for it.
        let stderr = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(limit) = self.timeout {
                        if started_at.elapsed() >= limit {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(self.failed(format!(
                                "timed out after {}s",
                                limit.as_secs_f32()
                            )));
                        }
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(self.failed(format!("lost track of child process: {e}"))),
            }
        };
        let stderr = reader.join().unwrap_or_default();

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(self.failed(format!("exit {code}: {}", stderr.trim())));
        }
        if !pdf.is_file() {
            return Err(self.failed(format!(
                "exited successfully but wrote no PDF at {}",
                pdf.display()
            )));
        }

        log::info!(
            "Wrote '{}' via {} in {} ms",
            pdf.display(),
            self.kind,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

/// `file://` URI for a local document.
fn file_uri(path: &Path) -> Result<String> {
    let absolute = fs::canonicalize(path).map_err(|e| Error::fs("resolve", path, e))?;
    url::Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|()| Error::RenderFailed {
            backend: BackendKind::Chromium.to_string(),
            reason: format!("cannot express {} as a file URI", absolute.display()),
        })
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn fake_program(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn successful_process_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        // weasyprint <html> <pdf>
        let program = fake_program(
            dir.path(),
            "fake-weasyprint",
            "#!/bin/sh\nprintf '%%PDF-1.4 fake' > \"$2\"\n",
        );
        let html = dir.path().join("doc.html");
        let pdf = dir.path().join("doc.pdf");
        fs::write(&html, "<p>x</p>").unwrap();

        let backend =
            ProcessBackend::locate(BackendKind::Weasyprint, Some(&program), None).unwrap();
        backend.render(&html, &pdf, &PageSetup::default()).unwrap();
        assert!(fs::read(&pdf).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn failing_process_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_program(
            dir.path(),
            "fake-weasyprint",
            "#!/bin/sh\necho 'boom: bad html' >&2\nexit 3\n",
        );
        let html = dir.path().join("doc.html");
        fs::write(&html, "<p>x</p>").unwrap();

        let backend =
            ProcessBackend::locate(BackendKind::Weasyprint, Some(&program), None).unwrap();
        let err = backend
            .render(&html, &dir.path().join("doc.pdf"), &PageSetup::default())
            .unwrap_err();
        match err {
            Error::RenderFailed { reason, .. } => {
                assert!(reason.contains("exit 3"));
                assert!(reason.contains("boom: bad html"));
            }
            other => panic!("expected RenderFailed, got {other:?}"),
        }
    }

    #[test]
    fn success_without_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_program(dir.path(), "fake-weasyprint", "#!/bin/sh\nexit 0\n");
        let html = dir.path().join("doc.html");
        fs::write(&html, "<p>x</p>").unwrap();

        let backend =
            ProcessBackend::locate(BackendKind::Weasyprint, Some(&program), None).unwrap();
        let err = backend
            .render(&html, &dir.path().join("doc.pdf"), &PageSetup::default())
            .unwrap_err();
        assert_eq!(err.kind(), "RenderFailed");
    }

    #[test]
    fn hung_process_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_program(dir.path(), "fake-weasyprint", "#!/bin/sh\nexec sleep 30\n");
        let html = dir.path().join("doc.html");
        fs::write(&html, "<p>x</p>").unwrap();

        let backend = ProcessBackend::locate(
            BackendKind::Weasyprint,
            Some(&program),
            Some(Duration::from_millis(200)),
        )
        .unwrap();
        let started = Instant::now();
        let err = backend
            .render(&html, &dir.path().join("doc.pdf"), &PageSetup::default())
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn chromium_receives_file_uri_and_target() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.log");
        let script = format!(
            "#!/bin/sh\nfor a in \"$@\"; do echo \"$a\" >> '{}'; done\nfor a in \"$@\"; do case \"$a\" in --print-to-pdf=*) printf '%%PDF-1.7' > \"${{a#--print-to-pdf=}}\";; esac; done\n",
            log.display()
        );
        let program = fake_program(dir.path(), "fake-chromium", &script);
        let html = dir.path().join("doc.html");
        let pdf = dir.path().join("doc.pdf");
        fs::write(&html, "<p>x</p>").unwrap();

        let backend = ProcessBackend::locate(BackendKind::Chromium, Some(&program), None).unwrap();
        backend.render(&html, &pdf, &PageSetup::default()).unwrap();

        let logged = fs::read_to_string(&log).unwrap();
        assert!(logged.contains("--headless"));
        assert!(logged.contains("file://"));
        assert!(pdf.is_file());
    }
}
