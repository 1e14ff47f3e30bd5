//! Pipeline – runs one conversion from Markdown file to PDF.
//!
//! Stages run strictly in order. Everything that can be checked without
//! touching the output directory (profile, input, output directory, render
//! backend, front matter, template) is checked before the HTML is written.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::assets::{self, AssetPlan};
use crate::backend::{self, BackendOverrides, PdfBackend};
use crate::error::{Error, Result};
use crate::frontmatter::{self, Metadata};
use crate::lifecycle::{self, ArtifactPaths, CleanupReport};
use crate::markdown::{ComrakRenderer, MarkdownRenderer};
use crate::profile::{Profile, ProfileStore};
use crate::template::{Compositor, SubstitutionContext, SubstitutionMode};

/// One document to convert.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    /// Defaults to the directory of `input`.
    pub output_dir: Option<PathBuf>,
    pub profile: String,
    /// Use `DEFAULT` instead of failing on an unknown profile.
    pub fallback_to_default: bool,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output_dir: None,
            profile: profile.into(),
            fallback_to_default: false,
        }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn fallback_to_default(mut self, enabled: bool) -> Self {
        self.fallback_to_default = enabled;
        self
    }
}

/// What a successful conversion left behind.
#[derive(Debug)]
pub struct ConversionReport {
    /// Name of the profile actually used.
    pub profile: String,
    pub html: PathBuf,
    pub assets_dir: PathBuf,
    /// Present when a PDF was rendered.
    pub pdf: Option<PathBuf>,
    pub metadata: Metadata,
    pub cleanup: CleanupReport,
}

impl ConversionReport {
    /// True when the HTML document is still on disk.
    pub fn html_retained(&self) -> bool {
        self.cleanup.retained
    }
}

/// The conversion pipeline, bound to a profile store and resource home.
pub struct Pipeline {
    store: ProfileStore,
    home: PathBuf,
    /// `None` renders with comrak, configured from each profile.
    renderer: Option<Box<dyn MarkdownRenderer>>,
    mode: SubstitutionMode,
    overrides: BackendOverrides,
}

/// Everything derived from the input before any file is written.
struct Prepared {
    profile: Profile,
    paths: ArtifactPaths,
    plan: AssetPlan,
    metadata: Metadata,
    fragment: String,
}

impl Pipeline {
    pub fn new(store: ProfileStore, home: impl Into<PathBuf>) -> Self {
        Self {
            store,
            home: home.into(),
            renderer: None,
            mode: SubstitutionMode::Safe,
            overrides: BackendOverrides::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn MarkdownRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_mode(mut self, mode: SubstitutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_overrides(mut self, overrides: BackendOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Convert one document.
    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionReport> {
        let profile = self.resolve_profile(request)?;
        let input = validate_input(&request.input)?;
        let output_dir = match &request.output_dir {
            Some(dir) => dir.clone(),
            None => parent_dir(&input),
        };
        validate_output_dir(&output_dir)?;

        let backend = if profile.generate_pdf {
            Some(backend::select(&profile, &self.home, &self.overrides)?)
        } else {
            log::info!("Profile '{}' does not generate a PDF", profile.name);
            None
        };

        let prepared = self.prepare(profile, &input, &output_dir)?;
        let pdf_target = prepared
            .profile
            .generate_pdf
            .then(|| prepared.paths.pdf(&prepared.metadata));
        check_input_not_overwritten(&input, &prepared.paths, pdf_target.as_deref())?;

        let compositor = Compositor::new(&self.home, self.mode);
        let html = compositor.compose(
            &prepared.profile,
            &prepared.plan,
            &prepared.metadata,
            &prepared.fragment,
        )?;

        let Prepared {
            profile,
            paths,
            plan,
            metadata,
            ..
        } = prepared;

        fs::write(&paths.html, html).map_err(|e| Error::fs("write", &paths.html, e))?;
        log::info!("Wrote {}", paths.html.display());
        assets::stage(&plan)?;

        let pdf = match backend {
            Some(backend) => Some(render(backend.as_ref(), &profile, &paths, &metadata)?),
            None => None,
        };

        let cleanup = lifecycle::finalize(&paths, &profile, pdf.is_some());
        Ok(ConversionReport {
            profile: profile.name,
            html: paths.html,
            assets_dir: paths.assets_dir,
            pdf,
            metadata,
            cleanup,
        })
    }

    /// The substitution context `convert` would expand the template with.
    /// Writes nothing.
    pub fn context(&self, request: &ConversionRequest) -> Result<SubstitutionContext> {
        let profile = self.resolve_profile(request)?;
        let input = validate_input(&request.input)?;
        let output_dir = match &request.output_dir {
            Some(dir) => dir.clone(),
            None => parent_dir(&input),
        };
        let prepared = self.prepare(profile, &input, &output_dir)?;
        Ok(SubstitutionContext::build(
            &prepared.profile,
            &prepared.plan,
            &prepared.metadata,
            &prepared.fragment,
        ))
    }

    fn resolve_profile(&self, request: &ConversionRequest) -> Result<Profile> {
        if request.fallback_to_default {
            let (profile, fell_back) = self.store.resolve_or_default(&request.profile)?;
            if fell_back {
                log::warn!(
                    "Unknown profile '{}', using '{}' instead (known profiles: {})",
                    request.profile,
                    profile.name,
                    self.store.names().join(", ")
                );
            }
            Ok(profile)
        } else {
            self.store.resolve(&request.profile)
        }
    }

    fn prepare(&self, profile: Profile, input: &Path, output_dir: &Path) -> Result<Prepared> {
        log::info!("Using profile '{}'", profile.name);

        let raw = fs::read_to_string(input).map_err(|e| Error::fs("read", input, e))?;
        let (metadata, body) = frontmatter::extract(&raw)?;
        log::debug!(
            "Front matter keys: [{}]",
            metadata.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        );

        let fragment = match &self.renderer {
            Some(renderer) => renderer.render(body),
            None => ComrakRenderer::new()
                .with_hard_breaks(profile.hard_breaks)
                .render(body),
        };
        let paths = ArtifactPaths::new(input, output_dir);
        let plan = AssetPlan::for_profile(&profile, &self.home, &paths);

        Ok(Prepared {
            profile,
            paths,
            plan,
            metadata,
            fragment,
        })
    }
}

fn render(
    backend: &dyn PdfBackend,
    profile: &Profile,
    paths: &ArtifactPaths,
    metadata: &Metadata,
) -> Result<PathBuf> {
    let pdf = paths.pdf(metadata);
    log::info!(
        "Rendering {} with '{}' backend",
        pdf.display(),
        backend.kind()
    );
    backend.render(&paths.html, &pdf, &profile.page)?;
    log::info!("Wrote {}", pdf.display());
    Ok(pdf)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// The input must be an existing, readable regular file.
fn validate_input(path: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| Error::InvalidInput {
        path: path.to_path_buf(),
        reason,
    };
    let meta = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => invalid("does not exist".to_string()),
        _ => invalid(e.to_string()),
    })?;
    if !meta.is_file() {
        return Err(invalid("is not a regular file".to_string()));
    }
    fs::File::open(path).map_err(|e| invalid(format!("is not readable: {e}")))?;
    Ok(path.to_path_buf())
}

/// The output directory must exist and accept new files.
fn validate_output_dir(dir: &Path) -> Result<()> {
    let invalid = |reason: String| Error::InvalidOutputDir {
        path: dir.to_path_buf(),
        reason,
    };
    if !dir.is_dir() {
        return Err(invalid(if dir.exists() {
            "is not a directory".to_string()
        } else {
            "does not exist".to_string()
        }));
    }
    tempfile::Builder::new()
        .prefix(".mdforge-write-check")
        .tempfile_in(dir)
        .map_err(|e| invalid(format!("is not writable: {e}")))?;
    Ok(())
}

/// Resolve symlinks and `..` in `path`. A target that does not exist yet is
/// resolved through its parent directory.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(p) = fs::canonicalize(path) {
        return p;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// The input must not be one of the files the conversion writes or removes:
/// the HTML, the PDF, or anything under the staged asset directory.
fn check_input_not_overwritten(
    input: &Path,
    paths: &ArtifactPaths,
    pdf: Option<&Path>,
) -> Result<()> {
    let source = resolved(input);
    let clash = |what: &str, target: &Path| Error::InvalidInput {
        path: input.to_path_buf(),
        reason: format!("would be overwritten by the {what} {}", target.display()),
    };
    if source == resolved(&paths.html) {
        return Err(clash("HTML output", &paths.html));
    }
    if let Some(pdf) = pdf {
        if source == resolved(pdf) {
            return Err(clash("PDF output", pdf));
        }
    }
    if source.starts_with(resolved(&paths.assets_dir)) {
        return Err(clash("asset directory", &paths.assets_dir));
    }
    Ok(())
}
