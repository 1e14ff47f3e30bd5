//! Profile resolver – loads named conversion profiles from the configuration
//! store.
//!
//! The store is a TOML document with one table per profile plus a reserved
//! `[DEFAULT]` table. Named profiles inherit every key they leave unset from
//! `[DEFAULT]`, so a minimal profile only names what differs:
//!
//! ```toml
//! [DEFAULT]
//! template_name = "default"
//! markdown_css = "github-markdown.css"
//! generate_pdf = true
//! generate_html = false
//!
//! [coach]
//! template_name = "coach"
//! generate_html = "True"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::backend::{BackendKind, PageSetup, PageSize};
use crate::error::{Error, Result};

/// Name of the reserved fallback profile.
pub const DEFAULT_PROFILE: &str = "DEFAULT";

/// Template used when no profile names one.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Render timeout used when no profile names one.
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 120;

/// Profile keys that name style/script assets, in staging order.
pub const ASSET_KEYS: [&str; 4] = [
    "markdown_css",
    "markdown_custom_css",
    "highlight_css",
    "highlight_js",
];

/// A resolved, read-only conversion profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Section name this profile was resolved from.
    pub name: String,
    /// Directory name under `<home>/templates/`.
    pub template_name: String,
    /// Ordered `(key, file name)` pairs for the style/script assets.
    pub assets: Vec<(String, String)>,
    /// Retain the HTML document and its staged assets after the run.
    pub keep_html: bool,
    /// Render a PDF from the HTML document.
    pub generate_pdf: bool,
    /// Single newlines inside paragraphs become line breaks.
    pub hard_breaks: bool,
    /// Backend selector as written in the store; validated by
    /// [`crate::backend::select`].
    pub backend: String,
    /// Optional executable override for external backends.
    pub backend_path: Option<PathBuf>,
    /// Page geometry handed to the backend.
    pub page: PageSetup,
    /// Upper bound on a single render, in seconds.
    pub render_timeout_secs: u64,
    /// Every raw key/value of the section (DEFAULT-inherited keys included).
    pub fields: BTreeMap<String, String>,
}

impl Profile {
    /// Build a profile from its merged raw fields.
    fn from_fields(name: &str, fields: BTreeMap<String, String>, origin: &Path) -> Result<Self> {
        let flag = |key: &str, default: bool| -> Result<bool> {
            match fields.get(key) {
                None => Ok(default),
                Some(raw) => parse_bool(raw).ok_or_else(|| Error::Config {
                    path: origin.to_path_buf(),
                    reason: format!("[{name}] {key} = '{raw}' is not a boolean"),
                }),
            }
        };
        let text = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|k| fields.get(*k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let assets = ASSET_KEYS
            .iter()
            .filter_map(|key| {
                fields
                    .get(*key)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v.to_string()))
            })
            .collect();

        let page_size = match text(&["page_size"]) {
            Some(raw) => raw.parse::<PageSize>().map_err(|reason| Error::Config {
                path: origin.to_path_buf(),
                reason: format!("[{name}] {reason}"),
            })?,
            None => PageSize::A4,
        };
        let margin_mm = match text(&["page_margin_mm"]) {
            Some(raw) => raw
                .parse::<f32>()
                .ok()
                .filter(|m| m.is_finite() && *m >= 0.0)
                .ok_or_else(|| Error::Config {
                    path: origin.to_path_buf(),
                    reason: format!("[{name}] page_margin_mm = '{raw}' is not a length"),
                })?,
            None => PageSetup::default().margin_mm,
        };
        let render_timeout_secs = match text(&["render_timeout_secs"]) {
            Some(raw) => raw.parse::<u64>().map_err(|_| Error::Config {
                path: origin.to_path_buf(),
                reason: format!("[{name}] render_timeout_secs = '{raw}' is not a number"),
            })?,
            None => DEFAULT_RENDER_TIMEOUT_SECS,
        };

        let template_name =
            text(&["template_name", "template_dir"]).unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        let backend = text(&["print_pdf_backend", "print_pdf_browser"])
            .unwrap_or_else(|| BackendKind::Native.as_str().to_string());
        let backend_path =
            text(&["print_pdf_backend_path", "print_pdf_browser_path"]).map(PathBuf::from);
        let keep_html = flag("generate_html", false)?;
        let generate_pdf = flag("generate_pdf", true)?;
        let hard_breaks = flag("hard_breaks", false)?;
        let page = PageSetup {
            size: page_size,
            margin_mm,
            landscape: flag("landscape", false)?,
            print_background: flag("print_background", true)?,
        };

        Ok(Profile {
            name: name.to_string(),
            template_name,
            assets,
            keep_html,
            generate_pdf,
            hard_breaks,
            backend,
            backend_path,
            page,
            render_timeout_secs,
            fields,
        })
    }
}

/// All profile sections of one configuration store.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    origin: PathBuf,
    defaults: BTreeMap<String, String>,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ProfileStore {
    /// Load the store at `path`. A missing file yields a store that only
    /// knows the built-in `DEFAULT` profile.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!(
                    "No profile store at '{}', using built-in defaults",
                    path.display()
                );
                Ok(Self {
                    origin: path.to_path_buf(),
                    ..Self::default()
                })
            }
            Err(e) => Err(Error::Config {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    /// Parse a store from TOML text (used by tests and embedders).
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, origin: &Path) -> Result<Self> {
        let config_err = |reason: String| Error::Config {
            path: origin.to_path_buf(),
            reason,
        };
        let root: toml::Table = text.parse().map_err(|e: toml::de::Error| config_err(e.to_string()))?;

        let mut store = Self {
            origin: origin.to_path_buf(),
            ..Self::default()
        };
        for (section, value) in root {
            let toml::Value::Table(table) = value else {
                return Err(config_err(format!(
                    "top-level key '{section}' must be a [section]"
                )));
            };
            let mut fields = BTreeMap::new();
            for (key, value) in table {
                let value = scalar_to_string(&value).ok_or_else(|| {
                    config_err(format!("[{section}] {key} must be a string, number or boolean"))
                })?;
                fields.insert(key.to_ascii_lowercase(), value);
            }
            if section == DEFAULT_PROFILE {
                store.defaults = fields;
            } else {
                store.sections.insert(section, fields);
            }
        }
        Ok(store)
    }

    /// Names of the configured profile sections, sorted, `DEFAULT` excluded.
    pub fn names(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }

    /// Path the store was loaded from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    fn lookup(&self, name: &str) -> Option<Result<Profile>> {
        let section = if name == DEFAULT_PROFILE {
            BTreeMap::new()
        } else {
            self.sections.get(name)?.clone()
        };
        let mut merged = self.defaults.clone();
        merged.extend(section);
        Some(Profile::from_fields(name, merged, &self.origin))
    }

    /// Resolve `name` to a profile, failing with [`Error::UnknownProfile`]
    /// when it is neither `DEFAULT` nor a configured section.
    pub fn resolve(&self, name: &str) -> Result<Profile> {
        self.lookup(name).unwrap_or_else(|| {
            Err(Error::UnknownProfile {
                requested: name.to_string(),
                known: self.names(),
            })
        })
    }

    /// `lookup(name)` or else `lookup("DEFAULT")`. The flag reports whether
    /// the fallback was taken.
    pub fn resolve_or_default(&self, name: &str) -> Result<(Profile, bool)> {
        match self.lookup(name) {
            Some(profile) => Ok((profile?, false)),
            None => Ok((self.resolve(DEFAULT_PROFILE)?, true)),
        }
    }
}

/// Parse a boolean from a TOML literal or one of the canonical tokens.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}
