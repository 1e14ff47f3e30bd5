//! Asset stager – copies the style sheets and scripts a profile references
//! into a directory next to the generated HTML so the pair can be moved as
//! a unit.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lifecycle::ArtifactPaths;
use crate::profile::Profile;

/// Directory under the resource home holding shared style/script assets.
pub const STYLES_DIR: &str = "styles";

/// Optional per-template stylesheet, next to `template.html`.
pub const TEMPLATE_CSS_FILE: &str = "template.css";

/// One asset to copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    /// Profile key the asset came from (`markdown_css`, …, `template_css`).
    pub key: String,
    /// Where the asset lives under the resource home.
    pub source: PathBuf,
    /// File name inside the staged directory.
    pub file_name: String,
}

/// Deterministic description of what staging will create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPlan {
    dir: PathBuf,
    dir_name: String,
    assets: Vec<StagedAsset>,
}

impl AssetPlan {
    /// Plan the assets of `profile` for the document described by `paths`.
    pub fn for_profile(profile: &Profile, home: &Path, paths: &ArtifactPaths) -> Self {
        let styles = home.join(STYLES_DIR);
        let mut assets: Vec<StagedAsset> = profile
            .assets
            .iter()
            .map(|(key, name)| {
                let source = styles.join(name);
                let file_name = Path::new(name)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone());
                StagedAsset {
                    key: key.clone(),
                    source,
                    file_name,
                }
            })
            .collect();

        let template_css = home
            .join("templates")
            .join(&profile.template_name)
            .join(TEMPLATE_CSS_FILE);
        if template_css.is_file() {
            assets.push(StagedAsset {
                key: "template_css".to_string(),
                source: template_css,
                file_name: TEMPLATE_CSS_FILE.to_string(),
            });
        } else {
            log::debug!(
                "Template '{}' has no {TEMPLATE_CSS_FILE}",
                profile.template_name
            );
        }

        let mut seen = HashSet::new();
        for asset in &assets {
            if !seen.insert(asset.file_name.as_str()) {
                log::warn!(
                    "Asset '{}' ({}) shares its file name with an earlier asset and will replace it",
                    asset.key,
                    asset.file_name
                );
            }
        }

        Self {
            dir: paths.assets_dir.clone(),
            dir_name: paths.assets_dir_name(),
            assets,
        }
    }

    /// A plan that stages nothing into `dir_name` (relative to the cwd).
    pub fn empty(dir_name: &str) -> Self {
        Self {
            dir: PathBuf::from(dir_name),
            dir_name: dir_name.to_string(),
            assets: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn assets(&self) -> &[StagedAsset] {
        &self.assets
    }

    /// Relative href of every asset as seen from the HTML document, keyed by
    /// the profile key, plus `assets_dir`.
    pub fn hrefs(&self) -> Vec<(String, String)> {
        let mut hrefs: Vec<(String, String)> = self
            .assets
            .iter()
            .map(|a| (a.key.clone(), format!("{}/{}", self.dir_name, a.file_name)))
            .collect();
        hrefs.push(("assets_dir".to_string(), self.dir_name.clone()));
        hrefs
    }
}

/// Create the staged directory and copy every planned asset into it.
///
/// Re-staging over an existing directory overwrites the copies, so identical
/// sources give an identical directory. The first missing source aborts with
/// [`Error::AssetMissing`]; copies already made stay in place.
pub fn stage(plan: &AssetPlan) -> Result<PathBuf> {
    fs::create_dir_all(&plan.dir).map_err(|e| Error::fs("create", &plan.dir, e))?;

    for asset in &plan.assets {
        if !asset.source.is_file() {
            return Err(Error::AssetMissing {
                key: asset.key.clone(),
                path: asset.source.clone(),
            });
        }
        let target = plan.dir.join(&asset.file_name);
        fs::copy(&asset.source, &target).map_err(|e| Error::fs("copy asset to", &target, e))?;
        log::debug!("Staged {} -> {}", asset.source.display(), target.display());
    }

    log::info!(
        "Staged {} asset(s) into '{}'",
        plan.assets.len(),
        plan.dir.display()
    );
    Ok(plan.dir.clone())
}
