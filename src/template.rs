//! Template compositor – merges profile, metadata and rendered content into
//! one substitution context and expands a `${name}` template against it.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::assets::AssetPlan;
use crate::error::{Error, Result};
use crate::frontmatter::Metadata;
use crate::profile::Profile;

/// File name of the template document inside `templates/<name>/`.
pub const TEMPLATE_FILE: &str = "template.html";

/// Key under which the rendered Markdown body is stored.
pub const CONTENT_KEY: &str = "content";

/// What to do with a placeholder that has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Leave it in the output verbatim.
    #[default]
    Safe,
    /// Fail with [`Error::UnresolvedPlaceholder`].
    Strict,
}

/// Flat key → value map used to expand templates. Later layers win.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct SubstitutionContext {
    values: BTreeMap<String, String>,
}

impl SubstitutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `layer` over the current values; colliding keys are replaced.
    pub fn layer<I, K, V>(&mut self, layer: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in layer {
            self.values.insert(k.into(), v.into());
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pretty JSON object of every key and value.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| Error::Serialize {
            what: "substitution context",
            source,
        })
    }

    /// Build the context for one document: profile fields, then metadata,
    /// then `content`, so `content` can never be overridden.
    pub fn build(
        profile: &Profile,
        plan: &AssetPlan,
        metadata: &Metadata,
        content: &str,
    ) -> Self {
        let mut ctx = Self::new();
        ctx.layer(profile.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        ctx.layer(plan.hrefs());
        ctx.insert("profile", profile.name.as_str());
        ctx.insert("page_css", profile.page.css_rule());
        ctx.layer(metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        ctx.insert(CONTENT_KEY, content);
        ctx
    }
}

/// A parsed template document.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Load `templates/<name>/template.html` under `home`.
    pub fn load(home: &Path, name: &str) -> Result<Self> {
        let path = template_path(home, name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Self::new(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::TemplateNotFound {
                name: name.to_string(),
                path,
            }),
            Err(e) => Err(Error::fs("read template", path, e)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Expand every placeholder against `ctx`.
    ///
    /// `$$` yields a literal `$`; `${name}` and `$name` are looked up by
    /// lowercased name. In [`SubstitutionMode::Safe`] unknown placeholders
    /// and stray `$` signs are copied through unchanged.
    pub fn substitute(&self, ctx: &SubstitutionContext, mode: SubstitutionMode) -> Result<String> {
        let src = self.source.as_str();
        let mut out = String::with_capacity(src.len());
        let mut rest = src;

        while let Some(dollar) = rest.find('$') {
            out.push_str(&rest[..dollar]);
            let after = &rest[dollar + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
                continue;
            }

            let (name, consumed) = match placeholder_at(after) {
                Some(found) => found,
                None => {
                    out.push('$');
                    rest = after;
                    continue;
                }
            };

            match ctx.get(&name.to_ascii_lowercase()) {
                Some(value) => out.push_str(value),
                None if mode == SubstitutionMode::Strict => {
                    return Err(Error::UnresolvedPlaceholder {
                        name: name.to_string(),
                    })
                }
                None => out.push_str(&rest[dollar..dollar + 1 + consumed]),
            }
            rest = &after[consumed..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Recognise `{ident}` or `ident` at the start of `s`; returns the identifier
/// and the number of bytes the placeholder spans after the `$`.
fn placeholder_at(s: &str) -> Option<(&str, usize)> {
    if let Some(inner) = s.strip_prefix('{') {
        let len = ident_len(inner);
        if len > 0 && inner[len..].starts_with('}') {
            return Some((&inner[..len], len + 2));
        }
        return None;
    }
    let len = ident_len(s);
    (len > 0).then(|| (&s[..len], len))
}

fn ident_len(s: &str) -> usize {
    let mut len = 0;
    for (i, c) in s.char_indices() {
        let ok = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !ok {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

/// Path of the template document for `name`.
pub fn template_path(home: &Path, name: &str) -> PathBuf {
    home.join("templates").join(name).join(TEMPLATE_FILE)
}

/// Loads templates from a resource home and expands them.
#[derive(Debug, Clone)]
pub struct Compositor {
    home: PathBuf,
    mode: SubstitutionMode,
}

impl Compositor {
    pub fn new(home: impl Into<PathBuf>, mode: SubstitutionMode) -> Self {
        Self {
            home: home.into(),
            mode,
        }
    }

    /// Produce the complete HTML document for one conversion.
    pub fn compose(
        &self,
        profile: &Profile,
        plan: &AssetPlan,
        metadata: &Metadata,
        html_fragment: &str,
    ) -> Result<String> {
        let template = Template::load(&self.home, &profile.template_name)?;
        let ctx = SubstitutionContext::build(profile, plan, metadata, html_fragment);
        log::debug!(
            "Expanding template '{}' with {} context keys",
            profile.template_name,
            ctx.len()
        );
        template.substitute(&ctx, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileStore;

    fn ctx(pairs: &[(&str, &str)]) -> SubstitutionContext {
        let mut c = SubstitutionContext::new();
        c.layer(pairs.iter().copied());
        c
    }

    #[test]
    fn braced_and_bare_placeholders() {
        let t = Template::new("<h1>${title}</h1><p>$author</p>");
        let out = t
            .substitute(&ctx(&[("title", "T"), ("author", "A")]), SubstitutionMode::Safe)
            .unwrap();
        assert_eq!(out, "<h1>T</h1><p>A</p>");
    }

    #[test]
    fn context_dumps_as_flat_json_object() {
        let json = ctx(&[("title", "T \"quoted\""), ("content", "<p>x</p>")])
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["title"], "T \"quoted\"");
        assert_eq!(value["content"], "<p>x</p>");
        assert_eq!(value.as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn safe_mode_leaves_unknowns_verbatim() {
        let t = Template::new("${titel} costs $5 and $ more ${ bad } $unknown");
        let out = t.substitute(&ctx(&[]), SubstitutionMode::Safe).unwrap();
        assert_eq!(out, "${titel} costs $5 and $ more ${ bad } $unknown");
    }

    #[test]
    fn strict_mode_rejects_unknowns() {
        let t = Template::new("${titel}");
        match t.substitute(&ctx(&[("title", "x")]), SubstitutionMode::Strict) {
            Err(Error::UnresolvedPlaceholder { name }) => assert_eq!(name, "titel"),
            other => panic!("expected UnresolvedPlaceholder, got {other:?}"),
        }
    }

    #[test]
    fn double_dollar_escapes() {
        let t = Template::new("$$title costs $$${price}");
        let out = t
            .substitute(&ctx(&[("title", "no"), ("price", "3")]), SubstitutionMode::Strict)
            .unwrap();
        assert_eq!(out, "$title costs $3");
    }

    #[test]
    fn placeholder_names_are_case_insensitive() {
        let t = Template::new("${Title}");
        let out = t.substitute(&ctx(&[("title", "ok")]), SubstitutionMode::Safe).unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn substituted_values_are_not_reexpanded() {
        let t = Template::new("${content}");
        let out = t
            .substitute(&ctx(&[("content", "${title}"), ("title", "x")]), SubstitutionMode::Safe)
            .unwrap();
        assert_eq!(out, "${title}");
    }

    #[test]
    fn metadata_overrides_profile_but_not_content() {
        let store = ProfileStore::from_toml_str(
            "[DEFAULT]\nmarkdown_custom_css = \"custom.css\"\ntitle = \"Profile title\"\ncontent = \"profile body\"\n",
        )
        .unwrap();
        let profile = store.resolve("DEFAULT").unwrap();
        let plan = AssetPlan::empty("doc_style");

        let mut meta = Metadata::new();
        meta.insert("title".into(), "Doc title".into());
        meta.insert("content".into(), "<div>injected</div>".into());
        meta.insert("markdown_custom_css".into(), "override.css".into());

        let c = SubstitutionContext::build(&profile, &plan, &meta, "<p>body</p>");
        assert_eq!(c.get("title"), Some("Doc title"));
        assert_eq!(c.get("markdown_custom_css"), Some("override.css"));
        assert_eq!(c.get("content"), Some("<p>body</p>"));
        assert_eq!(c.get("profile"), Some("DEFAULT"));
        assert!(c.get("page_css").unwrap().contains("@page"));
    }

    #[test]
    fn profile_keys_fill_gaps_left_by_metadata() {
        let store = ProfileStore::from_toml_str("[DEFAULT]\nfooter = \"Internal\"\n").unwrap();
        let profile = store.resolve("DEFAULT").unwrap();
        let c = SubstitutionContext::build(&profile, &AssetPlan::empty("x"), &Metadata::new(), "");
        assert_eq!(c.get("footer"), Some("Internal"));
    }

    #[test]
    fn missing_template_is_reported() {
        let err = Template::load(Path::new("/no/such/home"), "ghost").unwrap_err();
        match err {
            Error::TemplateNotFound { name, path } => {
                assert_eq!(name, "ghost");
                assert!(path.ends_with("templates/ghost/template.html"));
            }
            other => panic!("expected TemplateNotFound, got {other:?}"),
        }
    }
}
