//! # md-forge – profile-driven Markdown → HTML → PDF pipeline
//!
//! One Markdown document with front matter is turned into a standalone HTML
//! document and, optionally, a paginated PDF. The stages are:
//!
//! 1. **Resolve** – pick a named profile from the store ([`profile`])
//! 2. **Extract** – split front matter from the body ([`frontmatter`])
//! 3. **Render** – Markdown → HTML fragment ([`markdown`])
//! 4. **Compose** – expand the profile's template ([`template`])
//! 5. **Stage** – copy style/script assets next to the HTML ([`assets`])
//! 6. **Print** – HTML → PDF through a [`backend::PdfBackend`]
//! 7. **Finalize** – remove intermediate artifacts ([`lifecycle`])
//!
//! [`pipeline::Pipeline`] runs them in order. The built-in `native` print
//! backend lives in [`typeset`] and the engine modules it drives: [`dom`],
//! [`style`], [`layout`], [`pagination`] and [`render`].

pub mod assets;
pub mod backend;
pub mod dom;
pub mod error;
pub mod fonts;
pub mod frontmatter;
pub mod layout;
pub mod layout_config;
pub mod lifecycle;
pub mod markdown;
pub mod pagination;
pub mod pipeline;
pub mod profile;
pub mod render;
pub mod style;
pub mod template;
pub mod typeset;

// Re-exports for convenience
pub use error::{Error, Result};
pub use pipeline::{ConversionReport, ConversionRequest, Pipeline};
pub use profile::{Profile, ProfileStore, DEFAULT_PROFILE};
pub use template::SubstitutionMode;
