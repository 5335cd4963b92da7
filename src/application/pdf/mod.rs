//! Render-and-cache pipeline that serves documents as PDFs.
//!
//! A download request derives the document's cache key, serves the cached
//! artifact when one exists, and otherwise fetches the document's canonical
//! HTML through a loop-back request, rewrites root-relative asset URLs,
//! converts the result with the configured [`PdfEngine`] and stores it.
//! Preview requests stop after the rewrite and return the HTML.

mod cookies;
mod engine;
mod fetch;
mod hooks;
mod invalidation;
mod keys;
mod rewrite;
mod service;

pub use cookies::{CookiePolicy, ForwardedCookies, compose_cookie_header};
pub use engine::{PdfEngine, RenderError};
pub use fetch::{ContentFetcher, FetchError};
pub use hooks::{HtmlFilterHook, KeyOverrideHook, PdfHooks};
pub use invalidation::CacheInvalidator;
pub use keys::{CacheKeyDeriver, DerivedKey, compose_artifact_name};
pub use rewrite::absolutize_asset_urls;
pub use service::{
    ArtifactSource, PdfArtifact, PdfPipelineConfig, PdfService, RenderOutcome, RenderRequest,
    display_filename, download_filename,
};

use thiserror::Error;

use crate::{
    application::repos::RepoError, cache::ArtifactStoreError, domain::error::DomainError,
};

/// Query flag that selects the Download mode.
pub const DOWNLOAD_FLAG: &str = "pdf";
/// Query flag that selects the Preview mode.
pub const PREVIEW_FLAG: &str = "pdf-preview";
/// Query flag served to the loop-back fetch; never triggers a conversion.
pub const TEMPLATE_FLAG: &str = "pdf-template";

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("document not found")]
    NotFound,
    #[error("loop-back fetch failed")]
    Fetch(#[from] FetchError),
    #[error("html to pdf conversion failed")]
    Render(#[from] RenderError),
    #[error("artifact cache failure")]
    Store(#[from] ArtifactStoreError),
    #[error("invalid artifact name")]
    Key(#[from] DomainError),
    #[error("document repository failure")]
    Repo(#[from] RepoError),
}
