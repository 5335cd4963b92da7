use std::{collections::BTreeSet, sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    application::repos::DocumentsRepo,
    cache::{ArtifactStore, ArtifactStoreError, KeyLocks},
    domain::{
        entities::DocumentRecord,
        types::{CacheKey, PaperConfig, RenderMode},
    },
};

use super::{
    PdfError, TEMPLATE_FLAG,
    cookies::ForwardedCookies,
    engine::{PdfEngine, RenderError},
    fetch::{ContentFetcher, FetchError},
    hooks::PdfHooks,
    invalidation::CacheInvalidator,
    keys::{CacheKeyDeriver, DerivedKey},
    rewrite::absolutize_asset_urls,
};

const TARGET: &str = "application::pdf::service";
const FALLBACK_FILENAME: &str = "document";

/// Static pipeline settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct PdfPipelineConfig {
    /// When false every download renders and streams without touching the store.
    pub cache_enabled: bool,
    pub eligible_types: BTreeSet<String>,
    pub paper: PaperConfig,
    /// Absolute base that root-relative asset URLs are rewritten against.
    pub site_base_url: Url,
    /// Origin the loop-back fetch is sent to.
    pub loopback_base_url: Url,
    pub debug: bool,
}

impl PdfPipelineConfig {
    pub fn is_eligible(&self, kind: &str) -> bool {
        self.eligible_types.contains(kind)
    }

    /// Canonical URL of the document with the template flag appended.
    pub fn template_url(&self, document: &DocumentRecord) -> Result<Url, FetchError> {
        let base = self.loopback_base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{}", document.canonical_path()))
            .map_err(|err| FetchError::InvalidUrl(err.to_string()))?;
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{TEMPLATE_FLAG}"),
            _ => TEMPLATE_FLAG.to_string(),
        };
        url.set_query(Some(&query));
        Ok(url)
    }
}

/// Per-request inputs to [`PdfService::render`].
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub document_id: Uuid,
    pub mode: RenderMode,
    /// Set by an explicit no-cache signal on the inbound request.
    pub bypass_cache: bool,
    pub cookies: ForwardedCookies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Served from an existing cache entry.
    Cache,
    /// Rendered, stored, and read back from the store.
    Rendered,
    /// Rendered but never stored: caching is disabled, or the document
    /// changed while it was rendering.
    Streamed,
}

impl ArtifactSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactSource::Cache => "hit",
            ArtifactSource::Rendered => "miss",
            ArtifactSource::Streamed => "bypass",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PdfArtifact {
    /// ASCII fallback of the download name, safe inside a quoted header value.
    pub filename: String,
    /// Download name with the title intact (`<title>.pdf`).
    pub display_filename: String,
    pub bytes: Bytes,
    pub cache_key: Option<CacheKey>,
    pub source: ArtifactSource,
}

#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// The document kind is not PDF-eligible; the caller serves the normal page.
    NotApplicable,
    /// Post-processed template HTML for preview mode.
    Preview(String),
    Pdf(PdfArtifact),
}

/// Orchestrates cache lookup, loop-back fetch, conversion and persistence.
pub struct PdfService {
    config: PdfPipelineConfig,
    documents: Arc<dyn DocumentsRepo>,
    deriver: CacheKeyDeriver,
    store: Arc<ArtifactStore>,
    fetcher: Arc<dyn ContentFetcher>,
    engine: Arc<dyn PdfEngine>,
    hooks: PdfHooks,
    locks: KeyLocks,
}

impl PdfService {
    pub fn new(
        config: PdfPipelineConfig,
        documents: Arc<dyn DocumentsRepo>,
        store: Arc<ArtifactStore>,
        fetcher: Arc<dyn ContentFetcher>,
        engine: Arc<dyn PdfEngine>,
        hooks: PdfHooks,
    ) -> Self {
        let deriver = CacheKeyDeriver::new(documents.clone(), hooks.clone());
        Self {
            config,
            documents,
            deriver,
            store,
            fetcher,
            engine,
            hooks,
            locks: KeyLocks::new(),
        }
    }

    pub fn config(&self) -> &PdfPipelineConfig {
        &self.config
    }

    /// Invalidation trigger sharing this service's store and key locks.
    pub fn invalidator(&self) -> CacheInvalidator {
        CacheInvalidator::new(
            self.documents.clone(),
            self.deriver.clone(),
            self.store.clone(),
            self.locks.clone(),
        )
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderOutcome, PdfError> {
        let document = self
            .documents
            .find_document(request.document_id)
            .await?
            .ok_or(PdfError::NotFound)?;
        self.render_document(&document, request).await
    }

    /// Render an already loaded document; `request.document_id` is not consulted.
    pub async fn render_document(
        &self,
        document: &DocumentRecord,
        request: &RenderRequest,
    ) -> Result<RenderOutcome, PdfError> {
        if !self.config.is_eligible(&document.kind) {
            debug!(
                target = TARGET,
                op = "pdf::render",
                result = "not_applicable",
                document_id = %document.id,
                kind = %document.kind,
                "Document kind is not PDF-eligible"
            );
            return Ok(RenderOutcome::NotApplicable);
        }

        match request.mode {
            RenderMode::Preview => {
                let html = self.fetch_source(document, &request.cookies).await?;
                Ok(RenderOutcome::Preview(html))
            }
            RenderMode::Download => self.download(document, request).await.map(RenderOutcome::Pdf),
        }
    }

    async fn download(
        &self,
        document: &DocumentRecord,
        request: &RenderRequest,
    ) -> Result<PdfArtifact, PdfError> {
        let started_at = Instant::now();
        let filename = download_filename(&document.title);
        let display_filename = display_filename(&document.title);

        if !self.config.cache_enabled {
            let bytes = self.generate(document, &request.cookies).await?;
            info!(
                target = TARGET,
                op = "pdf::download",
                result = ArtifactSource::Streamed.as_str(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                document_id = %document.id,
                pdf_bytes = bytes.len(),
                "PDF rendered with caching disabled"
            );
            return Ok(PdfArtifact {
                filename,
                display_filename,
                bytes,
                cache_key: None,
                source: ArtifactSource::Streamed,
            });
        }

        let DerivedKey { key, persisted } = self.deriver.derive_for(document)?;

        if !request.bypass_cache {
            if let Some(bytes) = self.read_cached(&key).await? {
                return Ok(self.cache_hit(
                    document,
                    key,
                    (filename, display_filename),
                    bytes,
                    started_at,
                ));
            }
        }

        let _guard = self.locks.acquire(&key).await;

        // A concurrent miss may have filled the entry while we waited.
        if !request.bypass_cache {
            if let Some(bytes) = self.read_cached(&key).await? {
                return Ok(self.cache_hit(
                    document,
                    key,
                    (filename, display_filename),
                    bytes,
                    started_at,
                ));
            }
        }

        counter!("stampa_pdf_cache_miss_total").increment(1);
        let rendered = self.generate(document, &request.cookies).await?;

        if !self.unchanged_since_fetch(document).await? {
            info!(
                target = TARGET,
                op = "pdf::download",
                result = ArtifactSource::Streamed.as_str(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                document_id = %document.id,
                cache_key = %key,
                pdf_bytes = rendered.len(),
                "Document changed during render; serving without caching"
            );
            return Ok(PdfArtifact {
                filename,
                display_filename,
                bytes: rendered,
                cache_key: None,
                source: ArtifactSource::Streamed,
            });
        }

        let key = if persisted {
            key
        } else {
            self.persist_key(document, key).await?
        };

        self.store.write(&key, rendered).await?;
        let bytes = self.store.read(&key).await?;

        info!(
            target = TARGET,
            op = "pdf::download",
            result = ArtifactSource::Rendered.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            document_id = %document.id,
            cache_key = %key,
            bypass = request.bypass_cache,
            pdf_bytes = bytes.len(),
            "PDF rendered and cached"
        );

        Ok(PdfArtifact {
            filename,
            display_filename,
            bytes,
            cache_key: Some(key),
            source: ArtifactSource::Rendered,
        })
    }

    fn cache_hit(
        &self,
        document: &DocumentRecord,
        key: CacheKey,
        (filename, display_filename): (String, String),
        bytes: Bytes,
        started_at: Instant,
    ) -> PdfArtifact {
        counter!("stampa_pdf_cache_hit_total").increment(1);
        info!(
            target = TARGET,
            op = "pdf::download",
            result = ArtifactSource::Cache.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            document_id = %document.id,
            cache_key = %key,
            pdf_bytes = bytes.len(),
            "PDF served from cache"
        );
        PdfArtifact {
            filename,
            display_filename,
            bytes,
            cache_key: Some(key),
            source: ArtifactSource::Cache,
        }
    }

    /// Whether the stored document still matches the snapshot the render
    /// started from. A save that lands mid-render may have derived a
    /// different key and so never waited on this render's lock.
    async fn unchanged_since_fetch(&self, document: &DocumentRecord) -> Result<bool, PdfError> {
        let current = self.documents.find_document(document.id).await?;
        Ok(current.is_some_and(|current| {
            current.updated_at == document.updated_at
                && current.title == document.title
                && current.published_at == document.published_at
        }))
    }

    async fn read_cached(&self, key: &CacheKey) -> Result<Option<Bytes>, PdfError> {
        if !self.store.exists(key).await {
            return Ok(None);
        }
        match self.store.read(key).await {
            Ok(bytes) => Ok(Some(bytes)),
            // Evicted between the probe and the read.
            Err(ArtifactStoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Memoize a newly derived key. If another request stored a different
    /// name first, that name wins and is returned instead.
    async fn persist_key(
        &self,
        document: &DocumentRecord,
        key: CacheKey,
    ) -> Result<CacheKey, PdfError> {
        if self
            .documents
            .store_cached_artifact_name(document.id, key.as_str())
            .await?
        {
            return Ok(key);
        }

        let stored = self.deriver.derive(document.id).await?;
        if stored.key != key {
            debug!(
                target = TARGET,
                op = "pdf::persist_key",
                document_id = %document.id,
                derived = %key,
                stored = %stored.key,
                "Artifact name already memoized; using stored name"
            );
        }
        Ok(stored.key)
    }

    async fn generate(
        &self,
        document: &DocumentRecord,
        cookies: &ForwardedCookies,
    ) -> Result<Bytes, PdfError> {
        let html = self.fetch_source(document, cookies).await?;

        let started_at = Instant::now();
        let result = self.engine.render(&html, self.config.paper).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!("stampa_pdf_render_ms").record(elapsed_ms as f64);

        match result {
            Ok(bytes) if bytes.is_empty() => {
                counter!("stampa_pdf_render_error_total").increment(1);
                Err(RenderError::EmptyOutput.into())
            }
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                counter!("stampa_pdf_render_error_total").increment(1);
                warn!(
                    target = TARGET,
                    op = "pdf::generate",
                    result = "error",
                    elapsed_ms,
                    document_id = %document.id,
                    error = %err,
                    "PDF engine failed"
                );
                Err(err.into())
            }
        }
    }

    /// Fetch the template HTML, apply filters and absolutize asset URLs.
    async fn fetch_source(
        &self,
        document: &DocumentRecord,
        cookies: &ForwardedCookies,
    ) -> Result<String, PdfError> {
        let url = self.config.template_url(document)?;
        let started_at = Instant::now();

        let fetched = match self.fetcher.fetch(&url, cookies).await {
            Ok(html) => html,
            Err(err) => {
                counter!("stampa_pdf_fetch_error_total").increment(1);
                warn!(
                    target = TARGET,
                    op = "pdf::fetch_source",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    document_id = %document.id,
                    url = %url,
                    error = %err,
                    "Loop-back fetch failed"
                );
                return Err(err.into());
            }
        };

        let fetched_bytes = fetched.len();
        let filtered = self.hooks.apply_fetched_html(fetched);
        let rewritten = absolutize_asset_urls(&filtered, &self.config.site_base_url);
        let html = self.hooks.apply_template_html(rewritten);
        if html.trim().is_empty() {
            return Err(FetchError::EmptyBody.into());
        }

        if self.config.debug {
            info!(
                target = TARGET,
                op = "pdf::fetch_source",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                document_id = %document.id,
                url = %url,
                forwarded_cookies = ?cookies.names(),
                fetched_bytes,
                html_bytes = html.len(),
                "Loop-back source fetched"
            );
        }

        Ok(html)
    }
}

/// `<title>.pdf` with control characters dropped and whitespace collapsed.
pub fn display_filename(title: &str) -> String {
    let cleaned = title
        .split_whitespace()
        .map(|word| word.chars().filter(|ch| !ch.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        format!("{FALLBACK_FILENAME}.pdf")
    } else {
        format!("{cleaned}.pdf")
    }
}

/// `<title>.pdf` reduced to characters that are safe inside a quoted header value.
pub fn download_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter_map(|ch| match ch {
            '"' | '\\' => Some('_'),
            ch if ch.is_whitespace() => Some(' '),
            ' '..='~' => Some(ch),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        format!("{FALLBACK_FILENAME}.pdf")
    } else {
        format!("{cleaned}.pdf")
    }
}
