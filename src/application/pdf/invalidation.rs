use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::repos::DocumentsRepo,
    cache::{ArtifactStore, KeyLocks},
    domain::types::CacheKey,
};

use super::{PdfError, keys::CacheKeyDeriver};

const TARGET: &str = "application::pdf::invalidation";

/// Evicts cache entries in response to document mutations.
#[derive(Clone)]
pub struct CacheInvalidator {
    documents: Arc<dyn DocumentsRepo>,
    deriver: CacheKeyDeriver,
    store: Arc<ArtifactStore>,
    locks: KeyLocks,
}

impl CacheInvalidator {
    pub fn new(
        documents: Arc<dyn DocumentsRepo>,
        deriver: CacheKeyDeriver,
        store: Arc<ArtifactStore>,
        locks: KeyLocks,
    ) -> Self {
        Self {
            documents,
            deriver,
            store,
            locks,
        }
    }

    /// Save-event handler. Revisions leave the cache alone; every failure is
    /// logged and swallowed.
    pub async fn on_document_saved(&self, document_id: Uuid, is_revision: bool) {
        if is_revision {
            info!(
                target = TARGET,
                op = "pdf::on_document_saved",
                result = "skipped",
                document_id = %document_id,
                "Revision save leaves cache untouched"
            );
            return;
        }

        match self.evict(document_id).await {
            Ok(key) => {
                counter!("stampa_pdf_invalidate_total").increment(1);
                info!(
                    target = TARGET,
                    op = "pdf::on_document_saved",
                    result = "evicted",
                    document_id = %document_id,
                    cache_key = %key,
                    "Cache entry evicted"
                );
            }
            Err(PdfError::NotFound) => {
                info!(
                    target = TARGET,
                    op = "pdf::on_document_saved",
                    result = "not_found",
                    document_id = %document_id,
                    "Saved document is unknown; nothing to evict"
                );
            }
            Err(err) => {
                warn!(
                    target = TARGET,
                    op = "pdf::on_document_saved",
                    result = "error",
                    document_id = %document_id,
                    error = %err,
                    "Cache eviction failed"
                );
            }
        }
    }

    /// Evict the current entry and forget the memoized name, so the next
    /// render derives a fresh key from the document's current title and date.
    pub async fn reset_key(&self, document_id: Uuid) -> Result<CacheKey, PdfError> {
        let key = self.evict(document_id).await?;
        self.documents.clear_cached_artifact_name(document_id).await?;
        counter!("stampa_pdf_invalidate_total").increment(1);
        info!(
            target = TARGET,
            op = "pdf::reset_key",
            result = "ok",
            document_id = %document_id,
            cache_key = %key,
            "Cache key reset"
        );
        Ok(key)
    }

    pub async fn purge_all(&self) -> Result<usize, PdfError> {
        let removed = self.store.purge().await?;
        counter!("stampa_pdf_invalidate_total").increment(removed as u64);
        info!(
            target = TARGET,
            op = "pdf::purge_all",
            result = "ok",
            removed,
            "Cache purged"
        );
        Ok(removed)
    }

    async fn evict(&self, document_id: Uuid) -> Result<CacheKey, PdfError> {
        let derived = self.deriver.derive(document_id).await?;
        // Wait out any in-flight render so it cannot re-populate stale content.
        let _guard = self.locks.acquire(&derived.key).await;
        self.store.delete(&derived.key).await?;
        Ok(derived.key)
    }
}
