use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::DocumentsRepo,
    domain::{entities::DocumentRecord, slug::derive_slug, types::CacheKey},
};

use super::{PdfError, hooks::PdfHooks};

const FALLBACK_SLUG: &str = "document";

/// A cache key together with whether it is already memoized on the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub key: CacheKey,
    pub persisted: bool,
}

/// Computes the artifact name for a document.
///
/// A name stored on the document wins unconditionally, so the key survives
/// later title or date edits. Otherwise the name is composed from the title
/// slug and the publish date and passed through the key-override hooks.
/// Persisting a newly composed name is left to the caller.
#[derive(Clone)]
pub struct CacheKeyDeriver {
    documents: Arc<dyn DocumentsRepo>,
    hooks: PdfHooks,
}

impl CacheKeyDeriver {
    pub fn new(documents: Arc<dyn DocumentsRepo>, hooks: PdfHooks) -> Self {
        Self { documents, hooks }
    }

    pub async fn derive(&self, document_id: Uuid) -> Result<DerivedKey, PdfError> {
        let document = self
            .documents
            .find_document(document_id)
            .await?
            .ok_or(PdfError::NotFound)?;
        self.derive_for(&document)
    }

    pub fn derive_for(&self, document: &DocumentRecord) -> Result<DerivedKey, PdfError> {
        if let Some(stored) = document
            .cached_artifact_name
            .as_deref()
            .filter(|name| !name.is_empty())
        {
            return Ok(DerivedKey {
                key: CacheKey::parse(stored)?,
                persisted: true,
            });
        }

        let composed = compose_artifact_name(&document.title, document.published_at);
        let name = self.hooks.apply_key_overrides(composed);
        Ok(DerivedKey {
            key: CacheKey::parse(name)?,
            persisted: false,
        })
    }
}

/// `<title-slug>-<dd>-<mm>-<yyyy>.pdf`
pub fn compose_artifact_name(title: &str, published_at: OffsetDateTime) -> String {
    let slug = derive_slug(title).unwrap_or_else(|_| FALLBACK_SLUG.to_string());
    let date = published_at.date();
    format!(
        "{slug}-{:02}-{:02}-{:04}.pdf",
        date.day(),
        date.month() as u8,
        date.year()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::macros::datetime;

    use crate::application::repos::RepoError;

    struct SingleDocument(Mutex<DocumentRecord>);

    #[async_trait]
    impl DocumentsRepo for SingleDocument {
        async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError> {
            let doc = self.0.lock().expect("lock").clone();
            Ok((doc.id == id).then_some(doc))
        }

        async fn find_document_by_slug(
            &self,
            slug: &str,
        ) -> Result<Option<DocumentRecord>, RepoError> {
            let doc = self.0.lock().expect("lock").clone();
            Ok((doc.slug == slug).then_some(doc))
        }

        async fn store_cached_artifact_name(
            &self,
            _id: Uuid,
            name: &str,
        ) -> Result<bool, RepoError> {
            let mut doc = self.0.lock().expect("lock");
            if doc.cached_artifact_name.is_some() {
                return Ok(false);
            }
            doc.cached_artifact_name = Some(name.to_string());
            Ok(true)
        }

        async fn clear_cached_artifact_name(&self, _id: Uuid) -> Result<(), RepoError> {
            self.0.lock().expect("lock").cached_artifact_name = None;
            Ok(())
        }

        async fn health_check(&self) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn document(title: &str) -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            slug: "annual-report".to_string(),
            kind: "post".to_string(),
            title: title.to_string(),
            body_html: "<p>body</p>".to_string(),
            published_at: datetime!(2024-03-05 10:00 UTC),
            cached_artifact_name: None,
            created_at: datetime!(2024-03-01 09:00 UTC),
            updated_at: datetime!(2024-03-05 10:00 UTC),
        }
    }

    #[test]
    fn composes_slug_and_day_first_date() {
        assert_eq!(
            compose_artifact_name("Annual Report", datetime!(2024-03-05 10:00 UTC)),
            "annual-report-05-03-2024.pdf"
        );
    }

    #[test]
    fn untitled_documents_fall_back_to_generic_slug() {
        assert_eq!(
            compose_artifact_name("  ", datetime!(2023-12-31 23:59 UTC)),
            "document-31-12-2023.pdf"
        );
    }

    #[tokio::test]
    async fn derivation_is_idempotent_without_persistence() {
        let doc = document("Annual Report");
        let id = doc.id;
        let deriver = CacheKeyDeriver::new(
            Arc::new(SingleDocument(Mutex::new(doc))),
            PdfHooks::default(),
        );

        let first = deriver.derive(id).await.expect("first");
        let second = deriver.derive(id).await.expect("second");
        assert_eq!(first, second);
        assert!(!first.persisted);
        assert_eq!(first.key.as_str(), "annual-report-05-03-2024.pdf");
    }

    #[tokio::test]
    async fn stored_name_survives_title_change() {
        let doc = document("Annual Report");
        let id = doc.id;
        let repo = Arc::new(SingleDocument(Mutex::new(doc)));
        let deriver = CacheKeyDeriver::new(repo.clone(), PdfHooks::default());

        let derived = deriver.derive(id).await.expect("derive");
        repo.store_cached_artifact_name(id, derived.key.as_str())
            .await
            .expect("persist");
        repo.0.lock().expect("lock").title = "Completely New Title".to_string();

        let again = deriver.derive(id).await.expect("derive again");
        assert_eq!(again.key, derived.key);
        assert!(again.persisted);
    }

    #[tokio::test]
    async fn override_hook_applies_to_composed_names_only() {
        let mut doc = document("Annual Report");
        let id = doc.id;
        let hooks = PdfHooks::new().with_key_override(|name| format!("acme-{name}"));

        let deriver = CacheKeyDeriver::new(
            Arc::new(SingleDocument(Mutex::new(doc.clone()))),
            hooks.clone(),
        );
        let derived = deriver.derive(id).await.expect("derive");
        assert_eq!(derived.key.as_str(), "acme-annual-report-05-03-2024.pdf");

        doc.cached_artifact_name = Some("legacy.pdf".to_string());
        let deriver = CacheKeyDeriver::new(Arc::new(SingleDocument(Mutex::new(doc))), hooks);
        let derived = deriver.derive(id).await.expect("derive stored");
        assert_eq!(derived.key.as_str(), "legacy.pdf");
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let deriver = CacheKeyDeriver::new(
            Arc::new(SingleDocument(Mutex::new(document("Annual Report")))),
            PdfHooks::default(),
        );
        let err = deriver.derive(Uuid::new_v4()).await.expect_err("missing");
        assert!(matches!(err, PdfError::NotFound));
    }

    #[tokio::test]
    async fn unsafe_override_is_rejected() {
        let doc = document("Annual Report");
        let id = doc.id;
        let deriver = CacheKeyDeriver::new(
            Arc::new(SingleDocument(Mutex::new(doc))),
            PdfHooks::new().with_key_override(|name| format!("../{name}")),
        );
        let err = deriver.derive(id).await.expect_err("traversal");
        assert!(matches!(err, PdfError::Key(_)));
    }
}
