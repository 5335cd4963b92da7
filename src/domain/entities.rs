//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A content entity that can be served as a page and, when its kind is
/// eligible, as a rendered PDF.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub slug: String,
    /// Content-type tag (`post`, `page`, ...) checked against the eligible set.
    pub kind: String,
    pub title: String,
    pub body_html: String,
    pub published_at: OffsetDateTime,
    /// Memoized artifact file name; once set it is returned verbatim.
    pub cached_artifact_name: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl DocumentRecord {
    /// Site-relative path of the document's canonical page.
    pub fn canonical_path(&self) -> String {
        format!("/{}", self.slug)
    }
}
