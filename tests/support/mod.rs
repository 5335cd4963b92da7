//! In-memory collaborators for pipeline and router tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use time::macros::datetime;
use url::Url;
use uuid::Uuid;

use stampa::{
    application::{
        pdf::{
            ContentFetcher, FetchError, ForwardedCookies, PdfEngine, PdfHooks, PdfPipelineConfig,
            PdfService, RenderError,
        },
        repos::{DocumentsRepo, RepoError},
    },
    cache::ArtifactStore,
    domain::{entities::DocumentRecord, types::PaperConfig},
};

pub const SITE: &str = "https://docs.example.com/";
pub const LOOPBACK: &str = "http://127.0.0.1:3000";

#[derive(Default)]
pub struct InMemoryDocuments {
    documents: Mutex<HashMap<Uuid, DocumentRecord>>,
    pub store_calls: AtomicUsize,
}

impl InMemoryDocuments {
    pub fn insert(&self, document: DocumentRecord) {
        self.documents
            .lock()
            .expect("lock")
            .insert(document.id, document);
    }

    pub fn get(&self, id: Uuid) -> Option<DocumentRecord> {
        self.documents.lock().expect("lock").get(&id).cloned()
    }

    pub fn update(&self, id: Uuid, apply: impl FnOnce(&mut DocumentRecord)) {
        let mut documents = self.documents.lock().expect("lock");
        apply(documents.get_mut(&id).expect("document exists"));
    }
}

#[async_trait]
impl DocumentsRepo for InMemoryDocuments {
    async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError> {
        Ok(self.get(id))
    }

    async fn find_document_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<DocumentRecord>, RepoError> {
        Ok(self
            .documents
            .lock()
            .expect("lock")
            .values()
            .find(|document| document.slug == slug)
            .cloned())
    }

    async fn store_cached_artifact_name(&self, id: Uuid, name: &str) -> Result<bool, RepoError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().expect("lock");
        let document = documents.get_mut(&id).ok_or(RepoError::NotFound)?;
        if document
            .cached_artifact_name
            .as_deref()
            .is_some_and(|name| !name.is_empty())
        {
            return Ok(false);
        }
        document.cached_artifact_name = Some(name.to_string());
        Ok(true)
    }

    async fn clear_cached_artifact_name(&self, id: Uuid) -> Result<(), RepoError> {
        if let Some(document) = self.documents.lock().expect("lock").get_mut(&id) {
            document.cached_artifact_name = None;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Serves a fixed HTML body and records every call.
pub struct CountingFetcher {
    html: Mutex<String>,
    fail: Mutex<bool>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
    pub cookies: Mutex<Vec<ForwardedCookies>>,
}

impl CountingFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_delay(html, Duration::ZERO)
    }

    pub fn with_delay(html: &str, delay: Duration) -> Self {
        Self {
            html: Mutex::new(html.to_string()),
            fail: Mutex::new(false),
            delay,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            cookies: Mutex::new(Vec::new()),
        }
    }

    pub fn set_html(&self, html: &str) {
        *self.html.lock().expect("lock") = html.to_string();
    }

    pub fn fail_with_status(&self) {
        *self.fail.lock().expect("lock") = true;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for CountingFetcher {
    async fn fetch(&self, url: &Url, cookies: &ForwardedCookies) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().expect("lock").push(url.to_string());
        self.cookies.lock().expect("lock").push(cookies.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if *self.fail.lock().expect("lock") {
            return Err(FetchError::Status { status: 500 });
        }
        Ok(self.html.lock().expect("lock").clone())
    }
}

/// Produces `%PDF-stub\n<html>` and records every call.
#[derive(Default)]
pub struct CountingEngine {
    fail: Mutex<bool>,
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<(String, PaperConfig)>>,
}

impl CountingEngine {
    pub fn fail(&self) {
        *self.fail.lock().expect("lock") = true;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PdfEngine for CountingEngine {
    async fn render(&self, html: &str, paper: PaperConfig) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .expect("lock")
            .push((html.to_string(), paper));
        if *self.fail.lock().expect("lock") {
            return Err(RenderError::Engine {
                exit_code: Some(1),
                stderr: "layout failed".to_string(),
            });
        }
        Ok(Bytes::from(format!("%PDF-stub\n{html}")))
    }
}

pub fn document(slug: &str, kind: &str, title: &str) -> DocumentRecord {
    DocumentRecord {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        kind: kind.to_string(),
        title: title.to_string(),
        body_html: r#"<p>Quarterly numbers</p><img src="/media/chart.png">"#.to_string(),
        published_at: datetime!(2024-03-05 10:00 UTC),
        cached_artifact_name: None,
        created_at: datetime!(2024-03-01 09:00 UTC),
        updated_at: datetime!(2024-03-05 10:00 UTC),
    }
}

pub fn pipeline_config(cache_enabled: bool) -> PdfPipelineConfig {
    PdfPipelineConfig {
        cache_enabled,
        eligible_types: ["post", "page"]
            .into_iter()
            .map(str::to_string)
            .collect::<BTreeSet<_>>(),
        paper: PaperConfig::default(),
        site_base_url: Url::parse(SITE).expect("site url"),
        loopback_base_url: Url::parse(LOOPBACK).expect("loopback url"),
        debug: true,
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub documents: Arc<InMemoryDocuments>,
    pub fetcher: Arc<CountingFetcher>,
    pub engine: Arc<CountingEngine>,
    pub store: Arc<ArtifactStore>,
    pub service: Arc<PdfService>,
}

impl Harness {
    pub fn new(cache_enabled: bool) -> Self {
        Self::build(
            pipeline_config(cache_enabled),
            CountingFetcher::new(r#"<html><body><img src="/a.png"></body></html>"#),
            PdfHooks::default(),
        )
    }

    pub fn build(config: PdfPipelineConfig, fetcher: CountingFetcher, hooks: PdfHooks) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let documents = Arc::new(InMemoryDocuments::default());
        let fetcher = Arc::new(fetcher);
        let engine = Arc::new(CountingEngine::default());
        let store = Arc::new(ArtifactStore::new(dir.path().join("pdf-cache")));
        let service = Arc::new(PdfService::new(
            config,
            documents.clone(),
            store.clone(),
            fetcher.clone(),
            engine.clone(),
            hooks,
        ));
        Self {
            dir,
            documents,
            fetcher,
            engine,
            store,
            service,
        }
    }

    pub fn add(&self, document: DocumentRecord) -> Uuid {
        let id = document.id;
        self.documents.insert(document);
        id
    }

    pub fn cache_root_exists(&self) -> bool {
        self.store.root().exists()
    }
}
