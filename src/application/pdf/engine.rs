use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::types::PaperConfig;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdf engine unavailable: {0}")]
    Unavailable(io::Error),
    #[error("pdf engine i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("pdf engine failed (exit {exit_code:?}): {stderr}")]
    Engine {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("pdf engine exceeded {seconds}s budget")]
    Timeout { seconds: u64 },
    #[error("pdf engine produced no output")]
    EmptyOutput,
}

/// Converts a complete HTML document into PDF bytes.
#[async_trait]
pub trait PdfEngine: Send + Sync {
    async fn render(&self, html: &str, paper: PaperConfig) -> Result<Bytes, RenderError>;
}
