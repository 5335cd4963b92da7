//! Value types shared by the PDF pipeline.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// File name of a document's cached artifact.
///
/// Keys form a flat namespace inside the cache root, so they never contain
/// path separators and never start with a dot (temporary files do).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::validation("cache key must not be empty"));
        }
        if value.starts_with('.') {
            return Err(DomainError::validation(format!(
                "cache key `{value}` must not start with a dot"
            )));
        }
        if value
            .chars()
            .any(|ch| matches!(ch, '/' | '\\' | '\0') || ch.is_control())
        {
            return Err(DomainError::validation(format!(
                "cache key `{value}` contains a path separator or control character"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which representation a PDF endpoint request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Download,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSize {
    A3,
    A4,
    A5,
    #[default]
    Letter,
    Legal,
    Tabloid,
}

impl PaperSize {
    /// Name understood by wkhtmltopdf-compatible engines.
    pub fn as_str(self) -> &'static str {
        match self {
            PaperSize::A3 => "A3",
            PaperSize::A4 => "A4",
            PaperSize::A5 => "A5",
            PaperSize::Letter => "Letter",
            PaperSize::Legal => "Legal",
            PaperSize::Tabloid => "Tabloid",
        }
    }
}

impl FromStr for PaperSize {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(Self::A3),
            "a4" => Ok(Self::A4),
            "a5" => Ok(Self::A5),
            "letter" => Ok(Self::Letter),
            "legal" => Ok(Self::Legal),
            "tabloid" => Ok(Self::Tabloid),
            other => Err(DomainError::validation(format!(
                "unsupported paper size `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Portrait => "Portrait",
            Orientation::Landscape => "Landscape",
        }
    }
}

impl FromStr for Orientation {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            other => Err(DomainError::validation(format!(
                "unsupported orientation `{other}`"
            ))),
        }
    }
}

/// Paper settings handed to the HTML-to-PDF engine unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaperConfig {
    pub size: PaperSize,
    pub orientation: Orientation,
}
