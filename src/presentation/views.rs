use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, macros::format_description};
use url::Url;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        pdf::{DOWNLOAD_FLAG, PREVIEW_FLAG},
    },
    domain::entities::DocumentRecord,
};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response() -> Response {
    let mut response = render_template_response(NotFoundTemplate, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Fields shared by the page and PDF-source templates.
pub struct DocumentView {
    pub title: String,
    pub published: String,
    pub iso_date: String,
    pub body_html: String,
    pub canonical_url: String,
    pub site_url: String,
    pub pdf_enabled: bool,
    pub download_url: String,
    pub preview_url: String,
}

impl DocumentView {
    pub fn from_record(document: &DocumentRecord, site_base_url: &Url, pdf_enabled: bool) -> Self {
        let site_url = site_base_url.as_str().to_string();
        let canonical_url = format!(
            "{}{}",
            site_url.trim_end_matches('/'),
            document.canonical_path()
        );
        let published = document
            .published_at
            .format(format_description!("[month repr:long] [day padding:none], [year]"))
            .unwrap_or_default();
        let iso_date = document.published_at.format(&Rfc3339).unwrap_or_default();

        Self {
            title: document.title.clone(),
            published,
            iso_date,
            body_html: document.body_html.clone(),
            download_url: format!("{canonical_url}?{DOWNLOAD_FLAG}"),
            preview_url: format!("{canonical_url}?{PREVIEW_FLAG}"),
            canonical_url,
            site_url,
            pdf_enabled,
        }
    }
}

#[derive(Template)]
#[template(path = "document.html")]
pub struct DocumentTemplate {
    pub view: DocumentView,
}

/// Conversion source: document content only, no scripts and no site chrome.
#[derive(Template)]
#[template(path = "document_pdf.html")]
pub struct DocumentPdfTemplate {
    pub view: DocumentView,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate;

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn document() -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            slug: "field-notes".to_string(),
            kind: "post".to_string(),
            title: "Field Notes".to_string(),
            body_html: r#"<p>Body</p><img src="/media/a.png">"#.to_string(),
            published_at: datetime!(2024-03-05 10:00 UTC),
            cached_artifact_name: None,
            created_at: datetime!(2024-03-01 09:00 UTC),
            updated_at: datetime!(2024-03-05 10:00 UTC),
        }
    }

    fn base() -> Url {
        Url::parse("https://example.com/").expect("url")
    }

    #[test]
    fn page_links_to_pdf_modes_when_eligible() {
        let view = DocumentView::from_record(&document(), &base(), true);
        let html = DocumentTemplate { view }.render().expect("render");
        assert!(html.contains("https://example.com/field-notes?pdf\""));
        assert!(html.contains("https://example.com/field-notes?pdf-preview"));
        assert!(html.contains("March 5, 2024"));
    }

    #[test]
    fn page_hides_pdf_links_when_ineligible() {
        let view = DocumentView::from_record(&document(), &base(), false);
        let html = DocumentTemplate { view }.render().expect("render");
        assert!(!html.contains("?pdf"));
    }

    #[test]
    fn pdf_source_has_no_scripts_or_chrome() {
        let view = DocumentView::from_record(&document(), &base(), true);
        let html = DocumentPdfTemplate { view }.render().expect("render");
        assert!(html.contains("<p>Body</p>"));
        assert!(html.contains(r#"src="/media/a.png""#));
        assert!(!html.contains("<script"));
        assert!(!html.contains("Download PDF"));
    }
}
