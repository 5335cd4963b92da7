use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, RawQuery, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{
            ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, PRAGMA,
        },
    },
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use tracing::error;
use url::{Url, form_urlencoded};

use crate::{
    application::{
        error::HttpError,
        pdf::{
            CookiePolicy, DOWNLOAD_FLAG, PREVIEW_FLAG, PdfArtifact, PdfService, RenderOutcome,
            RenderRequest, TEMPLATE_FLAG,
        },
        repos::DocumentsRepo,
    },
    domain::{entities::DocumentRecord, types::RenderMode},
    presentation::views::{
        DocumentPdfTemplate, DocumentTemplate, DocumentView, render_not_found_response,
        render_template_response,
    },
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

const CONTENT_TRANSFER_ENCODING: HeaderName = HeaderName::from_static("content-transfer-encoding");

#[derive(Clone)]
pub struct HttpState {
    pub documents: Arc<dyn DocumentsRepo>,
    pub pdf: Arc<PdfService>,
    pub cookies: CookiePolicy,
    pub site_base_url: Url,
}

/// Alternative representations a document URL can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfEndpoint {
    /// Conversion source HTML; only ever requested by the loop-back fetch.
    Template,
    Download,
    Preview,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(public_health))
        .route("/{slug}", get(document))
        .route("/{slug}/pdf", get(document_pdf))
        .route("/{slug}/pdf/", get(document_pdf))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Select the endpoint from query flags. `pdf-template` wins over every
/// other flag, and a download wins over a preview.
pub fn endpoint_from_query(query: Option<&str>) -> Option<PdfEndpoint> {
    let query = query?;
    let mut download = false;
    let mut preview = false;
    for (key, _) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            TEMPLATE_FLAG => return Some(PdfEndpoint::Template),
            DOWNLOAD_FLAG => download = true,
            PREVIEW_FLAG => preview = true,
            _ => {}
        }
    }
    if download {
        Some(PdfEndpoint::Download)
    } else if preview {
        Some(PdfEndpoint::Preview)
    } else {
        None
    }
}

/// `Pragma: no-cache` or any `Cache-Control` directive of `no-cache`.
pub fn no_cache_requested(headers: &HeaderMap) -> bool {
    let pragma = headers
        .get_all(PRAGMA)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.trim().eq_ignore_ascii_case("no-cache"));
    let cache_control = headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"));
    pragma || cache_control
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.documents.health_check().await)
}

async fn document(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let endpoint = endpoint_from_query(query.as_deref());
    serve_document(&state, &slug, endpoint, &headers, &jar).await
}

async fn document_pdf(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let endpoint = match endpoint_from_query(query.as_deref()) {
        Some(PdfEndpoint::Template) => PdfEndpoint::Template,
        _ => PdfEndpoint::Download,
    };
    serve_document(&state, &slug, Some(endpoint), &headers, &jar).await
}

async fn serve_document(
    state: &HttpState,
    slug: &str,
    endpoint: Option<PdfEndpoint>,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Response {
    let document = match state.documents.find_document_by_slug(slug).await {
        Ok(Some(document)) => document,
        Ok(None) => return render_not_found_response(),
        Err(err) => return HttpError::from(err).into_response(),
    };
    let eligible = state.pdf.config().is_eligible(&document.kind);

    let mode = match endpoint {
        None => return document_page(state, &document, eligible),
        Some(_) if !eligible => return document_page(state, &document, eligible),
        Some(PdfEndpoint::Template) => return document_template(state, &document),
        Some(PdfEndpoint::Download) => RenderMode::Download,
        Some(PdfEndpoint::Preview) => RenderMode::Preview,
    };

    let request = RenderRequest {
        document_id: document.id,
        mode,
        bypass_cache: no_cache_requested(headers),
        cookies: state
            .cookies
            .collect(jar.iter().map(|cookie| (cookie.name(), cookie.value()))),
    };

    match state.pdf.render_document(&document, &request).await {
        Ok(RenderOutcome::NotApplicable) => document_page(state, &document, false),
        Ok(RenderOutcome::Preview(html)) => Html(html).into_response(),
        Ok(RenderOutcome::Pdf(artifact)) => pdf_response(artifact),
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn document_page(state: &HttpState, document: &DocumentRecord, eligible: bool) -> Response {
    let view = DocumentView::from_record(document, &state.site_base_url, eligible);
    render_template_response(DocumentTemplate { view }, StatusCode::OK)
}

fn document_template(state: &HttpState, document: &DocumentRecord) -> Response {
    let view = DocumentView::from_record(document, &state.site_base_url, false);
    render_template_response(DocumentPdfTemplate { view }, StatusCode::OK)
}

/// `inline` disposition carrying the ASCII name plus an RFC 5987 encoded
/// UTF-8 name for clients that understand `filename*`.
fn content_disposition(filename: &str, display_filename: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(display_filename.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A");
    format!("inline; filename=\"{filename}\"; filename*=UTF-8''{encoded}")
}

fn pdf_response(artifact: PdfArtifact) -> Response {
    let disposition = content_disposition(&artifact.filename, &artifact.display_filename);
    let disposition = match HeaderValue::from_str(&disposition) {
        Ok(value) => value,
        Err(err) => {
            error!(
                target = "infra::http::public",
                filename = %artifact.filename,
                error = %err,
                "invalid content-disposition header"
            );
            HeaderValue::from_static("inline; filename=\"document.pdf\"")
        }
    };

    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (CONTENT_DISPOSITION, disposition),
            (CONTENT_TRANSFER_ENCODING, HeaderValue::from_static("binary")),
            (CONTENT_LENGTH, HeaderValue::from(artifact.bytes.len())),
            (ACCEPT_RANGES, HeaderValue::from_static("bytes")),
        ],
        artifact.bytes,
    )
        .into_response()
}
