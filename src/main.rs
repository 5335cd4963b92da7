use std::{process, sync::Arc};

use stampa::{
    application::{
        error::AppError,
        pdf::{CacheInvalidator, CacheKeyDeriver, PdfHooks, PdfPipelineConfig, PdfService},
        repos::DocumentsRepo,
    },
    cache::{ArtifactStore, KeyLocks},
    config,
    infra::{
        db::PostgresRepositories,
        engine::CommandPdfEngine,
        error::InfraError,
        fetch::HttpContentFetcher,
        http::{self, AdminState, HttpState},
        telemetry,
    },
};
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(InfraError::from)?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ResetKey(args) => run_reset_key(settings, args).await,
        config::Command::PurgeCache(_) => run_purge_cache(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let documents: Arc<dyn DocumentsRepo> = init_repositories(&settings).await?;
    let pdf = Arc::new(build_pdf_service(&settings, documents.clone())?);

    let http_state = HttpState {
        documents: documents.clone(),
        pdf: pdf.clone(),
        cookies: settings.pdf.cookies.clone(),
        site_base_url: settings.site.base_url.clone(),
    };
    let admin_state = AdminState {
        documents,
        invalidator: pdf.invalidator(),
    };

    info!(
        target = "stampa::serve",
        public_addr = %settings.server.public_addr,
        admin_addr = %settings.server.admin_addr,
        cache_enabled = settings.pdf.cache_enabled,
        cache_dir = %settings.pdf.cache_dir.display(),
        engine = %settings.pdf.engine_path.display(),
        "Starting HTTP services"
    );

    serve_http(&settings, http_state, admin_state).await
}

async fn run_reset_key(
    settings: config::Settings,
    args: config::ResetKeyArgs,
) -> Result<(), AppError> {
    let documents: Arc<dyn DocumentsRepo> = init_repositories(&settings).await?;
    let invalidator = CacheInvalidator::new(
        documents.clone(),
        CacheKeyDeriver::new(documents, PdfHooks::default()),
        Arc::new(ArtifactStore::new(settings.pdf.cache_dir.clone())),
        KeyLocks::new(),
    );

    let key = invalidator.reset_key(args.document_id).await?;
    info!(
        target = "stampa::reset_key",
        document_id = %args.document_id,
        cache_key = %key,
        "Cache key reset"
    );
    Ok(())
}

async fn run_purge_cache(settings: config::Settings) -> Result<(), AppError> {
    let store = ArtifactStore::new(settings.pdf.cache_dir.clone());
    let removed = store
        .purge()
        .await
        .map_err(|err| AppError::unexpected(format!("cache purge failed: {err}")))?;
    info!(
        target = "stampa::purge_cache",
        removed,
        cache_dir = %settings.pdf.cache_dir.display(),
        "Cache purged"
    );
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_pdf_service(
    settings: &config::Settings,
    documents: Arc<dyn DocumentsRepo>,
) -> Result<PdfService, AppError> {
    let pdf = &settings.pdf;
    let config = PdfPipelineConfig {
        cache_enabled: pdf.cache_enabled,
        eligible_types: pdf.eligible_types.clone(),
        paper: pdf.paper,
        site_base_url: settings.site.base_url.clone(),
        loopback_base_url: pdf.loopback_base_url.clone(),
        debug: pdf.debug,
    };
    let fetcher =
        HttpContentFetcher::new(pdf.cookies.clone(), pdf.forward_cookies, pdf.fetch_timeout)
            .map_err(InfraError::from)?;
    let engine = CommandPdfEngine::new(pdf.engine_path.clone(), pdf.render_timeout);

    Ok(PdfService::new(
        config,
        documents,
        Arc::new(ArtifactStore::new(pdf.cache_dir.clone())),
        Arc::new(fetcher),
        Arc::new(engine),
        PdfHooks::default(),
    ))
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(InfraError::from)?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(InfraError::from)?;

    let public_server = axum::serve(public_listener, public_router.into_make_service());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service());

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
