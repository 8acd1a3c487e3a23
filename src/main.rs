use std::{future, process, sync::Arc};

use tokio::{signal, sync::oneshot};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vetrina::{
    application::{chrome::ChromeService, error::AppError, feed::FeedService, repos::ContentRepo},
    config,
    infra::{
        content_api::{CachedContent, ContentClient},
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};

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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Check(_) => run_check(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let content = init_content(&settings)?;
    let feed = Arc::new(FeedService::new(content));
    let chrome = Arc::new(ChromeService::new(Arc::new(settings.site.clone())));

    let state = HttpState { feed, chrome };
    serve_http(&settings, state).await
}

async fn run_check(settings: config::Settings) -> Result<(), AppError> {
    let content = init_content(&settings)?;
    let feed = FeedService::new(content);

    let context = feed
        .page_context()
        .await
        .map_err(|err| AppError::unexpected(format!("content check failed: {err}")))?;

    info!(
        target = "vetrina::check",
        posts = context.posts.len(),
        more = context.loader.next_cursor.is_some(),
        "content API reachable"
    );

    Ok(())
}

fn init_content(settings: &config::Settings) -> Result<Arc<dyn ContentRepo>, AppError> {
    let api_url = settings
        .content
        .api_url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("content api url is not configured"))?;

    let client = ContentClient::connect(
        api_url,
        &settings.content.document_type,
        settings.content.page_size.get(),
        settings.content.timeout,
    )?;

    if settings.content.cache_ttl.is_zero() {
        return Ok(Arc::new(client));
    }

    Ok(Arc::new(CachedContent::new(
        Arc::new(client),
        settings.content.cache_ttl,
        settings.content.cache_capacity.get(),
    )))
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "vetrina::server",
        addr = %settings.server.addr,
        "serving public site"
    );

    let grace = settings.server.graceful_shutdown;
    let (drain_tx, drain_rx) = oneshot::channel();
    let server = async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = drain_tx.send(());
            })
            .await
    };

    // Once a shutdown signal lands, in-flight requests get the configured
    // grace period before the remaining connections are dropped.
    let drain_deadline = async move {
        if drain_rx.await.is_err() {
            future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline => {
            warn!(
                target = "vetrina::server",
                grace_seconds = grace.as_secs(),
                "drain window elapsed; closing remaining connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install interrupt handler");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install terminate handler");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }

    info!(target = "vetrina::server", "shutdown signal received; draining");
}
