use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vetrina::{
    application::{
        error::AppError,
        storefront::{StorefrontService, describe_outcome},
    },
    cache::{CacheState, ResponseCache, ResponseCacheConfig},
    config,
    graphql::{HttpTransport, Transport},
    infra::{
        assets::StaticFiles,
        error::InfraError,
        http::{self, HttpState, ProxyState},
        shell::DocumentShell,
        telemetry,
    },
    persistence::ContextDefaults,
    presentation::views::OutcomeRenderer,
    route::ViewRegistry,
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Resolve(args) => run_resolve(settings, args).await,
    }
}

async fn build_storefront(settings: &config::Settings) -> Result<StorefrontService, AppError> {
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(settings.backend.graphql_url.clone(), settings.backend.timeout)
            .map_err(|err| InfraError::configuration(err.to_string()))?,
    );
    let views = ViewRegistry::from_entries(
        settings
            .views
            .iter()
            .map(|(tag, bundle)| (tag.as_str(), bundle.as_str())),
    );
    let shell = DocumentShell::load(settings.shell.index_path.as_deref()).await?;

    Ok(StorefrontService::new(
        transport,
        Arc::new(views),
        Arc::new(OutcomeRenderer::default()),
        shell,
        settings.retry.policy(),
        ContextDefaults {
            store_code: Arc::from(settings.backend.store_code.as_str()),
            url_store_codes: settings
                .backend
                .url_store_codes
                .iter()
                .map(|code| Arc::from(code.as_str()))
                .collect(),
        },
        settings.persistence.namespace.as_str(),
    ))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let storefront = Arc::new(build_storefront(&settings).await?);
    let cache_config = ResponseCacheConfig::from(&settings.response_cache);
    let state = HttpState {
        cache: CacheState {
            cache: ResponseCache::new(&cache_config),
            namespace: Arc::from(storefront.namespace()),
        },
        storefront,
        proxy: ProxyState::new(
            settings.backend.origin.clone(),
            settings.backend.timeout,
            settings.backend.proxy_max_body_bytes.get(),
        )?,
        files: StaticFiles::new(settings.shell.static_dir.clone()),
    };

    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        addr = %settings.server.addr,
        backend = %settings.backend.origin,
        response_cache = cache_config.enabled,
        "storefront listening"
    );

    let grace = settings.server.graceful_shutdown;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = stop_tx.send(());
        },
    );

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline(stop_rx, grace) => {
            warn!(grace_secs = grace.as_secs(), "graceful shutdown timed out");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}

async fn drain_deadline(stop: tokio::sync::oneshot::Receiver<()>, grace: Duration) {
    if stop.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn run_resolve(
    settings: config::Settings,
    args: config::ResolveArgs,
) -> Result<(), AppError> {
    let storefront = build_storefront(&settings).await?;
    let path = match url::Url::parse(&args.url) {
        Ok(url) => url.path().to_string(),
        Err(_) => args.url.clone(),
    };

    let (pathname, outcome) = storefront.resolve(&path).await;
    let described = describe_outcome(&pathname, &outcome);
    let rendered = serde_json::to_string_pretty(&described)
        .map_err(|err| AppError::unexpected(format!("failed to encode outcome: {err}")))?;
    println!("{rendered}");
    Ok(())
}
