#![doc = include_str!("../README.md")]

mod server;

use blog_tonic_core::proto::{FILE_DESCRIPTOR_SET, blog_service_server::BlogServiceServer};
use clap::Parser;
use futures::Stream;
use server::config::{CliArgs, ServerConfig};
use server::lifecycle::Lifecycle;
use server::service::handler::BlogHandler;
use server::store::BlogStore;
use server::telemetry::init_telemetry;
use server::{build_blog_service, connect_store};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::transport::server::Connected;
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry(config.log_format)?;
    let store = connect_store(&config).await?;
    let lifecycle = Arc::new(Lifecycle::new());

    let res = if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config, store.as_ref());
            let res =
                run_server_with_incoming(incoming, &config, Arc::clone(&store), &lifecycle).await;
            // Best effort: a panic might still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config, store.as_ref());
        run_server_with_incoming(incoming, &config, Arc::clone(&store), &lifecycle).await
    };
    tracing::info!("Listener closed");

    // The store outlives the server so in-flight calls can finish.
    tracing::info!("Closing {} store connection", store.name());
    if let Err(e) = store.shutdown().await {
        tracing::error!("Error closing store: {e}");
    }

    lifecycle.mark_stopped();
    tracing::info!("Service stopped");
    providers.shutdown();
    res
}

async fn run_server_with_incoming<I, IO, IE>(
    incoming: I,
    config: &ServerConfig,
    store: Arc<dyn BlogStore>,
    lifecycle: &Arc<Lifecycle>,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<BlogServiceServer<BlogHandler>>()
        .await;

    let service = BlogHandler::new(store, Arc::clone(lifecycle), config);

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    lifecycle.mark_serving();

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_blog_service(service))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(
                Arc::clone(lifecycle),
                health_reporter,
                config.shutdown_timeout,
            ),
        )
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig, store: &dyn BlogStore) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting blog service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting blog service on {} backed by the {} store",
            addr,
            store.name()
        );
    }
}

/// Resolves once the server should stop accepting connections.
///
/// Waits for Ctrl+C or SIGTERM, then refuses new calls, reports the service
/// as not serving and gives in-flight calls up to `grace` to finish before
/// cancelling them.
async fn shutdown_signal(
    lifecycle: Arc<Lifecycle>,
    health_reporter: HealthReporter,
    grace: core::time::Duration,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Stop admitting calls
    lifecycle.begin_drain();

    // 2. Publish the status
    health_reporter
        .set_not_serving::<BlogServiceServer<BlogHandler>>()
        .await;

    // 3. Let in-flight calls finish, then cancel the rest
    if !lifecycle.drain(grace).await {
        tracing::warn!("Cancelled calls still running after {grace:?}");
    }

    tracing::info!("Stopping the server");
}
