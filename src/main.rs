use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uppy_bridge::api::middleware::request_id::REQUEST_ID_HEADER;
use uppy_bridge::config::BridgeConfig;
use uppy_bridge::services::bridge::{
    BatchCollector, CompletedUpload, HttpPublisher, collect_and_publish,
};
use uppy_bridge::services::materializer::Materializer;
use uppy_bridge::widget::{Source, UppyConfig};
use uppy_bridge::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Port for the HTTP server, overrides BRIDGE_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Upload local files to a running server as one batch
    Push {
        /// Base URL of the server
        #[arg(long, default_value = "http://127.0.0.1:3000/")]
        server: String,

        #[arg(long)]
        session: String,

        #[arg(long, default_value = "files")]
        input: String,

        /// Files already uploaded to a tus server
        #[arg(long = "remote", value_name = "URL")]
        remote: Vec<String>,

        /// Files larger than this are skipped instead of inlined
        #[arg(long)]
        max_inline_size: Option<u64>,

        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uppy_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(port).await,
        Command::Push {
            server,
            session,
            input,
            remote,
            max_inline_size,
            files,
        } => push(server, session, input, remote, max_inline_size, files).await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = BridgeConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    config.validate().context("invalid configuration")?;

    info!(
        "Bridge config: upload dir={}, max size={}MB, fetch timeout={}s, tus={}",
        config.upload_dir.display(),
        config.max_file_size / 1024 / 1024,
        config.fetch_timeout_secs,
        config.tus_endpoint.as_deref().unwrap_or("off")
    );

    let handlers = uppy_bridge::init();
    let widget = default_widget(&config).context("invalid default widget")?;
    let materializer = Materializer::from_config(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid BRIDGE_HOST/BRIDGE_PORT")?;
    let state = AppState::new(config, handlers, materializer, vec![widget]);

    let app = create_app(state).layer(
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }),
    );

    info!("Server ready at http://{}", addr);
    info!("Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully.");
    Ok(())
}

/// Widget served under `/widgets/{DEFAULT_INPUT_ID}`. Cloud sources are only
/// offered in tus mode.
fn default_widget(config: &BridgeConfig) -> anyhow::Result<UppyConfig> {
    let mut builder = UppyConfig::builder(config.default_input_id.as_str()).source(Source::Webcam);
    match (&config.tus_endpoint, &config.companion_url) {
        (Some(endpoint), Some(companion)) => {
            builder = builder
                .tus(endpoint.as_str())
                .companion(companion.as_str())
                .source(Source::Url)
                .source(Source::GoogleDrive)
                .source(Source::Dropbox);
        }
        (Some(endpoint), None) => builder = builder.tus(endpoint.as_str()),
        (None, Some(_)) => {
            tracing::warn!("COMPANION_URL is ignored without TUS_ENDPOINT");
        }
        (None, None) => {}
    }
    Ok(builder.build()?)
}

async fn push(
    server: String,
    session: String,
    input: String,
    remote: Vec<String>,
    max_inline_size: Option<u64>,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut uploads: Vec<CompletedUpload> = files.into_iter().map(CompletedUpload::from_path).collect();
    uploads.extend(remote.into_iter().map(|url| {
        let name = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("remote")
            .to_string();
        CompletedUpload::remote(name, url)
    }));

    let mut collector = BatchCollector::new();
    if let Some(limit) = max_inline_size {
        collector = collector.with_max_inline_size(limit);
    }

    let publisher = HttpPublisher::new(&server, &session, &input)?;
    info!("Pushing {} file(s) to {}", uploads.len(), publisher.endpoint());

    let table = collect_and_publish(&collector, uploads, &publisher).await?;
    println!("{}", serde_json::to_string_pretty(&table)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown...");
        },
    }
}
