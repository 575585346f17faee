mod api;
mod config;
mod irc;
mod xdcc;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::irc::IrcEngine;
use crate::xdcc::{FileWriteOpener, TcpDialer, XdccEngine};

#[derive(Clone)]
pub struct AppState {
    pub xdcc: Arc<XdccEngine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "xdcc_fetcher=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting xdcc-fetcher...");

    let config_path =
        std::env::var("XDCC_CONFIG_FILE").unwrap_or_else(|_| "config.json".to_string());
    let config = AppConfig::load(&config_path);

    tokio::fs::create_dir_all(&config.download_dir).await?;

    let cancel = CancellationToken::new();
    let irc = dial_and_start_irc(&config, cancel.clone()).await?;

    let registered = irc
        .register(Duration::from_millis(config.register_try_timeout_ms))
        .await;
    if !registered {
        anyhow::bail!("IRC registration did not complete before shutdown");
    }
    tracing::info!(nick = %irc.current_nick().await, "registered with IRC server");

    let xdcc = XdccEngine::start(
        irc,
        Box::new(TcpDialer),
        Box::new(FileWriteOpener::new(config.download_dir.clone())),
        config.unsafe_mode,
    );

    let state = AppState { xdcc };

    let app = Router::new().merge(api::routes()).with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    tracing::info!(addr = %config.http_bind, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Dials the configured IRC host/port, wraps it in TLS if requested, and
/// starts the IRC engine over the resulting duplex stream (§4.2's "already-
/// open duplex byte stream" input).
async fn dial_and_start_irc(
    config: &AppConfig,
    cancel: CancellationToken,
) -> anyhow::Result<Arc<IrcEngine>> {
    let addr = format!("{}:{}", config.irc_host, config.irc_port);
    let stream = tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        TcpStream::connect(&addr),
    )
    .await??;

    if config.use_tls {
        let connector = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
        let tls_stream = connector.connect(&config.irc_host, stream).await?;
        let (read_half, write_half) = tokio::io::split(tls_stream);
        Ok(IrcEngine::start_with_capacity(
            read_half,
            write_half,
            cancel,
            config.packet_channel_capacity,
        ))
    } else {
        let (read_half, write_half) = tokio::io::split(stream);
        Ok(IrcEngine::start_with_capacity(
            read_half,
            write_half,
            cancel,
            config.packet_channel_capacity,
        ))
    }
}
