//! OAuth 1.0a provider server.
//!
//! Hosts the request-token, authorize and access-token endpoints plus one
//! protected resource, backed by the in-memory data store.
//!
//! # Usage
//!
//! ```text
//! OAUTH_CONSUMER_KEY=ck OAUTH_CONSUMER_SECRET=cs oauth1-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:4580` | Bind address |
//! | `OAUTH_REALM` | *(empty)* | Realm advertised in challenges |
//! | `OAUTH_ADMIN_TOKEN` | *(unset)* | Secret for `/oauth/authorize` (loopback-only when unset) |
//! | `OAUTH_TIMESTAMP_THRESHOLD` | `300` | Accepted clock skew in seconds |
//! | `OAUTH_CONSUMER_KEY` | *(unset)* | Key of the consumer registered at startup |
//! | `OAUTH_CONSUMER_SECRET` | *(unset)* | Its secret or PEM key |
//! | `OAUTH_SIGNATURE_METHOD` | `HMAC-SHA1` | Its signature method |
//! | `OAUTH_CONSUMER_USER_ID` | *(unset)* | Fixed user identity (skips the token exchange) |
//! | `OAUTH_CONSUMER_HOST` | *(unset)* | Allowed IPv4 address or CIDR network |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod config;
mod response;
mod service;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use oauth1_auth::{InMemoryDataStore, Server};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::service::OAuthHttpService;

/// Server version reported in health check responses.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often recorded nonces are swept.
const NONCE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Drop nonces whose timestamps can no longer pass the freshness check.
fn spawn_nonce_sweeper(store: Arc<InMemoryDataStore>, threshold_secs: u64) {
    let threshold = i64::try_from(threshold_secs).unwrap_or(i64::MAX);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(NONCE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now().timestamp().saturating_sub(threshold);
            store.prune_nonces(cutoff);
            debug!(cutoff, remaining = store.nonce_count(), "swept nonces");
        }
    });
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: OAuthHttpService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.for_peer(peer_addr.ip());
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Request the health endpoint of a running server.
///
/// Succeeds when the response is 200 OK and reports the server as running.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env();

    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level)?;

    let store = Arc::new(InMemoryDataStore::new());
    match &config.consumer {
        Some(settings) => {
            let consumer = settings.to_consumer()?;
            info!(
                consumer_key = %consumer.key,
                signature_method = %consumer.signature_method,
                "registering consumer",
            );
            store.register_consumer(consumer);
        }
        None => warn!("no consumer configured, every signed request will be refused"),
    }

    spawn_nonce_sweeper(store.clone(), config.server.timestamp_threshold_secs);

    let server = Server::new(store.clone(), config.server.clone());
    if config.admin_token.is_none() {
        warn!("OAUTH_ADMIN_TOKEN not set, token approval accepted from loopback only");
    }
    let service = OAuthHttpService::new(Arc::new(server), store, &config.realm)
        .with_admin_token(config.admin_token.as_deref());

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        realm = %config.realm,
        timestamp_threshold_secs = config.server.timestamp_threshold_secs,
        version = VERSION,
        "starting OAuth provider",
    );

    serve(listener, service).await
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    async fn one_shot_server(reply: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(reply.as_bytes()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_should_pass_health_check_on_running_server() {
        let addr = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 20\r\n\r\n{\"status\":\"running\"}",
        )
        .await;
        assert!(run_health_check(&addr).await.is_ok());
    }

    #[tokio::test]
    async fn test_should_fail_health_check_on_error_status() {
        let addr = one_shot_server("HTTP/1.1 503 Service Unavailable\r\n\r\n").await;
        assert!(run_health_check(&addr).await.is_err());
    }

    #[test]
    fn test_should_fail_health_check_without_listener() {
        let addr = tokio_test::block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        });
        assert!(tokio_test::block_on(run_health_check(&addr)).is_err());
    }
}
