//! Write-through S3 proxy entry point.
//!
//! Wires the configured components together and runs the connection-accept
//! loop. Grounded on `barbacane`'s `run_serve`/`main` in structure (hyper
//! `auto::Builder`, a `watch` shutdown channel, signal-driven graceful
//! drain) but stripped of everything this proxy doesn't need: no TLS
//! termination (spec §6: "TLS is assumed to be terminated by the
//! deployment environment"), no hot-reload, no control plane.

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::sync::watch;

use s3proxy_lib::config::Config;
use s3proxy_lib::dispatcher::AppState;
use s3proxy_lib::httpclient::{HttpClientConfig, HttpClientPool};
use s3proxy_lib::mirror::MirrorWriter;
use s3proxy_telemetry::{log_config_error, log_listening, log_shutdown, log_startup};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let log_format = s3proxy_telemetry::LogFormat::parse(&config.log_format)
        .unwrap_or(s3proxy_telemetry::LogFormat::Json);
    let telemetry_config = s3proxy_telemetry::TelemetryConfig::new()
        .with_service_name("s3proxy")
        .with_log_level(&config.log_level)
        .with_log_format(log_format);
    if let Err(e) = s3proxy_telemetry::Telemetry::init(telemetry_config) {
        eprintln!("error: failed to initialize telemetry: {e}");
        return ExitCode::from(1);
    }

    let addr = match config.validate() {
        Ok(addr) => addr,
        Err(e) => {
            log_config_error!(error = %e, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let pool = match HttpClientPool::new(HttpClientConfig::default()) {
        Ok(pool) => pool,
        Err(e) => {
            log_config_error!(error = %e, "failed to build HTTP client pool");
            return ExitCode::from(1);
        }
    };

    let inventory = if config.inventory_enabled() {
        let url = config
            .postgres_url
            .as_deref()
            .expect("inventory_enabled implies postgres_url is set");
        match s3proxy_inventory::InventoryStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                log_config_error!(error = %e, "failed to connect to inventory database");
                return ExitCode::from(1);
            }
        }
    } else {
        Arc::new(s3proxy_inventory::InventoryStore::disabled())
    };

    let mirror = Arc::new(MirrorWriter::new(
        config.mirror_endpoint.clone(),
        config.mirror_access_key.clone(),
        config.mirror_secret_key.clone(),
        config.mirror_bucket_prefix.clone(),
        pool.clone(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        pool,
        inventory,
        mirror,
    });

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log_config_error!(error = %e, addr = %addr, "failed to bind listen address");
            return ExitCode::from(1);
        }
    };

    log_startup!(
        main_endpoint = %config.main_endpoint,
        mirror_endpoint = %config.mirror_endpoint,
        inventory_enabled = config.inventory_enabled(),
        "s3proxy starting"
    );
    log_listening!(addr = %addr, "listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        log_shutdown!("received shutdown signal, draining connections");
        let _ = shutdown_tx.send(true);
    });

    let active_connections = Arc::new(AtomicU64::new(0));

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            accept_result = listener.accept() => {
                let (stream, _peer_addr) = match accept_result {
                    Ok(conn) => conn,
                    Err(e) => {
                        log_config_error!(error = %e, "accept failed");
                        continue;
                    }
                };

                let conn_state = state.clone();
                let conn_counter = active_connections.clone();
                let mut conn_shutdown_rx = shutdown_rx.clone();
                conn_counter.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let conn_state = conn_state.clone();
                        async move { s3proxy_lib::handle_request(conn_state, req).await }
                    });

                    let io = TokioIo::new(stream);
                    let mut builder = auto::Builder::new(TokioExecutor::new());
                    builder.http1().keep_alive(true);
                    let conn = builder.serve_connection_with_upgrades(io, service);
                    tokio::pin!(conn);

                    loop {
                        tokio::select! {
                            result = conn.as_mut() => {
                                if let Err(e) = result {
                                    tracing::debug!(error = %e, "connection error");
                                }
                                break;
                            }
                            _ = conn_shutdown_rx.changed() => {
                                if *conn_shutdown_rx.borrow() {
                                    conn.as_mut().graceful_shutdown();
                                }
                            }
                        }
                    }

                    conn_counter.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    }

    let drain_start = Instant::now();
    let shutdown_duration = Duration::from_secs(config.shutdown_timeout_secs);
    loop {
        if active_connections.load(Ordering::SeqCst) == 0 {
            break;
        }
        if drain_start.elapsed() > shutdown_duration {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    log_shutdown!("stopped accepting connections; any in-flight async inventory/mirror tasks are abandoned");
    ExitCode::SUCCESS
}

/// Wait for SIGTERM or SIGINT (Ctrl-C on non-Unix).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");

        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
