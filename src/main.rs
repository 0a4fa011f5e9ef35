//! # Bearerbox - Message Switching Core Entry Point
//!
//! Boots the full bearerbox pipeline: loads configuration, replays the
//! message store, starts the SMSC connector pool, the box-connection
//! multiplexer, the SMS router, and the WTP responder, then waits for a
//! shutdown signal.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

use bearerbox::admission::AccessList;
use bearerbox::cli::Args;
use bearerbox::config::BearerboxConfig;
use bearerbox::logging::ColorizedFormatter;
use bearerbox::queue::Queue;
use bearerbox::router::run_router;
use bearerbox::smsc::mock::MockDriver;
use bearerbox::smsc::{ConnectorPool, RouteConfig, SmscConn};
use bearerbox::store::MessageStore;
use bearerbox::supervisor::Supervisor;
use bearerbox::wtp::{run_responder, WtpResponder};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("starting bearerbox");
    let config = BearerboxConfig::load(&args.config)
        .await
        .with_context(|| format!("loading config from {:?}", args.config))?;

    if args.check_config {
        info!("configuration is valid, exiting ({})", args.config.display());
        return Ok(());
    }

    let access = AccessList {
        white_list: config.access.white_list.clone(),
        black_list: config.access.black_list.clone(),
    };
    let supervisor = Arc::new(Supervisor::new(access, vec![]));

    let (store, pending) = MessageStore::init_and_load(&config.core.store_path)
        .await
        .context("opening message store")?;
    info!(pending = pending.len(), "message store ready");

    let outgoing: Queue<bearerbox::message::Sms> = Queue::new();
    let inbound_from_smsc: Queue<bearerbox::message::Sms> = Queue::new();
    let pool = Arc::new(ConnectorPool::new(inbound_from_smsc.clone()));

    for entry in &config.smsc {
        let route = RouteConfig {
            allowed_prefixes: entry.allowed_prefixes.clone(),
            denied_prefixes: entry.denied_prefixes.clone(),
            preferred_prefixes: entry.preferred_prefixes.clone(),
            preferred_smsc_ids: entry.preferred_smsc_ids.clone(),
            denied_smsc_ids: entry.denied_smsc_ids.clone(),
        };
        let driver = match entry.dialect.as_str() {
            "mock" => Arc::new(MockDriver::new(entry.id.clone(), true)),
            other => {
                warn!(dialect = %other, id = %entry.id, "unknown smsc dialect, falling back to mock");
                Arc::new(MockDriver::new(entry.id.clone(), true))
            }
        };
        let conn = Arc::new(SmscConn::new(entry.id.clone(), route, driver));
        pool.add(conn).await.context("starting smsc connector")?;
    }

    // Replayed messages were saved but never acked; re-route them before
    // accepting any new traffic.
    let router_producer = outgoing.producer();
    for sms in pending {
        outgoing.produce(sms).await;
    }

    let router_handle = {
        let pool = pool.clone();
        let outgoing = outgoing.clone();
        tokio::spawn(async move { run_router(pool, outgoing).await })
    };

    let responder = Arc::new(WtpResponder::new(config.core.wtp_port));
    let wtp_incoming: Queue<bearerbox::message::WdpDatagram> = Queue::new();
    let responder_handle = {
        let responder = responder.clone();
        let wtp_incoming = wtp_incoming.clone();
        tokio::spawn(async move { run_responder(responder, wtp_incoming).await })
    };

    let boxc = Arc::new(bearerbox::boxc::BoxConnMux::new(&config.core.box_listen));
    boxc.clone().start().await.context("starting box connection listener")?;

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    supervisor.request_shutdown();

    drop(router_producer);
    pool.shutdown_all().await;
    store.shutdown().await.context("flushing message store")?;
    router_handle.abort();
    responder_handle.abort();

    info!("bearerbox stopped");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let detailed_log_layer = match args.log_file.as_deref() {
        Some("stderr") | None => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed(),
        Some(path_str) => {
            let log_path = std::path::Path::new(path_str);
            let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let log_filename = log_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("bearerbox.log"));
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            // Leak the guard: it must outlive the subscriber for the life of
            // the process, and main() has no natural place to park it.
            Box::leak(Box::new(guard));
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_writer)
                .with_ansi(false)
                .with_filter(log_level)
                .boxed()
        }
    };

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();

    Ok(())
}
