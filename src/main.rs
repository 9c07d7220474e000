//! `streamplex` binary: tail labelled WebSocket feeds as one stream.
//!
//! Each feed is exposed through a [`SocketStream`] and all of them are merged
//! in arrival order. Every value is printed as `label<TAB>json`.

mod cli;

use std::{error::Error, sync::Arc};

use clap::Parser;
use futures::StreamExt;
use streamplex::{
    adapter::{AdapterConfig, ClosePolicy, IdleErrorPolicy, SocketStream},
    connection::WebSocketConnection,
    multiplex::Merged,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    if let Some(addr) = cli.metrics_listen {
        install_metrics(addr)?;
    }

    let config = AdapterConfig::default()
        .with_close_policy(if cli.drain_on_close {
            ClosePolicy::Drain
        } else {
            ClosePolicy::Discard
        })
        .with_idle_errors(if cli.defer_idle_errors {
            IdleErrorPolicy::Defer
        } else {
            IdleErrorPolicy::Drop
        });

    let mut connections = Vec::with_capacity(cli.sources.len());
    let mut builder = Merged::builder();
    for (label, url) in &cli.sources {
        let headers = cli
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()));
        let conn = WebSocketConnection::connect(url, headers).await?;
        info!(%label, url = conn.url(), "feed attached");
        let stream = SocketStream::builder(Arc::clone(&conn))
            .config(config)
            .build();
        builder = builder.source(label.as_str(), stream);
        connections.push(conn);
    }
    let mut merged = builder.build()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut failure = None;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            item = merged.next() => match item {
                Some(Ok((label, value))) => println!("{label}\t{value}"),
                Some(Err(err)) => {
                    error!(label = %err.label, error = %err.source, "feed failed");
                    failure = Some(err);
                    break;
                }
                None => break,
            },
        }
    }

    drop(merged);
    for conn in connections {
        conn.close().await;
    }
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "metrics exporter listening");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
#[expect(
    clippy::unnecessary_wraps,
    reason = "signature matches the metrics-enabled build"
)]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error>> {
    tracing::warn!(%addr, "built without the metrics feature; --metrics-listen ignored");
    Ok(())
}
