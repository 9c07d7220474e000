//! Command line interface for the `streamplex` binary.
//!
//! The binary tails one or more WebSocket feeds and prints every decoded
//! message prefixed by the label of the feed it came from.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `streamplex` binary.
#[derive(Debug, Parser)]
#[command(
    name = "streamplex",
    version,
    about = "Merge labelled WebSocket feeds into one stream"
)]
pub struct Cli {
    /// Feeds to tail, written as `LABEL=URL`.
    #[arg(required = true, value_parser = parse_source)]
    pub sources: Vec<(String, String)>,

    /// Header sent with every handshake, written as `NAME:VALUE`.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Deliver messages still buffered when a feed closes.
    #[arg(long)]
    pub drain_on_close: bool,

    /// Raise errors that arrive between reads instead of dropping them.
    #[arg(long)]
    pub defer_idle_errors: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_listen: Option<SocketAddr>,
}

fn parse_source(raw: &str) -> Result<(String, String), String> {
    let (label, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=URL, got `{raw}`"))?;
    if label.is_empty() {
        return Err(format!("empty label in `{raw}`"));
    }
    if url.is_empty() {
        return Err(format!("empty url in `{raw}`"));
    }
    Ok((label.to_owned(), url.to_owned()))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}
