//! Demo binary: proxies one request through the time-warp handler and
//! prints the result. No port is bound — the thin HTTP binary that would
//! sit in front of `dispatch::handle` is an external collaborator, out of
//! scope here. This exists only so the crate stays runnable end-to-end in
//! a dev loop.

use base64::Engine;
use clap::Parser;
use timewarp_registry::config::ProxyConfig;
use timewarp_registry::dispatch::{self, ProxyState};
use timewarp_registry::http_types::UpstreamRequest;
use url::Url;

#[derive(Parser)]
#[command(about = "Fetch one registry URL through the time-warp proxy and print the response.")]
struct Args {
    #[command(flatten)]
    config: ProxyConfig,

    /// Basic-auth username: npm, pypi, cargosparse, or cargogitarchive.
    platform: String,

    /// Basic-auth password: an RFC 3339 instant for npm/pypi, a commit hash for cargo.
    secret: String,

    /// Full request URL to proxy, e.g. http://localhost/some-package
    url: String,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let state = ProxyState::new(args.config)?;

    let mut request = UpstreamRequest::get(Url::parse(&args.url)?);
    let credential = format!("{}:{}", args.platform, args.secret);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credential);
    request.headers.insert(
        http::header::AUTHORIZATION,
        http::HeaderValue::from_str(&format!("Basic {encoded}"))?,
    );

    let response = dispatch::handle(request, &state).await;
    println!("{}", response.status);
    println!("{}", String::from_utf8_lossy(&response.body));

    Ok(())
}
