use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::build_app_background;
use std::net::SocketAddr;
use std::path::PathBuf;
use tfidx_core::config::SearchConfig;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Directory stored document paths are resolved against
    #[arg(long, default_value = ".")]
    doc_root: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = SearchConfig { doc_root: args.doc_root, ..SearchConfig::default() };
    let app: Router = build_app_background(args.index, config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
