// src/main.rs
// =============================================================================
// Entry point.
//
// What happens here:
// 1. Load .env (if any) and set up tracing
// 2. Parse command-line arguments using clap
// 3. Build the AppContext and dispatch to the subcommand
// 4. Exit with proper code (0 = completed, 1 = crawl failed, 2 = error)
// =============================================================================

mod cli;
mod config;
mod context;
mod crawl;
mod error;
mod logs;
mod server;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};
use config::CrawlConfig;
use context::AppContext;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// RUST_LOG overrides the default filter. Output goes to stderr so that
// `crawl --json` keeps stdout clean.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawl_controller=info,crawl=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// Returns:
//   Ok(0) = server stopped cleanly, or the crawl completed
//   Ok(1) = the crawl failed or was cancelled
//   Err = bad configuration, bind failure, bad seed URL, ...
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, crawl } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid listen address {}:{}", host, port))?;
            handle_serve(CrawlConfig::from(&crawl), addr).await
        }
        Commands::Crawl { url, json, crawl } => {
            handle_crawl(CrawlConfig::from(&crawl), &url, json).await
        }
    }
}

async fn handle_serve(config: CrawlConfig, addr: SocketAddr) -> Result<i32> {
    let ctx = AppContext::new(config)?;
    server::serve(ctx, addr, server::shutdown_signal()).await?;
    Ok(0)
}

// Runs one job to the end, then prints the whole log.
// Log lines are printed after the fact, not streamed.
async fn handle_crawl(config: CrawlConfig, url: &str, json: bool) -> Result<i32> {
    let ctx = AppContext::new(config)?;

    let job = ctx.controller.start_crawl(url, None)?;
    let job = tokio::select! {
        done = ctx.controller.wait_for(job.id) => done?,
        _ = server::shutdown_signal() => {
            ctx.controller.cancel(job.id)?;
            ctx.controller.wait_for(job.id).await?
        }
    };
    ctx.shutdown().await;

    if json {
        let report = json!({
            "job": job,
            "logs": ctx.controller.logs(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in ctx.controller.log_lines() {
            println!("{}", line);
        }
    }

    Ok(job.status.exit_code())
}
