//! newsroom CLI
//!
//! Runs the scheduler and read API, or a single scrape cycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use newsroom::{
    api,
    app::App,
    config::load_config,
    error::{AppError, Result},
    models::Config,
    storage::{ArticleStorage, ListQuery, OrderBy},
};
use tokio::sync::watch;

const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// newsroom - featured NBA news scraper
#[derive(Parser, Debug)]
#[command(
    name = "newsroom",
    version,
    about = "Scrapes featured UDN NBA news and serves it"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "storage/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the read API until Ctrl-C
    Serve {
        /// Address to bind (overrides api.bind)
        #[arg(long)]
        bind: Option<String>,

        /// Serve the API only, without scraping
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Run one scrape cycle now and print its summary
    Scrape,

    /// Print stored articles
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        page_size: usize,

        /// list_position, published_at or first_seen
        #[arg(long, default_value = "list_position")]
        order_by: String,
    },

    /// Validate the configuration file
    Validate,

    /// Show storage information
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn parse_order_by(value: &str) -> Result<OrderBy> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| AppError::validation(format!("unknown order '{value}'")))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("newsroom starting...");

    match cli.command {
        Command::Serve { bind, no_scheduler } => {
            let config = load_config(&cli.config)?;
            serve(config, bind, no_scheduler).await?;
        }

        Command::Scrape => {
            let config = load_config(&cli.config)?;
            let app = App::build(config).await?;

            let result = app.pipeline.run_cycle(1, &AtomicBool::new(false)).await?;
            log::info!("{}", result.summary());
            for failure in &result.failures {
                log::warn!(
                    "  {:?} {}: {}",
                    failure.stage,
                    failure.external_id.as_deref().unwrap_or("-"),
                    failure.reason
                );
            }
            if let Some(reason) = &result.aborted {
                log::error!("Cycle aborted: {}", reason);
            }
        }

        Command::List {
            page,
            page_size,
            order_by,
        } => {
            let config = load_config(&cli.config)?;
            let app = App::build(config).await?;
            let query = ListQuery {
                page,
                page_size,
                order_by: parse_order_by(&order_by)?,
            };

            let page = app.store.list(&query).await?;
            println!(
                "page {} ({} per page, {} total)",
                page.page, page.page_size, page.total
            );
            for article in page.items {
                println!(
                    "{:>3}  {:<16} {}",
                    article.list_position, article.external_id, article.title
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            let config = if cli.config.exists() {
                Config::load(&cli.config)?
            } else {
                return Err(AppError::config(format!(
                    "{} not found",
                    cli.config.display()
                )));
            };
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            newsroom::services::ArticleParser::from_config(&config)?;
            log::info!("✓ Config OK ({} tags, selectors compile)", config.tags.len());
        }

        Command::Info => {
            let config = load_config(&cli.config)?;
            match &config.storage.dir {
                Some(dir) => log::info!("Storage directory: {}", dir.display()),
                None => log::info!("Storage: in memory only"),
            }
            let app = App::build(config).await?;
            log::info!("Stored articles: {}", app.store.len().await?);

            let authors = app.store.authors().await?;
            log::info!("Authors: {}", authors.len());
            for author in authors.iter().take(5) {
                log::info!("  {} ({})", author.name, author.articles);
            }
        }
    }

    log::info!("Done!");

    Ok(())
}

async fn serve(config: Config, bind: Option<String>, no_scheduler: bool) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.api.bind.clone());
    let app = App::build(config).await?;
    let router = api::router(app.api_state());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = if no_scheduler {
        log::info!("Scheduler disabled");
        None
    } else {
        Some(tokio::spawn(Arc::clone(&app.scheduler).run(shutdown_rx.clone())))
    };

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    log::info!("API listening on http://{}", listener.local_addr()?);

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    let server_task = tokio::spawn(async move { server.await });

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            log::error!("Scheduler task failed: {}", e);
        }
    }
    // open event streams keep connections alive, so draining is bounded
    match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server_task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => log::error!("Server task failed: {}", e),
        Err(_) => log::warn!("Connections still open after {:?}, exiting", SERVER_DRAIN_TIMEOUT),
    }

    Ok(())
}
