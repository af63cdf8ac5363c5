use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docbuild::config::SyncConfig;
use docbuild::html::HtmlExport;
use docbuild::render::{HtmlRenderer, LinkTarget};
use docbuild::sync::cache::CacheStore;
use docbuild::sync::reconciler::{Reconciler, SyncReport};
use freshdesk_core::Visibility;

/// Publish a markdown document tree to a Freshdesk knowledge base.
#[derive(Parser, Debug)]
#[command(name = "docbuild", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Document root: one directory per chapter, one markdown file per article
    #[arg(long, global = true, env = "DOCBUILD_SOURCE", default_value = "./docs")]
    source: PathBuf,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Create and update the knowledge base articles
    Freshdesk {
        /// Delete the cache files before syncing
        #[arg(long)]
        start_fresh: bool,

        /// Publish articles instead of saving them as drafts
        #[arg(long)]
        publish: bool,
    },
    /// Render every article to a standalone HTML file
    Html {
        #[arg(long, default_value = "./html")]
        destination: PathBuf,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Freshdesk {
            start_fresh,
            publish,
        } => {
            let config = SyncConfig::from_env()?;
            if *start_fresh {
                CacheStore::new(&cli.source)
                    .remove_all()
                    .await
                    .context("failed to delete cache files")?;
            }
            let client = config.client().context("failed to build http client")?;
            let renderer = HtmlRenderer::new(LinkTarget::Freshdesk(client.base_url().clone()));
            let visibility = if *publish {
                Visibility::Published
            } else {
                Visibility::Draft
            };
            let report = Reconciler::new(client, renderer, cli.source.clone())
                .with_visibility(visibility)
                .with_backoff(config.backoff())
                .run()
                .await
                .with_context(|| format!("sync of {} failed", cli.source.display()))?;
            if !cli.quiet {
                print_summary(&report);
            }
        }
        Commands::Html { destination } => {
            let export = HtmlExport::new(
                HtmlRenderer::new(LinkTarget::HtmlFiles),
                cli.source.clone(),
                destination.clone(),
            );
            let report = export
                .run()
                .await
                .with_context(|| format!("html export of {} failed", cli.source.display()))?;
            if !cli.quiet {
                println!(
                    "wrote {} page(s) to {}",
                    report.written,
                    destination.display()
                );
                for (path, reason) in &report.failures {
                    eprintln!("  failed: {}: {reason}", path.display());
                }
            }
        }
    }
    Ok(())
}

fn print_summary(report: &SyncReport) {
    println!(
        "pushed {} article(s) to category {} ({} folder(s) and {} article(s) created)",
        report.articles_pushed, report.category_id, report.folders_created, report.articles_created
    );
    if report.skipped_missing > 0 {
        println!(
            "{} cached article(s) have no local file and were left untouched",
            report.skipped_missing
        );
    }
    for failure in &report.failures {
        eprintln!(
            "  failed ({:?}): {}: {}",
            failure.stage, failure.name, failure.reason
        );
    }
    if let Some(hint) = summary_hint(report) {
        println!("{hint}");
    }
}

fn summary_hint(report: &SyncReport) -> Option<&'static str> {
    if report.articles_pushed == 0 && (report.category_created || !report.failures.is_empty()) {
        Some(
            "no articles were pushed; inspect the .DOCBUILD_*Cache.json files in the source \
             directory or rerun with --start-fresh",
        )
    } else {
        None
    }
}
