use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trigrep::config::Config;
use trigrep::index::{DiskIndex, NGramStore};
use trigrep::output;
use trigrep::query::{SearchFilters, SearchRequest};
use trigrep::service::{Indexer, SearchService, Searcher};
use trigrep::source::{GitSync, LocalMirrors, SyncRoutine, TreeWalker};
use trigrep::utils::CancelToken;
use trigrep::worker::IndexWorker;

type Service = SearchService<DiskIndex, LocalMirrors>;

#[derive(Parser)]
#[command(name = "trigrep")]
#[command(about = "Trigram-indexed code search across repository mirrors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <app data dir>/trigrep/config.json)
    #[arg(long, global = true, env = "TRIGREP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the index and mirrors
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Root of the repository mirrors
    #[arg(long, global = true)]
    mirrors_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reindex one repository from its mirror under the mirrors directory
    Index {
        /// Repository id
        repo: String,
    },
    /// Remove one file from the index
    Remove { repo: String, path: String },
    /// Search the index
    Search {
        query: String,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        language: Option<String>,

        /// Substring of the file path
        #[arg(long)]
        path: Option<String>,

        #[arg(long, default_value_t = 0)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(short = 's', long)]
        case_sensitive: bool,

        /// Treat the query as a regular expression
        #[arg(short = 'e', long)]
        regex: bool,

        /// Print the result page as JSON
        #[arg(long, conflicts_with_all = ["files_with_matches", "count"])]
        json: bool,

        /// Only print the names of matching files
        #[arg(short = 'l', long)]
        files_with_matches: bool,

        /// Print matching line counts per file
        #[arg(short = 'c', long)]
        count: bool,

        #[arg(long)]
        no_color: bool,
    },
    /// Show index statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Run one sync-and-reindex cycle over all configured repositories
    Sync {
        #[arg(long)]
        json: bool,
    },
    /// Serve the search endpoint and run the index worker until Ctrl+C
    Serve {
        /// Listen address
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.mirrors_dir {
        config.mirrors_dir = Some(dir);
    }

    match cli.command {
        Commands::Index { repo } => {
            let service = open_service(&config)?.with_progress(std::io::stderr().is_terminal());
            let dir = LocalMirrors::new(config.mirrors_dir()).repo_dir(&repo)?;
            let report = service.reindex_repo(&repo, &dir, &CancelToken::new())?;
            println!(
                "Indexed {}: {} files, {} skipped, {} removed, {} failed",
                report.repo, report.indexed, report.skipped, report.removed, report.failed
            );
        }
        Commands::Remove { repo, path } => {
            let service = open_service(&config)?;
            if service.remove_file(&repo, &path)? {
                println!("Removed {}:{}", repo, path);
            } else {
                println!("Not indexed: {}:{}", repo, path);
            }
        }
        Commands::Search {
            query,
            repo,
            language,
            path,
            limit,
            offset,
            case_sensitive,
            regex,
            json,
            files_with_matches,
            count,
            no_color,
        } => {
            let service = open_service(&config)?;
            let request = SearchRequest::new(query)
                .with_filters(SearchFilters {
                    repo,
                    language,
                    path,
                })
                .page(limit, offset)
                .case_sensitive(case_sensitive)
                .regex(regex);
            let page = service.search(&request, &CancelToken::new())?;

            let color = !no_color && std::io::stdout().is_terminal();
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else if files_with_matches {
                output::print_files_only(&page.results, color)?;
            } else if count {
                output::print_match_counts(&page.results, color)?;
            } else {
                output::print_page(&page, offset, color)?;
            }
        }
        Commands::Stats { json } => {
            let service = open_service(&config)?;
            let stats = service.store().stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                stats.print();
            }
        }
        Commands::Sync { json } => {
            let service: Arc<dyn Indexer> = Arc::new(open_service(&config)?);
            let worker = IndexWorker::new(service, git_sync(&config), config.worker_config());
            let report = worker.run_cycle(&CancelToken::new());
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for r in &report.reports {
                    println!(
                        "{}: {} indexed, {} skipped, {} removed, {} failed",
                        r.repo, r.indexed, r.skipped, r.removed, r.failed
                    );
                }
                for f in &report.failures {
                    println!("{}: FAILED: {}", f.repo, f.error);
                }
            }
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            serve(&config)?;
        }
    }

    Ok(())
}

fn open_service(config: &Config) -> Result<Service> {
    config.validate()?;
    let index = DiskIndex::open(config.index_path(), config.index_config())
        .with_context(|| format!("Failed to open index at {}", config.index_path().display()))?;
    let walker = TreeWalker::new(&config.exclude)?;
    Ok(SearchService::new(index, LocalMirrors::new(config.mirrors_dir()))
        .with_query_options(config.query_options())
        .with_walker(walker)
        .with_policy(config.index_policy()))
}

fn git_sync(config: &Config) -> Arc<dyn SyncRoutine> {
    Arc::new(GitSync::new(LocalMirrors::new(config.mirrors_dir())))
}

fn serve(config: &Config) -> Result<()> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind))?;
    let service = Arc::new(open_service(config)?);

    let indexer: Arc<dyn Indexer> = service.clone();
    let searcher: Arc<dyn Searcher> = service;
    let mut worker = IndexWorker::new(indexer, git_sync(config), config.worker_config()).start()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(trigrep::server::serve(
        addr,
        searcher,
        trigrep::server::shutdown_on(tokio::signal::ctrl_c()),
    ));

    worker.stop();
    result.context("Search endpoint failed")
}
