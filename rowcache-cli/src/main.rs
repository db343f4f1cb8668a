mod config;
mod demo;
mod paths;
mod render;

use std::fs;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rowcache_lib::source::MAX_BATCH_SIZE;
use rowcache_lib::{HttpRowSource, RowSource, SourceError, TableId, TableSession};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use thiserror::Error;

use crate::config::{ConfigError, Settings};

/// Rows in the generated `--demo` table.
const DEMO_ROWS: usize = 10_000;

#[derive(Parser)]
#[command(name = "rowcache", about = "Browse a large table through an on-demand row cache.")]
struct Args {
    /// Base URL of the data server.
    #[arg(long)]
    url: Option<String>,

    /// Project the tables belong to.
    #[arg(long)]
    project: Option<String>,

    /// Rows per batch request.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Rows fetched beyond each edge of the visible window.
    #[arg(long)]
    overscan: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Config file to use instead of the default one.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Serve a generated table instead of talking to a server.
    #[arg(long)]
    demo: bool,

    /// Also log to stderr.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a window of rows, loading only the batches it needs.
    View {
        table: String,

        /// First visible row.
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Number of visible rows.
        #[arg(long, default_value_t = 20)]
        rows: usize,

        /// Columns to show, comma separated.
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },
    /// Bulk load a table over the streaming endpoint.
    Stream {
        table: String,

        /// Maximum rows to stream.
        #[arg(long, default_value_t = MAX_BATCH_SIZE)]
        limit: usize,

        /// First row to stream.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

impl Args {
    fn overrides(&self) -> Settings {
        Settings {
            url: self.url.clone(),
            project: self.project.clone(),
            batch_size: self.batch_size,
            overscan: self.overscan,
            timeout_secs: self.timeout,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rows(#[from] rowcache_lib::Error),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("missing {0}: pass --{0} or set it in the config file")]
    Missing(&'static str),
}

fn init_logging(verbose: bool) {
    paths::rotate_logs();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if let Some(path) = paths::log_file() {
        if let Some(dir) = path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        match File::create(&path) {
            Ok(file) => loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file)),
            Err(e) => eprintln!("Failed to create log file {}: {}", path.display(), e),
        }
    }
    if verbose {
        loggers.push(TermLogger::new(
            LevelFilter::Debug,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Failed to initialize logger: {}", e);
    }
}

fn http_source(settings: &Settings) -> Result<HttpRowSource, CliError> {
    let url = settings.url.clone().ok_or(CliError::Missing("url"))?;
    let project = settings.project.clone().ok_or(CliError::Missing("project"))?;

    let mut builder = HttpRowSource::builder().url(url).project(project);
    if let Some(timeout) = settings.timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

async fn view(
    args: &Args,
    settings: &Settings,
    table: &str,
    start: usize,
    rows: usize,
    columns: &[String],
) -> Result<(), CliError> {
    let source: Arc<dyn RowSource> = if args.demo {
        Arc::new(demo::source(DEMO_ROWS))
    } else {
        Arc::new(http_source(settings)?)
    };

    let session = TableSession::open(table, source, settings.session_config()).await?;
    let end = start.saturating_add(rows.max(1) - 1);
    let plan = session.set_visible_range(start, end);
    log::debug!("Visible rows {}..={} issued {} requests", start, end, plan.len());
    session.wait_idle().await;

    print!("{}", render::window(&session, start..end.saturating_add(1).min(session.total()), columns));
    eprintln!("{}", render::status(&session.load_state()));
    session.close();
    Ok(())
}

async fn stream(
    args: &Args,
    settings: &Settings,
    table: &str,
    limit: usize,
    offset: usize,
) -> Result<(), CliError> {
    let config = settings.session_config();
    let table = TableId::new(table);

    let merged = if args.demo {
        let source = Arc::new(demo::source(DEMO_ROWS));
        let session = TableSession::with_schema(table, source, Vec::new(), 0, config)?;
        let merged = session.load_stream(demo::stream(DEMO_ROWS, limit, offset)).await?;
        eprintln!("{}", render::status(&session.load_state()));
        merged
    } else {
        let source = http_source(settings)?;
        let messages = source.stream_rows(&table, limit, offset);
        let session = TableSession::with_schema(table, Arc::new(source), Vec::new(), 0, config)?;

        let mut changes = session.subscribe();
        let progress = session.clone();
        let reporter = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                log::debug!("{}", render::status(&progress.load_state()));
            }
        });

        let result = session.load_stream(messages).await;
        eprintln!("{}", render::status(&session.load_state()));
        session.close();
        reporter.abort();
        result?
    };

    println!("{}", merged);
    Ok(())
}

async fn run(args: Args) -> Result<(), CliError> {
    let settings = Settings::load(args.config.as_deref())?.merge(args.overrides());

    match &args.command {
        Command::View {
            table,
            start,
            rows,
            columns,
        } => view(&args, &settings, table, *start, *rows, columns).await,
        Command::Stream {
            table,
            limit,
            offset,
        } => stream(&args, &settings, table, *limit, *offset).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
