//! Command-line front end for the doublet store, the crawler and search.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::{self, BufRead, IsTerminal, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Args, Parser, Subcommand};
use nu_ansi_term::{Color, Style};
use tracing::{error, warn};

use doubletdb::config::default_config_path;
use doubletdb::crawler::FileFetcher;
use doubletdb::logging::init_logging;
use doubletdb::service::FnSink;
use doubletdb::unicode::UNICODE_MAP_SIZE;
use doubletdb::{
    Config, Database, LinkId, ProtocolHandler, Request, ServiceEvent, ServiceOptions, Supervisor,
};

#[derive(Parser, Debug)]
#[command(
    name = "doubletdb",
    version,
    about = "Doublet link store, site crawler and text search",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    #[arg(long, global = true, value_name = "FILE", help = "Configuration file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILE", help = "Link store file")]
    db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "DOUBLETDB_LOG",
        help = "Log filter, e.g. info or doubletdb=debug"
    )]
    log_level: Option<String>,

    #[arg(long, global = true, value_name = "FILE", help = "Append logs to this file")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Line protocol over stdin/stdout: plain lines create sequences, lines
    /// ending in `?` search them.
    Links,
    /// Crawl `file://` sites and search archived pages. Urls start crawls,
    /// other lines start searches; `:stop`, `:reset` and `:quit` control
    /// the service.
    Crawler,
    /// Print stored links.
    Dump(DumpArgs),
    /// Print the effective configuration, or save it with `--save`.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(
        long,
        help = "Write the configuration to --config, or to the default config path"
    )]
    save: bool,
}

#[derive(Args, Debug)]
struct DumpArgs {
    #[arg(long, help = "Include the code unit atoms")]
    all: bool,

    #[arg(long, help = "Stop after this many links")]
    limit: Option<usize>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = cli.global.config.clone();
    let mut config = match (&cli.command, &config_path) {
        // A file about to be written does not have to exist yet.
        (Command::Config(args), Some(path)) if args.save && !path.exists() => Config::default(),
        _ => Config::load(config_path.as_deref())?,
    };
    if let Some(db) = cli.global.db {
        config.store.path = db;
    }
    if let Some(level) = cli.global.log_level {
        config.log.level = level;
    }
    if let Some(file) = cli.global.log_file {
        config.log.file = Some(file);
    }
    init_logging(&config.log.level, config.log.file.as_deref())?;

    match cli.command {
        Command::Links => run_links(&config),
        Command::Crawler => run_crawler(&config),
        Command::Dump(args) => run_dump(&config, &args),
        Command::Config(args) => run_config(&config, config_path, &args),
    }
}

fn run_links(config: &Config) -> Result<(), Box<dyn Error>> {
    let db = Database::open(config.store_options())?;
    let handler = ProtocolHandler::new(db.sequences().clone());
    let stdout = io::stdout();
    for line in io::stdin().lock().lines() {
        let line = line?;
        match handler.handle_line(&line) {
            Ok(replies) => {
                let mut out = stdout.lock();
                for reply in replies {
                    writeln!(out, "{reply}")?;
                }
                out.flush()?;
            }
            Err(err) => error!(line = %line, error = %err, "links.line.failed"),
        }
    }
    db.dispose()?;
    Ok(())
}

fn run_crawler(config: &Config) -> Result<(), Box<dyn Error>> {
    let out = Arc::new(Mutex::new(io::stdout()));
    let events = Arc::clone(&out);
    let sink = FnSink(move |event: ServiceEvent| {
        let Ok(line) = serde_json::to_string(&event) else {
            return ControlFlow::Continue(());
        };
        let written = match events.lock() {
            Ok(mut out) => writeln!(out, "{line}").is_ok(),
            Err(_) => false,
        };
        if written {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    });
    let fetcher = FileFetcher::with_delay(config.politeness_delay());
    let mut supervisor = Supervisor::start(
        ServiceOptions::from_config(config),
        Arc::new(fetcher),
        Arc::new(sink),
    )?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        let request = match trimmed {
            ":stop" => Request::StopCrawl,
            ":reset" => Request::Reset,
            ":quit" => Request::Shutdown,
            json if json.starts_with('{') => match Request::from_json(json) {
                Ok(request) => request,
                Err(err) => {
                    warn!(line = %line, error = %err, "crawler.request.malformed");
                    continue;
                }
            },
            other => match Request::from_line(other) {
                Some(request) => request,
                None => continue,
            },
        };
        let quitting = request == Request::Shutdown;
        match supervisor.handle(request) {
            Ok(response) => {
                let line = serde_json::to_string(&response)?;
                if let Ok(mut out) = out.lock() {
                    writeln!(out, "{line}")?;
                }
            }
            Err(err) => error!(line = %line, error = %err, "crawler.request.failed"),
        }
        if quitting {
            return Ok(());
        }
    }

    if let Some(service) = supervisor.service() {
        service.wait_idle();
    }
    if supervisor.is_running() {
        supervisor.handle(Request::Shutdown)?;
    }
    Ok(())
}

fn run_dump(config: &Config, args: &DumpArgs) -> Result<(), Box<dyn Error>> {
    let db = Database::open(config.store_options())?;
    let paint = io::stdout().is_terminal();
    let style = |s: Style, text: String| {
        if paint {
            s.paint(text).to_string()
        } else {
            text
        }
    };
    let first_shown: LinkId = if args.all { 1 } else { UNICODE_MAP_SIZE + 1 };
    let limit = args.limit.unwrap_or(usize::MAX);

    let mut links = Vec::new();
    db.store().each(None, None, |link| {
        if link.id >= first_shown {
            links.push(link);
        }
        ControlFlow::Continue(())
    })?;
    links.sort_by_key(|link| link.id);

    let mut out = io::stdout().lock();
    for link in links.into_iter().take(limit) {
        let mut row = format!(
            "{}: {} -> {}",
            style(Color::Cyan.bold(), link.id.to_string()),
            link.source,
            link.target
        );
        if db.sequences().is_sequence(link.id)? {
            let text = db.sequences().format(link.id)?;
            row.push_str(&format!("  {}", style(Color::Green.normal(), format!("{text:?}"))));
        }
        writeln!(out, "{row}")?;
    }
    drop(out);
    db.dispose()?;
    Ok(())
}

fn run_config(
    config: &Config,
    path: Option<PathBuf>,
    args: &ConfigArgs,
) -> Result<(), Box<dyn Error>> {
    if !args.save {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    let path = path
        .or_else(default_config_path)
        .ok_or("no config path given and no default config directory")?;
    config.persist(&path)?;
    println!("saved {}", path.display());
    Ok(())
}
