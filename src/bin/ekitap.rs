use std::io::{self, BufRead, Write};
use std::net::TcpListener;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ekitap_downloader::app::{
    App, CoversResult, FetchResult, ListResult, ProgressSinkKind, ShowResult, SyncResult,
};
use ekitap_downloader::catalog::SyncConflict;
use ekitap_downloader::config::{ConfigLoader, ResolvedConfig};
use ekitap_downloader::error::KitapError;
use ekitap_downloader::http::ReqwestHttpClient;
use ekitap_downloader::launcher::{NoClipboard, SystemClipboard, SystemLauncher};
use ekitap_downloader::lifecycle::{AcquireOutcome, Acquisition};
use ekitap_downloader::output::{JsonOutput, OutputMode, StderrProgress};
use ekitap_downloader::remote::{AccessKey, RemoteInstaller};
use ekitap_downloader::store::Store;
use ekitap_downloader::tui::Tui;

type DesktopApp = App<ReqwestHttpClient, SystemLauncher, SystemClipboard>;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "ekitap")]
#[command(about = "Browse the e-book app catalog, download companion apps and clean up after them")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Inspect or sync the local catalog")]
    Catalog(CatalogArgs),
    #[command(about = "Resolve and cache every cover image")]
    Covers,
    #[command(about = "Download (or open) a catalog item")]
    Fetch(FetchArgs),
    #[command(about = "Delete a downloaded item")]
    Remove(NameArgs),
    #[command(about = "Serve the authenticated remote install endpoint")]
    Serve(ServeArgs),
}

#[derive(Args)]
struct CatalogArgs {
    #[command(subcommand)]
    command: Option<CatalogCommand>,
}

#[derive(Subcommand)]
enum CatalogCommand {
    #[command(about = "List items grouped by category")]
    List,
    #[command(about = "Show one item with its cover status")]
    Show(NameArgs),
    #[command(about = "Refresh the local catalog from the remote copy")]
    Sync(SyncArgs),
}

#[derive(Args)]
struct NameArgs {
    name: String,
}

#[derive(Args)]
struct FetchArgs {
    name: String,

    #[arg(long)]
    launch: bool,
}

#[derive(Args)]
struct SyncArgs {
    /// Overwrite a differing local catalog without asking.
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8765")]
    addr: String,

    /// Access key clients must send in X-Access-Key. Prompted for when omitted.
    #[arg(long)]
    secret: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kitap) = report.downcast_ref::<KitapError>() {
            return ExitCode::from(map_exit_code(kitap));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KitapError) -> u8 {
    match error {
        KitapError::CatalogMissing(_)
        | KitapError::ItemNotFound(_)
        | KitapError::MissingDownloadUrl(_)
        | KitapError::MissingRemote
        | KitapError::ConfigRead(_)
        | KitapError::ConfigParse(_) => 2,
        KitapError::NetworkTimeout(_)
        | KitapError::NetworkError(_)
        | KitapError::HttpStatus { .. } => 3,
        KitapError::LaunchFailure(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Catalog(args)) => run_catalog(args, config, output_mode),
        Some(Commands::Covers) => run_covers(build_app(config)?, output_mode),
        Some(Commands::Fetch(args)) => run_fetch(args, build_app(config)?, output_mode),
        Some(Commands::Remove(args)) => run_remove(args, build_app(config)?, output_mode),
        Some(Commands::Serve(args)) => run_serve(args, config, output_mode),
        None => match output_mode {
            OutputMode::Interactive => {
                let app = Arc::new(build_app(config)?);
                let mut tui = Tui::new(ProgressSinkKind::Browse);
                tui.browse(app)
            }
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "command required (try `ekitap --help`)",
            )),
        },
    }
}

fn build_app(config: ResolvedConfig) -> miette::Result<DesktopApp> {
    let store = Store::new(&config)?;
    let http = ReqwestHttpClient::new(config.request_timeout)?;
    let download_http = ReqwestHttpClient::new(config.download_timeout)?;
    Ok(App::new(
        config,
        store,
        http,
        download_http,
        SystemLauncher,
        SystemClipboard::new(),
    ))
}

fn run_catalog(
    args: CatalogArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = build_app(config)?;
    match args.command.unwrap_or(CatalogCommand::List) {
        CatalogCommand::List => match output_mode {
            OutputMode::NonInteractive => {
                let result = app.list(&JsonOutput)?;
                JsonOutput::print_list(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let result = app.list(&StderrProgress)?;
                print_list_summary(&result);
                Ok(())
            }
        },
        CatalogCommand::Show(args) => match output_mode {
            OutputMode::NonInteractive => {
                let result = app.show(&args.name, &JsonOutput)?;
                JsonOutput::print_show(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let result = app.show(&args.name, &StderrProgress)?;
                print_show_summary(&result);
                Ok(())
            }
        },
        CatalogCommand::Sync(args) => match output_mode {
            OutputMode::NonInteractive => {
                let result = app.sync_catalog(&JsonOutput, |_| args.yes)?;
                JsonOutput::print_sync(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let result = app.sync_catalog(&StderrProgress, |conflict| {
                    args.yes || confirm_overwrite(conflict)
                })?;
                print_sync_summary(&result);
                Ok(())
            }
        },
    }
}

fn confirm_overwrite(conflict: &SyncConflict) -> bool {
    let remote = conflict
        .remote_items
        .map(|count| format!("{count} items"))
        .unwrap_or_else(|| "unparseable".to_string());
    let question = format!(
        "Remote catalog differs (local {} bytes, remote {} bytes, {remote}). Overwrite local copy?",
        conflict.local_bytes, conflict.remote_bytes
    );
    let mut tui = Tui::new(ProgressSinkKind::Sync);
    match tui.confirm(&question) {
        Ok(answer) => answer,
        Err(report) => {
            tracing::warn!(error = %report, "confirmation prompt failed, keeping local catalog");
            false
        }
    }
}

fn run_covers(app: DesktopApp, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.warm_covers(&JsonOutput)?;
            JsonOutput::print_covers(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Covers);
            let result = tui.run(move |sink| app.warm_covers(sink))?;
            print_covers_summary(&result);
            Ok(())
        }
    }
}

fn run_fetch(args: FetchArgs, app: DesktopApp, output_mode: OutputMode) -> miette::Result<()> {
    let FetchArgs { name, launch } = args;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&name, launch, &JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Fetch);
            let result = tui.run(move |sink| app.fetch(&name, launch, sink))?;
            print_fetch_summary(&result);
            Ok(())
        }
    }
}

fn run_remove(args: NameArgs, app: DesktopApp, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.remove(&args.name)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_remove(&result).into_diagnostic(),
        OutputMode::Interactive => {
            if result.removed {
                println!("{GREEN}removed {}{RESET}", result.path);
            } else {
                println!("{YELLOW}{} was not downloaded{RESET}", result.path);
            }
            Ok(())
        }
    }
}

fn run_serve(args: ServeArgs, config: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let secret = match (args.secret, output_mode) {
        (Some(secret), _) => secret,
        (None, OutputMode::Interactive) => prompt_secret().into_diagnostic()?,
        (None, OutputMode::NonInteractive) => {
            return Err(miette::Report::msg("--secret is required with --non-interactive"));
        }
    };
    let key = AccessKey::new(&secret)?;

    let store = Store::new(&config)?;
    let download_http = ReqwestHttpClient::new(config.download_timeout)?;
    let acquisition = Acquisition::new(store, download_http, SystemLauncher, NoClipboard);
    let installer = RemoteInstaller::new(acquisition, key);

    let listener = TcpListener::bind(&args.addr)
        .map_err(|err| KitapError::NetworkError(format!("{}: {err}", args.addr)))?;
    if matches!(output_mode, OutputMode::Interactive) {
        println!("{CYAN}listening on http://{}/install{RESET}", args.addr);
    }
    installer.serve(listener)?;
    Ok(())
}

fn prompt_secret() -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "access key: ")?;
    stderr.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_list_summary(result: &ListResult) {
    println!(
        "{CYAN}📚 {} · {} items{RESET}",
        result.catalog_path, result.total_items
    );
    if let Some(warning) = &result.warning {
        println!("{YELLOW}⚠️ {warning}{RESET}");
    }
    for group in &result.groups {
        println!("{CYAN}[{}]{RESET} {} items", group.category, group.items.len());
        for item in &group.items {
            let marker = if item.link { " ↗" } else { "" };
            println!("  {}{marker} {GRAY}· {}{RESET}", item.name, item.publisher);
        }
    }
}

fn print_show_summary(result: &ShowResult) {
    let item = &result.item;
    println!("{CYAN}{}{RESET}", item.name);
    println!("  publisher:  {}", item.publisher);
    println!("  category:   {}", item.category);
    println!("  download:   {}", item.download_url);
    println!("  unlock key: {}", item.unlock_key().unwrap_or("none"));
    println!(
        "  cover:      {:?} {}x{}",
        result.cover.source, result.cover.width, result.cover.height
    );
    if let Some(path) = &result.saved_path {
        let state = if result.downloaded {
            format!("{GREEN}downloaded{RESET}")
        } else {
            format!("{GRAY}not downloaded{RESET}")
        };
        println!("  saved as:   {path} ({state})");
    }
}

fn print_sync_summary(result: &SyncResult) {
    println!("{CYAN}🔄 {}{RESET}", result.remote_url);
    println!("{GREEN}{}{RESET}", result.outcome);
    println!("{GRAY}{} · {} items{RESET}", result.catalog_path, result.items);
}

fn print_covers_summary(result: &CoversResult) {
    let summary = &result.summary;
    println!("{CYAN}🖼  covers in {}{RESET}", result.cache_dir);
    println!(
        "{GREEN}✅ memory {} · disk {} · network {}{RESET}",
        summary.memory, summary.disk, summary.network
    );
    if summary.placeholder > 0 {
        println!("{YELLOW}⚠️ placeholders: {}{RESET}", summary.placeholder);
    }
}

fn print_fetch_summary(result: &FetchResult) {
    match &result.outcome {
        AcquireOutcome::OpenedLink { target } => {
            println!("{CYAN}↗ {} opened {target}{RESET}", result.name);
        }
        AcquireOutcome::Saved {
            path,
            bytes,
            unlock_key,
            copied_to_clipboard,
        } => {
            println!("{GREEN}⬇️ {} saved to {path} ({bytes} bytes){RESET}", result.name);
            if let Some(key) = unlock_key {
                let note = if *copied_to_clipboard {
                    " (copied to clipboard)"
                } else {
                    ""
                };
                println!("{YELLOW}🔑 unlock key: {key}{note}{RESET}");
            }
            if result.launched {
                println!("{GREEN}🚀 launched{RESET}");
            }
        }
    }
}
