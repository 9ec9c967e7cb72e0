use std::path::PathBuf;
use std::sync::OnceLock;
use anyhow::Context;
use clap::{ArgAction, ColorChoice, CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use is_terminal::IsTerminal;
use crash_detective::config::{load_config, AppConfig, LogFormat, OutputFmt};
use crash_detective::evtx_source::EvtxSource;
use crash_detective::matcher::MatchEngine;
use crash_detective::reader::EventSource;
use crash_detective::report::{render, RenderOptions, TimeZone};
use crash_detective::root::RootTables;
use crash_detective::signatures::{load_registry, SignatureTable};
use crash_detective::{Diagnoser, LookbackWindow};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Parser, Debug)]
#[command(
    name = "CrashDetective",
    about = "Explains why a game crashed using the Windows event log",
    long_about = "Searches the Application and System event logs for crash records that belong to a game executable and explains the fault codes and modules they mention.",
    after_long_help = "Examples:\n  CrashDetective \"C:\\Games\\MyGame\\Binaries\\Win64\\game.exe\"\n  CrashDetective game.exe --days 7 --output json\n  CrashDetective game.exe --evtx-dir D:\\exported-logs --time-zone utc",
    color = ColorChoice::Auto
)]
struct Args {
    /// Path to the game executable
    #[arg(required_unless_present = "completions")]
    exe: Option<String>,
    #[arg(long, short = 'd', value_enum)]
    days: Option<LookbackWindow>,
    #[arg(long, help = "Read exported Application.evtx and System.evtx from this directory")]
    evtx_dir: Option<PathBuf>,
    #[arg(long, short = 'o', value_enum)]
    output: Option<OutputFmt>,
    #[arg(long, help = "Also write the text report to this file")]
    report_path: Option<PathBuf>,
    #[arg(long, value_enum)]
    time_zone: Option<TimeZone>,
    #[arg(long, default_value_t = false, help = "Skip fuzzy matching")]
    quick: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, help = "JSON signature registry appended to the built-in table")]
    signatures: Option<PathBuf>,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<PathBuf>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        clap_complete::generate(sh, &mut cmd, "CrashDetective", &mut std::io::stdout());
        return;
    }
    let cwd = std::env::current_dir().unwrap_or_default();
    let cfg = match load_config(args.config.as_deref(), &cwd) {
        Ok(c) => c.unwrap_or_default(),
        Err(e) => { eprintln!("{:#}", e); std::process::exit(2); }
    };
    if let Err(e) = apply_config(&mut args, &cfg) { eprintln!("{:#}", e); std::process::exit(2); }
    init_logging(&args);
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let term = std::env::var("TERM").unwrap_or_default();
    let _ = ENABLE_COLOR.set(std::io::stdout().is_terminal() && !no_color_env && term != "dumb");

    match run(&args, &cfg) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("{}", paint(&format!("error: {:#}", e), "1;31"));
            std::process::exit(2);
        }
    }
}

fn run(args: &Args, cfg: &AppConfig) -> anyhow::Result<i32> {
    let exe = args.exe.clone().unwrap_or_default();
    let window = args.days.unwrap_or_default();
    let mut signatures = SignatureTable::builtin().extended(cfg.signatures.clone());
    if let Some(p) = args.signatures.as_ref() {
        signatures = signatures.extended(load_registry(p)?);
    }
    log::debug!("{} signatures loaded", signatures.len());
    let tables: RootTables = cfg.root_tables();
    let source = open_source(args)?;
    if !args.quiet { println!("{}", paint(&format!("Searching the last {} days of event logs for {} ...", window.days(), exe), "1;36")); }

    let mut diagnoser = Diagnoser::new(source)
        .root_tables(tables)
        .signatures(signatures)
        .engine(MatchEngine::new().deep_scan(!args.quick));
    let diagnosis = diagnoser.diagnose(&exe, window);
    let report = render(&diagnosis, RenderOptions { time_zone: args.time_zone.unwrap_or_default() });

    match args.output.unwrap_or_default() {
        OutputFmt::Text => println!("{}", report),
        OutputFmt::Json => println!("{}", serde_json::to_string_pretty(&diagnosis).context("serializing diagnosis")?),
    }
    if let Some(p) = args.report_path.as_ref() {
        std::fs::write(p, report.to_string()).with_context(|| format!("writing report {}", p.to_string_lossy()))?;
        if !args.quiet { println!("{}", paint(&format!("Report written: {}", p.to_string_lossy()), "1;36")); }
    }
    if diagnosis.has_fatal_error() { return Ok(1); }
    if !args.quiet {
        let status = if diagnosis.findings.is_empty() { paint("No matching crash events.", "33") } else { paint(&format!("{} crash event(s) found.", diagnosis.findings.len()), "1;32") };
        println!("{}", status);
    }
    Ok(0)
}

fn open_source(args: &Args) -> anyhow::Result<Box<dyn EventSource>> {
    if let Some(dir) = args.evtx_dir.as_ref() {
        log::info!("reading exported logs from {}", dir.to_string_lossy());
        return Ok(Box::new(EvtxSource::new(dir)));
    }
    live_source()
}

#[cfg(windows)]
fn live_source() -> anyhow::Result<Box<dyn EventSource>> {
    Ok(Box::new(crash_detective::windows_live::LiveSource::new()))
}

#[cfg(not(windows))]
fn live_source() -> anyhow::Result<Box<dyn EventSource>> {
    anyhow::bail!("the live event log is only available on Windows; pass --evtx-dir with exported Application.evtx and System.evtx")
}

/// Fills anything not given on the command line from the config file.
fn apply_config(args: &mut Args, cfg: &AppConfig) -> anyhow::Result<()> {
    if args.days.is_none() && let Some(w) = cfg.window()? { args.days = Some(w); }
    if args.output.is_none() && let Some(v) = cfg.output { args.output = Some(v); }
    if args.time_zone.is_none() && let Some(v) = cfg.time_zone { args.time_zone = Some(v); }
    if !args.quick && let Some(v) = cfg.quick { args.quick = v; }
    if args.evtx_dir.is_none() && let Some(v) = cfg.evtx_dir.clone() { args.evtx_dir = Some(v); }
    if args.report_path.is_none() && let Some(v) = cfg.report_path.clone() { args.report_path = Some(v); }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path.clone() { args.log_path = Some(v); }
    Ok(())
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    match args.log_format {
        Some(LogFormat::Json) => {
            builder.format(|buf, record| {
                use std::io::Write;
                let obj = serde_json::json!({
                    "ts": chrono::Local::now().to_rfc3339(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", obj)
            });
        }
        Some(LogFormat::Text) => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(buf, "[{:<5} {}] {}", record.level(), chrono::Local::now().format("%H:%M:%S"), record.args())
            });
        }
        None => {}
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => eprintln!("Failed to open log file {}: {}", path.to_string_lossy(), e),
        }
    }
    builder.init();
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}
