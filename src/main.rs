//! soulscan CLI
//!
//! Usage:
//!   soulscan --serve                                 # Analysis proxy
//!   soulscan --photo selfie.jpg                      # Single scan
//!   soulscan --photo selfie.jpg --interactive        # Interactive session
//!   soulscan --photo selfie.jpg --json               # JSON output

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use soulscan::core::{
    run_server, AnalysisClient, CaptureAdapter, ClientConfig, Provider, ProxyConfig, ResetMode,
    Session, SessionConfig, StillCamera, Upstream,
};
use soulscan::types::{CapturePreference, FacingMode, SessionStatus, Stage};
use soulscan::{ANALYZE_PATH, DEFAULT_JPEG_QUALITY, DEFAULT_TIMEOUT_SECS, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "soulscan",
    version = VERSION,
    about = "Soul Scanner - a selfie goes in, a roast comes out",
    long_about = "Soul Scanner takes one photo, sends it to a hosted vision model\n\
                  through a small proxy, and prints a mock 'analysis report'.\n\n\
                  Modes:\n  \
                  --serve        Run the analysis proxy\n  \
                  --photo PATH   Scan one photo (the photo stands in for the camera)\n  \
                  --interactive  Step through the session from the keyboard\n\n\
                  Stages:\n  \
                  INTRO           - Waiting to start\n  \
                  CAPTURING_VIDEO - Camera live\n  \
                  PROCESSING      - Frame sent, waiting for the verdict\n  \
                  RESULT          - Report shown\n  \
                  ERROR           - No camera could be opened"
)]
struct Args {
    /// Run the analysis proxy
    #[arg(short, long)]
    serve: bool,

    /// Photo used as the camera
    #[arg(short, long)]
    photo: Option<PathBuf>,

    /// Interactive session (needs --photo)
    #[arg(short, long, requires = "photo")]
    interactive: bool,

    /// Proxy listen address
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Analyze endpoint used by scans
    #[arg(long, default_value_t = format!("http://127.0.0.1:3000{}", ANALYZE_PATH))]
    endpoint: String,

    /// Hosted model provider (proxy mode)
    #[arg(long, value_enum, default_value_t = Provider::Dashscope)]
    provider: Provider,

    /// Model name override (proxy mode)
    #[arg(long)]
    model: Option<String>,

    /// Upstream base URL override (proxy mode)
    #[arg(long)]
    upstream_url: Option<String>,

    /// Upstream API key (proxy mode)
    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// JPEG quality for the captured frame (1-100)
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Preferred camera facing
    #[arg(long, value_enum, default_value_t = FacingMode::User)]
    facing: FacingMode,

    /// Downscale frames wider than this
    #[arg(long)]
    max_width: Option<u32>,

    /// Timeout for one analysis round trip, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Go straight back to the camera after a report (interactive mode)
    #[arg(long)]
    retry_immediately: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(args.verbose);
    if args.no_color {
        colored::control::set_override(false);
    }

    let outcome = if args.serve {
        run_serve(&args).await
    } else if args.interactive {
        run_interactive(&args).await
    } else if args.photo.is_some() {
        run_single(&args).await
    } else {
        Err("nothing to do: pass --serve, or --photo PATH to scan".into())
    };

    if let Err(e) = outcome {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so JSON on stdout stays clean
fn init_logging(verbose: bool) {
    let default = if verbose { "soulscan=debug" } else { "soulscan=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Key from the flag or DASHSCOPE_API_KEY, then the other known variables
fn resolve_api_key(args: &Args) -> Option<String> {
    first_usable_key([
        args.api_key.clone(),
        std::env::var("VITE_API_KEY").ok(),
        std::env::var("GEMINI_API_KEY").ok(),
    ])
}

/// First candidate that is set and not blank
fn first_usable_key<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|k| !k.trim().is_empty())
}

fn build_session(args: &Args) -> Result<Session, Box<dyn std::error::Error>> {
    let photo = args.photo.as_ref().ok_or("--photo is required")?;

    let camera = StillCamera::new(photo, Some(args.facing));
    let client = AnalysisClient::new(
        ClientConfig::new(&args.endpoint).with_timeout(Duration::from_secs(args.timeout_secs)),
    )?;

    let config = SessionConfig {
        preference: CapturePreference {
            facing: Some(args.facing),
            ..CapturePreference::default()
        }
        .with_resolution(args.max_width, None),
        jpeg_quality: args.quality,
        reset_mode: if args.retry_immediately {
            ResetMode::Recapture
        } else {
            ResetMode::Intro
        },
        ..SessionConfig::default()
    };

    Ok(Session::new(
        CaptureAdapter::new(Arc::new(camera)),
        Arc::new(client),
        config,
    ))
}

/// Run one scan: start, capture, print the report
async fn run_single(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = build_session(args)?;

    if !args.json {
        print_header(args.no_color);
    }

    if session.start().await == Stage::Error {
        print_error_screen(&session, args);
        return Err("camera unavailable".into());
    }

    scan(&mut session, args).await?;
    print_report(&session, args)?;
    Ok(())
}

/// Run an interactive session: Enter drives each stage, 'q' quits
async fn run_interactive(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = build_session(args)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_header(args.no_color);
    println!("Press Enter to move on. Type 'q' to quit.");
    println!();

    loop {
        print_prompt(session.stage(), args.no_color);
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        match session.stage() {
            Stage::Intro => {
                if session.start().await == Stage::Error {
                    print_error_screen(&session, args);
                } else {
                    println!("{}", "Camera live. Press Enter to take the shot.".green());
                }
            }
            Stage::CapturingVideo => {
                if let Err(e) = scan(&mut session, args).await {
                    eprintln!("{} {} (press Enter to try again)", "capture failed:".yellow(), e);
                    continue;
                }
                print_report(&session, args)?;
            }
            Stage::Result | Stage::Error => {
                let next = session.reset().await;
                if next == Stage::Error {
                    print_error_screen(&session, args);
                } else if next == Stage::CapturingVideo {
                    println!("{}", "Camera live again. Press Enter to take the shot.".green());
                }
            }
            Stage::Processing => {
                session.resolve().await;
                print_report(&session, args)?;
            }
        }
    }

    println!("\nSession ended.");
    Ok(())
}

/// Capture and analyze, echoing progress text while waiting
async fn scan(session: &mut Session, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let echo = if args.json {
        None
    } else {
        Some(tokio::spawn(echo_progress(session.subscribe(), args.no_color)))
    };

    let outcome = session.capture().await;

    if let Some(echo) = echo {
        echo.abort();
    }
    outcome?;
    Ok(())
}

/// Print each new loading message until processing ends
async fn echo_progress(mut rx: watch::Receiver<SessionStatus>, no_color: bool) {
    let mut last: Option<String> = None;
    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().clone();
        if status.stage != Stage::Processing {
            continue;
        }
        if let Some(message) = status.loading_message {
            if last.as_deref() != Some(message.as_str()) {
                if no_color {
                    println!("  > {}", message);
                } else {
                    println!("  {} {}", ">".green(), message.green().dimmed());
                }
                last = Some(message);
            }
        }
    }
}

fn print_report(session: &Session, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let report = match session.last_report() {
        Some(report) => report,
        None => return Ok(()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if args.no_color {
        println!("{}", report.to_parseable_string());
    } else {
        println!();
        println!("{}", report.to_terminal_string());
        println!();
    }
    Ok(())
}

fn print_error_screen(session: &Session, args: &Args) {
    let reason = session.last_error().unwrap_or("unknown error");
    if args.json {
        println!("{}", serde_json::json!({ "stage": Stage::Error, "error": reason }));
        return;
    }
    println!("{}", "⚠ 无法访问摄像头 (Camera access denied)".red().bold());
    println!("  {}", reason.red());
    println!("  Check the photo path and try again.");
}

fn print_header(no_color: bool) {
    if no_color {
        println!("========================================");
        println!("  Soul Scanner v{}", VERSION);
        println!("========================================");
    } else {
        println!("{}", "╔══════════════════════════════════════╗".green().bold());
        println!("{}", format!("║       Soul Scanner v{:<17}║", VERSION).green().bold());
        println!("{}", "╚══════════════════════════════════════╝".green().bold());
        println!("{}", "AI 灵魂扫描仪 · 检测你的人类成分".green());
    }
    println!();
}

fn print_prompt(stage: Stage, no_color: bool) {
    use std::io::Write;

    let label = match stage {
        Stage::Intro => "start scan",
        Stage::CapturingVideo => "capture",
        Stage::Result | Stage::Error => "again",
        Stage::Processing => "wait",
    };
    if no_color {
        print!("[{}] {} > ", stage, label);
    } else {
        print!("{} {} {} > ", stage.emoji(), format!("[{}]", stage).cyan(), label);
    }
    let _ = std::io::stdout().flush();
}

/// Run the analysis proxy
async fn run_serve(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProxyConfig {
        model: args.model.clone(),
        base_url: args.upstream_url.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
        ..ProxyConfig::new(args.provider, resolve_api_key(args))
    };
    let upstream = Upstream::from_config(&config);

    println!();
    println!("{}", "╔══════════════════════════════════════╗".green().bold());
    println!("{}", "║  Soul Scanner analysis proxy         ║".green().bold());
    println!("{}", format!("║  Version: {:<27}║", VERSION).green().bold());
    println!("{}", "╚══════════════════════════════════════╝".green().bold());
    println!("  provider: {}  upstream: {}", args.provider, if upstream.is_ready() { "ready" } else { "misconfigured" });
    println!();

    run_server(&args.addr, upstream).await
}

// =============================================================================
// TESTS
// =============================================================================
