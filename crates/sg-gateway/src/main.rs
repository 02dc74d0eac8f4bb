//! speech-gateway: Speech Gateway Main Binary
//!
//! Usage:
//!   speech-gateway             - Serve the speech tools over MCP (stdio)
//!   speech-gateway --info      - Print the environment report and exit
//!   speech-gateway --help      - Show help

mod report;

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use sg_core::{Config, SpeechContext, ToolManager};
use sg_engines::EngineDiscovery;
use sg_mcp::SpeechServer;
use sg_tools::register_speech_tools;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// MCP server on stdio
    Serve,
    /// Print the environment report and exit
    Info,
    /// Show help
    Help,
    /// Show version
    Version,
}

/// Flags that adjust the selected mode
#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    offline: bool,
    online: bool,
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (mode, options) = parse_args(std::env::args().skip(1));

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("speech-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // stdout carries the MCP stream, so logs go to stderr
    let level = if options.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let mut config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    config.routing.offline_only |= options.offline;
    config.routing.online_only |= options.online;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting speech-gateway...");

    let source = EngineDiscovery::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to set up engines: {}", e))?;
    let context = SpeechContext::initialize(&config, Arc::new(source))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize speech context: {}", e))?;

    let engine_report = context
        .engine_report()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to build engine report: {}", e))?;

    if mode == RunMode::Info {
        print!("{}", report::render(&engine_report, std::io::stdout().is_terminal()));
        context.shutdown().await;
        return Ok(());
    }
    if options.debug {
        eprint!("{}", report::render(&engine_report, std::io::stderr().is_terminal()));
    }

    run_server(config, context).await
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> (RunMode, CliOptions)
where
    I: IntoIterator<Item = String>,
{
    let mut mode = RunMode::Serve;
    let mut options = CliOptions::default();

    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return (RunMode::Help, options),
            "--version" | "-V" => return (RunMode::Version, options),
            "--info" | "-i" => mode = RunMode::Info,
            "--debug" | "-d" => options.debug = true,
            "--offline" => options.offline = true,
            "--online" => options.online = true,
            other => eprintln!("Ignoring unknown argument: {}", other),
        }
    }

    (mode, options)
}

/// Print help message
fn print_help() {
    println!("speech-gateway - text-to-speech and speech-to-text over MCP");
    println!();
    println!("Usage:");
    println!("  speech-gateway             Serve the speech tools over MCP (stdio)");
    println!("  speech-gateway --info      Print the environment report and exit");
    println!("  speech-gateway --debug     Verbose logging; prints the report to stderr");
    println!("  speech-gateway --offline   Only use engines that run locally");
    println!("  speech-gateway --online    Only use cloud engines");
    println!("  speech-gateway --help      Show this help message");
    println!("  speech-gateway --version   Show version");
    println!();
    println!("Configuration: speech-gateway.toml in the working directory, overridden by:");
    println!("  SPEECH_DEFAULT_LANGUAGE    Language used for 'auto' (default: en)");
    println!("  SPEECH_DEFAULT_ENGINE      Engine tried first when available");
    println!("  SPEECH_OFFLINE_ONLY        true/false");
    println!("  SPEECH_ONLINE_ONLY         true/false");
    println!("  SPEECH_ATTEMPT_TIMEOUT_MS  Per-engine attempt timeout (default: 30000)");
    println!("  SPEECH_JOB_TIMEOUT_MS      Whole-job deadline (optional)");
    println!("  SPEECH_MAX_CONCURRENCY     Batch worker limit (default: 4)");
    println!("  SPEECH_CACHE_TTL_SECS      Result cache lifetime (default: 600)");
    println!("  SPEECH_OUTPUT_DIR          Where generated audio is written");
    println!("  ESPEAK_BINARY              espeak executable");
    println!("  OPENAI_API_KEY             Enables the openai engine");
    println!("  AZURE_SPEECH_KEY           Enables the azure engine (with AZURE_SPEECH_REGION)");
    println!("  AZURE_SPEECH_REGION        Azure region, e.g. eastasia");
}

/// Serve the speech tools until the client disconnects or Ctrl+C
async fn run_server(config: Config, context: Arc<SpeechContext>) -> anyhow::Result<()> {
    let mut tool_manager = ToolManager::new();
    register_speech_tools(&mut tool_manager, context.clone(), config.output.directory.clone());
    tracing::info!(
        "Registered {} tools: {:?}",
        tool_manager.len(),
        tool_manager.tool_names()
    );

    // Expired cache entries are dropped in the background
    let purge_every = config.cache.ttl().max(Duration::from_secs(1));
    let purger = {
        let context = context.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(purge_every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = context.purge_cache();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired cache entries");
                }
            }
        })
    };

    let server = SpeechServer::new(Arc::new(tool_manager));
    let outcome = tokio::select! {
        result = server.serve_stdio() => result.map_err(|e| anyhow::anyhow!("MCP server error: {}", e)),
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
            signal.map_err(anyhow::Error::from)
        }
    };

    purger.abort();
    context.shutdown().await;
    tracing::info!("speech-gateway stopped");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> (RunMode, CliOptions) {
        parse_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_default_is_serve() {
        assert_eq!(parse(&[]), (RunMode::Serve, CliOptions::default()));
    }

    #[test]
    fn test_flags() {
        let (mode, options) = parse(&["--offline", "-d"]);
        assert_eq!(mode, RunMode::Serve);
        assert!(options.offline && options.debug && !options.online);

        let (mode, options) = parse(&["-i", "--online"]);
        assert_eq!(mode, RunMode::Info);
        assert!(options.online);
    }

    #[test]
    fn test_help_and_version_win() {
        assert_eq!(parse(&["--info", "--help"]).0, RunMode::Help);
        assert_eq!(parse(&["-V"]).0, RunMode::Version);
    }
}
