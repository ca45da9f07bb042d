//! friday-rs: voice assistant relay server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use friday_rs::api::{self, ApiState};
use friday_rs::config::Config;
use friday_rs::emotion::VoiceTable;
use friday_rs::gemini::GeminiBackend;
use friday_rs::history::ConversationLog;
use friday_rs::pipeline::Pipeline;
use friday_rs::session::{SessionFactory, SessionRegistry};
use friday_rs::speech::AzureSpeech;

#[derive(Parser, Debug)]
#[command(name = "friday-rs", about = "Voice assistant relay server")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/WebSocket server (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the conversation report for a day
    Report {
        /// 'today', 'list', or YYYY-MM-DD
        #[arg(default_value = "today")]
        date: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(args.config.as_deref());

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, port).await,
        Command::Report { date } => {
            report(&config, &date);
            Ok(())
        }
    }
}

async fn serve(mut config: Config, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        config.server.port = port;
    }

    info!("{}", "=".repeat(50));
    info!("F.R.I.D.A.Y backend starting...");
    info!("{}", "=".repeat(50));

    if !config.gemini.is_configured() {
        warn!("No Gemini API key found! Set GEMINI_API_KEY or gemini.api_key in config.yaml");
    }
    if config.tts.api_key.trim().is_empty() {
        warn!("No speech API key found; replies will be text only (set AZURE_SPEECH_KEY)");
    }

    let backend = Arc::new(GeminiBackend::new(&config.gemini)?);
    let factory = SessionFactory::from_config(backend, &config);
    if let Some(log) = factory.log() {
        info!("Conversation log: {}", log.dir().display());
    }
    let sessions = SessionRegistry::new(factory).with_limits(
        Duration::from_secs(config.session.idle_ttl_secs),
        config.session.max_named_sessions,
    );

    let voices = VoiceTable::from_config(&config.tts);
    info!("Default voice: {}", voices.default_voice());

    let pipeline = Pipeline::new(
        Arc::new(AzureSpeech::new(&config.tts)?),
        voices,
        Duration::from_secs(config.tts.timeout_secs),
    );

    let state = ApiState {
        pipeline: Arc::new(pipeline),
        sessions: Arc::new(sessions),
        gemini_configured: config.gemini.is_configured(),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    api::serve(state, &addr).await?;
    Ok(())
}

fn report(config: &Config, date: &str) {
    let log = ConversationLog::new(config.history.resolved_dir());
    if date == "list" {
        let dates = log.list_available_dates();
        if dates.is_empty() {
            println!("No conversation logs in {}", log.dir().display());
        }
        for date in dates {
            println!("{date}");
        }
    } else {
        println!("{}", log.generate_report(date));
    }
}
