use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use supporthive_core::{Services, SupportConfig};
use supporthive_schema::ChatRequest;
use supporthive_server::state::AppState;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "supporthive=info,tower_http=debug";

#[derive(Parser)]
#[command(name = "supporthive", version, about = "Retrieval-augmented customer support agent")]
struct Cli {
    #[arg(long, help = "YAML configuration file (environment variables override it)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        default_value = "~/.supporthive",
        help = "Data directory for the local index and logs"
    )]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP API server")]
    Serve,
    #[command(about = "Load a file or a directory of documents into the knowledge base")]
    Ingest {
        #[arg(help = "File or directory to ingest")]
        path: PathBuf,
        #[arg(long, help = "Category assigned to every ingested document")]
        category: Option<String>,
        #[arg(long = "tag", help = "Tag assigned to every ingested document (repeatable)")]
        tags: Vec<String>,
    },
    #[command(about = "Answer one question from the command line")]
    Ask {
        #[arg(help = "Question to answer")]
        query: String,
        #[arg(long, help = "Session id to continue")]
        session: Option<String>,
    },
    #[command(about = "Print the effective configuration without secrets")]
    Config,
}

fn expand_home(path: PathBuf) -> PathBuf {
    if !path.starts_with("~") {
        return path;
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(path.strip_prefix("~").unwrap_or(&path)),
        None => path,
    }
}

/// Keep the returned guard alive for as long as file logging should flush.
fn init_logging(data_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "supporthive.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = expand_home(cli.data_dir);
    let _guard = init_logging(&data_dir)?;

    let config = SupportConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config.public_view())?);
        }
        Commands::Serve => {
            let addr = config.server.bind_addr();
            let services = Services::build(config, &data_dir)?;
            supporthive_server::serve(AppState::from(services), &addr).await?;
        }
        Commands::Ingest {
            path,
            category,
            tags,
        } => {
            let services = Services::build(config, &data_dir)?;
            let path = expand_home(path);
            if path.is_dir() {
                let batch = services.loader.load_directory(&path, category, tags).await;
                for item in &batch.results {
                    let mark = if item.result.success { "ok" } else { "FAILED" };
                    println!("[{mark}] {}: {}", item.name, item.result.message);
                }
                println!("{}", batch.message);
                if !batch.success {
                    anyhow::bail!("ingestion of {} failed", path.display());
                }
            } else {
                let result = services.loader.load_file(&path, category, tags).await;
                if !result.success {
                    anyhow::bail!("{}: {}", path.display(), result.message);
                }
                println!(
                    "{} ({})",
                    result.message,
                    result.document_id.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Ask { query, session } => {
            let services = Services::build(config, &data_dir)?;
            let mut request = ChatRequest::new(query);
            if let Some(session) = session {
                request = request.with_session(session);
            }
            let response = services.agent.generate_response(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
