//! Command line front end for the codegrade engine.
//!
//! Runs ad-hoc code, grades a submission against a lesson file, warms the
//! environment pool or just screens code with the sanitizer. Results are
//! printed as pretty JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codegrade_core::{
    config::ConfigLoader, ContainerPool, ContainerRuntime, DockerRuntime, Engine, EngineConfig, InMemoryLessons,
    Lesson, SanitizerRegistry,
};
use log::LevelFilter;
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "codegrade - run and grade untrusted code in containers")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, help = "Configuration file (defaults to <config dir>/codegrade/config.yaml when present)")]
    config: Option<PathBuf>,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a source file once and print its output
    Run {
        #[clap(long, short)]
        language: String,

        #[clap(long, short)]
        file: PathBuf,
    },
    /// Grade a source file against a lesson definition (YAML)
    Test {
        #[clap(long)]
        lesson: PathBuf,

        #[clap(long, short)]
        file: PathBuf,

        #[clap(long, help = "User id to report a successful completion for")]
        user: Option<uuid::Uuid>,
    },
    /// Manage the warm environment pool
    Pool {
        #[clap(subcommand)]
        action: PoolCommands,
    },
    /// Screen a source file without running it
    Sanitize {
        #[clap(long, short)]
        language: String,

        #[clap(long, short)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum PoolCommands {
    /// Create warm environments for one language/framework pair and keep
    /// them running until interrupted
    Warm {
        #[clap(long, short)]
        language: String,

        #[clap(long)]
        framework: String,

        #[clap(long, default_value_t = 2)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run { language, file } => run_code(config, &language, &file).await,
        Commands::Test { lesson, file, user } => run_tests(config, &lesson, &file, user).await,
        Commands::Pool {
            action: PoolCommands::Warm {
                language,
                framework,
                count,
            },
        } => warm_pool(config, &language, &framework, count).await,
        Commands::Sanitize { language, file } => sanitize(&language, &file).await,
    }
}

async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => dirs::config_dir()
            .map(|dir| dir.join("codegrade").join("config.yaml"))
            .filter(|candidate| candidate.is_file()),
    };

    let config = match path {
        Some(path) => {
            log::info!("Loading configuration from file: {}", path.display());
            ConfigLoader::from_file(&path).await?
        }
        None => {
            log::info!("No configuration file found, using defaults");
            ConfigLoader::from_str("")?
        }
    };
    Ok(config)
}

async fn read_source(file: &Path) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

fn docker_runtime(config: &EngineConfig) -> Result<Arc<dyn ContainerRuntime>> {
    let runtime = DockerRuntime::new(&config.docker).context("Failed to connect to Docker")?;
    Ok(Arc::new(runtime))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_code(config: EngineConfig, language: &str, file: &Path) -> Result<()> {
    let code = read_source(file).await?;
    let engine = Engine::new(&config, docker_runtime(&config)?, Arc::new(InMemoryLessons::default()));

    let result = engine.execution.execute_code(language, &code).await;
    engine.shutdown().await;
    print_json(&result?)
}

async fn run_tests(config: EngineConfig, lesson_file: &Path, file: &Path, user: Option<uuid::Uuid>) -> Result<()> {
    let lesson_yaml = read_source(lesson_file).await?;
    let lesson: Lesson = serde_yaml::from_str(&lesson_yaml)
        .with_context(|| format!("Invalid lesson definition in {}", lesson_file.display()))?;
    let code = read_source(file).await?;
    let lesson_id = lesson.id.clone();

    let engine = Engine::new(&config, docker_runtime(&config)?, Arc::new(InMemoryLessons::new([lesson])));
    engine.warm_up().await;

    let result = engine.tests.run_tests(&lesson_id, &code, user).await;
    engine.shutdown().await;
    print_json(&result?)
}

async fn warm_pool(mut config: EngineConfig, language: &str, framework: &str, count: usize) -> Result<()> {
    config.pool.enabled = true;
    let engine = Engine::new(&config, docker_runtime(&config)?, Arc::new(InMemoryLessons::default()));
    let pool = engine
        .pool()
        .cloned()
        .context("Environment pool is not available")?;

    let held = hold_pool(&pool, language, framework, count, shutdown_signal()).await;
    engine.shutdown().await;
    held.map(|_| ())
}

/// Warms the key, reports it, then leaves the environments to pool
/// maintenance until `stop` resolves. Returns how many were created.
async fn hold_pool<F>(pool: &ContainerPool, language: &str, framework: &str, count: usize, stop: F) -> Result<usize>
where
    F: Future<Output = ()>,
{
    let created = pool.initialize(language, framework, count).await?;
    let idle = pool.idle_count(language, framework).await;
    print_json(&json!({
        "language": language,
        "framework": framework,
        "created": created,
        "idle": idle,
    }))?;

    log::info!(
        "Holding {} warm environments for {}/{}; press Ctrl+C to release them",
        idle,
        language,
        framework
    );
    stop.await;
    Ok(created)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, releasing warm environments...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, releasing warm environments...");
        },
    }
}

async fn sanitize(language: &str, file: &Path) -> Result<()> {
    let code = read_source(file).await?;
    let registry = SanitizerRegistry::default();

    match registry.sanitize(&code, language) {
        Ok(_) => print_json(&json!({ "accepted": true })),
        Err(e) => {
            print_json(&json!({ "accepted": false, "reason": e.to_string() }))?;
            Err(e.into())
        }
    }
}
