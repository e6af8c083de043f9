use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use field_sampling_engine::config::EngineConfig;
use field_sampling_engine::coordinator::{ChunkRequest, Engine};
use field_sampling_engine::pca::PcaBasis;
use field_sampling_engine::store::{PgVectorStore, VectorStore};

#[derive(Debug, Parser)]
#[command(name = "field-sampling-engine")]
#[command(version)]
#[command(about = "Deterministic spatial sampling engine for artwork field exploration")]
struct Cli {
    /// Override the PCA basis artifact path.
    #[arg(long)]
    pca_basis: Option<PathBuf>,

    /// Override the Postgres connection string.
    #[arg(long)]
    database_url: Option<String>,

    /// Override the HTTP listen address (serve mode only).
    #[arg(long)]
    listen: Option<String>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API (default if no subcommand is given).
    Serve,
    /// Run a single field-chunk query against the configured store and print
    /// the JSON result. Useful for debugging a chunk without standing up
    /// the HTTP server.
    Chunk {
        #[arg(long)]
        focal_id: i32,
        #[arg(long, allow_hyphen_values = true)]
        x: i32,
        #[arg(long, allow_hyphen_values = true)]
        y: i32,
        #[arg(long)]
        count: Option<i64>,
        #[arg(long)]
        global_seed: Option<u32>,
        #[arg(long)]
        exclude: Option<String>,
    },
}

fn resolve_config(cli: &Cli) -> EngineConfig {
    let mut cfg = EngineConfig::from_env();
    if let Some(p) = cli.pca_basis.clone() {
        cfg.pca_basis_path = p;
    }
    if let Some(u) = cli.database_url.clone() {
        cfg.database_url = u;
    }
    if let Some(a) = cli.listen.clone() {
        cfg.listen_addr = a;
    }
    cfg
}

async fn build_engine(cfg: EngineConfig) -> Result<Engine> {
    let basis = PcaBasis::load(&cfg.pca_basis_path).with_context(|| {
        format!(
            "loading PCA basis artifact from {}",
            cfg.pca_basis_path.display()
        )
    })?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect(&cfg.database_url)
        .await
        .context("connecting to the vector store")?;
    let store: Arc<dyn VectorStore> = Arc::new(PgVectorStore::new(pool, cfg.artwork_table.clone()));

    Ok(Engine::new(cfg, basis, store))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let cfg = resolve_config(&cli);

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    rt.block_on(async move {
        match cli.cmd.unwrap_or(Command::Serve) {
            Command::Serve => {
                let engine = build_engine(cfg).await?;
                field_sampling_engine::http::serve(engine).await
            }
            Command::Chunk {
                focal_id,
                x,
                y,
                count,
                global_seed,
                exclude,
            } => {
                let default_count = cfg.default_count;
                let engine = build_engine(cfg).await?;
                let req = ChunkRequest::new(
                    focal_id,
                    x,
                    y,
                    global_seed,
                    count,
                    exclude.as_deref(),
                    default_count,
                )?;
                let resp = engine.single_chunk(&req).await?;
                println!("{}", serde_json::to_string_pretty(&resp)?);
                Ok(())
            }
        }
    })
}
