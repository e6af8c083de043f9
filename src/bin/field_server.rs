//! Standalone HTTP entrypoint: load configuration and the PCA basis, open
//! the Postgres pool, and serve the two documented field-chunk routes. No
//! CLI surface beyond environment configuration — deployments that only
//! want the API run this instead of `field-sampling-engine serve`.

use std::sync::Arc;

use anyhow::Context;
use field_sampling_engine::config::EngineConfig;
use field_sampling_engine::coordinator::Engine;
use field_sampling_engine::pca::PcaBasis;
use field_sampling_engine::store::{PgVectorStore, VectorStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = EngineConfig::from_env();
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

    let engine = Engine::new(cfg, basis, store);
    field_sampling_engine::http::serve(engine).await
}
