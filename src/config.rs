//! Process-wide configuration, loaded once at startup: a serde-default
//! struct plus a best-effort loader that never panics on a missing `.env`
//! file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Pool sizes for single-chunk mode.
pub const SINGLE_TIGHT_LIMIT: usize = 200;
pub const SINGLE_DRIFT_LIMIT: usize = 400;
pub const SINGLE_RANDOM_LIMIT: usize = 800;

/// Multiplier/cap constants for multi-chunk pool sizing:
/// tight = `min(500, 125*N)` shared; drift = `min(400, driftCap)` per chunk;
/// random = `min(800, 300*N)` per chunk.
pub const MULTI_TIGHT_CAP: usize = 500;
pub const MULTI_TIGHT_PER_CHUNK: usize = 125;
pub const MULTI_DRIFT_LIMIT: usize = 400;
pub const MULTI_RANDOM_CAP: usize = 800;
pub const MULTI_RANDOM_PER_CHUNK: usize = 300;

/// Smoothstep edges for temperature.
pub const TEMPERATURE_EDGE_LOW: f64 = 1.5;
pub const TEMPERATURE_EDGE_HIGH: f64 = 12.0;

/// Count clamp range.
pub const COUNT_MIN: usize = 1;
pub const COUNT_MAX: usize = 50;

/// Multi-chunk request size bound.
pub const MAX_CHUNKS_PER_REQUEST: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the PCA basis artifact. Default matches the documented
    /// default: `pca_basis.json` in the working directory.
    pub pca_basis_path: PathBuf,

    /// Postgres connection string for the vector store. Left unset (empty)
    /// by default; absence is surfaced as `StoreFailure` on first use, not
    /// a startup panic.
    pub database_url: String,

    /// Name of the artwork table the vector-store queries run against.
    pub artwork_table: String,

    /// Max connections in the Postgres connection pool.
    pub db_max_connections: u32,

    /// Listen address for the thin HTTP binary (`src/bin/field_server.rs`).
    pub listen_addr: String,

    /// Default `count` when a request omits it.
    pub default_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pca_basis_path: PathBuf::from("pca_basis.json"),
            database_url: String::new(),
            artwork_table: "artworks".to_string(),
            db_max_connections: 10,
            listen_addr: "0.0.0.0:8787".to_string(),
            default_count: 20,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset. A `.env` file in the working directory
    /// is loaded best-effort first (missing file is not an error).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut cfg = EngineConfig::default();
        if let Ok(v) = std::env::var("PCA_BASIS_PATH") {
            cfg.pca_basis_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            cfg.database_url = v;
        }
        if let Ok(v) = std::env::var("ARTWORK_TABLE") {
            cfg.artwork_table = v;
        }
        if let Ok(v) = std::env::var("DB_MAX_CONNECTIONS") {
            if let Ok(n) = v.parse() {
                cfg.db_max_connections = n;
            }
        }
        if let Ok(v) = std::env::var("LISTEN_ADDR") {
            cfg.listen_addr = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_COUNT") {
            if let Ok(n) = v.parse() {
                cfg.default_count = n;
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pca_basis_path, PathBuf::from("pca_basis.json"));
        assert_eq!(cfg.default_count, 20);
        assert!(cfg.db_max_connections > 0);
    }
}
