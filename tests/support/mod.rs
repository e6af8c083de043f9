//! Shared fixtures for the integration suites: a synthetic corpus and an
//! in-memory engine wired against it.

use std::path::Path;
use std::sync::Arc;

use field_sampling_engine::coordinator::Engine;
use field_sampling_engine::config::EngineConfig;
use field_sampling_engine::pca::PcaBasis;
use field_sampling_engine::store::{ArtworkRecord, Display, MemoryStore, VectorStore};

pub const DIM: usize = 16;

/// Builds a deterministic, non-trivial embedding for record `i`: mostly
/// clustered with a slow drift so nearest-neighbor and random pools differ.
fn embedding_for(i: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = 1.0;
    v[(i % (DIM - 1)) + 1] = 0.15 + (i as f32 % 7.0) * 0.02;
    v
}

pub fn synthetic_records(n: usize) -> Vec<ArtworkRecord> {
    (0..n as i32)
        .map(|i| ArtworkRecord {
            id: i + 1,
            embedding: Some(embedding_for(i as usize)),
            displayable: (i + 1) % 13 != 0, // sprinkle in a few ineligible rows, never id 1
            display: Display {
                title: Some(format!("Artwork {}", i + 1)),
                artist: Some(format!("Artist {}", (i % 37) + 1)),
                object_id: Some(format!("obj-{}", i + 1)),
                image_url_local: if i % 3 == 0 {
                    Some(format!("https://cdn.example/s3/{}.jpg", i + 1))
                } else {
                    None
                },
                image_url_small: Some(format!("https://met.example/small/{}.jpg", i + 1)),
                image_url_original: Some(format!("https://met.example/orig/{}.jpg", i + 1)),
            },
        })
        .collect()
}

pub fn write_test_basis(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("pca_basis.json");
    let mut rows = Vec::new();
    for k in 0..4 {
        let mut row = vec![0.0f32; DIM];
        row[k] = 1.0;
        rows.push(row);
    }
    let json = serde_json::json!({ "basis": rows });
    std::fs::write(&path, json.to_string()).unwrap();
    path
}

pub fn build_engine(n: usize) -> Engine {
    let dir = tempfile::tempdir().unwrap();
    let basis_path = write_test_basis(dir.path());
    let basis = PcaBasis::load(&basis_path).unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new(synthetic_records(n)));
    Engine::new(EngineConfig::default(), basis, store)
}
