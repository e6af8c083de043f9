//! PCA basis store — the process-wide immutable table of principal-component
//! unit vectors the field transform biases queries toward. Loaded once at
//! startup from an external artifact; never mutated again.
//!
//! A small serde struct for the on-disk shape, a loader that fails loudly
//! and distinguishably, and a read-only accessor for the rest of the engine.

use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::numeric::vec_normalize;

/// On-disk shape: `{"basis": [[...768 floats...], ...]}`.
#[derive(Debug, Deserialize)]
struct PcaBasisFile {
    basis: Vec<Vec<f32>>,
}

/// Minimum number of principal components required for a usable basis
/// (`bias()` needs the first two).
const MIN_COMPONENTS: usize = 2;

/// Immutable, process-wide ordered list of L2-normalized principal-component
/// unit vectors. Construct once via [`PcaBasis::load`] and share behind an
/// `Arc` — there is no interior mutability here on purpose. Accessing a
/// basis before initialization is a programming error distinct from the
/// runtime `PcaUnavailable` surfaced when the artifact itself fails to load.
#[derive(Debug, Clone)]
pub struct PcaBasis {
    components: Vec<Vec<f32>>,
}

impl PcaBasis {
    /// Loads and validates the basis artifact at `path`.
    ///
    /// Failure conditions: artifact missing, malformed, or fewer than
    /// [`MIN_COMPONENTS`] rows -> `EngineError::PcaUnavailable`.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::PcaUnavailable(format!(
                "could not read PCA basis artifact at {}: {e}",
                path.display()
            ))
        })?;

        let parsed: PcaBasisFile = serde_json::from_str(&text).map_err(|e| {
            EngineError::PcaUnavailable(format!("malformed PCA basis artifact: {e}"))
        })?;

        if parsed.basis.len() < MIN_COMPONENTS {
            return Err(EngineError::PcaUnavailable(format!(
                "PCA basis has rank {}, need at least {MIN_COMPONENTS}",
                parsed.basis.len()
            )));
        }

        // Rows need not be pre-normalized on disk; normalize unconditionally,
        // even if they already look unit-length, to avoid silent divergence
        // if an artifact is ever produced with unnormalized rows.
        let components = parsed.basis.iter().map(|row| vec_normalize(row)).collect();

        Ok(Self { components })
    }

    /// Read-only accessor for the ordered component list.
    pub fn components(&self) -> &[Vec<f32>] {
        &self.components
    }

    /// The first two unit vectors `bias()` composes its direction from.
    /// Panics if called on a basis with rank < 2 — cannot happen for a
    /// `PcaBasis` obtained via [`PcaBasis::load`], since that constructor
    /// enforces [`MIN_COMPONENTS`].
    pub fn first_two(&self) -> (&[f32], &[f32]) {
        (&self.components[0], &self.components[1])
    }
}
