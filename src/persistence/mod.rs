//! Snapshot and load orchestration across generation directories.
//!
//! A persisted generation is a directory containing seven independently
//! framed files (`manifest.bin`, `hnsw.bin`, `lsh.bin`, `bm25.bin`,
//! `pq.bin`, `embeddings.bin`, `metadata.bin`). A generation is written to a
//! fresh `gen-<id>.tmp` directory and only renamed into place once every
//! file has landed, so a reader never observes a half-written generation;
//! the renamed directory's id is then recorded in a `CURRENT` pointer file.
//! A directory whose rename never completed, or whose `CURRENT` pointer
//! names a missing directory, is treated as if no generation existed.

mod error;
mod format;

pub use error::{PersistenceError, PersistenceResult};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bm25::Bm25Index;
use crate::hnsw::HnswSnapshot;
use crate::lsh::LshIndex;
use crate::metadata::MetadataStore;
use crate::pq::ProductQuantizer;

const CURRENT_FILE: &str = "CURRENT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub generation: u64,
    pub dimension: usize,
    pub hnsw_m: usize,
    pub pq_num_centroids: usize,
    pub lsh_num_bands: usize,
    pub lsh_rows_per_band: usize,
    pub document_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsSnapshot {
    pub dimension: usize,
    pub id_map: Vec<String>,
    pub data: Vec<f32>,
}

/// Every index structure the engine needs to fully reconstruct itself,
/// bundled for a single atomic save/load.
pub struct EngineSnapshot {
    pub manifest: Manifest,
    pub hnsw: HnswSnapshot,
    pub lsh: LshIndex,
    pub bm25: Bm25Index,
    pub pq: ProductQuantizer,
    pub metadata: MetadataStore,
    pub embeddings: EmbeddingsSnapshot,
}

fn generation_dir(base_dir: &Path, generation: u64) -> PathBuf {
    base_dir.join(format!("gen-{generation:020}"))
}

/// Write `snapshot` to a new generation directory and advance `CURRENT` to
/// point at it. Older generations are left on disk; callers wanting
/// retention limits prune them separately.
pub fn save_generation(base_dir: &Path, snapshot: &EngineSnapshot) -> PersistenceResult<()> {
    fs::create_dir_all(base_dir)?;
    let final_dir = generation_dir(base_dir, snapshot.manifest.generation);
    let tmp_dir = base_dir.join(format!("gen-{:020}.tmp", snapshot.manifest.generation));
    if tmp_dir.exists() {
        fs::remove_dir_all(&tmp_dir)?;
    }
    fs::create_dir_all(&tmp_dir)?;

    write_file(&tmp_dir, "manifest.bin", &snapshot.manifest)?;
    write_file(&tmp_dir, "hnsw.bin", &snapshot.hnsw)?;
    write_file(&tmp_dir, "lsh.bin", &snapshot.lsh)?;
    write_file(&tmp_dir, "bm25.bin", &snapshot.bm25)?;
    write_file(&tmp_dir, "pq.bin", &snapshot.pq)?;
    write_file(&tmp_dir, "metadata.bin", &snapshot.metadata)?;
    write_file(&tmp_dir, "embeddings.bin", &snapshot.embeddings)?;

    if final_dir.exists() {
        fs::remove_dir_all(&final_dir)?;
    }
    fs::rename(&tmp_dir, &final_dir)?;

    let current_tmp = base_dir.join("CURRENT.tmp");
    fs::write(&current_tmp, final_dir.file_name().unwrap().to_string_lossy().as_bytes())?;
    fs::rename(&current_tmp, base_dir.join(CURRENT_FILE))?;
    Ok(())
}

/// Load the generation `CURRENT` points at. Returns
/// [`PersistenceError::NoGeneration`] if no generation has ever been saved,
/// or if `CURRENT` names a directory that no longer exists.
pub fn load_latest(base_dir: &Path) -> PersistenceResult<EngineSnapshot> {
    let pointer_path = base_dir.join(CURRENT_FILE);
    let pointer = fs::read_to_string(&pointer_path).map_err(|_| PersistenceError::NoGeneration)?;
    let dir = base_dir.join(pointer.trim());
    if !dir.is_dir() {
        return Err(PersistenceError::NoGeneration);
    }

    let manifest: Manifest = read_file(&dir, "manifest.bin")?;
    let hnsw: HnswSnapshot = read_file(&dir, "hnsw.bin")?;
    let lsh: LshIndex = read_file(&dir, "lsh.bin")?;
    let bm25: Bm25Index = read_file(&dir, "bm25.bin")?;
    let pq: ProductQuantizer = read_file(&dir, "pq.bin")?;
    let metadata: MetadataStore = read_file(&dir, "metadata.bin")?;
    let embeddings: EmbeddingsSnapshot = read_file(&dir, "embeddings.bin")?;

    Ok(EngineSnapshot { manifest, hnsw, lsh, bm25, pq, metadata, embeddings })
}

fn write_file<T: Serialize>(dir: &Path, name: &str, value: &T) -> PersistenceResult<()> {
    let mut file = fs::File::create(dir.join(name))?;
    format::write_section(&mut file, name, value)
}

fn read_file<T: serde::de::DeserializeOwned>(dir: &Path, name: &str) -> PersistenceResult<T> {
    let mut file = fs::File::open(dir.join(name))?;
    format::read_section(&mut file, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(generation: u64) -> EngineSnapshot {
        EngineSnapshot {
            manifest: Manifest {
                generation,
                dimension: 8,
                hnsw_m: 16,
                pq_num_centroids: 4,
                lsh_num_bands: 4,
                lsh_rows_per_band: 2,
                document_count: 1,
            },
            hnsw: crate::hnsw::HnswIndex::new(8, 16, 64, 1).snapshot(),
            lsh: crate::lsh::LshIndex::new(4, 2, 1),
            bm25: crate::bm25::Bm25Index::new(1.5, 0.75),
            pq: crate::pq::ProductQuantizer::new(8, 2, 4).unwrap(),
            metadata: crate::metadata::MetadataStore::new(),
            embeddings: EmbeddingsSnapshot { dimension: 8, id_map: vec![], data: vec![] },
        }
    }

    #[test]
    fn save_then_load_round_trips_the_manifest() {
        let dir = std::env::temp_dir().join(format!("rank-hybrid-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let snapshot = sample_snapshot(1);
        save_generation(&dir, &snapshot).unwrap();
        let loaded = load_latest(&dir).unwrap();
        assert_eq!(loaded.manifest.generation, 1);
        assert_eq!(loaded.manifest.dimension, 8);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn loading_with_no_current_pointer_reports_no_generation() {
        let dir = std::env::temp_dir().join(format!("rank-hybrid-test-empty-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let result = load_latest(&dir);
        assert!(matches!(result, Err(PersistenceError::NoGeneration)));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn a_second_save_advances_current_to_the_new_generation() {
        let dir = std::env::temp_dir().join(format!("rank-hybrid-test-advance-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        save_generation(&dir, &sample_snapshot(1)).unwrap();
        save_generation(&dir, &sample_snapshot(2)).unwrap();
        let loaded = load_latest(&dir).unwrap();
        assert_eq!(loaded.manifest.generation, 2);
        fs::remove_dir_all(&dir).ok();
    }
}
