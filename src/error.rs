//! Run-level failure taxonomy.
//!
//! Per-extrinsic mismatches are plain data (`drift::Evaluation`); only the
//! conditions below end a run or get reported as a distinct warning.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeightCheckError {
    #[error("pallet {pallet}: no dispatch file configured")]
    MissingDispatchPath { pallet: String },

    #[error("pallet {pallet}: dispatch file {} not found", path.display())]
    MissingDispatchFile { pallet: String, path: PathBuf },

    #[error("unknown pallet {pallet:?} (configured: {configured})")]
    UnknownPallet { pallet: String, configured: String },

    #[error("pallet {pallet}: weights drifted after {attempts} attempts and auto-patch is disabled")]
    DriftExceeded { pallet: String, attempts: u32 },

    #[error("pallet {pallet}: weights still drift after patching {}", path.display())]
    UnresolvedAfterPatch { pallet: String, path: PathBuf },

    #[error("{}: no {axis} literal syntax matched for {extrinsic}; left unpatched", path.display())]
    PatchApplication {
        path: PathBuf,
        extrinsic: String,
        axis: &'static str,
    },

    #[error("git {step} failed on branch {branch} (last commit: {last_commit}): {detail}")]
    Publish {
        step: &'static str,
        branch: String,
        last_commit: String,
        detail: String,
    },
}
