//! Block State Storage - JSON file in the local data dir
//!
//! Writes go to a sibling temp file and are renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use super::BlockedSet;
use crate::constants::{APP_DIR_NAME, BLOCKLIST_FILE_NAME};
use crate::logic::telemetry::Pid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("block state I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("block state format error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On-disk form of the blocked set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStateFile {
    pub blocked_pids: Vec<Pid>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub start_times: BTreeMap<Pid, u64>,
}

/// Get default block state path
pub fn default_blocklist_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(BLOCKLIST_FILE_NAME)
}

/// Save the blocked set, replacing the file in one rename
pub fn save_block_state(set: &BlockedSet, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(&set.to_file())?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load the blocked set. A missing file is an empty set.
pub fn load_block_state(path: &Path) -> Result<BlockedSet, StoreError> {
    if !path.exists() {
        return Ok(BlockedSet::new());
    }

    let data = fs::read(path)?;
    let file: BlockStateFile = serde_json::from_slice(&data)?;
    Ok(BlockedSet::from_file(file))
}
