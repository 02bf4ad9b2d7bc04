use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// JSON file holding the contract state. Kept in memory only if unset.
    pub snapshot_path: Option<PathBuf>,
    /// Most recent notifications retained for `/notifications` readers.
    pub notification_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}
