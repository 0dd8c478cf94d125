use std::path::PathBuf;

use serde::Deserialize;

/// Location of the per-user data tree
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory holding one sub-directory per user
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Shared scope consulted when a user has no value of their own
    #[serde(default = "default_guest_user")]
    pub guest_user: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            guest_user: default_guest_user(),
        }
    }
}

fn default_data_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_guest_user() -> String {
    "guest".to_owned()
}
