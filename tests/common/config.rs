//! Test configuration helpers

use std::path::Path;

use super::fixtures::BUCKET;

/// JSON configuration pointing every path into `root` and every URL at `site_uri`.
///
/// Retries are immediate and git checkpoints are off.
pub fn config_json(root: &Path, site_uri: &str, categories: &[&str], workers: usize) -> serde_json::Value {
    serde_json::json!({
        "base_url": site_uri,
        "categories": categories,
        "num_workers": workers,
        "request_delay": 0.0,
        "retry_attempts": 2,
        "retry_delay": 0.0,
        "queue_pop_timeout": 0.05,
        "commit_every_n_successes": 10,
        "upload_to_object_store": true,
        "object_store": {
            "bucket": BUCKET,
            "endpoint": site_uri,
        },
        "paths": {
            "metadata_dir": root.join("metadata"),
            "payload_dir": root.join("videos"),
            "progress_file": root.join("progress.json"),
            "log_dir": null,
        },
        "checkpoint": { "enabled": false },
    })
}

/// Write `config` to `<root>/config.json` and return its path
pub fn write_config(root: &Path, config: &serde_json::Value) -> std::path::PathBuf {
    let path = root.join("config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(config).unwrap()).unwrap();
    path
}
