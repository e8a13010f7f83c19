// Copyright 2026 The scand Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dotenv_config::EnvConfig;
use dotenvy::dotenv_override;
use once_cell::sync::Lazy;

/// Fixed partition count for the ring this node serves. A real cluster
/// negotiates this at bootstrap; here it is a deployment-time constant like
/// the source system's `N_PARTITIONS`.
pub const N_PARTITIONS: u16 = 4096;

pub const SIZE_IN_MB: usize = 1024 * 1024;
pub const INIT_BUF_SIZE: usize = 2 * SIZE_IN_MB;
pub const CHUNK_LIMIT: usize = SIZE_IN_MB;
pub const LOW_PRIORITY_RPS: u32 = 5000;
pub const MAX_ACTIVE_TRANSACTIONS: usize = 200;
pub const SAMPLE_MARGIN: u64 = 4;
pub const RECORD_MAX_BINS: usize = 64;
/// Longest bin name a job will accept in its `bin_name_filter`; longer names
/// fail job construction with `BIN_NAME` rather than being truncated.
pub const BIN_NAME_MAX_LEN: usize = 15;

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from(Arc::new(init())));

pub fn get_config() -> Arc<Config> {
    CONFIG.load().clone()
}

pub fn refresh_config() -> Result<(), anyhow::Error> {
    CONFIG.store(Arc::new(init()));
    Ok(())
}

fn init() -> Config {
    // Load a local `.env`, if any, before `EnvConfig` reads the process
    // environment; a missing file is not an error.
    dotenv_override().ok();
    Config::init().expect("failed to load scand configuration from environment")
}

#[derive(EnvConfig)]
pub struct Config {
    pub log: Log,
    pub scan: Scan,
    pub namespace: Namespace,
}

#[derive(EnvConfig)]
pub struct Log {
    #[env_config(name = "SCAND_LOG_LEVEL", default = "info")]
    pub level: String,
    #[env_config(name = "SCAND_LOG_LOCAL_TIME_FORMAT", default = "")]
    pub local_time_format: String,
    #[env_config(name = "SCAND_LOG_DIR", default = "")]
    pub dir: String,
    #[env_config(name = "SCAND_LOG_JSON", default = false)]
    pub json: bool,
}

#[derive(EnvConfig)]
pub struct Scan {
    /// Socket write timeout used when a request does not specify one, in ms.
    /// `0` means infinite.
    #[env_config(name = "SCAND_SCAN_DEFAULT_SOCKET_TIMEOUT_MS", default = 0)]
    pub default_socket_timeout_ms: u32,
    #[env_config(name = "SCAND_SCAN_BACKGROUND_POLL_MS", default = 1)]
    pub background_poll_ms: u64,
    /// Global kill switch for UDF execution; aggregation and UDF-background
    /// scans are rejected with `FORBIDDEN` while this is `false`.
    #[env_config(name = "SCAND_SCAN_UDF_ENABLED", default = true)]
    pub udf_enabled: bool,
    /// How many terminated jobs' stats the manager keeps around for
    /// `get_job_info`/`get_all_jobs` after `finish()` returns; oldest
    /// entries are evicted first once this cap is reached.
    #[env_config(name = "SCAND_SCAN_MAX_FINISHED_JOBS", default = 1000)]
    pub max_finished_jobs: usize,
}

#[derive(EnvConfig)]
pub struct Namespace {
    /// Ceiling applied to every background (UDF/ops) scan's RPS; `rps=0` on
    /// the request is rewritten to this value.
    #[env_config(name = "SCAND_NAMESPACE_BACKGROUND_SCAN_MAX_RPS", default = 20000)]
    pub background_scan_max_rps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let cfg = init();
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.namespace.background_scan_max_rps, 20000);
    }

    #[test]
    fn get_config_returns_shared_instance() {
        let a = get_config();
        let b = get_config();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
