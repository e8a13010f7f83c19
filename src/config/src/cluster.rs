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

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

/// Monotonically-refreshed token identifying the current cluster membership
/// epoch. Bumped whenever a node join/leave is observed; a scan started with
/// `fail_on_cluster_change` compares its captured value against this on
/// every record visit.
static CLUSTER_KEY: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(1));

pub fn current_cluster_key() -> u64 {
    CLUSTER_KEY.load(Ordering::Relaxed)
}

/// Simulates a cluster membership change (node join/leave). Exposed for
/// tests and for a real node's cluster-watch task to call.
pub fn bump_cluster_key() -> u64 {
    CLUSTER_KEY.fetch_add(1, Ordering::Relaxed) + 1
}

/// Best-effort estimate of how many nodes currently own a master replica of
/// this namespace's partitions. Used only to size `max_per_partition` when a
/// scan request omits an explicit partition list.
///
/// The `N_PARTITIONS / cluster_size` estimate this feeds is undefined for
/// `cluster_size == 0`. A single-node deployment (the only topology this
/// crate models end-to-end) always has at least itself, so callers should
/// treat `0` as `1` rather than propagate a division by zero; see
/// `scand_scan::sampling::estimate_partition_count`.
static CLUSTER_SIZE: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(1));

pub fn cluster_size() -> u64 {
    CLUSTER_SIZE.load(Ordering::Relaxed)
}

pub fn set_cluster_size(n: u64) {
    CLUSTER_SIZE.store(n, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_increments_and_is_observable() {
        let before = current_cluster_key();
        let after = bump_cluster_key();
        assert_eq!(after, before + 1);
        assert_eq!(current_cluster_key(), after);
    }
}
