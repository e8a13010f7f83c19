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

//! The sample-max split policy: a global ceiling must be divided across
//! partitions up front because partitions are visited concurrently.

use scand_config::config::{N_PARTITIONS, SAMPLE_MARGIN};

/// `N_PARTITIONS / cluster_size`, the approximation of master count used
/// when a scan request omits an explicit partition list. `cluster_size ==
/// 0` is treated as `1`: a node always masters at least its own partitions.
pub fn estimate_partition_count(cluster_size: u64) -> u16 {
    let cluster_size = cluster_size.max(1);
    (N_PARTITIONS as u64 / cluster_size).max(1) as u16
}

/// `ceil(sample_max / n_pids) + SAMPLE_MARGIN`. The margin absorbs size
/// variance across partitions so a near-full scan still reaches the target.
pub fn max_per_partition(sample_max: u64, n_pids: u16) -> u64 {
    if n_pids == 0 {
        return sample_max + SAMPLE_MARGIN;
    }
    sample_max.div_ceil(n_pids as u64) + SAMPLE_MARGIN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_partition_count_treats_zero_cluster_size_as_one() {
        assert_eq!(
            estimate_partition_count(0),
            estimate_partition_count(1)
        );
    }

    #[test]
    fn max_per_partition_matches_worked_example() {
        // sample_max=10, 4 partitions requested: ceil(10/4)+4 = 7.
        assert_eq!(max_per_partition(10, 4), 7);
    }
}
