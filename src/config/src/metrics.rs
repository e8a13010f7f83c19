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

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts, Registry};

pub const NAMESPACE: &str = "scand";

/// `scan_{basic|aggr|udf_bg|ops_bg}_{complete|abort|error}` counts.
pub static SCAN_JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scan_jobs_total", "Scan jobs terminated, by flavor and outcome.")
            .namespace(NAMESPACE),
        &["flavor", "outcome"],
    )
    .expect("metric created")
});

/// Namespace-level sub-transaction filtered counter fed by background scans.
pub static SUB_WRITE_FILTERED_OUT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sub_write_filtered_out_total",
            "Sub-transactions skipped by predicate before submission.",
        )
        .namespace(NAMESPACE),
        &["namespace"],
    )
    .expect("metric created")
});

pub fn registry() -> Registry {
    let registry = Registry::new();
    registry
        .register(Box::new(SCAN_JOBS_TOTAL.clone()))
        .expect("register scan_jobs_total");
    registry
        .register(Box::new(SUB_WRITE_FILTERED_OUT.clone()))
        .expect("register sub_write_filtered_out_total");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        SCAN_JOBS_TOTAL.with_label_values(&["basic", "complete"]).inc();
        assert_eq!(
            SCAN_JOBS_TOTAL
                .with_label_values(&["basic", "complete"])
                .get(),
            1
        );
    }
}
