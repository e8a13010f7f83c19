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

//! The basic scan job: per-partition iteration that emits record responses,
//! optionally filtered and sampled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use scand_config::config::CHUNK_LIMIT;
use scand_storage::{Digest, MatchResult, Namespace, PredicateExpr};

use crate::conn::ConnJobState;
use crate::core::JobCore;
use crate::error::AbandonReason;
use crate::throttle::throttle_sleep;
use crate::wire::{ResponseBuffer, PARTITION_STATUS_OK, PARTITION_STATUS_UNAVAILABLE};

pub struct BasicJobState {
    pub core: JobCore,
    pub conn: ConnJobState,
    pub cluster_key_at_start: u64,
    pub fail_on_cluster_change: bool,
    pub no_bin_data: bool,
    pub sample_pct: u8,
    pub sample_max: u64,
    pub sample_count: AtomicU64,
    pub max_per_partition: u64,
    pub predicate: Option<Arc<dyn PredicateExpr>>,
    pub bin_name_filter: Option<Vec<String>>,
}

impl BasicJobState {
    fn sample_max_mode(&self) -> bool {
        self.max_per_partition > 0
    }

    fn sample_pct_mode(&self) -> bool {
        !self.sample_max_mode() && self.sample_pct < 100
    }
}

/// The job only emits partition-done markers when the client supplied an
/// explicit partition list.
fn wants_partition_done(job: &BasicJobState) -> bool {
    job.core.partitions.is_some()
}

/// Runs one partition's share of a basic scan. `now_ms` is threaded in
/// rather than read from a clock so tests can exercise doomed-record edge
/// cases deterministically.
pub fn slice_basic(job: &BasicJobState, ns: &dyn Namespace, partition_id: u16, now_ms: i64) {
    let mut buf = ResponseBuffer::new();

    let Some(reservation) = ns.reservation(partition_id) else {
        if wants_partition_done(job) {
            buf.push_partition_done(partition_id, PARTITION_STATUS_UNAVAILABLE);
            let _ = job.conn.send_chunk(buf.finish());
        }
        return;
    };
    let Some(tree) = reservation.tree() else {
        if wants_partition_done(job) {
            buf.push_partition_done(partition_id, PARTITION_STATUS_UNAVAILABLE);
            let _ = job.conn.send_chunk(buf.finish());
        }
        return;
    };

    // Set name given but unresolved: only reachable when an explicit
    // partition list let admission through without a `NOT_FOUND`.
    if job.core.set_name.is_some() && job.core.set_id.is_none() {
        if wants_partition_done(job) {
            buf.push_partition_done(partition_id, PARTITION_STATUS_OK);
            let _ = job.conn.send_chunk(buf.finish());
        }
        return;
    }

    let resume_from = job
        .core
        .partitions
        .as_ref()
        .and_then(|list| list.iter().find(|p| p.partition_id == partition_id))
        .and_then(|p| p.resume_from);

    let limit = (tree.len() as u64) * job.sample_pct as u64 / 100;
    let mut pre_filter_count = 0u64;
    // Per-partition share of `sample_max`, allocated up front (`spec.md`
    // §4.2's split policy) since partitions iterate concurrently; bounds
    // this partition's contribution independently of the shared atomic
    // `sample_count` below.
    let mut local_sample_count = 0u64;

    let mut visit = |digest: Digest| -> bool {
        if job.core.is_abandoned() {
            return false;
        }
        if job.fail_on_cluster_change && reservation.cluster_key() != job.cluster_key_at_start {
            job.core.abandon(AbandonReason::ClusterKeyMismatch);
            return false;
        }

        let record = match ns.records().open(digest) {
            Ok(Some(r)) => r,
            Ok(None) => return true,
            Err(_) => {
                job.core.failed.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        };

        if job.sample_pct_mode() {
            pre_filter_count += 1;
            if pre_filter_count == limit {
                return false;
            }
            if !record.meta.is_live(now_ms) {
                return true;
            }
        } else if !record.meta.is_live(now_ms) {
            return true;
        }

        if let (Some(requested), Some(actual)) = (job.core.set_id, record.meta.set_id) {
            if requested != actual {
                return true;
            }
        }

        let mut effective_predicate = job.predicate.as_ref();
        if let Some(p) = effective_predicate {
            match p.match_metadata(&record.meta) {
                MatchResult::True => effective_predicate = None,
                MatchResult::False => {
                    job.core.filtered_meta.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                MatchResult::Unknown => {}
            }
        }
        if let Some(p) = effective_predicate {
            if !p.match_bins(&record) {
                job.core.filtered_bins.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }

        let mut last_sample = false;
        if job.sample_max_mode() {
            local_sample_count += 1;
            if local_sample_count > job.max_per_partition {
                return false;
            }
            let count = job.sample_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count > job.sample_max {
                return false;
            }
            last_sample = count == job.sample_max;
        }

        buf.push_record(
            digest,
            job.no_bin_data,
            &record.bins,
            job.bin_name_filter.as_deref(),
        );
        job.core.succeeded.fetch_add(1, Ordering::Relaxed);

        if last_sample {
            return false;
        }

        if let Some(micros) = throttle_sleep(job.core.rps) {
            std::thread::sleep(std::time::Duration::from_micros(micros));
        }

        if buf.payload_len() >= CHUNK_LIMIT {
            let sent = std::mem::replace(&mut buf, ResponseBuffer::new());
            if let Err(e) = job.conn.send_chunk(sent.finish()) {
                job.core.abandon(e.reason());
                return false;
            }
        }
        true
    };

    if job.sample_pct_mode() {
        tree.reduce_from(resume_from, &mut visit);
    } else {
        tree.reduce_live(resume_from, &mut visit);
    }

    if wants_partition_done(job) && !job.core.is_abandoned() {
        buf.push_partition_done(partition_id, PARTITION_STATUS_OK);
    }
    if buf.has_body() {
        let _ = job.conn.send_chunk(buf.finish());
    }
}
