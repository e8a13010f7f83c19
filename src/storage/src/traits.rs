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

//! Seams a real storage engine, predicate evaluator, and UDF runtime would
//! occupy. Each scan flavor is written purely in terms of these traits so
//! that a production node can supply real implementations without touching
//! the scheduling and streaming code.

use std::sync::Arc;

use crate::digest::Digest;
use crate::errors::Result;
use crate::record::Record;

/// A snapshot of one partition's index tree, good for the lifetime of a
/// single reservation.
pub trait PartitionTree: Send + Sync {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds over every digest in the tree, live or not, in tree order.
    fn reduce_from(&self, start: Option<Digest>, visit: &mut dyn FnMut(Digest) -> bool);

    /// Folds over every digest whose record is currently live.
    fn reduce_live(&self, start: Option<Digest>, visit: &mut dyn FnMut(Digest) -> bool) {
        self.reduce_from(start, visit);
    }
}

/// A held claim on one partition for the duration of a scan. `None` from
/// `tree()` models a partition this node no longer masters (the UNAVAILABLE
/// case).
pub trait Reservation: Send + Sync {
    fn partition_id(&self) -> u16;
    fn tree(&self) -> Option<&dyn PartitionTree>;
    fn cluster_key(&self) -> u64;
}

/// Opens the record behind a digest for the duration of one visit. A real
/// engine would mmap or pread a block device here; the in-memory double
/// just clones out of a map.
pub trait RecordStore: Send + Sync {
    fn open(&self, digest: Digest) -> Result<Option<Record>>;
}

/// A named collection of partitions. One `Namespace` per scan request.
pub trait Namespace: Send + Sync {
    fn name(&self) -> &str;

    /// Looks up a set by name, returning `None` when no such set exists in
    /// this namespace.
    fn resolve_set(&self, name: &str) -> Option<u16>;

    fn reservation(&self, partition_id: u16) -> Option<Box<dyn Reservation>>;
    fn records(&self) -> &dyn RecordStore;

    /// Ceiling applied when a background scan's `rps` is left at `0`.
    fn background_scan_max_rps(&self) -> u32;

    /// The aggregation engine an aggregation scan drives per slice.
    fn aggregation_runtime(&self) -> Arc<dyn AggregationRuntime>;

    /// The internal write path a background scan feeds sub-transactions
    /// into.
    fn transaction_submitter(&self) -> Arc<dyn TransactionSubmitter>;
}

/// Outcome of evaluating a predicate against one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    True,
    False,
    /// The predicate could not be decided from the bins read so far
    /// (e.g. a requested bin is absent). Scan policy treats this as a
    /// non-match rather than an error.
    Unknown,
}

/// Evaluated in two phases, matching the metadata-then-bins pass a slice
/// makes over each record: `match_metadata` runs before the record is
/// opened and may return `Unknown` to force a bin-level pass; `match_bins`
/// runs against the fully-loaded record and must be conclusive.
pub trait PredicateExpr: Send + Sync {
    fn match_metadata(&self, meta: &crate::record::RecordMeta) -> MatchResult;
    fn match_bins(&self, record: &Record) -> bool;
}

/// The out-of-scope aggregation engine. Invoked once per slice with the
/// surviving digests collected during iteration; `reservation` backs the
/// `ptn_reserve` hook (the slice's own reservation, returned regardless of
/// which partition id is asked for) and `emit` backs `ostream_write`.
pub trait AggregationRuntime: Send + Sync {
    fn run(
        &self,
        namespace: &str,
        digests: &[Digest],
        reservation: &dyn Reservation,
        emit: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()>;
}

/// What became of one candidate sub-transaction submitted by an
/// ops-background scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Applied,
    /// The record was deleted between the scan's visit and the
    /// sub-transaction's apply; not a failure.
    NotFound,
    FilteredOut,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
pub enum InternalTransaction {
    Touch { digest: Digest },
    Delete { digest: Digest },
}

/// The internal transaction path an ops-background scan feeds. A real node
/// routes this through its write path and replication; the double just
/// records what it was asked to do.
pub trait TransactionSubmitter: Send + Sync {
    fn submit(&self, namespace: &str, txn: InternalTransaction) -> Result<SubmitOutcome>;
}
