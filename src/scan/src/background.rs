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

//! UDF-background and ops-background scan jobs: never stream record data,
//! instead fan surviving records out as internally-generated write
//! sub-transactions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scand_config::config::MAX_ACTIVE_TRANSACTIONS;
use scand_config::metrics::SUB_WRITE_FILTERED_OUT;
use scand_storage::{
    Digest, InternalTransaction, MatchResult, Namespace, PredicateExpr, SubmitOutcome,
    TransactionSubmitter,
};

use crate::core::JobCore;
use crate::throttle::throttle_sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFlavor {
    Udf,
    Ops,
}

pub struct BackgroundJobState {
    pub core: JobCore,
    pub flavor: BackgroundFlavor,
    pub predicate: Arc<dyn PredicateExpr>,
    pub durable_delete: bool,
    pub n_active_tr: AtomicU64,
    pub submitter: Arc<dyn TransactionSubmitter>,
}

impl BackgroundJobState {
    /// `finish()` must not return until every submitted sub-transaction has
    /// completed.
    pub async fn await_drain(&self) {
        let poll = Duration::from_millis(scand_config::config::get_config().scan.background_poll_ms);
        while self.n_active_tr.load(Ordering::Relaxed) != 0 {
            tokio::time::sleep(poll).await;
        }
    }
}

/// Runs one partition's share of a background scan. Splits the source
/// algorithm's single interleaved loop into a synchronous filter pass (set,
/// doomed, predicate) followed by an async fan-out pass (backpressure,
/// throttle, submit) — the only blocking points the source allows — since
/// `PartitionTree::reduce_live`'s visitor is synchronous.
pub async fn slice_background(
    job: Arc<BackgroundJobState>,
    ns: &dyn Namespace,
    partition_id: u16,
    now_ms: i64,
) {
    let Some(reservation) = ns.reservation(partition_id) else {
        return;
    };
    let Some(tree) = reservation.tree() else {
        return;
    };

    let mut surviving = Vec::new();
    let mut visit = |digest: Digest| -> bool {
        if job.core.is_abandoned() {
            return false;
        }
        let Ok(Some(record)) = ns.records().open(digest) else {
            return true;
        };
        if !record.meta.is_live(now_ms) {
            return true;
        }
        if let (Some(requested), Some(actual)) = (job.core.set_id, record.meta.set_id) {
            if requested != actual {
                return true;
            }
        }
        match job.predicate.match_metadata(&record.meta) {
            MatchResult::False => {
                job.core.filtered_meta.fetch_add(1, Ordering::Relaxed);
                SUB_WRITE_FILTERED_OUT
                    .with_label_values(&[job.core.namespace.as_str()])
                    .inc();
                return true;
            }
            MatchResult::True | MatchResult::Unknown => {}
        }
        surviving.push(digest);
        true
    };
    tree.reduce_live(None, &mut visit);
    drop(reservation);

    for digest in surviving {
        if job.core.is_abandoned() {
            break;
        }
        while job.n_active_tr.load(Ordering::Relaxed) as usize >= MAX_ACTIVE_TRANSACTIONS {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        if let Some(micros) = throttle_sleep(job.core.rps) {
            tokio::time::sleep(Duration::from_micros(micros)).await;
        }

        let txn = match job.flavor {
            BackgroundFlavor::Udf => InternalTransaction::Touch { digest },
            BackgroundFlavor::Ops => InternalTransaction::Delete { digest },
        };

        job.n_active_tr.fetch_add(1, Ordering::Relaxed);
        let job = job.clone();
        tokio::spawn(async move {
            let outcome = job.submitter.submit(&job.core.namespace, txn);
            complete(&job, outcome);
        });
    }
}

/// The sub-transaction completion callback, invoked from whichever task
/// ends up running the submission.
fn complete(job: &BackgroundJobState, outcome: scand_storage::Result<SubmitOutcome>) {
    match outcome {
        Ok(SubmitOutcome::Applied) => {
            job.core.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(SubmitOutcome::NotFound) => {}
        Ok(SubmitOutcome::FilteredOut) => {
            job.core.filtered_bins.fetch_add(1, Ordering::Relaxed);
        }
        Ok(SubmitOutcome::Rejected) | Err(_) => {
            job.core.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
    job.n_active_tr.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use scand_storage::{MemNamespace, MemTransactionSubmitter, Record, RecordMeta};

    use super::*;

    struct AlwaysTrue;
    impl PredicateExpr for AlwaysTrue {
        fn match_metadata(&self, _meta: &RecordMeta) -> MatchResult {
            MatchResult::True
        }
        fn match_bins(&self, _record: &Record) -> bool {
            true
        }
    }

    struct AlwaysFalse;
    impl PredicateExpr for AlwaysFalse {
        fn match_metadata(&self, _meta: &RecordMeta) -> MatchResult {
            MatchResult::False
        }
        fn match_bins(&self, _record: &Record) -> bool {
            false
        }
    }

    fn rec(byte: u8) -> Record {
        Record {
            digest: Digest([byte; 20]),
            meta: RecordMeta {
                generation: 1,
                expire_at_ms: None,
                tombstone: false,
                set_id: None,
            },
            bins: vec![("v".into(), Bytes::from_static(b"1"))],
        }
    }

    #[tokio::test]
    async fn surviving_records_all_get_submitted() {
        let ns = MemNamespace::new("ns");
        for b in 0..5u8 {
            ns.seed(rec(b), 1);
        }
        let submitter = Arc::new(MemTransactionSubmitter::new());
        let job = Arc::new(BackgroundJobState {
            core: JobCore::new(1, "ns".into(), None, None, None, 0, "c".into()),
            flavor: BackgroundFlavor::Udf,
            predicate: Arc::new(AlwaysTrue),
            durable_delete: false,
            n_active_tr: AtomicU64::new(0),
            submitter: submitter.clone(),
        });
        slice_background(job.clone(), &ns, 0, 0).await;
        job.await_drain().await;
        assert_eq!(job.core.succeeded.load(Ordering::Relaxed), 5);
        assert_eq!(submitter.submitted_count(), 5);
    }

    #[tokio::test]
    async fn predicate_rejecting_everything_filters_all_records() {
        let ns = MemNamespace::new("ns");
        for b in 0..4u8 {
            ns.seed(rec(b), 1);
        }
        let submitter = Arc::new(MemTransactionSubmitter::new());
        let job = Arc::new(BackgroundJobState {
            core: JobCore::new(1, "ns".into(), None, None, None, 0, "c".into()),
            flavor: BackgroundFlavor::Ops,
            predicate: Arc::new(AlwaysFalse),
            durable_delete: false,
            n_active_tr: AtomicU64::new(0),
            submitter: submitter.clone(),
        });
        slice_background(job.clone(), &ns, 0, 0).await;
        job.await_drain().await;
        assert_eq!(job.core.filtered_meta.load(Ordering::Relaxed), 4);
        assert_eq!(submitter.submitted_count(), 0);
    }
}
