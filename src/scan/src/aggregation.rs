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

//! The aggregation scan job: collects surviving digests per slice, then
//! drives the user-defined aggregation pipeline over them.

use std::sync::Arc;

use scand_config::config::CHUNK_LIMIT;
use scand_storage::{AggregationRuntime, Digest, Namespace};

use crate::conn::ConnJobState;
use crate::core::JobCore;
use crate::error::AbandonReason;
use crate::wire::ResponseBuffer;

/// Fixed-size chunk of the digest list accumulated per slice before handing
/// the flattened run to the aggregation engine.
const DIGEST_CHUNK_SIZE: usize = 256;

pub struct AggregationJobState {
    pub core: JobCore,
    pub conn: ConnJobState,
    pub aggregation: Arc<dyn AggregationRuntime>,
}

/// Runs one partition's share of an aggregation scan. `now_ms` is threaded
/// in rather than read from a clock so tests can exercise doomed-record
/// edge cases deterministically, matching `slice_basic`.
pub fn slice_aggregation(
    job: &AggregationJobState,
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

    let mut chunks: Vec<Vec<Digest>> = vec![Vec::with_capacity(DIGEST_CHUNK_SIZE)];

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

        let tail = chunks.last_mut().expect("at least one chunk");
        if tail.len() == DIGEST_CHUNK_SIZE {
            chunks.push(Vec::with_capacity(DIGEST_CHUNK_SIZE));
        }
        chunks
            .last_mut()
            .expect("just pushed or had room")
            .push(digest);
        true
    };

    tree.reduce_live(None, &mut visit);

    let digests: Vec<Digest> = chunks.into_iter().flatten().collect();
    if digests.is_empty() || job.core.is_abandoned() {
        return;
    }

    let mut buf = ResponseBuffer::new();
    let mut flush_err = None;
    {
        let mut emit = |value: &[u8]| -> scand_storage::Result<()> {
            buf.push_value(value);
            if buf.payload_len() >= CHUNK_LIMIT {
                let sent = std::mem::replace(&mut buf, ResponseBuffer::new());
                if let Err(e) = job.conn.send_chunk(sent.finish()) {
                    flush_err = Some(e);
                }
            }
            Ok(())
        };

        if let Err(e) = job
            .aggregation
            .run(&job.core.namespace, &digests, reservation.as_ref(), &mut emit)
        {
            let mut fail_buf = ResponseBuffer::new();
            fail_buf.push_value(format!("aggregation error: {e}").as_bytes());
            let _ = job.conn.send_chunk(fail_buf.finish());
            job.core.abandon(AbandonReason::Unknown);
            return;
        }
    }

    if let Some(e) = flush_err {
        job.core.abandon(e.reason());
        return;
    }

    if buf.has_body() {
        let _ = job.conn.send_chunk(buf.finish());
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use scand_storage::{MemNamespace, Record, RecordMeta, Reservation};

    use super::*;
    use crate::conn::MemClientConn;

    struct CountingAggregation;

    impl AggregationRuntime for CountingAggregation {
        fn run(
            &self,
            _namespace: &str,
            digests: &[Digest],
            _reservation: &dyn Reservation,
            emit: &mut dyn FnMut(&[u8]) -> scand_storage::Result<()>,
        ) -> scand_storage::Result<()> {
            emit(&(digests.len() as u64).to_be_bytes())
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

    #[test]
    fn aggregation_over_live_records_emits_one_value() {
        let ns = MemNamespace::new("ns");
        for b in 0..5u8 {
            ns.seed(rec(b), 1);
        }
        let conn = Arc::new(MemClientConn::new());
        let job = AggregationJobState {
            core: JobCore::new(1, "ns".into(), None, None, None, 0, "c".into()),
            conn: ConnJobState::new(conn.clone(), 0),
            aggregation: Arc::new(CountingAggregation),
        };
        slice_aggregation(&job, &ns, 0, 0);
        assert_eq!(conn.frames().len(), 1);
    }

    #[test]
    fn empty_partition_emits_no_frame() {
        let ns = MemNamespace::new("ns");
        let conn = Arc::new(MemClientConn::new());
        let job = AggregationJobState {
            core: JobCore::new(1, "ns".into(), None, None, None, 0, "c".into()),
            conn: ConnJobState::new(conn.clone(), 0),
            aggregation: Arc::new(CountingAggregation),
        };
        slice_aggregation(&job, &ns, 0, 0);
        assert!(conn.frames().is_empty());
    }
}
