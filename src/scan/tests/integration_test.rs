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

//! End-to-end scenarios driven through the public `scand_scan` interface
//! (request parsing -> admission -> slicing -> termination) against the
//! in-memory storage double, rather than any one module in isolation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use scand_scan::{parse_scan_request, MemClientConn, ScanError};
use scand_storage::{Digest, MemNamespace, Namespace, Record, RecordMeta};

fn rec(byte: u8) -> Record {
    Record {
        digest: Digest([byte; 20]),
        meta: RecordMeta {
            generation: 1,
            expire_at_ms: None,
            tombstone: false,
            set_id: None,
        },
        bins: vec![("color".into(), Bytes::from_static(b"red"))],
    }
}

/// Polls a job's stats until the driver has retired it, rather than
/// asserting on a fixed sleep.
async fn wait_for_completion(trid: i64) -> scand_scan::ScanStat {
    for _ in 0..1000 {
        if let Some(stat) = scand_scan::get_job_info(trid) {
            if stat.abandoned.is_some() || scand_scan::active_job_count() == 0 {
                return stat;
            }
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("job {trid} never reached a terminal state");
}

#[tokio::test]
async fn basic_scan_over_whole_namespace_streams_every_live_record() {
    scand_scan::init();
    let ns = MemNamespace::new("fruit");
    for b in 0..6u8 {
        ns.seed(rec(b), scand_config::config::N_PARTITIONS);
    }
    let ns: Arc<dyn Namespace> = Arc::new(ns);
    let conn = Arc::new(MemClientConn::new());

    let req = parse_scan_request(&[0, 0, 0]).unwrap();
    let trid = scand_scan::scan(req, ns, conn.clone(), "client-a".into()).unwrap();

    let stat = wait_for_completion(trid).await;
    assert!(stat.abandoned.is_none());
    assert_eq!(stat.succeeded, 6);
    assert!(conn.is_closed());
    assert!(!conn.frames().is_empty());
}

#[tokio::test]
async fn explicit_partition_list_reports_unavailable_for_a_revoked_partition() {
    scand_scan::init();
    let ns = MemNamespace::new("fruit");
    ns.seed(rec(1), scand_config::config::N_PARTITIONS);
    ns.seed(rec(2), scand_config::config::N_PARTITIONS);
    let pid_revoked = Digest([1u8; 20]).partition_id(scand_config::config::N_PARTITIONS);
    let pid_live = Digest([2u8; 20]).partition_id(scand_config::config::N_PARTITIONS);
    ns.revoke_partition(pid_revoked);

    let ns: Arc<dyn Namespace> = Arc::new(ns);
    let conn = Arc::new(MemClientConn::new());

    let mut bytes = vec![0b0000_0100u8, 0, 0]; // FLAG_PARTITION_LIST
    bytes.extend_from_slice(&2u16.to_be_bytes());
    bytes.extend_from_slice(&pid_revoked.to_be_bytes());
    bytes.extend_from_slice(&pid_live.to_be_bytes());
    let req = parse_scan_request(&bytes).unwrap();

    let trid = scand_scan::scan(req, ns, conn.clone(), "client-b".into()).unwrap();
    let stat = wait_for_completion(trid).await;

    assert!(stat.abandoned.is_none());
    assert_eq!(stat.succeeded, 1);
    // One partition-done(UNAVAILABLE) chunk for the revoked partition plus
    // one OK chunk carrying the live record plus the terminal fin: at least
    // two frames went out before the connection closed.
    assert!(conn.frames().len() >= 2);
}

#[tokio::test]
async fn unknown_set_name_without_a_partition_list_is_rejected_before_any_job_exists() {
    scand_scan::init();
    let before = scand_scan::active_job_count();
    let ns: Arc<dyn Namespace> = Arc::new(MemNamespace::new("fruit"));
    let conn = Arc::new(MemClientConn::new());
    let mut req = parse_scan_request(&[0, 0, 0]).unwrap();
    req.set_name = Some("no-such-set".into());

    let result = scand_scan::scan(req, ns, conn.clone(), "client-c".into());
    assert!(matches!(result, Err(ScanError::NotFound)));
    assert_eq!(scand_scan::active_job_count(), before);
    assert!(conn.frames().is_empty());
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn udf_background_scan_filters_by_predicate_and_submits_survivors() {
    scand_scan::init();
    let ns = MemNamespace::new("fruit");
    ns.seed(rec(1), scand_config::config::N_PARTITIONS); // color=red
    let mut other = rec(2);
    other.bins = vec![("color".into(), Bytes::from_static(b"blue"))];
    ns.seed(other, scand_config::config::N_PARTITIONS);
    let ns: Arc<dyn Namespace> = Arc::new(ns);
    let conn = Arc::new(MemClientConn::new());

    // flags: PREDICATE; flags2: IS_UDF | UDF_OP_PRESENT (background, bit unset)
    let predicate = b"bin_eq:color:red";
    let mut bytes = vec![0b1000_0000u8, 0b0000_0101, 0];
    bytes.extend_from_slice(&(predicate.len() as u32).to_be_bytes());
    bytes.extend_from_slice(predicate);
    let req = parse_scan_request(&bytes).unwrap();

    let trid = scand_scan::scan(req, ns, conn.clone(), "client-d".into()).unwrap();
    // Background flavors reply synchronously and release the connection
    // before any partition is sliced.
    assert_eq!(conn.frames().len(), 1);
    assert!(conn.is_closed());

    let stat = wait_for_completion(trid).await;
    assert!(stat.abandoned.is_none());
    assert_eq!(stat.succeeded, 1);
    assert_eq!(stat.filtered_bins, 1);
}

#[tokio::test]
async fn ops_background_scan_with_a_read_op_is_rejected_at_admission() {
    scand_scan::init();
    let ns: Arc<dyn Namespace> = Arc::new(MemNamespace::new("fruit"));
    let conn = Arc::new(MemClientConn::new());

    let mut bytes = vec![0u8, 0b0010_0010, 0]; // flags2: WRITE | OP_LIST_HAS_READ
    bytes.extend_from_slice(&1u16.to_be_bytes()); // op_list_len = 1
    let req = parse_scan_request(&bytes).unwrap();

    let result = scand_scan::scan(req, ns, conn, "client-e".into());
    assert!(matches!(result, Err(ScanError::Parameter(_))));
}

#[tokio::test]
async fn ops_background_scan_with_empty_op_list_is_rejected_at_admission() {
    scand_scan::init();
    let ns: Arc<dyn Namespace> = Arc::new(MemNamespace::new("fruit"));
    let conn = Arc::new(MemClientConn::new());

    let mut bytes = vec![0u8, 0b0000_0010, 0]; // flags2: WRITE only
    bytes.extend_from_slice(&0u16.to_be_bytes()); // op_list_len = 0
    let req = parse_scan_request(&bytes).unwrap();

    let result = scand_scan::scan(req, ns, conn, "client-f".into());
    assert!(matches!(result, Err(ScanError::Parameter(_))));
}

#[tokio::test]
async fn partition_list_with_explicit_partitions_requests_exactly_those_partitions() {
    scand_scan::init();
    let ns = MemNamespace::new("fruit");
    for b in 0..3u8 {
        ns.seed(rec(b), 8);
    }
    let target_pid = Digest([0u8; 20]).partition_id(8);
    let ns: Arc<dyn Namespace> = Arc::new(ns);
    let conn = Arc::new(MemClientConn::new());

    let mut bytes = vec![0b0000_0100u8, 0, 0]; // FLAG_PARTITION_LIST
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&target_pid.to_be_bytes());
    let req = parse_scan_request(&bytes).unwrap();

    let trid = scand_scan::scan(req, ns, conn.clone(), "client-g".into()).unwrap();
    let stat = wait_for_completion(trid).await;
    assert!(stat.abandoned.is_none());
    // Only digests landing in `target_pid` (out of 8 partitions over 3
    // seeded records) were ever visited; a whole-namespace scan of the same
    // data would see all 3 via `N_PARTITIONS`-wide slicing instead.
    assert!(stat.succeeded <= 3);
}
