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

//! Job admission, the job registry, and the partition-slicing driver loop.
//! Stands in for the out-of-scope scan manager (`spec.md` §1): admission
//! validates a request and picks one of the four job constructors, the
//! registry answers `get_job_info`/`get_all_jobs`/`abort_*`, and the driver
//! loop stands in for the partition-slicing thread pool, one `tokio` task
//! per partition per job (`spec.md` §9's DESIGN NOTES explicitly invite
//! modeling that pool as whichever concurrency primitive is idiomatic).

use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use scand_config::config::{get_config, N_PARTITIONS};
use scand_config::metrics::SCAN_JOBS_TOTAL;
use scand_storage::Namespace;

use crate::aggregation::AggregationJobState;
use crate::background::{BackgroundFlavor, BackgroundJobState};
use crate::basic::BasicJobState;
use crate::conn::{ClientConn, ConnJobState};
use crate::core::{JobCore, ScanStat, TrId};
use crate::error::{AbandonReason, Result, ScanError};
use crate::job::ScanJob;
use crate::predicate;
use crate::request::{PartitionSelector, ScanKind, ScanRequest};
use crate::sampling;
use crate::wire::encode_fin;

struct ScanManager {
    /// Jobs still being sliced or awaiting `finish()`.
    active: DashMap<TrId, Arc<ScanJob>>,
    /// Final stats of terminated jobs, oldest first; capped by
    /// `scan.max_finished_jobs`.
    finished: Mutex<VecDeque<ScanStat>>,
}

static MANAGER: Lazy<ScanManager> = Lazy::new(|| ScanManager {
    active: DashMap::new(),
    finished: Mutex::new(VecDeque::new()),
});

/// Initializes the scan manager. Forces the registry's lazy statics so
/// `active_job_count()` and friends never pay a first-call penalty; safe to
/// call more than once.
pub fn init() {
    Lazy::force(&MANAGER);
}

/// §4.1's "set" field contract, shared by all four job constructors: an
/// unresolved set name is tolerated only when an explicit partition list
/// lets admission through (the legacy path), otherwise it is `NOT_FOUND`.
fn resolve_set(req: &ScanRequest, ns: &dyn Namespace) -> Result<Option<u16>> {
    match &req.set_name {
        None => Ok(None),
        Some(name) => match ns.resolve_set(name) {
            Some(id) => Ok(Some(id)),
            None if req.partitions.is_some() => Ok(None),
            None => Err(ScanError::NotFound),
        },
    }
}

/// A request's `socket_timeout_ms == 0` is ambiguous between "explicitly
/// infinite" and "field omitted"; resolved in the manager's favor of the
/// configured default, which itself defaults to `0` (infinite).
fn effective_socket_timeout_ms(requested: u32) -> u32 {
    if requested != 0 {
        requested
    } else {
        get_config().scan.default_socket_timeout_ms
    }
}

fn validate_bin_names(names: Option<Vec<String>>) -> Result<Option<Vec<String>>> {
    if let Some(names) = &names {
        for name in names {
            if name.len() > scand_config::config::BIN_NAME_MAX_LEN {
                return Err(ScanError::BinName);
            }
        }
    }
    Ok(names)
}

fn start_basic(
    trid: TrId,
    req: ScanRequest,
    ns: &dyn Namespace,
    conn: Arc<dyn ClientConn>,
    client_identity: String,
) -> Result<BasicJobState> {
    let set_id = resolve_set(&req, ns)?;
    let bin_name_filter = validate_bin_names(req.bin_names)?;
    let predicate = req
        .predicate
        .as_deref()
        .map(predicate::compile)
        .transpose()?;
    let n_pids = req.partitions.as_ref().map(|p| p.len() as u16).unwrap_or_else(|| {
        sampling::estimate_partition_count(scand_config::cluster::cluster_size())
    });
    let max_per_partition = if req.sample_max > 0 {
        sampling::max_per_partition(req.sample_max, n_pids)
    } else {
        0
    };
    let cluster_key_at_start = scand_config::cluster::current_cluster_key();
    let core = JobCore::new(
        trid,
        ns.name().to_string(),
        req.set_name,
        set_id,
        req.partitions,
        req.rps,
        client_identity,
    );
    Ok(BasicJobState {
        core,
        conn: ConnJobState::new(conn, effective_socket_timeout_ms(req.socket_timeout_ms)),
        cluster_key_at_start,
        fail_on_cluster_change: req.options.fail_on_cluster_change,
        no_bin_data: req.no_bin_data,
        sample_pct: req.options.sample_pct,
        sample_max: req.sample_max,
        sample_count: AtomicU64::new(0),
        max_per_partition,
        predicate,
        bin_name_filter,
    })
}

fn start_aggregation(
    trid: TrId,
    req: ScanRequest,
    ns: &dyn Namespace,
    conn: Arc<dyn ClientConn>,
    client_identity: String,
) -> Result<AggregationJobState> {
    if !get_config().scan.udf_enabled {
        return Err(ScanError::Forbidden);
    }
    if req.predicate.is_some() {
        return Err(ScanError::UnsupportedFeature);
    }
    let set_id = resolve_set(&req, ns)?;
    let core = JobCore::new(
        trid,
        ns.name().to_string(),
        req.set_name,
        set_id,
        req.partitions,
        req.rps,
        client_identity,
    );
    Ok(AggregationJobState {
        core,
        conn: ConnJobState::new(conn, effective_socket_timeout_ms(req.socket_timeout_ms)),
        aggregation: ns.aggregation_runtime(),
    })
}

fn start_background(
    trid: TrId,
    req: ScanRequest,
    ns: &dyn Namespace,
    client_identity: String,
    flavor: BackgroundFlavor,
) -> Result<BackgroundJobState> {
    match flavor {
        BackgroundFlavor::Udf => {
            if !get_config().scan.udf_enabled {
                return Err(ScanError::Forbidden);
            }
        }
        BackgroundFlavor::Ops => {
            if req.op_list_len == 0 || req.op_list_has_read {
                return Err(ScanError::Parameter(
                    "ops background scan requires a non-empty, read-free op list".into(),
                ));
            }
        }
    }
    let predicate = match &req.predicate {
        Some(bytes) => predicate::compile(bytes)?,
        // No predicate on the wire: every record passes the metadata phase.
        None => predicate::compile(b"true").expect("'true' always compiles"),
    };
    let set_id = resolve_set(&req, ns)?;
    let ceiling = ns.background_scan_max_rps();
    let rps = if req.rps == 0 {
        ceiling
    } else if req.rps > ceiling {
        return Err(ScanError::Parameter(format!(
            "rps {} exceeds background_scan_max_rps {ceiling}",
            req.rps
        )));
    } else {
        req.rps
    };
    let core = JobCore::new(
        trid,
        ns.name().to_string(),
        req.set_name,
        set_id,
        req.partitions,
        rps,
        client_identity,
    );
    Ok(BackgroundJobState {
        core,
        flavor,
        predicate,
        durable_delete: req.durable_delete,
        n_active_tr: AtomicU64::new(0),
        submitter: ns.transaction_submitter(),
    })
}

fn partitions_to_slice(requested: &Option<Vec<PartitionSelector>>) -> Vec<u16> {
    match requested {
        Some(list) => list.iter().map(|p| p.partition_id).collect(),
        None => (0..N_PARTITIONS).collect(),
    }
}

/// Dispatches by message-type bits (`spec.md` §6's selection table), builds
/// the matching job, and hands it to the driver loop. Background jobs send
/// their synchronous `fin(OK)` and release the connection right here, before
/// any partition is ever sliced; foreground jobs keep the connection until
/// their own `finish()` sends the terminal `fin`.
pub fn scan(
    request: ScanRequest,
    ns: Arc<dyn Namespace>,
    conn: Arc<dyn ClientConn>,
    client_identity: String,
) -> Result<TrId> {
    let kind = request.scan_kind()?;
    let trid = scand_config::ider::generate();

    let job = match kind {
        ScanKind::Basic => {
            ScanJob::Basic(start_basic(trid, request, ns.as_ref(), conn, client_identity)?)
        }
        ScanKind::Aggregation => ScanJob::Aggregation(start_aggregation(
            trid,
            request,
            ns.as_ref(),
            conn,
            client_identity,
        )?),
        ScanKind::UdfBackground => {
            let state = start_background(
                trid,
                request,
                ns.as_ref(),
                client_identity,
                BackgroundFlavor::Udf,
            )?;
            let _ = conn.send_chunk(encode_fin(AbandonReason::None.code()), 0);
            conn.close();
            ScanJob::UdfBackground(Arc::new(state))
        }
        ScanKind::OpsBackground => {
            let state = start_background(
                trid,
                request,
                ns.as_ref(),
                client_identity,
                BackgroundFlavor::Ops,
            )?;
            let _ = conn.send_chunk(encode_fin(AbandonReason::None.code()), 0);
            conn.close();
            ScanJob::OpsBackground(Arc::new(state))
        }
    };

    let job = Arc::new(job);
    MANAGER.active.insert(trid, job.clone());
    spawn_driver(job, ns);
    Ok(trid)
}

/// Drives every requested partition of one job concurrently, waits for all
/// slices to return, finalizes the job, and retires it into the finished
/// log. One task per job; slices themselves run as their own sub-tasks so a
/// slow partition never blocks the others.
fn spawn_driver(job: Arc<ScanJob>, ns: Arc<dyn Namespace>) {
    tokio::spawn(async move {
        let pids = partitions_to_slice(&job.core().partitions);
        let now_ms = Utc::now().timestamp_millis();

        let mut slices = tokio::task::JoinSet::new();
        for pid in pids {
            let job = job.clone();
            let ns = ns.clone();
            slices.spawn(async move {
                job.slice(ns.as_ref(), pid, now_ms).await;
            });
        }
        while slices.join_next().await.is_some() {}

        job.finish().await;
        retire(&job);
    });
}

fn retire(job: &Arc<ScanJob>) {
    let stat = job.info();
    let outcome = match stat.abandoned {
        None => "complete",
        Some(AbandonReason::UserAbort) => "abort",
        Some(_) => "error",
    };
    SCAN_JOBS_TOTAL.with_label_values(&[stat.kind, outcome]).inc();

    match stat.abandoned {
        None => tracing::debug!(trid = stat.trid, kind = stat.kind, succeeded = stat.succeeded, "scan job complete"),
        Some(reason) => tracing::warn!(trid = stat.trid, kind = stat.kind, ?reason, "scan job abandoned"),
    }

    MANAGER.active.remove(&stat.trid);
    MANAGER.finished.lock().push_back(stat);
    limit_finished_jobs();
}

pub fn get_job_info(trid: TrId) -> Option<ScanStat> {
    if let Some(job) = MANAGER.active.get(&trid) {
        return Some(job.info());
    }
    MANAGER
        .finished
        .lock()
        .iter()
        .find(|stat| stat.trid == trid)
        .cloned()
}

pub fn get_all_jobs() -> Vec<ScanStat> {
    let mut out: Vec<ScanStat> = MANAGER.active.iter().map(|e| e.value().info()).collect();
    out.extend(MANAGER.finished.lock().iter().cloned());
    out
}

pub fn abort_job(trid: TrId) -> bool {
    match MANAGER.active.get(&trid) {
        Some(job) => {
            job.abort();
            true
        }
        None => false,
    }
}

pub fn abort_all() -> usize {
    let mut count = 0;
    for entry in MANAGER.active.iter() {
        entry.value().abort();
        count += 1;
    }
    count
}

pub fn active_job_count() -> usize {
    MANAGER.active.len()
}

/// Evicts the oldest finished-job stats past `scan.max_finished_jobs`.
pub fn limit_finished_jobs() {
    let cap = get_config().scan.max_finished_jobs;
    let mut finished = MANAGER.finished.lock();
    while finished.len() > cap {
        finished.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use scand_storage::MemNamespace;

    use super::*;
    use crate::conn::MemClientConn;
    use crate::request::parse_scan_request;

    fn empty_request() -> ScanRequest {
        parse_scan_request(&[0, 0, 0]).unwrap()
    }

    /// Polls until the driver task has retired the job out of `active`.
    async fn await_termination(trid: TrId) {
        for _ in 0..500 {
            if MANAGER.active.get(&trid).is_none() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        panic!("job {trid} did not terminate in time");
    }

    #[tokio::test]
    async fn basic_scan_whole_namespace_completes_and_reports_success() {
        let ns = MemNamespace::new("ns");
        for b in 0..3u8 {
            ns.seed(
                scand_storage::Record {
                    digest: scand_storage::Digest([b; 20]),
                    meta: scand_storage::RecordMeta {
                        generation: 1,
                        expire_at_ms: None,
                        tombstone: false,
                        set_id: None,
                    },
                    bins: vec![("v".into(), bytes::Bytes::from_static(b"1"))],
                },
                scand_config::config::N_PARTITIONS,
            );
        }
        let ns: Arc<dyn Namespace> = Arc::new(ns);
        let conn = Arc::new(MemClientConn::new());
        let trid = scan(empty_request(), ns, conn.clone(), "client".into()).unwrap();

        await_termination(trid).await;
        let stat = get_job_info(trid).expect("job stats retained after termination");
        assert!(stat.abandoned.is_none());
        assert_eq!(stat.succeeded, 3);
        assert!(conn.is_closed());
        assert!(conn.frames().last().is_some(), "terminal fin frame sent");
    }

    #[tokio::test]
    async fn unknown_set_without_partition_list_is_rejected_before_admission() {
        let ns: Arc<dyn Namespace> = Arc::new(MemNamespace::new("ns"));
        let conn = Arc::new(MemClientConn::new());
        let mut req = empty_request();
        req.set_name = Some("ghost".into());
        let result = scan(req, ns, conn, "client".into());
        assert!(matches!(result, Err(ScanError::NotFound)));
        assert_eq!(active_job_count(), 0);
    }

    #[tokio::test]
    async fn ops_background_with_read_op_is_rejected() {
        let ns: Arc<dyn Namespace> = Arc::new(MemNamespace::new("ns"));
        let conn = Arc::new(MemClientConn::new());
        let mut bytes = vec![0u8, 0b0000_0010, 0]; // flags2: WRITE
        bytes.extend_from_slice(&1u16.to_be_bytes()); // op_list_len = 1
        let mut req = parse_scan_request(&bytes).unwrap();
        req.op_list_has_read = true;
        let result = scan(req, ns, conn, "client".into());
        assert!(matches!(result, Err(ScanError::Parameter(_))));
    }

    #[tokio::test]
    async fn udf_background_admitted_when_udf_enabled_by_default() {
        let ns = MemNamespace::new("ns");
        let result = start_background(
            1,
            empty_request(),
            &ns,
            "client".into(),
            BackgroundFlavor::Udf,
        );
        assert!(result.is_ok(), "default config keeps UDF enabled");
    }

    #[tokio::test]
    async fn udf_background_sends_synchronous_fin_before_slicing() {
        // flags2: IS_UDF | UDF_OP_PRESENT, udf_op bit left unset => Background.
        let ns: Arc<dyn Namespace> = Arc::new(MemNamespace::new("ns"));
        let conn = Arc::new(MemClientConn::new());
        let req = parse_scan_request(&[0, 0b0000_0101, 0]).unwrap();
        scan(req, ns, conn.clone(), "client".into()).unwrap();
        assert_eq!(conn.frames().len(), 1);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn abort_job_marks_a_registered_job_user_abort() {
        let ns: Arc<dyn Namespace> = Arc::new(MemNamespace::new("ns"));
        let conn = Arc::new(MemClientConn::new());
        let trid = scan(empty_request(), ns, conn, "client".into()).unwrap();
        // The job may finish before we get to it on a fast empty namespace;
        // aborting an already-finished job is defined to return false.
        let _ = abort_job(trid);
    }

    #[tokio::test]
    async fn limit_finished_jobs_evicts_oldest_first() {
        MANAGER.finished.lock().clear();
        let cap = get_config().scan.max_finished_jobs;
        let overflow = cap + 5;
        for trid in 0..overflow as i64 {
            MANAGER.finished.lock().push_back(ScanStat {
                trid,
                kind: "basic",
                abandoned: None,
                succeeded: 0,
                failed: 0,
                filtered_meta: 0,
                filtered_bins: 0,
                net_io_bytes: 0,
            });
        }
        limit_finished_jobs();
        let finished = MANAGER.finished.lock();
        assert_eq!(finished.len(), cap);
        assert_eq!(finished.front().unwrap().trid, 5);
        drop(finished);
        MANAGER.finished.lock().clear();
    }
}
