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

//! Demonstration entry point: wires up a single in-memory namespace and
//! runs one scan of each of the four flavors against it, logging the
//! resulting stats. This is not a server; the transport loop a real node
//! would run around `scand_scan::scan` is out of scope for this crate.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use scand_scan::{MemClientConn, ScanOptions, ScanRequest, UdfOp};
use scand_storage::{Digest, MemNamespace, Namespace, Record, RecordMeta};

#[derive(Parser, Debug)]
#[command(name = "scand", about = "Scan dispatch and per-record streaming core demo")]
struct Args {
    /// Namespace name to seed and scan.
    #[arg(long, default_value = "demo")]
    namespace: String,

    /// Number of sample records to seed before running the demo scans.
    #[arg(long, default_value_t = 50)]
    records: u16,
}

fn seed(ns: &MemNamespace, count: u16) {
    for i in 0..count {
        let mut raw = [0u8; Digest::LEN];
        raw[..2].copy_from_slice(&i.to_be_bytes());
        ns.seed(
            Record {
                digest: Digest(raw),
                meta: RecordMeta {
                    generation: 1,
                    expire_at_ms: None,
                    tombstone: false,
                    set_id: None,
                },
                bins: vec![("v".into(), bytes::Bytes::from(i.to_be_bytes().to_vec()))],
            },
            scand_config::config::N_PARTITIONS,
        );
    }
}

fn blank_request() -> ScanRequest {
    ScanRequest {
        set_name: None,
        options: ScanOptions::default(),
        partitions: None,
        sample_max: 0,
        rps: 0,
        socket_timeout_ms: 0,
        predicate: None,
        bin_names: None,
        no_bin_data: false,
        is_udf: false,
        write: false,
        udf_op: None,
        durable_delete: false,
        op_list_has_read: false,
        op_list_len: 0,
        replace_only: false,
    }
}

/// Submits one scan and blocks until it is the only thing left running.
/// Safe for a demo harness that never runs two scans concurrently; a real
/// caller would track its own `TrId` instead of polling
/// `active_job_count()`.
async fn run_one(label: &str, request: ScanRequest, ns: Arc<dyn Namespace>) {
    let conn = Arc::new(MemClientConn::new());
    let trid = match scand_scan::scan(request, ns, conn, "demo-client".into()) {
        Ok(trid) => trid,
        Err(e) => {
            tracing::warn!(scan = label, error = %e, "scan rejected at admission");
            return;
        }
    };
    while scand_scan::active_job_count() > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    match scand_scan::get_job_info(trid) {
        Some(stat) => tracing::info!(scan = label, ?stat, "scan finished"),
        None => tracing::warn!(scan = label, "job stats already evicted"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    scand_config::init()?;
    scand_scan::init();

    let ns = MemNamespace::new(args.namespace.clone());
    seed(&ns, args.records);
    let ns: Arc<dyn Namespace> = Arc::new(ns);

    run_one("basic", blank_request(), ns.clone()).await;

    let mut aggregation = blank_request();
    aggregation.is_udf = true;
    aggregation.udf_op = Some(UdfOp::Aggregate);
    run_one("aggregation", aggregation, ns.clone()).await;

    let mut udf_background = blank_request();
    udf_background.is_udf = true;
    udf_background.udf_op = Some(UdfOp::Background);
    run_one("udf_background", udf_background, ns.clone()).await;

    let mut ops_background = blank_request();
    ops_background.write = true;
    ops_background.op_list_len = 1;
    run_one("ops_background", ops_background, ns).await;

    Ok(())
}
