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

//! The tagged variant standing in for the source's vtable dispatch: one
//! `ScanJob` per flavor, each embedding a `JobCore` by composition.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use scand_storage::Namespace;

use crate::aggregation::{slice_aggregation, AggregationJobState};
use crate::background::{slice_background, BackgroundJobState};
use crate::basic::{slice_basic, BasicJobState};
use crate::core::{JobCore, ScanStat};
use crate::error::AbandonReason;

pub enum ScanJob {
    Basic(BasicJobState),
    Aggregation(AggregationJobState),
    UdfBackground(Arc<BackgroundJobState>),
    OpsBackground(Arc<BackgroundJobState>),
}

impl ScanJob {
    pub fn core(&self) -> &JobCore {
        match self {
            ScanJob::Basic(s) => &s.core,
            ScanJob::Aggregation(s) => &s.core,
            ScanJob::UdfBackground(s) => &s.core,
            ScanJob::OpsBackground(s) => &s.core,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScanJob::Basic(_) => "basic",
            ScanJob::Aggregation(_) => "aggr",
            ScanJob::UdfBackground(_) => "udf_bg",
            ScanJob::OpsBackground(_) => "ops_bg",
        }
    }

    /// Drives one partition through whichever flavor's slice algorithm.
    pub async fn slice(&self, ns: &dyn Namespace, partition_id: u16, now_ms: i64) {
        match self {
            ScanJob::Basic(s) => slice_basic(s, ns, partition_id, now_ms),
            ScanJob::Aggregation(s) => slice_aggregation(s, ns, partition_id, now_ms),
            ScanJob::UdfBackground(s) => {
                slice_background(s.clone(), ns, partition_id, now_ms).await
            }
            ScanJob::OpsBackground(s) => {
                slice_background(s.clone(), ns, partition_id, now_ms).await
            }
        }
    }

    /// Finalizes the job: foreground jobs send the terminal `fin` and
    /// release the connection; background jobs wait for in-flight
    /// sub-transactions to drain.
    pub async fn finish(&self) {
        match self {
            ScanJob::Basic(s) => s.conn.finish_and_close(s.core.abandoned()),
            ScanJob::Aggregation(s) => s.conn.finish_and_close(s.core.abandoned()),
            ScanJob::UdfBackground(s) => s.await_drain().await,
            ScanJob::OpsBackground(s) => s.await_drain().await,
        }
    }

    pub fn info(&self) -> ScanStat {
        let core = self.core();
        let net_io_bytes = match self {
            ScanJob::Basic(s) => s.conn.bytes_out(),
            ScanJob::Aggregation(s) => s.conn.bytes_out(),
            // The synchronous `fin(OK)` is the only traffic this core
            // accounts for; sub-transaction write volume is untracked here.
            ScanJob::UdfBackground(_) | ScanJob::OpsBackground(_) => 0,
        };
        ScanStat {
            trid: core.trid,
            kind: self.kind(),
            abandoned: core.abandoned(),
            succeeded: core.succeeded.load(Ordering::Relaxed),
            failed: core.failed.load(Ordering::Relaxed),
            filtered_meta: core.filtered_meta.load(Ordering::Relaxed),
            filtered_bins: core.filtered_bins.load(Ordering::Relaxed),
            net_io_bytes,
        }
    }

    pub fn abort(&self) {
        self.core().abandon(AbandonReason::UserAbort);
    }
}
