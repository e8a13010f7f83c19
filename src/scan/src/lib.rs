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

//! Scan dispatch and per-record streaming core: decodes an incoming scan
//! message, admits it as one of four job flavors, slices it across
//! partitions, and streams (or internally applies) the results.

pub mod aggregation;
pub mod background;
pub mod basic;
pub mod conn;
pub mod core;
pub mod error;
pub mod job;
pub mod manager;
pub mod predicate;
pub mod request;
pub mod sampling;
pub mod throttle;
pub mod wire;

pub use conn::{ClientConn, ConnJobState, MemClientConn};
pub use core::{JobCore, ScanStat, TrId};
pub use error::{AbandonReason, Result, ScanError};
pub use job::ScanJob;
pub use manager::{
    abort_all, abort_job, active_job_count, get_all_jobs, get_job_info, init, limit_finished_jobs,
    scan,
};
pub use request::{parse_scan_request, PartitionSelector, ScanKind, ScanOptions, ScanRequest, UdfOp};
