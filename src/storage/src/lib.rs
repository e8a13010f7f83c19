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

pub mod digest;
pub mod errors;
pub mod mem;
pub mod record;
pub mod traits;

pub use digest::Digest;
pub use errors::{Error, Result};
pub use mem::{MemNamespace, MemTransactionSubmitter};
pub use record::{Record, RecordMeta};
pub use traits::{
    AggregationRuntime, InternalTransaction, MatchResult, Namespace, PartitionTree, PredicateExpr,
    RecordStore, Reservation, SubmitOutcome, TransactionSubmitter,
};
