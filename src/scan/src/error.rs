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

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, ScanError>;

/// The terminal reason a job stops early, or the pre-admission rejection
/// reason when no job is ever created. Doubles as the value stored in a
/// job's `abandoned` field and as the wire-level error returned to a
/// rejected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AbandonReason {
    /// Not actually abandoned; the job is still running.
    None = 0,
    Parameter = 1,
    NotFound = 2,
    Forbidden = 3,
    UnsupportedFeature = 4,
    BinName = 5,
    ClusterKeyMismatch = 6,
    UserAbort = 7,
    ResponseTimeout = 8,
    ResponseError = 9,
    Unknown = 10,
}

impl AbandonReason {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_running(self) -> bool {
        matches!(self, AbandonReason::None)
    }
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("bad request parameter: {0}")]
    Parameter(String),
    #[error("unknown set without a partition list")]
    NotFound,
    #[error("udf execution is disabled")]
    Forbidden,
    #[error("predicate filters are not supported on this scan type")]
    UnsupportedFeature,
    #[error("bin name exceeds the maximum length")]
    BinName,
    #[error("cluster key changed during the scan")]
    ClusterKeyMismatch,
    #[error("aborted by client request")]
    UserAbort,
    #[error("chunk send timed out")]
    ResponseTimeout,
    #[error("chunk send failed")]
    ResponseError,
    #[error("aggregation runtime error: {0}")]
    Unknown(String),
}

impl ScanError {
    /// The `AbandonReason` this error corresponds to, used both to mark a
    /// running job terminal and to pick the metrics outcome label.
    pub fn reason(&self) -> AbandonReason {
        match self {
            ScanError::Parameter(_) => AbandonReason::Parameter,
            ScanError::NotFound => AbandonReason::NotFound,
            ScanError::Forbidden => AbandonReason::Forbidden,
            ScanError::UnsupportedFeature => AbandonReason::UnsupportedFeature,
            ScanError::BinName => AbandonReason::BinName,
            ScanError::ClusterKeyMismatch => AbandonReason::ClusterKeyMismatch,
            ScanError::UserAbort => AbandonReason::UserAbort,
            ScanError::ResponseTimeout => AbandonReason::ResponseTimeout,
            ScanError::ResponseError => AbandonReason::ResponseError,
            ScanError::Unknown(_) => AbandonReason::Unknown,
        }
    }

    pub fn error_code(&self) -> u8 {
        self.reason().code()
    }
}
