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

//! The connection-owning mixin shared by foreground (basic, aggregation)
//! jobs: owns the client handle for the job's lifetime, serializes every
//! send behind one lock, and tracks bytes sent for `info()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{AbandonReason, ScanError};
use crate::wire::encode_fin;

/// What a foreground job writes frames to. Stands in for the out-of-scope
/// socket-send/compression/connection-lifecycle transport.
pub trait ClientConn: Send + Sync {
    fn send_chunk(&self, frame: Bytes, timeout_ms: u32) -> Result<(), ScanError>;
    fn close(&self);
}

/// Collects every frame sent to it; good for assertions in tests and for
/// the demo binary, which prints what it collected.
#[derive(Default)]
pub struct MemClientConn {
    frames: Mutex<Vec<Bytes>>,
    closed: Mutex<bool>,
    fail_after: Option<usize>,
    timeout_after: Option<usize>,
}

impl MemClientConn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `send_chunk` from the Nth call onward fails with a send error.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// Every `send_chunk` from the Nth call onward times out.
    pub fn timing_out_after(n: usize) -> Self {
        Self {
            timeout_after: Some(n),
            ..Self::default()
        }
    }

    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl ClientConn for MemClientConn {
    fn send_chunk(&self, frame: Bytes, _timeout_ms: u32) -> Result<(), ScanError> {
        let mut frames = self.frames.lock();
        let call_index = frames.len();
        if let Some(n) = self.timeout_after {
            if call_index >= n {
                return Err(ScanError::ResponseTimeout);
            }
        }
        if let Some(n) = self.fail_after {
            if call_index >= n {
                return Err(ScanError::ResponseError);
            }
        }
        frames.push(frame);
        Ok(())
    }

    fn close(&self) {
        *self.closed.lock() = true;
    }
}

/// `fd_lock` serializes every socket send and the terminal `fin`; holding
/// it is the only permission to touch the connection.
pub struct ConnJobState {
    conn: Arc<dyn ClientConn>,
    fd_lock: Mutex<()>,
    send_timeout_ms: u32,
    bytes_out: AtomicU64,
}

impl ConnJobState {
    pub fn new(conn: Arc<dyn ClientConn>, send_timeout_ms: u32) -> Self {
        Self {
            conn,
            fd_lock: Mutex::new(()),
            send_timeout_ms,
            bytes_out: AtomicU64::new(0),
        }
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    /// Sends one chunk. A send failure is reported to the caller *and*
    /// recorded so the job can abandon itself without a second check.
    pub fn send_chunk(&self, frame: Bytes) -> Result<(), ScanError> {
        let _guard = self.fd_lock.lock();
        let len = frame.len() as u64;
        self.conn.send_chunk(frame, self.send_timeout_ms)?;
        self.bytes_out.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// Sends the terminal `fin` and releases the connection. Always called
    /// after every slice has returned, so no chunk send can race it.
    pub fn finish_and_close(&self, reason: Option<AbandonReason>) {
        let _guard = self.fd_lock.lock();
        let code = reason.map(|r| r.code()).unwrap_or(0);
        let frame = encode_fin(code);
        let len = frame.len() as u64;
        if self.conn.send_chunk(frame, self.send_timeout_ms).is_ok() {
            self.bytes_out.fetch_add(len, Ordering::Relaxed);
        }
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_chunk_tracks_bytes_out() {
        let conn = Arc::new(MemClientConn::new());
        let state = ConnJobState::new(conn.clone(), 0);
        state.send_chunk(Bytes::from_static(b"12345")).unwrap();
        assert_eq!(state.bytes_out(), 5);
        assert_eq!(conn.frames().len(), 1);
    }

    #[test]
    fn send_failure_propagates_response_error() {
        let conn: Arc<dyn ClientConn> = Arc::new(MemClientConn::failing_after(0));
        let state = ConnJobState::new(conn, 0);
        assert!(matches!(
            state.send_chunk(Bytes::from_static(b"x")),
            Err(ScanError::ResponseError)
        ));
    }

    #[test]
    fn finish_and_close_releases_connection() {
        let conn = Arc::new(MemClientConn::new());
        let state = ConnJobState::new(conn.clone(), 0);
        state.finish_and_close(Some(AbandonReason::UserAbort));
        assert!(conn.is_closed());
        assert_eq!(conn.frames().len(), 1);
    }
}
