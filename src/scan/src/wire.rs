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

//! Frame and payload encoding for the out-of-scope wire protocol encoder's
//! contract: every chunk sent to a client is one `{version, type, size,
//! payload}` frame, and the payload is a sequence of small self-describing
//! records (record response, value response, partition-done marker).

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use scand_config::config::{INIT_BUF_SIZE, RECORD_MAX_BINS};
use scand_storage::Digest;

const PROTOCOL_VERSION: u8 = 1;
const FRAME_TYPE_AS_MSG: u8 = 1;
pub const FRAME_HEADER_LEN: usize = 1 + 1 + 8;

const ENTRY_RECORD: u8 = 1;
const ENTRY_VALUE: u8 = 2;
const ENTRY_PARTITION_DONE: u8 = 3;

pub const PARTITION_STATUS_OK: u8 = 0;
pub const PARTITION_STATUS_UNAVAILABLE: u8 = 1;

/// Accumulates one frame's payload. Owned by a single slice; never shared.
pub struct ResponseBuffer {
    buf: BytesMut,
    has_body: bool,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        let mut buf = BytesMut::with_capacity(INIT_BUF_SIZE);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(FRAME_TYPE_AS_MSG);
        buf.put_u64(0); // size placeholder, patched in `finish`
        Self {
            buf,
            has_body: false,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.buf.len() - FRAME_HEADER_LEN
    }

    pub fn has_body(&self) -> bool {
        self.has_body
    }

    pub fn push_record(
        &mut self,
        digest: Digest,
        meta_only: bool,
        bins: &[(String, Bytes)],
        bin_filter: Option<&[String]>,
    ) {
        self.has_body = true;
        self.buf.put_u8(ENTRY_RECORD);
        self.buf.put_slice(&digest.0);
        self.buf.put_u8(if meta_only { 1 } else { 0 });
        if meta_only {
            self.buf.put_u16(0);
            return;
        }
        let mut selected: Vec<&(String, Bytes)> = match bin_filter {
            Some(names) => bins.iter().filter(|(k, _)| names.contains(k)).collect(),
            None => bins.iter().collect(),
        };
        // Mirrors the source's stack-allocated bin array: a record can
        // never serialize more bins than fit in it.
        selected.truncate(RECORD_MAX_BINS);
        self.buf.put_u16(selected.len() as u16);
        for (name, value) in selected {
            self.buf.put_u8(name.len() as u8);
            self.buf.put_slice(name.as_bytes());
            self.buf.put_u32(value.len() as u32);
            self.buf.put_slice(value);
        }
    }

    pub fn push_value(&mut self, value: &[u8]) {
        self.has_body = true;
        self.buf.put_u8(ENTRY_VALUE);
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value);
    }

    pub fn push_partition_done(&mut self, partition_id: u16, status: u8) {
        self.has_body = true;
        self.buf.put_u8(ENTRY_PARTITION_DONE);
        self.buf.put_u16(partition_id);
        self.buf.put_u8(status);
    }

    /// Finalizes the frame's size header and returns it, ready to send.
    pub fn finish(self) -> Bytes {
        let mut buf = self.buf;
        let payload_len = (buf.len() - FRAME_HEADER_LEN) as u64;
        (&mut buf[2..FRAME_HEADER_LEN])
            .write_u64::<BigEndian>(payload_len)
            .expect("fixed-size header slice");
        buf.freeze()
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes the terminal `fin` frame carrying the job's abandonment reason
/// (`0` for a clean finish).
pub fn encode_fin(reason_code: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 1);
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u8(FRAME_TYPE_AS_MSG);
    buf.put_u64(1);
    buf.put_u8(reason_code);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_has_no_body() {
        let buf = ResponseBuffer::new();
        assert!(!buf.has_body());
        assert_eq!(buf.payload_len(), 0);
    }

    #[test]
    fn finish_writes_correct_payload_length() {
        let mut buf = ResponseBuffer::new();
        buf.push_partition_done(3, PARTITION_STATUS_OK);
        let expected_len = buf.payload_len() as u64;
        let frame = buf.finish();
        let encoded_len = (&frame[2..FRAME_HEADER_LEN])
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64);
        assert_eq!(encoded_len, expected_len);
        assert_eq!(frame.len(), FRAME_HEADER_LEN + expected_len as usize);
    }

    #[test]
    fn fin_frame_carries_reason_code() {
        let frame = encode_fin(6);
        assert_eq!(frame[FRAME_HEADER_LEN], 6);
    }
}
