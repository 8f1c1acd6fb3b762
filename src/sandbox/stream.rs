//! Multiplexed output stream framing
//!
//! A container's combined output channel carries both stdio streams over one
//! byte stream: each frame is an 8-byte header (byte 0 selects the stream,
//! bytes 4-7 hold the big-endian payload length) followed by the payload.
//! Frames arrive split across arbitrary chunk boundaries, so the parser
//! buffers partial headers and payloads between pushes and only consumes a
//! frame once it is complete.

use bytes::{BufMut, Bytes, BytesMut};

/// Selector for the stdout stream
pub const STDOUT_SELECTOR: u8 = 1;

/// Selector for the stderr stream
pub const STDERR_SELECTOR: u8 = 2;

const HEADER_LEN: usize = 8;

/// Encode one frame on the wire format
pub fn encode_frame(selector: u8, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u8(selector);
    frame.put_bytes(0, 3);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}

/// Incremental demultiplexer for the framed output channel
#[derive(Debug, Default)]
pub struct FrameDemux {
    buf: BytesMut,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl FrameDemux {
    /// Create an empty demultiplexer
    pub fn new() -> Self {
        FrameDemux::default()
    }

    /// Feed one chunk of the raw stream, consuming any frames completed by it
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);

        while self.buf.len() >= HEADER_LEN {
            let payload_len =
                u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
            if self.buf.len() < HEADER_LEN + payload_len {
                break;
            }

            let frame = self.buf.split_to(HEADER_LEN + payload_len);
            let payload = &frame[HEADER_LEN..];
            match frame[0] {
                STDOUT_SELECTOR => self.stdout.extend_from_slice(payload),
                STDERR_SELECTOR => self.stderr.extend_from_slice(payload),
                // unknown selectors are discarded
                _ => {}
            }
        }
    }

    /// Finish, yielding the per-stream payload concatenations in delivery order
    pub fn into_streams(self) -> (Vec<u8>, Vec<u8>) {
        (self.stdout, self.stderr)
    }
}
