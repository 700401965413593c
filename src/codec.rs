use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ConnError;
use crate::frame::Frame;
use crate::parser::{is_only_whitespace, parse_frame_slice, skip_blank_lines};

/// Content type stamped on every outgoing frame that does not name its own.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Serialize `frame` onto `dst` in wire format.
///
/// Writes the command line, the caller's headers in order, a synthesized
/// `content-length` equal to the body length and (unless the caller set
/// one) a `content-type`, a blank line, the body and a single NUL. A
/// caller-supplied `content-length` is replaced so the length always
/// matches the body.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.extend_from_slice(frame.command.as_bytes());
    dst.put_u8(b'\n');

    let mut has_content_type = false;
    for (k, v) in &frame.headers {
        if k.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if k.eq_ignore_ascii_case("content-type") {
            has_content_type = true;
        }
        dst.extend_from_slice(k.as_bytes());
        dst.put_u8(b':');
        dst.extend_from_slice(v.as_bytes());
        dst.put_u8(b'\n');
    }

    dst.extend_from_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
    if !has_content_type {
        dst.extend_from_slice(b"content-type:");
        dst.extend_from_slice(DEFAULT_CONTENT_TYPE.as_bytes());
        dst.put_u8(b'\n');
    }

    dst.put_u8(b'\n');
    dst.extend_from_slice(&frame.body);
    dst.put_u8(0);
}

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// wire protocol.
///
/// Decoding skips blank lines between frames, honours `content-length`
/// when present and otherwise reads the body up to the NUL terminator. A
/// stream that ends between frames is a clean end of stream; one that ends
/// inside a frame is a framing error.
pub struct StompCodec {
    // No internal buffer: we parse directly from the provided `src` buffer
}

impl StompCodec {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for StompCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StompCodec {
    type Item = Frame;
    type Error = ConnError;

    /// Decode bytes from `src` into a `Frame`.
    ///
    /// Returns
    /// - `Ok(Some(Frame))` when a full frame was decoded; its bytes are
    ///   consumed from `src`.
    /// - `Ok(None)` when more bytes are required. Only complete blank lines
    ///   are consumed in that case.
    /// - `Err(ConnError::Framing)` on malformed input.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let padding = skip_blank_lines(src.chunk());
        src.advance(padding);

        match parse_frame_slice(src.chunk()) {
            Ok(Some((frame, consumed))) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ConnError::Framing(e)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if is_only_whitespace(src.chunk()) => {
                src.clear();
                Ok(None)
            }
            None => Err(ConnError::Framing(format!(
                "stream ended inside a frame ({} bytes unparsed)",
                src.len()
            ))),
        }
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = ConnError;

    /// Encode a `Frame` into the destination buffer. Never fails.
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst);
        Ok(())
    }
}
