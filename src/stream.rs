//! Incremental, push-based decoding.
//!
//! [`StreamingDecoder`] accepts bytes in arbitrary chunks, for example
//! straight off a socket. It buffers just enough of the head to sniff the
//! format, then advances the matching codec's state machine chunk by
//! chunk. There is no requirement that a token or container arrive whole;
//! the JSON and CBOR machines resume mid-token.
//!
//! Formats without an incremental mode (Serenity, compressed or base64
//! frames) accumulate and decode when the stream completes, as the
//! original buffered pipeline does.

use bytes::BytesMut;

use crate::format::{self, DataFormat};
use crate::{cbor, json, Value};

#[derive(Debug)]
enum Inner {
    /// Buffering the head until the format can be sniffed.
    Sniff(BytesMut),
    Json(Box<json::Decoder>),
    Cbor(Box<cbor::Decoder>),
    /// No incremental mode; decode everything at the end.
    Buffered(BytesMut),
}

/// Push-based decoder over all supported formats.
///
/// # Example
///
/// ```
/// use sdon::{StreamingDecoder, EncodeFormat, Value, write};
///
/// let v = Value::from(vec![Value::from(1i64), Value::from(2i64)]);
/// let encoded = write(&v, EncodeFormat::CBOR);
///
/// let mut dec = StreamingDecoder::new();
/// for chunk in encoded.chunks(3) {
///     dec.feed(chunk);
/// }
/// assert_eq!(dec.finish(), v);
/// ```
#[derive(Debug)]
pub struct StreamingDecoder {
    inner: Inner,
}

impl StreamingDecoder {
    pub fn new() -> StreamingDecoder {
        StreamingDecoder {
            inner: Inner::Sniff(BytesMut::new()),
        }
    }

    /// Appends a chunk of the incoming stream.
    pub fn feed(&mut self, chunk: &[u8]) {
        match &mut self.inner {
            Inner::Sniff(buf) => {
                buf.extend_from_slice(chunk);
                // every magic prefix fits in four bytes
                if buf.len() >= 4 {
                    let head = std::mem::take(buf);
                    self.route(head);
                }
            }
            Inner::Json(dec) => dec.feed(chunk),
            Inner::Cbor(dec) => dec.feed(chunk),
            Inner::Buffered(buf) => buf.extend_from_slice(chunk),
        }
    }

    fn route(&mut self, head: BytesMut) {
        match format::detect_data_format(&head) {
            DataFormat::Json => {
                let mut dec = Box::new(json::Decoder::new());
                dec.feed(&head);
                self.inner = Inner::Json(dec);
            }
            DataFormat::Cbor => {
                let mut dec = Box::new(cbor::Decoder::new());
                dec.feed(&head);
                self.inner = Inner::Cbor(dec);
            }
            _ => self.inner = Inner::Buffered(head),
        }
    }

    /// Completes the stream and returns the accumulated value.
    pub fn finish(self) -> Value {
        match self.inner {
            // streams shorter than the sniff window decode in one shot
            Inner::Sniff(buf) | Inner::Buffered(buf) => format::read(&buf),
            Inner::Json(dec) => dec.finish(),
            Inner::Cbor(dec) => dec.finish(),
        }
    }
}

impl Default for StreamingDecoder {
    fn default() -> Self { StreamingDecoder::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{read, write, Compression, EncodeFormat};

    fn sample() -> Value {
        let mut v = Value::Null;
        v.set("chunked", "mode");
        v.set(vec![Value::from(1i64), Value::from(2.5f64)], "items");
        v.set(vec![0u8, 1, 2], "raw");
        v
    }

    fn drip(encoded: &[u8]) -> Value {
        let mut dec = StreamingDecoder::new();
        for b in encoded {
            dec.feed(std::slice::from_ref(b));
        }
        dec.finish()
    }

    #[test]
    fn byte_at_a_time_equals_one_shot() {
        let v = sample();
        for fmt in [
            EncodeFormat::JSON,
            EncodeFormat::PRETTY,
            EncodeFormat::CBOR,
            EncodeFormat::SERENITY,
        ] {
            let encoded = write(&v, fmt);
            assert_eq!(drip(&encoded), read(&encoded), "{:?}", fmt);
            assert_eq!(drip(&encoded), v, "{:?}", fmt);
        }
    }

    #[test]
    fn compressed_streams_buffer_until_finish() {
        let mut v = Value::Null;
        for i in 0..300i64 {
            v.add_integer(i % 10);
        }
        let encoded = write(&v, EncodeFormat::CBOR.with_compression(Compression::Lz4));
        assert_eq!(drip(&encoded), v);
    }

    #[test]
    fn tiny_streams_decode_at_finish() {
        let mut dec = StreamingDecoder::new();
        dec.feed(b"42");
        assert_eq!(dec.finish(), Value::Integer(42));

        assert_eq!(StreamingDecoder::new().finish(), Value::Null);
    }

    #[test]
    fn chunk_sizes_do_not_matter() {
        let v = sample();
        let encoded = write(&v, EncodeFormat::JSON);
        for size in [1, 2, 3, 7, 16, 1024] {
            let mut dec = StreamingDecoder::new();
            for chunk in encoded.chunks(size) {
                dec.feed(chunk);
            }
            assert_eq!(dec.finish(), v, "chunk size {}", size);
        }
    }
}
