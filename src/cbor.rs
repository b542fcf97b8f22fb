//! CBOR-subset codec.
//!
//! The wire format is the CBOR framing described in the
//! [crate docs](crate#cbor-subset): 3-bit major type, 5-bit additional
//! info, minimal-size integer and float encodings, definite and indefinite
//! containers, and the self-describe document prefix `d9 d9 f7`.
//!
//! The decoder is a push machine over an explicit frame stack: bytes can
//! arrive in arbitrary chunks and the state survives a cut at any point,
//! including the middle of a length prefix or a string body. Depth is
//! bounded by the heap, not the call stack.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use half::f16;
use smallvec::SmallVec;
use tracing::warn;

use crate::{Array, Dictionary, Value};

/// 0xe0
pub const MASK_MAJOR: u8 = 0b1110_0000;
/// 0x1f
pub const MASK_INFO: u8 = 0b0001_1111;

pub const MAJOR_UNSIGNED: u8 = 0 << 5;
pub const MAJOR_NEGATIVE: u8 = 1 << 5;
pub const MAJOR_BYTES: u8 = 2 << 5;
pub const MAJOR_STRING: u8 = 3 << 5;
pub const MAJOR_ARRAY: u8 = 4 << 5;
pub const MAJOR_MAP: u8 = 5 << 5;
pub const MAJOR_TAG: u8 = 6 << 5;
pub const MAJOR_SIMPLE: u8 = 7 << 5;

/// Additional info below this is an inline value.
pub const INFO_MAX_INLINE: u8 = 24;
pub const INFO_U8: u8 = 24;
pub const INFO_U16: u8 = 25;
pub const INFO_U32: u8 = 26;
pub const INFO_U64: u8 = 27;
pub const INFO_INDEFINITE: u8 = 31;

pub const SIMPLE_FALSE: u8 = 20;
pub const SIMPLE_TRUE: u8 = 21;
pub const SIMPLE_NULL: u8 = 22;
pub const SIMPLE_UNDEFINED: u8 = 23;
pub const SIMPLE_EIGHT_BIT: u8 = 24;
pub const SIMPLE_FLOAT16: u8 = 25;
pub const SIMPLE_FLOAT32: u8 = 26;
pub const SIMPLE_FLOAT64: u8 = 27;

/// The break byte terminating indefinite-length items, 0xff.
pub const BREAK: u8 = MAJOR_SIMPLE | INFO_INDEFINITE;

/// Self-describe CBOR document prefix.
pub const DOCUMENT_PREFIX: [u8; 3] = [0xd9, 0xd9, 0xf7];

fn write_head(out: &mut Vec<u8>, major: u8, value: u64) {
    if value < INFO_MAX_INLINE as u64 {
        out.push(major | value as u8);
    } else if value <= u8::MAX as u64 {
        out.push(major | INFO_U8);
        out.push(value as u8);
    } else if value <= u16::MAX as u64 {
        out.push(major | INFO_U16);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        out.push(major | INFO_U32);
        out.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        out.push(major | INFO_U64);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn write_integer(out: &mut Vec<u8>, value: i64) {
    if value >= 0 {
        write_head(out, MAJOR_UNSIGNED, value as u64);
    } else {
        write_head(out, MAJOR_NEGATIVE, (-(value + 1)) as u64);
    }
}

fn write_f16(out: &mut Vec<u8>, bits: u16) {
    out.push(MAJOR_SIMPLE | SIMPLE_FLOAT16);
    out.extend_from_slice(&bits.to_be_bytes());
}

fn write_f32(out: &mut Vec<u8>, value: f32) {
    out.push(MAJOR_SIMPLE | SIMPLE_FLOAT32);
    out.extend_from_slice(&value.to_bits().to_be_bytes());
}

fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.push(MAJOR_SIMPLE | SIMPLE_FLOAT64);
    out.extend_from_slice(&value.to_bits().to_be_bytes());
}

/// Writes `value` at the smallest IEEE 754 width that round-trips.
///
/// Half precision is attempted first via the mantissa/exponent bit test
/// (normal, denormal and infinite cases), then single, then double. NaN is
/// always the canonical half-precision NaN.
fn write_double(out: &mut Vec<u8>, value: f64) {
    let single = value as f32;
    if value.is_nan() {
        write_f16(out, 0x7e00);
    } else if value == f64::INFINITY {
        write_f16(out, 0x7c00);
    } else if value == f64::NEG_INFINITY {
        write_f16(out, 0xfc00);
    } else if f64::from(single) == value {
        // 32 bits is enough; check whether half would also round-trip
        let bits = single.to_bits();
        if bits & 0x1fff == 0 {
            let mut half = ((bits >> 16) & 0x8000) as i32;
            let exp = ((bits >> 23) & 0xff) as i32;
            let mant = (bits & 0x7f_ffff) as i32;
            if exp == 0 && mant == 0 {
                // ±0.0
            } else if (113..=142).contains(&exp) {
                // normalized
                half += ((exp - 112) << 10) + (mant >> 13);
            } else if (103..113).contains(&exp) {
                // denormal half, exp16 = 0
                if mant & ((1 << (126 - exp)) - 1) != 0 {
                    write_f32(out, single);
                    return;
                }
                half += (mant + 0x80_0000) >> (126 - exp);
            } else if exp == 255 && mant == 0 {
                half += 0x7c00;
            } else {
                write_f32(out, single);
                return;
            }
            write_f16(out, half as u16);
        } else {
            write_f32(out, single);
        }
    } else {
        write_f64(out, value);
    }
}

/// Encodes a single item (no document prefix) into `out`.
pub fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(MAJOR_SIMPLE | SIMPLE_NULL),
        Value::Bool(true) => out.push(MAJOR_SIMPLE | SIMPLE_TRUE),
        Value::Bool(false) => out.push(MAJOR_SIMPLE | SIMPLE_FALSE),
        Value::Integer(i) => write_integer(out, *i),
        Value::Double(d) => write_double(out, *d),
        Value::String(s) => {
            write_head(out, MAJOR_STRING, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            write_head(out, MAJOR_BYTES, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::Array(a) => {
            write_head(out, MAJOR_ARRAY, a.len() as u64);
            for item in a {
                encode(item, out);
            }
        }
        Value::Dictionary(d) => {
            write_head(out, MAJOR_MAP, d.len() as u64);
            for (key, item) in d {
                write_head(out, MAJOR_STRING, key.len() as u64);
                out.extend_from_slice(key.as_bytes());
                encode(item, out);
            }
        }
    }
}

/// Encodes a full document: the `d9 d9 f7` prefix followed by the value.
pub fn encode_full(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&DOCUMENT_PREFIX);
    encode(value, &mut out);
    out
}

/// Decodes a document produced by [`encode_full`]. Input without the
/// document prefix yields [`Value::Null`].
pub fn decode(bytes: &[u8]) -> Value {
    let mut dec = Decoder::new();
    dec.feed(bytes);
    dec.finish()
}

#[derive(Debug)]
enum Frame {
    Array {
        items: Array,
        // None for indefinite length
        remaining: Option<u64>,
    },
    Dict {
        map: Dictionary,
        key: Option<String>,
        skip: bool,
        remaining: Option<u64>,
    },
}

impl Frame {
    fn into_value(self) -> Value {
        match self {
            Frame::Array { items, .. } => Value::Array(items),
            Frame::Dict { map, .. } => Value::Dictionary(map),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Literal {
    /// Consuming the 3-byte document prefix.
    Prefix,
    /// Waiting for a head byte.
    None,
    /// Multi-byte head argument for `major`.
    HeadArg { major: u8 },
    /// Definite-length string/byte-string body for `major`.
    Body { major: u8 },
    /// Float payload of the given width.
    Float,
    /// 8-bit simple value payload.
    Simple8,
}

/// Push-based CBOR decoder.
///
/// Feed byte chunks of any size with [`feed`](Decoder::feed); collect the
/// result with [`finish`](Decoder::finish). Malformed input stops the
/// machine and keeps the tree built so far.
#[derive(Debug)]
pub struct Decoder {
    literal: Literal,
    /// Bytes accumulated for the pending literal.
    buf: Vec<u8>,
    /// Bytes still needed to complete the pending literal.
    need: usize,
    /// Active indefinite-length string: target major type and accumulated
    /// chunks.
    sequence: Option<(u8, Vec<u8>)>,
    stack: SmallVec<[Frame; 8]>,
    root: Option<Value>,
    done: bool,
}

impl Default for Decoder {
    fn default() -> Self { Decoder::new() }
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder {
            literal: Literal::Prefix,
            buf: Vec::new(),
            need: 3,
            sequence: None,
            stack: SmallVec::new(),
            root: None,
            done: false,
        }
    }

    /// True once a complete document (or a hard decoding stop) was seen.
    pub fn is_done(&self) -> bool { self.done }

    /// Consumes a chunk. Bytes after the end of the document are ignored.
    pub fn feed(&mut self, mut input: &[u8]) {
        while !input.is_empty() && !self.done {
            match self.literal {
                Literal::Prefix | Literal::HeadArg { .. } | Literal::Float | Literal::Simple8 => {
                    let take = self.need.min(input.len());
                    self.buf.extend_from_slice(&input[..take]);
                    self.need -= take;
                    input = &input[take..];
                    if self.need == 0 {
                        self.finish_literal();
                    }
                }
                Literal::Body { major } => {
                    let take = self.need.min(input.len());
                    self.buf.extend_from_slice(&input[..take]);
                    self.need -= take;
                    input = &input[take..];
                    if self.need == 0 {
                        let body = std::mem::take(&mut self.buf);
                        self.literal = Literal::None;
                        self.finish_string(major, body);
                    }
                }
                Literal::None => {
                    let head = input[0];
                    input = &input[1..];
                    self.dispatch_head(head);
                }
            }
        }
    }

    /// Returns the decoded value, or the well-formed part of the tree when
    /// the input was truncated. Undecodable input yields [`Value::Null`].
    pub fn finish(mut self) -> Value {
        // unwind unterminated containers, innermost first
        while let Some(frame) = self.stack.pop() {
            let value = frame.into_value();
            self.attach(value);
        }
        self.root.take().unwrap_or(Value::Null)
    }

    fn finish_literal(&mut self) {
        let bytes = std::mem::take(&mut self.buf);
        match self.literal {
            Literal::Prefix => {
                if bytes == DOCUMENT_PREFIX {
                    self.literal = Literal::None;
                } else {
                    warn!("missing CBOR document prefix");
                    self.done = true;
                }
            }
            Literal::HeadArg { major } => {
                self.literal = Literal::None;
                let value = read_be(&bytes);
                self.dispatch_item(major, value);
            }
            Literal::Float => {
                self.literal = Literal::None;
                let value = match bytes.len() {
                    2 => f16::from_bits(u16::from_be_bytes([bytes[0], bytes[1]])).to_f64(),
                    4 => f64::from(f32::from_bits(read_be(&bytes) as u32)),
                    _ => f64::from_bits(read_be(&bytes)),
                };
                self.complete(Value::Double(value));
            }
            Literal::Simple8 => {
                self.literal = Literal::None;
                self.complete(Value::Integer(bytes[0] as i64));
            }
            Literal::None | Literal::Body { .. } => {}
        }
    }

    fn dispatch_head(&mut self, head: u8) {
        let major = head & MASK_MAJOR;
        let info = head & MASK_INFO;

        // inside an indefinite string only matching chunks and the break
        // byte are structurally valid
        if let Some(seq_major) = self.sequence.as_ref().map(|(m, _)| *m) {
            if head == BREAK {
                let (_, data) = self.sequence.take().unwrap_or((0, Vec::new()));
                self.finish_sequence(seq_major, data);
                return;
            }
            if major != seq_major || info == INFO_INDEFINITE {
                warn!("malformed indefinite-length string chunk");
                let (_, data) = self.sequence.take().unwrap_or((0, Vec::new()));
                self.finish_sequence(seq_major, data);
                return;
            }
        }

        if head == BREAK {
            self.close_indefinite();
            return;
        }

        match info {
            i if i < INFO_MAX_INLINE => match major {
                MAJOR_SIMPLE => self.dispatch_simple(info),
                _ => self.dispatch_item(major, info as u64),
            },
            INFO_U8 if major == MAJOR_SIMPLE => self.begin_fixed(Literal::Simple8, 1),
            INFO_U16 if major == MAJOR_SIMPLE => self.begin_fixed(Literal::Float, 2),
            INFO_U32 if major == MAJOR_SIMPLE => self.begin_fixed(Literal::Float, 4),
            INFO_U64 if major == MAJOR_SIMPLE => self.begin_fixed(Literal::Float, 8),
            INFO_U8 => self.begin_fixed(Literal::HeadArg { major }, 1),
            INFO_U16 => self.begin_fixed(Literal::HeadArg { major }, 2),
            INFO_U32 => self.begin_fixed(Literal::HeadArg { major }, 4),
            INFO_U64 => self.begin_fixed(Literal::HeadArg { major }, 8),
            INFO_INDEFINITE => match major {
                MAJOR_BYTES | MAJOR_STRING => {
                    self.sequence = Some((major, Vec::new()));
                }
                MAJOR_ARRAY => self.stack.push(Frame::Array {
                    items: Array::new(),
                    remaining: None,
                }),
                MAJOR_MAP => self.stack.push(Frame::Dict {
                    map: Dictionary::new(),
                    key: None,
                    skip: false,
                    remaining: None,
                }),
                _ => {
                    warn!("indefinite length on a non-container major type");
                    self.done = true;
                }
            },
            _ => {
                // 28-30 are unassigned
                warn!("reserved additional info {}", info);
                self.done = true;
            }
        }
    }

    fn begin_fixed(&mut self, literal: Literal, need: usize) {
        self.literal = literal;
        self.need = need;
        self.buf.clear();
    }

    fn dispatch_simple(&mut self, info: u8) {
        match info {
            SIMPLE_FALSE => self.complete(Value::Bool(false)),
            SIMPLE_TRUE => self.complete(Value::Bool(true)),
            SIMPLE_NULL | SIMPLE_UNDEFINED => self.complete(Value::Null),
            _ => self.complete(Value::Integer(info as i64)),
        }
    }

    fn dispatch_item(&mut self, major: u8, value: u64) {
        match major {
            MAJOR_UNSIGNED => self.complete(Value::Integer(value as i64)),
            MAJOR_NEGATIVE => self.complete(Value::Integer((-1i64).wrapping_sub(value as i64))),
            MAJOR_BYTES | MAJOR_STRING => {
                if value == 0 {
                    self.finish_string(major, Vec::new());
                } else {
                    self.literal = Literal::Body { major };
                    self.need = value as usize;
                    self.buf = Vec::with_capacity((value as usize).min(4096));
                }
            }
            MAJOR_ARRAY => {
                if value == 0 {
                    self.complete(Value::Array(Array::new()));
                } else {
                    self.stack.push(Frame::Array {
                        items: Array::with_capacity((value as usize).min(4096)),
                        remaining: Some(value),
                    });
                }
            }
            MAJOR_MAP => {
                if value == 0 {
                    self.complete(Value::Dictionary(Dictionary::new()));
                } else {
                    self.stack.push(Frame::Dict {
                        map: Dictionary::new(),
                        key: None,
                        skip: false,
                        remaining: Some(value),
                    });
                }
            }
            // the tag number is read and discarded; the tagged item is
            // transparent
            MAJOR_TAG => {}
            _ => {
                warn!("unhandled major type {:#04x}", major);
                self.done = true;
            }
        }
    }

    /// A definite-length string body (or chunk) completed.
    fn finish_string(&mut self, major: u8, body: Vec<u8>) {
        if let Some((_, data)) = self.sequence.as_mut() {
            data.extend_from_slice(&body);
            return;
        }
        self.complete(string_value(major, body));
    }

    /// The break byte ended an indefinite string.
    fn finish_sequence(&mut self, major: u8, data: Vec<u8>) {
        self.complete(string_value(major, data));
    }

    /// The break byte ended an indefinite container.
    fn close_indefinite(&mut self) {
        match self.stack.pop() {
            Some(frame) => {
                let value = frame.into_value();
                self.complete(value);
            }
            None => {
                warn!("break byte outside of any container");
                self.done = true;
            }
        }
    }

    /// Routes a completed item into the enclosing container, closing
    /// definite-length containers (and their parents) as they fill up.
    fn complete(&mut self, value: Value) {
        let mut value = Some(value);
        while let Some(v) = value.take() {
            let mut filled = false;
            match self.stack.last_mut() {
                None => {
                    self.root = Some(v);
                    self.done = true;
                }
                Some(Frame::Array { items, remaining }) => {
                    items.push(v);
                    if let Some(n) = remaining {
                        *n -= 1;
                        filled = *n == 0;
                    }
                }
                Some(Frame::Dict {
                    map,
                    key,
                    skip,
                    remaining,
                }) => {
                    if key.is_none() && !*skip {
                        // a pair starts: the item is the key
                        let k = key_string(&v);
                        if k.is_empty() {
                            // undecodable key, drop the whole entry
                            *skip = true;
                        } else {
                            *key = Some(k);
                        }
                    } else {
                        if let Some(k) = key.take() {
                            map.insert(k, v);
                        }
                        *skip = false;
                        if let Some(n) = remaining {
                            *n -= 1;
                            filled = *n == 0;
                        }
                    }
                }
            }
            if filled {
                value = self.stack.pop().map(Frame::into_value);
            }
        }
    }

    fn attach(&mut self, value: Value) {
        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(value);
                }
            }
            Some(Frame::Array { items, .. }) => items.push(value),
            Some(Frame::Dict { map, key, .. }) => {
                if let Some(k) = key.take() {
                    map.insert(k, value);
                }
            }
        }
    }
}

fn string_value(major: u8, body: Vec<u8>) -> Value {
    if major == MAJOR_BYTES {
        Value::Bytes(body)
    } else {
        match String::from_utf8(body) {
            Ok(s) => Value::String(s),
            // keep invalid UTF-8 as a byte-string instead of dropping it
            Err(e) => Value::Bytes(e.into_bytes()),
        }
    }
}

/// Non-string map keys are stringified; keys nothing can be made of
/// produce an empty string, which skips the entry.
fn key_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bytes(b) => STANDARD.encode(b),
        Value::Integer(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Bool(true) => "true".to_owned(),
        Value::Bool(false) => "false".to_owned(),
        _ => String::new(),
    }
}

fn read_be(bytes: &[u8]) -> u64 {
    let mut out = 0u64;
    for b in bytes {
        out = out << 8 | *b as u64;
    }
    out
}
