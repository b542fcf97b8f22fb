//! Serenity text format codec.
//!
//! The grammar is small but positional: `(k1:v1;k2:v2)` is a dictionary,
//! `~(a,b,c)` an array, `~token` a percent-encoded byte-string, and bare
//! tokens are typed by a fixed literal table. The decoder's hardest case is
//! the "plain list": an un-bracketed comma-separated run whose final shape
//! is unknown until parsing resolves it. It becomes an array on the first
//! `,`, and converts retroactively into a dictionary when an element turns
//! out to be followed by `:`.
//!
//! The decoder is an explicit stack of typed frames, one per in-progress
//! container or undetermined slot. Errors never surface: an invalid token
//! stops the machine and the tree built so far is returned.

use smallvec::SmallVec;
use tracing::warn;

use crate::{Array, Dictionary, Value};

/// Whether a byte must be `%XX`-escaped in Serenity output.
///
/// Control bytes and everything past 0x7e are always escaped; within the
/// printable range the table below marks the reserved characters.
pub fn should_encode_percent(b: u8) -> bool {
    #[rustfmt::skip]
    static TABLE: [u8; 96] = [
        // space ! " # $ % & ' ( ) * + , - . /
        1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 0, 1, 0, 0, 0,
        // 0-9 : ; < = > ?
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 0,
        // @ A-O
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        // P-Z [ \ ] ^ _
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 0,
        // ` a-o
        1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        // p-z { | } ~ del
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1,
    ];
    if (0x20..0x80).contains(&b) {
        TABLE[b as usize - 0x20] != 0
    } else {
        true
    }
}

fn percent_encode_into(out: &mut String, bytes: &[u8]) {
    for &b in bytes {
        if should_encode_percent(b) {
            out.push('%');
            out.push_str(&format!("{:02X}", b));
        } else {
            out.push(b as char);
        }
    }
}

fn hex_val(b: u8) -> Option<u8> { (b as char).to_digit(16).map(|d| d as u8) }

/// Percent-decodes a token into raw bytes; malformed escapes pass through
/// literally.
fn percent_decode(token: &str) -> Vec<u8> {
    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_val),
                bytes.get(i + 2).copied().and_then(hex_val),
            ) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn decode_string(token: &str) -> String {
    String::from_utf8_lossy(&percent_decode(token)).into_owned()
}

/// Types a bare token via the literal table.
fn plain_value(token: &str) -> Value {
    match token {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        "nan" => return Value::Double(f64::NAN),
        "inf" | "+inf" => return Value::Double(f64::INFINITY),
        "-inf" => return Value::Double(f64::NEG_INFINITY),
        _ => {}
    }
    if let Some(rest) = token.strip_prefix('~') {
        return Value::Bytes(percent_decode(rest));
    }
    if token
        .bytes()
        .next()
        .map_or(false, |b| matches!(b, b'0'..=b'9' | b'+' | b'-'))
    {
        let is_float = token.bytes().any(|b| matches!(b, b'.' | b'e' | b'E'));
        if !is_float {
            if let Ok(i) = token.parse::<i64>() {
                return Value::Integer(i);
            }
        }
        if let Ok(d) = token.parse::<f64>() {
            return Value::Double(d);
        }
    }
    Value::String(decode_string(token))
}

/// Token characters that may start a dictionary key.
fn is_key_start(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'/' | b'?' | b'@' | b'-' | b'.' | b'_' | b'!' | b'$' | b'\'' | b'*' | b'+' | b'%'
        )
}

fn is_token_byte(b: u8) -> bool {
    !matches!(b, b'~' | b':' | b',' | b';' | b'(' | b')') && !b.is_ascii_whitespace()
}

#[derive(Debug)]
enum Frame {
    /// `( ... )` whose shape is still unknown.
    Generic { bracketed: bool },
    Array { items: Array, bracketed: bool },
    Dict {
        map: Dictionary,
        key: Option<String>,
        bracketed: bool,
    },
    /// A dictionary value slot right after `key:`.
    Plain,
    /// A comma-promoted plain list.
    PlainList { items: Array },
    /// A dictionary value slot holding a completed nested group, which a
    /// following `,` may still fold into a list.
    PlainStop { value: Option<Value> },
}

impl Frame {
    fn into_value(self) -> Value {
        match self {
            Frame::Generic { .. } | Frame::Plain => Value::Null,
            Frame::Array { items, .. } => Value::Array(items),
            Frame::Dict { mut map, key, .. } => {
                if let Some(k) = key {
                    map.insert(k, Value::Null);
                }
                Value::Dictionary(map)
            }
            Frame::PlainList { items } => Value::Array(items),
            Frame::PlainStop { value } => value.unwrap_or(Value::Null),
        }
    }
}

struct Decoder<'a> {
    s: &'a [u8],
    i: usize,
    stack: SmallVec<[Frame; 8]>,
    root: Option<Value>,
    stop: bool,
}

/// Decodes a Serenity document. Undecodable input yields [`Value::Null`].
pub fn decode(input: &[u8]) -> Value {
    let text = String::from_utf8_lossy(input);
    Decoder::new(text.as_bytes()).parse()
}

impl<'a> Decoder<'a> {
    fn new(s: &'a [u8]) -> Decoder<'a> {
        Decoder {
            s,
            i: 0,
            stack: SmallVec::new(),
            root: None,
            stop: false,
        }
    }

    fn skip_ws(&mut self) {
        while self.i < self.s.len() && self.s[self.i].is_ascii_whitespace() {
            self.i += 1;
        }
    }

    fn peek(&self) -> Option<u8> { self.s.get(self.i).copied() }

    fn at_tilde_paren(&self) -> bool { self.s[self.i..].starts_with(b"~(") }

    fn eat(&mut self, n: usize) { self.i += n; }

    /// Reads one token: a leading `~` (byte-string marker) plus any run of
    /// token characters.
    fn read_token(&mut self) -> &'a str {
        let start = self.i;
        if self.peek() == Some(b'~') && !self.at_tilde_paren() {
            self.i += 1;
        }
        while self.i < self.s.len() && is_token_byte(self.s[self.i]) {
            self.i += 1;
        }
        // the cursor only ever stops at ASCII, so the slice stays valid
        // UTF-8; from_utf8_lossy already sanitized the input
        std::str::from_utf8(&self.s[start..self.i]).unwrap_or("")
    }

    /// Routes a completed value into the frame that owns the slot.
    fn complete(&mut self, value: Value) {
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
            Some(Frame::PlainList { items }) => items.push(value),
            Some(Frame::PlainStop { value: slot }) => *slot = Some(value),
            Some(Frame::Generic { .. } | Frame::Plain) => {
                // generics and plain slots never receive child values
                // directly; they morph into the matching frame first
            }
        }
    }

    fn pop_complete(&mut self, value: Value) {
        self.stack.pop();
        self.complete(value);
    }

    fn replace_top(&mut self, frame: Frame) {
        if let Some(top) = self.stack.last_mut() {
            *top = frame;
        }
    }

    /// Converts collected plain-list elements into dictionary keys mapped
    /// to `true`.
    fn promote_to_keys(items: Array) -> Dictionary {
        let mut map = Dictionary::new();
        for item in items {
            let key = item.as_string();
            if key.is_empty() {
                warn!("invalid token within promoted list");
            } else {
                map.insert(key, Value::Bool(true));
            }
        }
        map
    }

    fn parse(mut self) -> Value {
        self.skip_ws();
        if self.at_tilde_paren() {
            self.eat(2);
            self.stack.push(Frame::Generic { bracketed: true });
        } else if self.peek() == Some(b'(') {
            self.eat(1);
            self.stack.push(Frame::Generic { bracketed: true });
        } else {
            self.stack.push(Frame::Generic { bracketed: false });
        }

        while !self.stop && !self.stack.is_empty() {
            self.skip_ws();
            if self.i >= self.s.len() {
                break;
            }
            match self.stack.last() {
                Some(Frame::Generic { .. }) => self.step_generic(),
                Some(Frame::Array { .. }) => self.step_array(),
                Some(Frame::Dict { .. }) => self.step_dict(),
                Some(Frame::Plain) => self.step_plain(),
                Some(Frame::PlainList { .. }) => self.step_plain_list(),
                Some(Frame::PlainStop { .. }) => self.step_plain_stop(),
                None => break,
            }
        }

        // unwind whatever is still open, innermost first
        while let Some(frame) = self.stack.pop() {
            let value = frame.into_value();
            self.complete(value);
        }
        self.root.take().unwrap_or(Value::Null)
    }

    fn bracketed(&self) -> bool {
        match self.stack.last() {
            Some(Frame::Generic { bracketed })
            | Some(Frame::Array { bracketed, .. })
            | Some(Frame::Dict { bracketed, .. }) => *bracketed,
            _ => false,
        }
    }

    fn step_generic(&mut self) {
        let bracketed = self.bracketed();
        match self.peek() {
            Some(b')') => {
                self.stack.pop();
                if bracketed {
                    self.eat(1);
                }
                self.complete(Value::Null);
            }
            Some(b'(') => {
                // a group opening inside a group: this is an array of
                // groups
                self.eat(1);
                self.replace_top(Frame::Array {
                    items: Array::new(),
                    bracketed,
                });
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ if self.at_tilde_paren() => {
                self.eat(2);
                self.replace_top(Frame::Array {
                    items: Array::new(),
                    bracketed,
                });
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ => {
                let token = self.read_token();
                if token.is_empty() && self.peek() != Some(b':') {
                    self.stack.pop();
                    self.complete(Value::Null);
                    return;
                }
                self.skip_ws();
                match self.peek() {
                    Some(b':') => {
                        self.eat(1);
                        self.replace_top(Frame::Dict {
                            map: Dictionary::new(),
                            key: Some(decode_string(token)),
                            bracketed,
                        });
                        self.stack.push(Frame::Plain);
                    }
                    Some(b',') | Some(b';') => {
                        self.replace_top(Frame::Array {
                            items: vec![plain_value(token)],
                            bracketed,
                        });
                    }
                    Some(b'(') => {
                        self.eat(1);
                        self.replace_top(Frame::Dict {
                            map: Dictionary::new(),
                            key: Some(decode_string(token)),
                            bracketed,
                        });
                        self.stack.push(Frame::Generic { bracketed: true });
                    }
                    Some(b')') => {
                        self.stack.pop();
                        if bracketed {
                            self.eat(1);
                        }
                        self.complete(plain_value(token));
                    }
                    None => {
                        self.stack.pop();
                        self.complete(plain_value(token));
                    }
                    _ if self.at_tilde_paren() => {
                        self.eat(2);
                        self.replace_top(Frame::Dict {
                            map: Dictionary::new(),
                            key: Some(decode_string(token)),
                            bracketed,
                        });
                        self.stack.push(Frame::Generic { bracketed: true });
                    }
                    _ => {
                        warn!("invalid token in value group");
                        self.stop = true;
                    }
                }
            }
        }
    }

    fn step_array(&mut self) {
        let bracketed = self.bracketed();
        match self.peek() {
            Some(b')') => {
                if let Some(frame) = self.stack.pop() {
                    if bracketed {
                        self.eat(1);
                    }
                    let value = frame.into_value();
                    self.complete(value);
                }
            }
            Some(b';') | Some(b',') => self.eat(1),
            Some(b'(') => {
                self.eat(1);
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ if self.at_tilde_paren() => {
                self.eat(2);
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ => {
                let token = self.read_token();
                self.skip_ws();
                if token.is_empty() && self.peek() != Some(b':') {
                    // unreadable byte; step over it
                    self.eat(1);
                    return;
                }
                match self.peek() {
                    Some(b':') => {
                        // an element followed by ':' converts the whole
                        // list into a dictionary
                        self.eat(1);
                        if let Some(Frame::Array { items, bracketed }) = self.stack.pop() {
                            self.stack.push(Frame::Dict {
                                map: Self::promote_to_keys(items),
                                key: Some(decode_string(token)),
                                bracketed,
                            });
                            self.stack.push(Frame::Plain);
                        }
                    }
                    Some(b'(') => {
                        self.eat(1);
                        if let Some(Frame::Array { items, bracketed }) = self.stack.pop() {
                            self.stack.push(Frame::Dict {
                                map: Self::promote_to_keys(items),
                                key: Some(decode_string(token)),
                                bracketed,
                            });
                            self.stack.push(Frame::Generic { bracketed: true });
                        }
                    }
                    _ if self.at_tilde_paren() => {
                        self.eat(2);
                        if let Some(Frame::Array { items, bracketed }) = self.stack.pop() {
                            self.stack.push(Frame::Dict {
                                map: Self::promote_to_keys(items),
                                key: Some(decode_string(token)),
                                bracketed,
                            });
                            self.stack.push(Frame::Generic { bracketed: true });
                        }
                    }
                    _ => {
                        if let Some(Frame::Array { items, .. }) = self.stack.last_mut() {
                            items.push(plain_value(token));
                        }
                    }
                }
            }
        }
    }

    fn step_dict(&mut self) {
        let bracketed = self.bracketed();
        match self.peek() {
            Some(b')') => {
                if let Some(frame) = self.stack.pop() {
                    if bracketed {
                        self.eat(1);
                    }
                    let value = frame.into_value();
                    self.complete(value);
                }
            }
            Some(b';') | Some(b',') => self.eat(1),
            Some(b) if is_key_start(b) => {
                let token = self.read_token();
                self.skip_ws();
                let key = decode_string(token);
                match self.peek() {
                    Some(b':') => {
                        self.eat(1);
                        if let Some(Frame::Dict { key: slot, .. }) = self.stack.last_mut() {
                            *slot = Some(key);
                        }
                        self.stack.push(Frame::Plain);
                    }
                    Some(b'(') => {
                        self.eat(1);
                        if let Some(Frame::Dict { key: slot, .. }) = self.stack.last_mut() {
                            *slot = Some(key);
                        }
                        self.stack.push(Frame::Generic { bracketed: true });
                    }
                    Some(b';') | Some(b',') | Some(b')') | None => {
                        // a bare key reads as a true flag
                        if let Some(Frame::Dict { map, .. }) = self.stack.last_mut() {
                            map.insert(key, Value::Bool(true));
                        }
                    }
                    _ if self.at_tilde_paren() => {
                        self.eat(2);
                        if let Some(Frame::Dict { key: slot, .. }) = self.stack.last_mut() {
                            *slot = Some(key);
                        }
                        self.stack.push(Frame::Generic { bracketed: true });
                    }
                    _ => {
                        warn!("invalid token after dictionary key");
                        self.stop = true;
                    }
                }
            }
            _ => {
                warn!("invalid dictionary key");
                self.stop = true;
            }
        }
    }

    fn step_plain(&mut self) {
        match self.peek() {
            Some(b')') | Some(b';') => self.pop_complete(Value::Null),
            Some(b',') => {
                self.replace_top(Frame::PlainList {
                    items: vec![Value::Null],
                });
            }
            Some(b'(') => {
                self.eat(1);
                self.replace_top(Frame::PlainStop { value: None });
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ if self.at_tilde_paren() => {
                self.eat(2);
                self.replace_top(Frame::PlainStop { value: None });
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ => {
                let token = self.read_token();
                self.skip_ws();
                if token.is_empty() {
                    warn!("empty token in value position");
                    self.stop = true;
                    return;
                }
                match self.peek() {
                    Some(b':') => {
                        warn!("colon inside a plain value");
                        self.stop = true;
                    }
                    Some(b'(') => {
                        // `key:sub(...)`: the slot becomes a nested
                        // dictionary keyed by the token
                        self.eat(1);
                        self.replace_top(Frame::Dict {
                            map: Dictionary::new(),
                            key: Some(decode_string(token)),
                            bracketed: false,
                        });
                        self.stack.push(Frame::Generic { bracketed: true });
                    }
                    Some(b',') => {
                        self.replace_top(Frame::PlainList {
                            items: vec![plain_value(token)],
                        });
                    }
                    Some(b')') | Some(b';') | None => self.pop_complete(plain_value(token)),
                    _ if self.at_tilde_paren() => {
                        self.eat(2);
                        self.replace_top(Frame::Dict {
                            map: Dictionary::new(),
                            key: Some(decode_string(token)),
                            bracketed: false,
                        });
                        self.stack.push(Frame::Generic { bracketed: true });
                    }
                    _ => {
                        warn!("invalid token in plain value");
                        self.stop = true;
                    }
                }
            }
        }
    }

    fn step_plain_list(&mut self) {
        match self.peek() {
            Some(b')') | Some(b';') => {
                if let Some(frame) = self.stack.pop() {
                    let value = frame.into_value();
                    self.complete(value);
                }
            }
            Some(b',') => self.eat(1),
            Some(b'(') => {
                self.eat(1);
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ if self.at_tilde_paren() => {
                self.eat(2);
                self.stack.push(Frame::Generic { bracketed: true });
            }
            _ => {
                let token = self.read_token();
                self.skip_ws();
                if token.is_empty() && self.peek() != Some(b':') {
                    self.eat(1);
                    return;
                }
                match self.peek() {
                    Some(b':') => {
                        // the element is really the next key of the parent
                        // dictionary; the list so far stays with the old
                        // key, unwrapped again when it never grew past one
                        // element
                        self.eat(1);
                        if let Some(frame) = self.stack.pop() {
                            let value = match frame.into_value() {
                                Value::Array(mut items) if items.len() == 1 => {
                                    items.pop().unwrap_or(Value::Null)
                                }
                                other => other,
                            };
                            self.complete(value);
                        }
                        match self.stack.last_mut() {
                            Some(Frame::Dict { key: slot, .. }) => {
                                *slot = Some(decode_string(token));
                                self.stack.push(Frame::Plain);
                            }
                            _ => {
                                warn!("colon outside of a dictionary");
                                self.stop = true;
                            }
                        }
                    }
                    Some(b'(') if !self.at_tilde_paren() => {
                        self.eat(1);
                        if let Some(Frame::PlainList { items }) = self.stack.pop() {
                            self.stack.push(Frame::Dict {
                                map: Self::promote_to_keys(items),
                                key: Some(decode_string(token)),
                                bracketed: false,
                            });
                            self.stack.push(Frame::Generic { bracketed: true });
                        }
                    }
                    _ => {
                        if let Some(Frame::PlainList { items }) = self.stack.last_mut() {
                            items.push(plain_value(token));
                        }
                    }
                }
            }
        }
    }

    fn step_plain_stop(&mut self) {
        match self.peek() {
            Some(b')') | Some(b';') => {
                if let Some(frame) = self.stack.pop() {
                    let value = frame.into_value();
                    self.complete(value);
                }
            }
            Some(b',') => {
                if let Some(Frame::PlainStop { value }) = self.stack.pop() {
                    self.stack.push(Frame::PlainList {
                        items: vec![value.unwrap_or(Value::Null)],
                    });
                }
            }
            Some(b) if is_key_start(b) => {
                if let Some(frame) = self.stack.pop() {
                    let value = frame.into_value();
                    self.complete(value);
                }
            }
            _ => {
                warn!("invalid token after nested value");
                self.stop = true;
            }
        }
    }
}

/// Encodes a value in Serenity syntax, the syntactic mirror of
/// [`decode`].
pub fn encode(value: &Value, pretty: bool) -> String {
    let mut out = String::new();
    write_value(&mut out, value, pretty, 0);
    out
}

fn is_plain_scalar_array(a: &Array) -> bool { a.iter().all(|v| !v.is_dictionary()) }

fn write_value(out: &mut String, value: &Value, pretty: bool, depth: usize) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Double(d) => write_double(out, *d),
        Value::String(s) => percent_encode_into(out, s.as_bytes()),
        Value::Bytes(b) => {
            out.push('~');
            percent_encode_into(out, b);
        }
        Value::Array(a) => {
            // short scalar runs are written plain, which is what the
            // decoder regenerates them from
            if a.len() == 1 && is_plain_scalar_array(a) {
                write_value(out, &a[0], pretty, depth);
            } else if a.is_empty() {
                out.push_str("~()");
            } else {
                out.push_str("~(");
                for (i, item) in a.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                        if pretty {
                            out.push(' ');
                        }
                    }
                    write_value(out, item, pretty, depth);
                }
                out.push(')');
            }
        }
        Value::Dictionary(d) => {
            out.push('(');
            for (i, (key, item)) in d.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                if pretty {
                    out.push('\n');
                    for _ in 0..=depth {
                        out.push('\t');
                    }
                }
                percent_encode_into(out, key.as_bytes());
                out.push(':');
                write_value(out, item, pretty, depth + 1);
            }
            if pretty && !d.is_empty() {
                out.push('\n');
                for _ in 0..depth {
                    out.push('\t');
                }
            }
            out.push(')');
        }
    }
}

fn write_double(out: &mut String, d: f64) {
    if d.is_nan() {
        out.push_str("nan");
    } else if d == f64::INFINITY {
        out.push_str("inf");
    } else if d == f64::NEG_INFINITY {
        out.push_str("-inf");
    } else {
        out.push_str(&format!("{:?}", d));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_list_promotes_to_array() {
        let v = decode(b"a,b,c");
        assert!(v.is_array());
        assert_eq!(v.size(), 3);
        assert_eq!(v.get_string(0), "a");
        assert_eq!(v.get_string(2), "c");
    }

    #[test]
    fn plain_list_promotes_to_dictionary() {
        let v = decode(b"a:1,b:2");
        assert!(v.is_dictionary());
        assert_eq!(v.get_integer("a"), 1);
        assert_eq!(v.get_integer("b"), 2);
    }

    #[test]
    fn retroactive_dictionary_conversion() {
        // elements seen before the ':' become keys mapped to true
        let v = decode(b"a,b,c:d");
        assert!(v.is_dictionary());
        assert!(v.get_bool("a"));
        assert!(v.get_bool("b"));
        assert_eq!(v.get_string("c"), "d");
    }

    #[test]
    fn bracketed_dictionary() {
        let v = decode(b"(name:test;count:3;flag)");
        assert_eq!(v.get_string("name"), "test");
        assert_eq!(v.get_integer("count"), 3);
        assert!(v.get_bool("flag"));
    }

    #[test]
    fn explicit_array() {
        let v = decode(b"~(1,2.5,x)");
        assert_eq!(v.size(), 3);
        assert_eq!(v.get_integer(0), 1);
        assert_eq!(v.get(1).as_double(), 2.5);
        assert_eq!(v.get_string(2), "x");
    }

    #[test]
    fn byte_string_token() {
        assert_eq!(decode(b"~%00%FFab"), Value::Bytes(vec![0x00, 0xff, b'a', b'b']));
    }

    #[test]
    fn literal_table() {
        assert_eq!(decode(b"true"), Value::Bool(true));
        assert_eq!(decode(b"null"), Value::Null);
        assert_eq!(decode(b"-inf"), Value::Double(f64::NEG_INFINITY));
        assert!(decode(b"nan").as_double().is_nan());
        assert_eq!(decode(b"-42"), Value::Integer(-42));
        assert_eq!(decode(b"hello"), Value::from("hello"));
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(decode(b"a%20b"), Value::from("a b"));

        let v = decode(b"(k%3Aey:v)");
        assert_eq!(v.get_string("k:ey"), "v");
    }

    #[test]
    fn nested_containers() {
        let v = decode(b"(outer:(x:1;y:2);list:~(1,2,3))");
        assert_eq!(v.get("outer").get_integer("y"), 2);
        assert_eq!(v.get("list").size(), 3);
    }

    #[test]
    fn dict_value_promoted_to_list() {
        let v = decode(b"(k:a,b)");
        let list = v.get("k");
        assert!(list.is_array());
        assert_eq!(list.size(), 2);
        assert_eq!(list.get_string(1), "b");
    }

    #[test]
    fn array_of_groups() {
        let v = decode(b"((x:1);(y:2))");
        assert!(v.is_array());
        assert_eq!(v.get(0).get_integer("x"), 1);
        assert_eq!(v.get(1).get_integer("y"), 2);
    }

    #[test]
    fn truncated_input_keeps_prefix() {
        let v = decode(b"(a:1;b:");
        assert_eq!(v.get_integer("a"), 1);
        assert!(v.has("b"));
    }

    #[test]
    fn encoder_mirrors_decoder() {
        let mut v = Value::Null;
        v.set("some text", "s");
        v.set(-5i64, "n");
        v.set(2.5f64, "d");
        v.set(true, "t");
        v.set(vec![0u8, 255], "raw");
        v.set(
            vec![Value::from(1i64), Value::from(2i64), Value::from("x y")],
            "list",
        );
        let mut sub = Value::Null;
        sub.set(1i64, "x");
        v.set(sub, "sub");

        let enc = encode(&v, false);
        assert_eq!(decode(enc.as_bytes()), v);

        let pretty = encode(&v, true);
        assert_eq!(decode(pretty.as_bytes()), v);
    }

    #[test]
    fn single_scalar_arrays_are_written_plain() {
        let v = Value::Array(vec![Value::from(7i64)]);
        assert_eq!(encode(&v, false), "7");
    }

    #[test]
    fn dictionary_encoding_uses_semicolons() {
        let mut v = Value::Null;
        v.set(1i64, "a");
        v.set(2i64, "b");
        assert_eq!(encode(&v, false), "(a:1;b:2)");
    }

    #[test]
    fn percent_encoding_table() {
        assert!(should_encode_percent(b' '));
        assert!(should_encode_percent(b'('));
        assert!(should_encode_percent(b':'));
        assert!(should_encode_percent(b'%'));
        assert!(should_encode_percent(b'~'));
        assert!(should_encode_percent(0x00));
        assert!(should_encode_percent(0x80));
        assert!(!should_encode_percent(b'a'));
        assert!(!should_encode_percent(b'5'));
        assert!(!should_encode_percent(b'_'));
        assert!(!should_encode_percent(b'+'));
    }
}
