//! Encode-format selection, byte-sniffing format detection and the
//! top-level read/write dispatch.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fs;
use std::io;
use std::path::Path;

use crate::errors::Error;
use crate::{cbor, compress, json, serenity, Value};

/// Serialization format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Json = 0,
    Pretty = 1,
    /// Pretty JSON with inline comments on microsecond timestamps.
    PrettyTime = 2,
    Cbor = 3,
    Serenity = 4,
    PrettySerenity = 5,
}

/// Compression layered over the serialized bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    NoCompression = 0,
    Lz4 = 1,
    Lz4Hc = 2,
}

/// Encryption selector. The flag exists in the packed representation but
/// no cipher is implemented.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encryption {
    NoEncryption = 0,
    Encrypted = 1,
}

/// An immutable descriptor selecting format, compression and (reserved)
/// encryption.
///
/// # Example
///
/// ```
/// use sdon::{EncodeFormat, Value, write, read};
///
/// let v = Value::from("payload");
/// let bytes = write(&v, EncodeFormat::CBOR);
/// assert_eq!(read(&bytes), v);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncodeFormat {
    pub format: Format,
    pub compression: Compression,
    pub encryption: Encryption,
}

impl EncodeFormat {
    pub const JSON: EncodeFormat = EncodeFormat::new(Format::Json);
    pub const PRETTY: EncodeFormat = EncodeFormat::new(Format::Pretty);
    pub const PRETTY_TIME: EncodeFormat = EncodeFormat::new(Format::PrettyTime);
    pub const CBOR: EncodeFormat = EncodeFormat::new(Format::Cbor);
    pub const SERENITY: EncodeFormat = EncodeFormat::new(Format::Serenity);
    pub const PRETTY_SERENITY: EncodeFormat = EncodeFormat::new(Format::PrettySerenity);

    pub const CBOR_COMPRESSED: EncodeFormat =
        EncodeFormat::new(Format::Cbor).with_compression(Compression::Lz4Hc);
    pub const JSON_COMPRESSED: EncodeFormat =
        EncodeFormat::new(Format::Json).with_compression(Compression::Lz4Hc);

    pub const fn new(format: Format) -> EncodeFormat {
        EncodeFormat {
            format,
            compression: Compression::NoCompression,
            encryption: Encryption::NoEncryption,
        }
    }

    pub const fn with_compression(self, compression: Compression) -> EncodeFormat {
        EncodeFormat {
            compression,
            ..self
        }
    }

    /// No compression and no encryption.
    pub fn is_raw(&self) -> bool {
        self.compression == Compression::NoCompression
            && self.encryption == Encryption::NoEncryption
    }

    /// Raw and a plain-JSON textual format.
    pub fn is_textual(&self) -> bool {
        self.is_raw() && matches!(self.format, Format::Json | Format::Pretty)
    }

    /// Packed representation: bits 0-3 format, 4-7 compression, 8-11
    /// encryption.
    pub fn flag(&self) -> u32 {
        self.format as u32 | (self.compression as u32) << 4 | (self.encryption as u32) << 8
    }

    /// Reverses [`flag`](EncodeFormat::flag); unknown nibbles fall back to
    /// the defaults.
    pub fn from_flag(flag: u32) -> EncodeFormat {
        let format = match flag & 0x0f {
            1 => Format::Pretty,
            2 => Format::PrettyTime,
            3 => Format::Cbor,
            4 => Format::Serenity,
            5 => Format::PrettySerenity,
            _ => Format::Json,
        };
        let compression = match flag >> 4 & 0x0f {
            1 => Compression::Lz4,
            2 => Compression::Lz4Hc,
            _ => Compression::NoCompression,
        };
        let encryption = match flag >> 8 & 0x0f {
            1 => Encryption::Encrypted,
            _ => Encryption::NoEncryption,
        };
        EncodeFormat {
            format,
            compression,
            encryption,
        }
    }
}

impl Default for EncodeFormat {
    fn default() -> Self { EncodeFormat::JSON }
}

/// The format a byte buffer appears to carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Cbor,
    /// Base64-encoded CBOR: the "2dn3" prefix is the base64 of the CBOR magic.
    CborBase64,
    Serenity,
    Lz4Short,
    Lz4Word,
    /// Reserved; decoding yields `Null`.
    Brotli,
}

/// Sniffs the leading bytes of a buffer.
pub fn detect_data_format(data: &[u8]) -> DataFormat {
    if data.len() >= 3 && data[0] == 0xd9 && data[1] == 0xd9 && data[2] == 0xf7 {
        DataFormat::Cbor
    } else if data.starts_with(b"2dn3") {
        DataFormat::CborBase64
    } else if data.starts_with(&compress::MAGIC_LZ4_SHORT) {
        DataFormat::Lz4Short
    } else if data.starts_with(&compress::MAGIC_LZ4_WORD) {
        DataFormat::Lz4Word
    } else if data.starts_with(&compress::MAGIC_BROTLI) {
        DataFormat::Brotli
    } else if data.first() == Some(&b'(') {
        DataFormat::Serenity
    } else {
        DataFormat::Json
    }
}

/// Serializes `value` in the requested format.
///
/// Compression is conditional: when the compressed frame would not be
/// smaller than the raw encoding, the raw encoding is returned. The
/// reserved encryption flag yields empty bytes.
pub fn write(value: &Value, fmt: EncodeFormat) -> Vec<u8> {
    if fmt.encryption == Encryption::Encrypted {
        return Vec::new();
    }
    let raw = match fmt.format {
        Format::Json => json::encode(value).into_bytes(),
        Format::Pretty => json::encode_pretty(value, false).into_bytes(),
        Format::PrettyTime => json::encode_pretty(value, true).into_bytes(),
        Format::Cbor => cbor::encode_full(value),
        Format::Serenity => serenity::encode(value, false).into_bytes(),
        Format::PrettySerenity => serenity::encode(value, true).into_bytes(),
    };
    match fmt.compression {
        Compression::NoCompression => raw,
        c => {
            let frame = compress::compress(&raw, c, true);
            if frame.is_empty() {
                raw
            } else {
                frame
            }
        }
    }
}

/// Writes the serialized value into a stream.
pub fn write_to<W: io::Write>(w: &mut W, value: &Value, fmt: EncodeFormat) -> Result<(), Error> {
    if fmt.encryption == Encryption::Encrypted {
        return Err(Error::Encryption);
    }
    w.write_all(&write(value, fmt))?;
    Ok(())
}

/// Serializes the value into a file.
pub fn save<P: AsRef<Path>>(value: &Value, path: P, fmt: EncodeFormat) -> Result<(), Error> {
    if fmt.encryption == Encryption::Encrypted {
        return Err(Error::Encryption);
    }
    fs::write(path, write(value, fmt))?;
    Ok(())
}

/// Decodes a buffer, sniffing its format. Compressed frames are unwrapped
/// and re-dispatched; undecodable input yields [`Value::Null`].
pub fn read(data: &[u8]) -> Value { read_with_key(data, "") }

/// [`read`] with a decryption key, reserved for the unimplemented
/// encryption layer; the key is currently ignored.
pub fn read_with_key(data: &[u8], _key: &str) -> Value {
    match detect_data_format(data) {
        DataFormat::Json => json::decode(data),
        DataFormat::Cbor => cbor::decode(data),
        DataFormat::Serenity => serenity::decode(data),
        DataFormat::CborBase64 => {
            let text: Vec<u8> = data
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            match STANDARD.decode(&text) {
                Ok(decoded) => read(&decoded),
                Err(_) => Value::Null,
            }
        }
        DataFormat::Lz4Short | DataFormat::Lz4Word => {
            let raw = compress::decompress(data);
            if raw.is_empty() {
                Value::Null
            } else {
                read(&raw)
            }
        }
        DataFormat::Brotli => Value::Null,
    }
}

/// Reads and decodes a file. Decode failures still return
/// `Ok(Value::Null)`; only I/O failures error.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Value, Error> {
    Ok(read(&fs::read(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_packing() {
        let fmt = EncodeFormat::CBOR_COMPRESSED;
        assert_eq!(fmt.flag(), 3 | 2 << 4);
        assert_eq!(EncodeFormat::from_flag(fmt.flag()), fmt);

        let all = EncodeFormat {
            format: Format::PrettySerenity,
            compression: Compression::Lz4,
            encryption: Encryption::Encrypted,
        };
        assert_eq!(all.flag(), 5 | 1 << 4 | 1 << 8);
        assert_eq!(EncodeFormat::from_flag(all.flag()), all);
    }

    #[test]
    fn raw_and_textual() {
        assert!(EncodeFormat::JSON.is_raw());
        assert!(EncodeFormat::JSON.is_textual());
        assert!(EncodeFormat::PRETTY.is_textual());
        assert!(!EncodeFormat::CBOR.is_textual());
        assert!(!EncodeFormat::JSON_COMPRESSED.is_raw());
        assert!(!EncodeFormat::JSON_COMPRESSED.is_textual());
    }

    #[test]
    fn detection_table() {
        assert_eq!(detect_data_format(&[0xd9, 0xd9, 0xf7, 0x00]), DataFormat::Cbor);
        assert_eq!(detect_data_format(b"2dn3xxxx"), DataFormat::CborBase64);
        assert_eq!(detect_data_format(b"LZ4S\x05\x00"), DataFormat::Lz4Short);
        assert_eq!(detect_data_format(b"LZ4W\x05\x00\x00\x00"), DataFormat::Lz4Word);
        assert_eq!(detect_data_format(b"SPBr"), DataFormat::Brotli);
        assert_eq!(detect_data_format(b"(a:1)"), DataFormat::Serenity);
        assert_eq!(detect_data_format(b"{\"a\":1}"), DataFormat::Json);
        assert_eq!(detect_data_format(b"42"), DataFormat::Json);
        assert_eq!(detect_data_format(b""), DataFormat::Json);
    }

    fn sample() -> Value {
        let mut v = Value::Null;
        v.set("value", "str");
        v.set(17i64, "int");
        v.set(vec![Value::from(1i64), Value::from(2i64)], "arr");
        v
    }

    #[test]
    fn raw_dispatch_round_trips() {
        let v = sample();
        for fmt in [
            EncodeFormat::JSON,
            EncodeFormat::PRETTY,
            EncodeFormat::PRETTY_TIME,
            EncodeFormat::CBOR,
            EncodeFormat::SERENITY,
            EncodeFormat::PRETTY_SERENITY,
        ] {
            assert_eq!(read(&write(&v, fmt)), v, "{:?}", fmt);
        }
    }

    #[test]
    fn small_payloads_skip_compression() {
        let v = sample();
        let bytes = write(&v, EncodeFormat::CBOR_COMPRESSED);
        // conditional compression kept the raw document
        assert_eq!(detect_data_format(&bytes), DataFormat::Cbor);
        assert_eq!(read(&bytes), v);
    }

    #[test]
    fn large_payloads_compress_and_round_trip() {
        let mut v = Value::Null;
        for i in 0..200i64 {
            v.add_string(format!("repetitive entry number {}", i % 7));
        }

        let bytes = write(&v, EncodeFormat::CBOR_COMPRESSED);
        assert_eq!(detect_data_format(&bytes), DataFormat::Lz4Short);
        assert!(bytes.len() < write(&v, EncodeFormat::CBOR).len());
        assert_eq!(read(&bytes), v);

        let json_lz4 = write(&v, EncodeFormat::JSON.with_compression(Compression::Lz4));
        assert_eq!(read(&json_lz4), v);
    }

    #[test]
    fn base64_cbor_re_dispatch() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let v = sample();
        let encoded = STANDARD.encode(write(&v, EncodeFormat::CBOR));
        assert!(encoded.starts_with("2dn3"));
        assert_eq!(read(encoded.as_bytes()), v);
    }

    #[test]
    fn encrypted_writes_are_refused() {
        let fmt = EncodeFormat {
            encryption: Encryption::Encrypted,
            ..EncodeFormat::CBOR
        };
        assert!(write(&sample(), fmt).is_empty());
        assert!(matches!(
            write_to(&mut Vec::new(), &sample(), fmt),
            Err(Error::Encryption)
        ));
    }

    #[test]
    fn brotli_is_reserved() {
        assert!(read(b"SPBr\x00\x01\x02").is_null());
    }
}
