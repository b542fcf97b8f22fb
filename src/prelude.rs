pub use crate::{
    detect_data_format, read, read_file, read_with_key, save, write, write_to,
    Array, Compression, DataFormat, Dictionary, EncodeFormat, Encryption, Error, Format,
    StreamingDecoder, Value,
};
