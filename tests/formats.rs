use sdon::prelude::*;

fn sample() -> Value {
    let mut v = Value::Null;
    v.set("stappler", "engine");
    v.set(3i64, "major");
    v.set(1.5f64, "ratio");
    v.set(vec![0u8, 127, 255], "blob");
    v.set(
        vec![Value::from("a"), Value::from("b"), Value::from("c")],
        "tags",
    );
    v
}

#[test]
fn save_and_read_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let v = sample();

    for (name, fmt) in [
        ("doc.json", EncodeFormat::JSON),
        ("doc.pretty.json", EncodeFormat::PRETTY),
        ("doc.cbor", EncodeFormat::CBOR),
        ("doc.sp", EncodeFormat::SERENITY),
        ("doc.cbor.lz4", EncodeFormat::CBOR_COMPRESSED),
    ] {
        let path = dir.path().join(name);
        save(&v, &path, fmt).expect("save");
        assert_eq!(read_file(&path).expect("read_file"), v, "{}", name);
    }
}

#[test]
fn read_file_missing_is_an_error() {
    assert!(read_file("/nonexistent/sdon-doc.cbor").is_err());
}

#[test]
fn write_to_stream() {
    let mut out = Vec::new();
    write_to(&mut out, &sample(), EncodeFormat::CBOR).expect("write_to");
    assert_eq!(read(&out), sample());
}

#[test]
fn cbor_documents_carry_the_magic() {
    let bytes = write(&sample(), EncodeFormat::CBOR);
    assert_eq!(&bytes[..3], &[0xd9, 0xd9, 0xf7]);
}

#[test]
fn cbor_minimal_float_selection() {
    // 1.5 is representable as a half float
    let half = write(&Value::from(1.5f64), EncodeFormat::CBOR);
    assert_eq!(&half[3..], &[0xf9, 0x3e, 0x00]);

    // 1e40 overflows f32 and needs the full 64 bits
    let double = write(&Value::from(1e40f64), EncodeFormat::CBOR);
    assert_eq!(double[3], 0xfb);
}

#[test]
fn serenity_plain_list_promotion() {
    let arr = sdon::serenity::decode(b"a,b,c");
    assert!(arr.is_array());
    assert_eq!(arr.size(), 3);
    assert_eq!(arr.get_string(0), "a");

    let dict = sdon::serenity::decode(b"a:1,b:2");
    assert!(dict.is_dictionary());
    assert!(dict.has("a"));
    assert!(dict.has("b"));
}

#[test]
fn malformed_input_never_panics() {
    for bytes in [
        &b"\xd9\xd9\xf7"[..],
        b"\xd9\xd9\xf7\xff\xff\xff",
        b"{\"unclosed\": [1, 2",
        b"(((((",
        b"LZ4S\xff\xff\x00",
        b"2dn3!!!not base64",
        b"\xff\xfe\xfd",
        b"",
    ] {
        // each of these returns some value without erroring
        let _ = read(bytes);
    }
}

#[test]
fn unknown_keys_read_as_null() {
    let v = read(&write(&sample(), EncodeFormat::CBOR));
    assert!(v.get("absent").is_null());
    assert_eq!(v.get_integer("absent"), 0);
    assert!(!v.get_bool("absent"));
}
