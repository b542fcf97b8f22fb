use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sdon::prelude::*;

const N_ARR: usize = 10;
const N_MAP: usize = 10;

fn big_value() -> Value {
    let mut map = Value::Null;
    for i in 0..N_MAP {
        let mut inner = Value::Null;
        for j in 0..N_ARR {
            inner.add_integer((i * N_ARR + j) as i64);
        }
        map.set(inner, format!("key-{}", i).as_str());
    }

    let mut v = Value::Null;
    for _ in 0..N_ARR {
        v.add(map.clone());
    }
    v
}

fn bench_construction(c: &mut Criterion) {
    c.bench_function(
        &format!(
            "Creating a value encoding to {} bytes of CBOR",
            write(&big_value(), EncodeFormat::CBOR).len()
        ),
        |b| b.iter(|| black_box(big_value())),
    );
}

fn bench_enc(c: &mut Criterion) {
    let v = big_value();
    c.bench_function("Encoding CBOR", move |b| {
        b.iter(|| write(black_box(&v), EncodeFormat::CBOR))
    });

    let v = big_value();
    c.bench_function("Encoding JSON", move |b| {
        b.iter(|| write(black_box(&v), EncodeFormat::JSON))
    });

    let v = big_value();
    c.bench_function("Encoding compressed CBOR", move |b| {
        b.iter(|| write(black_box(&v), EncodeFormat::CBOR_COMPRESSED))
    });
}

fn bench_dec(c: &mut Criterion) {
    let cbor = write(&big_value(), EncodeFormat::CBOR);
    c.bench_function(
        &format!("Decoding {} bytes of CBOR", cbor.len()),
        move |b| b.iter(|| read(black_box(&cbor))),
    );

    let json = write(&big_value(), EncodeFormat::JSON);
    c.bench_function(
        &format!("Decoding {} bytes of JSON", json.len()),
        move |b| b.iter(|| read(black_box(&json))),
    );
}

criterion_group!(benches, bench_construction, bench_enc, bench_dec);
criterion_main!(benches);
