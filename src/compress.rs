//! LZ4 frame compression layer.
//!
//! A frame is `[magic:4][original length][LZ4 block]` where the magic is
//! `"LZ4S"` with a 2-byte little-endian length for sources up to 0xffff
//! bytes, and `"LZ4W"` with a 4-byte length above that. The Brotli magic
//! `"SPBr"` is recognized but reserved: decompressing it yields nothing.

use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};

use crate::format::Compression;

pub const MAGIC_LZ4_SHORT: [u8; 4] = *b"LZ4S";
pub const MAGIC_LZ4_WORD: [u8; 4] = *b"LZ4W";
pub const MAGIC_BROTLI: [u8; 4] = *b"SPBr";

/// Upper bound on the frame size for `size` input bytes, 0 when the
/// algorithm cannot handle the input.
pub fn compress_bounds(size: usize, compression: Compression) -> usize {
    match compression {
        Compression::Lz4 | Compression::Lz4Hc => {
            get_maximum_output_size(size) + if size <= 0xffff { 2 } else { 4 }
        }
        Compression::NoCompression => 0,
    }
}

/// Compresses `src` into a frame, reusing `scratch` for the block buffer
/// so repeated calls on small payloads stay allocation-free.
///
/// With `conditional` set, returns empty when the frame would not be
/// smaller than the input; the caller then keeps the raw encoding.
pub fn compress_with(
    scratch: &mut Vec<u8>,
    src: &[u8],
    compression: Compression,
    conditional: bool,
) -> Vec<u8> {
    let bound = compress_bounds(src.len(), compression);
    if bound == 0 {
        return Vec::new();
    }

    let short = src.len() <= 0xffff;
    let off = if short { 2 } else { 4 };

    scratch.clear();
    scratch.resize(bound, 0);
    if short {
        scratch[..2].copy_from_slice(&(src.len() as u16).to_le_bytes());
    } else {
        scratch[..4].copy_from_slice(&(src.len() as u32).to_le_bytes());
    }

    let written = match compress_into(src, &mut scratch[off..]) {
        Ok(n) => n,
        Err(_) => return Vec::new(),
    };
    if conditional && written + off + 4 > src.len() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(4 + off + written);
    out.extend_from_slice(if short {
        &MAGIC_LZ4_SHORT
    } else {
        &MAGIC_LZ4_WORD
    });
    out.extend_from_slice(&scratch[..off + written]);
    out
}

/// [`compress_with`] with a per-call buffer.
pub fn compress(src: &[u8], compression: Compression, conditional: bool) -> Vec<u8> {
    let mut scratch = Vec::new();
    compress_with(&mut scratch, src, compression, conditional)
}

/// Decompresses a full frame (including magic). Wrong magic, a truncated
/// header or a corrupt block all yield empty.
pub fn decompress(frame: &[u8]) -> Vec<u8> {
    if frame.len() < 4 {
        return Vec::new();
    }
    let (size, payload) = match &frame[..4] {
        m if *m == MAGIC_LZ4_SHORT => {
            if frame.len() < 6 {
                return Vec::new();
            }
            (
                u16::from_le_bytes([frame[4], frame[5]]) as usize,
                &frame[6..],
            )
        }
        m if *m == MAGIC_LZ4_WORD => {
            if frame.len() < 8 {
                return Vec::new();
            }
            (
                u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize,
                &frame[8..],
            )
        }
        // Brotli is reserved and intentionally not implemented
        _ => return Vec::new(),
    };

    let mut out = vec![0u8; size];
    match decompress_into(payload, &mut out) {
        Ok(n) if n == size => out,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_short() {
        let src = vec![7u8; 300];
        let frame = compress(&src, Compression::Lz4, false);

        assert_eq!(&frame[..4], b"LZ4S");
        assert_eq!(u16::from_le_bytes([frame[4], frame[5]]), 300);
        assert!(frame.len() < src.len());
        assert_eq!(decompress(&frame), src);
    }

    #[test]
    fn length_prefix_boundary() {
        for len in [0usize, 1, 65535, 65536] {
            let src: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = compress(&src, Compression::Lz4, false);

            let magic: &[u8] = if len <= 0xffff { b"LZ4S" } else { b"LZ4W" };
            assert_eq!(&frame[..4], magic, "len {}", len);
            assert_eq!(decompress(&frame), src, "len {}", len);
        }
    }

    #[test]
    fn hc_frames_decode_the_same() {
        let src = vec![42u8; 1000];
        let frame = compress(&src, Compression::Lz4Hc, false);
        assert_eq!(decompress(&frame), src);
    }

    #[test]
    fn conditional_rejects_incompressible() {
        // far too small for the header overhead to pay off
        assert!(compress(b"ab", Compression::Lz4, true).is_empty());

        let src = vec![0u8; 100_000];
        assert!(!compress(&src, Compression::Lz4, true).is_empty());
    }

    #[test]
    fn scratch_reuse() {
        let mut scratch = Vec::new();
        let a = compress_with(&mut scratch, &[1u8; 64], Compression::Lz4, false);
        let b = compress_with(&mut scratch, &[2u8; 64], Compression::Lz4, false);
        assert_eq!(decompress(&a), vec![1u8; 64]);
        assert_eq!(decompress(&b), vec![2u8; 64]);
    }

    #[test]
    fn bad_frames_yield_empty() {
        assert!(decompress(b"").is_empty());
        assert!(decompress(b"LZ4S").is_empty());
        assert!(decompress(b"SPBr\x00\x00\x00\x00").is_empty());

        let mut frame = compress(&vec![9u8; 500], Compression::Lz4, false);
        let end = frame.len() - 1;
        frame.truncate(end);
        assert!(decompress(&frame).is_empty());
    }
}
