use std::io;

use snap::raw::{Decoder, Encoder, decompress_len};

/// Snappy block-format compression used for gossip payloads.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    Ok(encoder.compress_vec(data)?)
}

/// Decompresses a snappy block, refusing outputs larger than `max_len`.
///
/// The length header is checked before any allocation happens.
pub fn decompress(data: &[u8], max_len: usize) -> io::Result<Vec<u8>> {
    let len = decompress_len(data)?;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decompressed length {len} exceeds limit {max_len}"),
        ));
    }

    let mut decoder = Decoder::new();
    Ok(decoder.decompress_vec(data)?)
}
