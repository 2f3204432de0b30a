use std::io::{self, Read};

pub trait AsBytes<const N: usize> {
    fn from_bytes(b: [u8; N]) -> Self;

    fn to_bytes(self) -> [u8; N];
}

impl AsBytes<4> for f32 {
    fn from_bytes(b: [u8; 4]) -> Self {
        f32::from_ne_bytes(b)
    }

    fn to_bytes(self) -> [u8; 4] {
        self.to_ne_bytes()
    }
}

impl AsBytes<4> for i32 {
    fn from_bytes(b: [u8; 4]) -> Self {
        i32::from_ne_bytes(b)
    }

    fn to_bytes(self) -> [u8; 4] {
        self.to_ne_bytes()
    }
}

/// Converts a packed buffer of native-endian `f32`s into values.
pub(crate) fn f32s_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Bytes taken by `count` packed `f32`s, or `None` if that overflows `usize`.
pub(crate) fn f32_byte_len(count: usize) -> Option<usize> {
    count.checked_mul(4)
}

/// Reads `byte_len` bytes of packed `f32`s. The buffer only grows with the bytes actually
/// present, so a stream shorter than announced fails with `UnexpectedEof`.
pub(crate) fn read_f32s<R: Read>(reader: &mut R, byte_len: usize) -> io::Result<Vec<f32>> {
    let mut bytes = Vec::new();
    reader.by_ref().take(byte_len as u64).read_to_end(&mut bytes)?;

    if bytes.len() < byte_len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }

    Ok(f32s_from_bytes(&bytes))
}

pub(crate) fn f32s_to_bytes<I: IntoIterator<Item = f32>>(values: I) -> Vec<u8> {
    values.into_iter().flat_map(|v| v.to_bytes()).collect()
}
