use crate::error::*;

/// Origin for a [`ByteSource::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Abstract sequential/seekable byte provider consumed by the decoders.
///
/// The engine never assumes a file; anything that can hand out bytes in
/// order and reposition itself satisfies the contract.
pub trait ByteSource {
    /// Next byte, or `None` at end of stream.
    fn get(&mut self) -> Option<u8>;

    /// Fill `buf` completely; `false` if the stream cannot satisfy it.
    fn read(&mut self, buf: &mut [u8]) -> bool;

    /// Reposition the stream. Returns `false` when the target is outside
    /// the stream.
    fn seek(&mut self, offset: i64, whence: Whence) -> bool;

    /// Absolute position from the start of the stream.
    fn tell(&self) -> usize;
}

/// In-memory [`ByteSource`] over a borrowed byte slice.
#[derive(Clone, Copy)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

impl ByteSource for SliceSource<'_> {
    fn get(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read(&mut self, buf: &mut [u8]) -> bool {
        let end = match self.pos.checked_add(buf.len()) {
            Some(end) if end <= self.bytes.len() => end,
            _ => return false,
        };
        buf.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        true
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> bool {
        let base = match whence {
            Whence::Start => 0i64,
            Whence::Current => self.pos as i64,
            Whence::End => self.bytes.len() as i64,
        };
        let target = base.saturating_add(offset);
        if target < 0 || target as usize > self.bytes.len() {
            return false;
        }
        self.pos = target as usize;
        true
    }

    fn tell(&self) -> usize {
        self.pos
    }
}

#[inline]
pub fn read_u8<S: ByteSource>(src: &mut S) -> Result<u8, Error> {
    src.get().ok_or(Error::Malformed(UNEXPECTED_END))
}

/// Reads exactly `N` raw little-endian bytes.
#[inline]
pub fn read_exact<S: ByteSource, const N: usize>(src: &mut S) -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];
    if !src.read(&mut buf) {
        return Err(Error::Malformed(UNEXPECTED_END));
    }
    Ok(buf)
}

#[inline]
pub fn read_u32_le<S: ByteSource>(src: &mut S) -> Result<u32, Error> {
    Ok(u32::from_le_bytes(read_exact(src)?))
}

#[inline]
pub fn read_f32_le<S: ByteSource>(src: &mut S) -> Result<f32, Error> {
    Ok(f32::from_le_bytes(read_exact(src)?))
}

#[inline]
pub fn read_f64_le<S: ByteSource>(src: &mut S) -> Result<f64, Error> {
    Ok(f64::from_le_bytes(read_exact(src)?))
}

/// Reads a length-prefixed UTF-8 string (LEB128 length).
pub fn read_string<S: ByteSource>(src: &mut S) -> Result<String, Error> {
    let len: u32 = crate::leb128::decode_varuint(src, 32)?;
    let mut buf = vec![0u8; len as usize];
    if !src.read(&mut buf) {
        return Err(Error::Malformed(UNEXPECTED_END));
    }
    String::from_utf8(buf).map_err(|_| Error::Malformed(INVALID_UTF8))
}

/// Reads a limit: has-max flag, minimum, and a maximum when flagged.
/// `upper` stands in for the maximum when the flag is absent.
pub fn decode_limit<S: ByteSource>(src: &mut S, upper: u32) -> Result<(u32, u32), Error> {
    let has_max = read_u8(src)?;
    let min: u32 = crate::leb128::decode_varuint(src, 32)?;
    let max = if has_max != 0 {
        crate::leb128::decode_varuint(src, 32)?
    } else {
        upper
    };
    if max < min {
        return Err(Error::Validation(MIN_GREATER_THAN_MAX));
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_get_and_read() {
        let bytes = [1u8, 2, 3, 4];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(src.get(), Some(1));
        let mut buf = [0u8; 2];
        assert!(src.read(&mut buf));
        assert_eq!(buf, [2, 3]);
        assert_eq!(src.tell(), 3);
        let mut big = [0u8; 4];
        assert!(!src.read(&mut big));
    }

    #[test]
    fn slice_source_seek() {
        let bytes = [0u8; 10];
        let mut src = SliceSource::new(&bytes);
        assert!(src.seek(4, Whence::Start));
        assert_eq!(src.tell(), 4);
        assert!(src.seek(3, Whence::Current));
        assert_eq!(src.tell(), 7);
        assert!(src.seek(-2, Whence::End));
        assert_eq!(src.tell(), 8);
        assert!(!src.seek(5, Whence::Current));
        assert_eq!(src.tell(), 8);
    }

    #[test]
    fn string_and_limit() {
        let bytes = [3u8, b'a', b's', b'm'];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(read_string(&mut src).unwrap(), "asm");

        let limit = [1u8, 2, 16];
        let mut src = SliceSource::new(&limit);
        assert_eq!(decode_limit(&mut src, u32::MAX).unwrap(), (2, 16));

        let no_max = [0u8, 5];
        let mut src = SliceSource::new(&no_max);
        assert_eq!(decode_limit(&mut src, 100).unwrap(), (5, 100));

        let bad = [1u8, 7, 2];
        let mut src = SliceSource::new(&bad);
        assert_eq!(
            decode_limit(&mut src, u32::MAX),
            Err(Error::Validation(MIN_GREATER_THAN_MAX))
        );
    }
}
