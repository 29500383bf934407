use crate::error::*;
use crate::source::ByteSource;

/// Decodes an unsigned LEB128 integer of at most `bits` bits.
///
/// Consuming more bytes than `bits` can ever need is rejected rather than
/// silently truncated, and so is a final byte carrying bits past the width.
#[inline]
pub fn decode_varuint<T, S>(src: &mut S, bits: u8) -> Result<T, Error>
where
    T: TryFrom<u64>,
    S: ByteSource,
{
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut consumed = 0usize;
    let last = loop {
        let byte = src.get().ok_or(Error::Malformed(UNEXPECTED_END))?;
        consumed += 1;
        if shift < 64 {
            result |= ((byte & 0x7f) as u64) << shift;
        }
        shift += 7;
        if byte & 0x80 == 0 {
            break byte;
        }
    };
    if consumed > (bits as usize).div_ceil(7) {
        return Err(Error::Malformed(INT_TOO_LONG));
    }
    // bits of the final byte falling outside the width must be zero
    if shift > bits as u32 {
        let used = 7 - (shift - bits as u32);
        if (last & 0x7f) >> used != 0 {
            return Err(Error::Malformed(INT_TOO_LARGE));
        }
    }
    if bits < 64 && result >> bits != 0 {
        return Err(Error::Malformed(INT_TOO_LARGE));
    }
    T::try_from(result).map_err(|_| Error::Malformed(INT_TOO_LARGE))
}

/// Decodes a signed LEB128 integer of at most `bits` bits, sign-extending
/// from the final byte's sign bit (0x40) when fewer than `bits` bits were
/// consumed.
#[inline]
pub fn decode_varint<T, S>(src: &mut S, bits: u8) -> Result<T, Error>
where
    T: TryFrom<i64>,
    S: ByteSource,
{
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut consumed = 0usize;
    let last = loop {
        let byte = src.get().ok_or(Error::Malformed(UNEXPECTED_END))?;
        consumed += 1;
        if shift < 64 {
            result |= (((byte & 0x7f) as u64) << shift) as i64;
        }
        shift += 7;
        if byte & 0x80 == 0 {
            break byte;
        }
    };
    if consumed > (bits as usize).div_ceil(7) {
        return Err(Error::Malformed(INT_TOO_LONG));
    }
    if shift < 64 && (last & 0x40) != 0 {
        result |= !0i64 << shift;
    }
    // bits of the final byte falling outside the width must sign-extend
    // its top value bit
    if shift > bits as u32 {
        let used = 7 - (shift - bits as u32);
        let unused_mask = (0x7fu8 >> used) << used;
        let fill = if last & (1u8 << (used - 1)) != 0 { unused_mask } else { 0 };
        if last & unused_mask != fill {
            return Err(Error::Malformed(INT_TOO_LARGE));
        }
    }
    if bits < 64 {
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        if result < min || result > max {
            return Err(Error::Malformed(INT_TOO_LARGE));
        }
    }
    T::try_from(result).map_err(|_| Error::Malformed(INT_TOO_LARGE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    fn encode_varuint(mut v: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if v == 0 {
                return out;
            }
        }
    }

    fn encode_varint(mut v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
            out.push(if done { byte } else { byte | 0x80 });
            if done {
                return out;
            }
        }
    }

    #[test]
    fn varuint_round_trip() {
        for v in [0u64, 1, 127, 128, 624485, u32::MAX as u64, u64::MAX] {
            let bytes = encode_varuint(v);
            let mut src = SliceSource::new(&bytes);
            let got: u64 = decode_varuint(&mut src, 64).unwrap();
            assert_eq!(got, v);
            assert!(src.is_empty());
        }
    }

    #[test]
    fn varint_round_trip() {
        for v in [0i64, 1, -1, 63, 64, -64, -65, -123456, i32::MIN as i64, i64::MAX, i64::MIN] {
            let bytes = encode_varint(v);
            let mut src = SliceSource::new(&bytes);
            let got: i64 = decode_varint(&mut src, 64).unwrap();
            assert_eq!(got, v);
        }
    }

    #[test]
    fn known_encodings() {
        // 624485 per the LEB128 reference example
        let mut src = SliceSource::new(&[0xe5, 0x8e, 0x26]);
        assert_eq!(decode_varuint::<u32, _>(&mut src, 32).unwrap(), 624485);
        // -123456
        let mut src = SliceSource::new(&[0xc0, 0xbb, 0x78]);
        assert_eq!(decode_varint::<i32, _>(&mut src, 32).unwrap(), -123456);
    }

    #[test]
    fn final_byte_overflow_is_rejected() {
        // the tenth byte of a 64-bit value carries one value bit; anything
        // more is an overflow, not a silent truncation
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(
            decode_varint::<i64, _>(&mut src, 64),
            Err(Error::Malformed(INT_TOO_LARGE))
        );

        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(
            decode_varuint::<u64, _>(&mut src, 64),
            Err(Error::Malformed(INT_TOO_LARGE))
        );

        // the extreme values themselves still decode
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(decode_varuint::<u64, _>(&mut src, 64).unwrap(), u64::MAX);
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f];
        let mut src = SliceSource::new(&bytes);
        assert_eq!(decode_varint::<i64, _>(&mut src, 64).unwrap(), i64::MIN);
    }

    #[test]
    fn over_long_is_rejected() {
        // six continuation bytes can never fit in 32 bits
        let mut src = SliceSource::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert_eq!(
            decode_varuint::<u32, _>(&mut src, 32),
            Err(Error::Malformed(INT_TOO_LONG))
        );
    }

    #[test]
    fn truncated_stream() {
        let mut src = SliceSource::new(&[0x80]);
        assert_eq!(
            decode_varuint::<u32, _>(&mut src, 32),
            Err(Error::Malformed(UNEXPECTED_END))
        );
    }
}
