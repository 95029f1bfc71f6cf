//! RFC 1006 TPKT framing for the H.225 and H.245 TCP streams

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

pub const TPKT_VERSION: u8 = 3;
pub const TPKT_HEADER_LEN: usize = 4;

/// Frame one payload
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let total = payload.len() + TPKT_HEADER_LEN;
    let len = u16::try_from(total)
        .map_err(|_| WireError::InvalidTpkt(format!("payload of {} bytes too large", payload.len())))?;
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u8(TPKT_VERSION);
    buf.put_u8(0);
    buf.put_u16(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Take one complete frame off the front of `buf`
///
/// Returns `Ok(None)` until a whole frame has arrived. Consumed bytes are
/// removed from `buf`.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    if buf.len() < TPKT_HEADER_LEN {
        return Ok(None);
    }
    if buf[0] != TPKT_VERSION {
        return Err(WireError::InvalidTpkt(format!("version {}", buf[0])));
    }
    let total = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if total < TPKT_HEADER_LEN {
        return Err(WireError::InvalidTpkt(format!("length {} below header size", total)));
    }
    if buf.len() < total {
        return Ok(None);
    }
    let mut frame = buf.split_to(total);
    frame.advance(TPKT_HEADER_LEN);
    Ok(Some(frame.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header() {
        let framed = encode(&[0xaa, 0xbb]).unwrap();
        assert_eq!(framed.as_ref(), &[3, 0, 0, 6, 0xaa, 0xbb]);
    }

    #[test]
    fn test_incremental_decode() {
        let framed = encode(b"hello").unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&framed[..3]);
        assert_eq!(decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&framed[3..7]);
        assert_eq!(decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&framed[7..]);
        buf.extend_from_slice(&encode(b"x").unwrap());
        assert_eq!(decode(&mut buf).unwrap().unwrap().as_ref(), b"hello");
        assert_eq!(decode(&mut buf).unwrap().unwrap().as_ref(), b"x");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bad_version() {
        let mut buf = BytesMut::from(&[2u8, 0, 0, 4][..]);
        assert!(matches!(decode(&mut buf), Err(WireError::InvalidTpkt(_))));
    }
}
