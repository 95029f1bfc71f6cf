//! Tagged field encoding shared by the H.225 and H.245 payloads
//!
//! Every field is laid out as `tag:u8 | length:u16 (big-endian) | value`.
//! Readers skip tags they do not recognise, so fields can be added without
//! breaking older decoders.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Largest value a single field can carry
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Writes tagged fields into a buffer
pub struct TlvWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> TlvWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    pub fn put_bytes(&mut self, tag: u8, value: &[u8]) -> Result<()> {
        if value.len() > MAX_FIELD_LEN {
            return Err(WireError::encode(format!(
                "field {} too long: {} bytes",
                tag,
                value.len()
            )));
        }
        self.buf.reserve(3 + value.len());
        self.buf.put_u8(tag);
        self.buf.put_u16(value.len() as u16);
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn put_u8(&mut self, tag: u8, value: u8) -> Result<()> {
        self.put_bytes(tag, &[value])
    }

    pub fn put_u16(&mut self, tag: u8, value: u16) -> Result<()> {
        self.put_bytes(tag, &value.to_be_bytes())
    }

    pub fn put_u32(&mut self, tag: u8, value: u32) -> Result<()> {
        self.put_bytes(tag, &value.to_be_bytes())
    }

    pub fn put_bool(&mut self, tag: u8, value: bool) -> Result<()> {
        self.put_u8(tag, value as u8)
    }

    pub fn put_str(&mut self, tag: u8, value: &str) -> Result<()> {
        self.put_bytes(tag, value.as_bytes())
    }

    /// Encode a nested structure as the value of `tag`
    pub fn put_nested<F>(&mut self, tag: u8, encode: F) -> Result<()>
    where
        F: FnOnce(&mut TlvWriter<'_>) -> Result<()>,
    {
        let mut inner = BytesMut::new();
        encode(&mut TlvWriter::new(&mut inner))?;
        self.put_bytes(tag, &inner)
    }
}

/// Iterates over tagged fields
pub struct TlvReader {
    buf: Bytes,
}

impl TlvReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Next `(tag, value)` pair, `None` once the buffer is exhausted
    pub fn next_field(&mut self) -> Result<Option<(u8, Bytes)>> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }
        if self.buf.remaining() < 3 {
            return Err(WireError::TooShort {
                required: 3,
                available: self.buf.remaining(),
            });
        }
        let tag = self.buf.get_u8();
        let len = self.buf.get_u16() as usize;
        if self.buf.remaining() < len {
            return Err(WireError::ElementOverrun {
                code: tag,
                length: len,
                remaining: self.buf.remaining(),
            });
        }
        Ok(Some((tag, self.buf.split_to(len))))
    }
}

/// All fields of one encoded structure, in wire order
#[derive(Debug, Default)]
pub struct FieldMap {
    fields: Vec<(u8, Bytes)>,
}

impl FieldMap {
    pub fn decode(buf: Bytes) -> Result<Self> {
        let mut fields = Vec::new();
        let mut r = TlvReader::new(buf);
        while let Some(field) = r.next_field()? {
            fields.push(field);
        }
        Ok(Self { fields })
    }

    /// First value for `tag`
    pub fn get(&self, tag: u8) -> Option<&Bytes> {
        self.fields.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Every value for a repeated `tag`, in order
    pub fn all(&self, tag: u8) -> impl Iterator<Item = &Bytes> + '_ {
        self.fields.iter().filter(move |(t, _)| *t == tag).map(|(_, v)| v)
    }

    pub fn require(&self, tag: u8, what: &str) -> Result<&Bytes> {
        self.get(tag)
            .ok_or_else(|| WireError::decode(format!("missing field {} ({})", tag, what)))
    }

    pub fn u8(&self, tag: u8) -> Result<Option<u8>> {
        self.get(tag).map(read_u8).transpose()
    }

    pub fn u16(&self, tag: u8) -> Result<Option<u16>> {
        self.get(tag).map(read_u16).transpose()
    }

    pub fn u32(&self, tag: u8) -> Result<Option<u32>> {
        self.get(tag).map(read_u32).transpose()
    }

    pub fn bool(&self, tag: u8) -> Result<bool> {
        Ok(self.get(tag).map(read_bool).transpose()?.unwrap_or(false))
    }

    pub fn string(&self, tag: u8) -> Result<Option<String>> {
        self.get(tag).map(read_string).transpose()
    }
}

pub fn read_u8(value: &Bytes) -> Result<u8> {
    match value.as_ref() {
        [v] => Ok(*v),
        _ => Err(WireError::decode(format!("expected 1 octet, got {}", value.len()))),
    }
}

pub fn read_u16(value: &Bytes) -> Result<u16> {
    match value.as_ref() {
        [a, b] => Ok(u16::from_be_bytes([*a, *b])),
        _ => Err(WireError::decode(format!("expected 2 octets, got {}", value.len()))),
    }
}

pub fn read_u32(value: &Bytes) -> Result<u32> {
    match value.as_ref() {
        [a, b, c, d] => Ok(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => Err(WireError::decode(format!("expected 4 octets, got {}", value.len()))),
    }
}

pub fn read_bool(value: &Bytes) -> Result<bool> {
    Ok(read_u8(value)? != 0)
}

pub fn read_string(value: &Bytes) -> Result<String> {
    String::from_utf8(value.to_vec()).map_err(|e| WireError::decode(format!("invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_in_order() {
        let mut buf = BytesMut::new();
        {
            let mut w = TlvWriter::new(&mut buf);
            w.put_u8(1, 7).unwrap();
            w.put_str(2, "gw").unwrap();
            w.put_nested(3, |inner| inner.put_u32(1, 0xdeadbeef)).unwrap();
        }

        let mut r = TlvReader::new(buf.freeze());
        let (tag, value) = r.next_field().unwrap().unwrap();
        assert_eq!((tag, read_u8(&value).unwrap()), (1, 7));
        let (tag, value) = r.next_field().unwrap().unwrap();
        assert_eq!((tag, read_string(&value).unwrap().as_str()), (2, "gw"));
        let (tag, value) = r.next_field().unwrap().unwrap();
        assert_eq!(tag, 3);
        let mut nested = TlvReader::new(value);
        let (_, inner) = nested.next_field().unwrap().unwrap();
        assert_eq!(read_u32(&inner).unwrap(), 0xdeadbeef);
        assert!(r.next_field().unwrap().is_none());
    }

    #[test]
    fn test_overrun_detected() {
        let mut r = TlvReader::new(Bytes::from_static(&[5, 0, 9, 1, 2]));
        assert!(matches!(
            r.next_field(),
            Err(WireError::ElementOverrun { code: 5, length: 9, remaining: 2 })
        ));
    }

    #[test]
    fn test_wrong_width_rejected() {
        assert!(read_u16(&Bytes::from_static(&[1])).is_err());
        assert!(read_u8(&Bytes::from_static(&[])).is_err());
    }
}
