//! Transport addresses and alias addresses

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};
use crate::tlv::{TlvReader, TlvWriter, read_string, read_u8};

/// IPv4 transport address (IP + TCP/UDP port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl TransportAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn to_octets(&self) -> [u8; 6] {
        let ip = self.ip.octets();
        let port = self.port.to_be_bytes();
        [ip[0], ip[1], ip[2], ip[3], port[0], port[1]]
    }

    pub fn from_octets(data: &[u8]) -> Result<Self> {
        match data {
            [a, b, c, d, p0, p1] => Ok(Self {
                ip: Ipv4Addr::new(*a, *b, *c, *d),
                port: u16::from_be_bytes([*p0, *p1]),
            }),
            _ => Err(WireError::decode(format!(
                "transport address must be 6 octets, got {}",
                data.len()
            ))),
        }
    }
}

impl From<SocketAddrV4> for TransportAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<TransportAddress> for SocketAddrV4 {
    fn from(addr: TransportAddress) -> Self {
        SocketAddrV4::new(addr.ip, addr.port)
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Type tag of an alias address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AliasKind {
    H323Id = 0,
    DialedDigits = 1,
    EmailId = 2,
    UrlId = 3,
    TransportAddress = 4,
}

impl TryFrom<u8> for AliasKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(AliasKind::H323Id),
            1 => Ok(AliasKind::DialedDigits),
            2 => Ok(AliasKind::EmailId),
            3 => Ok(AliasKind::UrlId),
            4 => Ok(AliasKind::TransportAddress),
            tag => Err(WireError::UnknownTag { context: "alias", tag }),
        }
    }
}

impl fmt::Display for AliasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AliasKind::H323Id => "h323_id",
            AliasKind::DialedDigits => "dialed_digits",
            AliasKind::EmailId => "email_id",
            AliasKind::UrlId => "url_id",
            AliasKind::TransportAddress => "transport_address",
        };
        f.write_str(name)
    }
}

/// A (type, value) alias exchanged in Setup, Facility and gatekeeper messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasAddress {
    pub kind: AliasKind,
    pub value: String,
}

impl AliasAddress {
    pub fn new(kind: AliasKind, value: impl Into<String>) -> Self {
        Self { kind, value: value.into() }
    }

    pub fn h323_id(value: impl Into<String>) -> Self {
        Self::new(AliasKind::H323Id, value)
    }

    pub fn dialed_digits(value: impl Into<String>) -> Self {
        Self::new(AliasKind::DialedDigits, value)
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self::new(AliasKind::EmailId, value)
    }

    pub fn url(value: impl Into<String>) -> Self {
        Self::new(AliasKind::UrlId, value)
    }

    /// Check the value is acceptable for its kind
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.value.is_empty() {
            return Err(format!("empty {} alias", self.kind));
        }
        match self.kind {
            AliasKind::DialedDigits => {
                if let Some(c) = self
                    .value
                    .chars()
                    .find(|c| !(c.is_ascii_digit() || matches!(c, '*' | '#' | ',')))
                {
                    return Err(format!("invalid character '{}' in dialed digits", c));
                }
            }
            AliasKind::EmailId => {
                if !self.value.contains('@') {
                    return Err(format!("email alias '{}' lacks '@'", self.value));
                }
            }
            AliasKind::TransportAddress => {
                if self.value.parse::<SocketAddrV4>().is_err() {
                    return Err(format!("transport alias '{}' is not ip:port", self.value));
                }
            }
            AliasKind::H323Id | AliasKind::UrlId => {}
        }
        Ok(())
    }

    pub(crate) fn encode(&self, w: &mut TlvWriter<'_>, tag: u8) -> Result<()> {
        w.put_nested(tag, |inner| {
            inner.put_u8(1, self.kind as u8)?;
            inner.put_str(2, &self.value)
        })
    }

    pub(crate) fn decode(value: Bytes) -> Result<Self> {
        let mut kind = None;
        let mut text = None;
        let mut r = TlvReader::new(value);
        while let Some((tag, field)) = r.next_field()? {
            match tag {
                1 => kind = Some(AliasKind::try_from(read_u8(&field)?)?),
                2 => text = Some(read_string(&field)?),
                _ => {}
            }
        }
        match (kind, text) {
            (Some(kind), Some(value)) => Ok(Self { kind, value }),
            _ => Err(WireError::decode("alias missing kind or value")),
        }
    }
}

impl fmt::Display for AliasAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

pub(crate) fn encode_address(w: &mut TlvWriter<'_>, tag: u8, addr: &TransportAddress) -> Result<()> {
    w.put_bytes(tag, &addr.to_octets())
}

pub(crate) fn decode_address(value: &Bytes) -> Result<TransportAddress> {
    TransportAddress::from_octets(value.as_ref())
}

/// Encode a list of aliases as a standalone buffer
pub fn encode_alias_list(aliases: &[AliasAddress]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    let mut w = TlvWriter::new(&mut buf);
    for alias in aliases {
        alias.encode(&mut w, 1)?;
    }
    Ok(buf.freeze())
}

/// Decode a list produced by [`encode_alias_list`]
pub fn decode_alias_list(data: Bytes) -> Result<Vec<AliasAddress>> {
    let mut out = Vec::new();
    let mut r = TlvReader::new(data);
    while let Some((tag, field)) = r.next_field()? {
        if tag == 1 {
            out.push(AliasAddress::decode(field)?);
        }
    }
    Ok(out)
}
