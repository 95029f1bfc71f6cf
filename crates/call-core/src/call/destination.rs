//! Parsing of dialed destinations
//!
//! Accepted forms are `ip`, `ip:port`, `alias@ip[:port]` and a bare alias.
//! A bare alias is routed through the gatekeeper.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use h323_wire_core::{AliasAddress, TransportAddress};

use crate::error::{CallError, Result};

pub const DEFAULT_H225_PORT: u16 = 1720;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub address: Option<TransportAddress>,
    pub aliases: Vec<AliasAddress>,
}

impl Destination {
    /// First dialed-digits alias, used as the called party number
    pub fn dialed_digits(&self) -> Option<&str> {
        self.aliases
            .iter()
            .find(|a| a.kind == h323_wire_core::AliasKind::DialedDigits)
            .map(|a| a.value.as_str())
    }
}

fn parse_host(host: &str) -> Option<TransportAddress> {
    if let Ok(addr) = host.parse::<SocketAddrV4>() {
        return Some(addr.into());
    }
    host.parse::<Ipv4Addr>()
        .ok()
        .map(|ip| TransportAddress::new(ip, DEFAULT_H225_PORT))
}

fn alias_for(user: &str) -> AliasAddress {
    let digits = AliasAddress::dialed_digits(user);
    if digits.validate().is_ok() {
        digits
    } else if user.contains("://") {
        AliasAddress::url(user)
    } else {
        AliasAddress::h323_id(user)
    }
}

impl FromStr for Destination {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CallError::InvalidDestination("empty destination".to_string()));
        }

        if let Some(address) = parse_host(s) {
            return Ok(Self { address: Some(address), aliases: Vec::new() });
        }

        if let Some((user, host)) = s.rsplit_once('@') {
            if let Some(address) = parse_host(host) {
                if user.is_empty() {
                    return Err(CallError::InvalidDestination(format!("empty alias in '{}'", s)));
                }
                return Ok(Self { address: Some(address), aliases: vec![alias_for(user)] });
            }
            // user@domain with no address part is an email alias
            return Ok(Self { address: None, aliases: vec![AliasAddress::email(s)] });
        }

        if s.contains(':') && !s.contains("://") {
            return Err(CallError::InvalidDestination(format!("bad address '{}'", s)));
        }
        Ok(Self { address: None, aliases: vec![alias_for(s)] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h323_wire_core::AliasKind;

    #[test]
    fn test_address_forms() {
        let d: Destination = "10.0.0.5".parse().unwrap();
        assert_eq!(d.address, Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 5), 1720)));
        assert!(d.aliases.is_empty());

        let d: Destination = "10.0.0.5:1721".parse().unwrap();
        assert_eq!(d.address.unwrap().port, 1721);
    }

    #[test]
    fn test_alias_at_address() {
        let d: Destination = "5551234@192.168.1.2".parse().unwrap();
        assert_eq!(d.aliases[0].kind, AliasKind::DialedDigits);
        assert_eq!(d.dialed_digits(), Some("5551234"));

        let d: Destination = "alice@192.168.1.2:1730".parse().unwrap();
        assert_eq!(d.aliases[0], AliasAddress::h323_id("alice"));
        assert_eq!(d.address.unwrap().port, 1730);
    }

    #[test]
    fn test_bare_aliases() {
        let d: Destination = "bob@example.com".parse().unwrap();
        assert_eq!(d.address, None);
        assert_eq!(d.aliases[0].kind, AliasKind::EmailId);

        let d: Destination = "gateway-1".parse().unwrap();
        assert_eq!(d.aliases[0], AliasAddress::h323_id("gateway-1"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<Destination>().is_err());
        assert!("10.0.0.1:notaport".parse::<Destination>().is_err());
        assert!("@10.0.0.1".parse::<Destination>().is_err());
    }
}
