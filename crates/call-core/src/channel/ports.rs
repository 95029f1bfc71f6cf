//! Endpoint-wide RTP/RTCP port allocation

use std::net::Ipv4Addr;

use h323_wire_core::TransportAddress;
use parking_lot::Mutex;

/// An RTP port and its RTCP companion (RTP + 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPorts {
    pub rtp: TransportAddress,
    pub rtcp: TransportAddress,
}

/// Hands out even RTP ports round-robin within a range
#[derive(Debug)]
pub struct RtpPortPool {
    ip: Ipv4Addr,
    base: u16,
    max: u16,
    next: Mutex<u16>,
}

impl RtpPortPool {
    /// `base` is rounded up to an even port
    pub fn new(ip: Ipv4Addr, base: u16, max: u16) -> Self {
        let base = base + base % 2;
        Self { ip, base, max, next: Mutex::new(base) }
    }

    pub fn allocate(&self) -> RtpPorts {
        let mut next = self.next.lock();
        let port = *next;
        *next = if port.saturating_add(2) > self.max.saturating_sub(1) { self.base } else { port + 2 };
        RtpPorts {
            rtp: TransportAddress::new(self.ip, port),
            rtcp: TransportAddress::new(self.ip, port + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_pairs_and_wrap() {
        let pool = RtpPortPool::new(Ipv4Addr::LOCALHOST, 10000, 10005);
        let first = pool.allocate();
        assert_eq!(first.rtp.port, 10000);
        assert_eq!(first.rtcp.port, 10001);
        assert_eq!(pool.allocate().rtp.port, 10002);
        assert_eq!(pool.allocate().rtp.port, 10004);
        assert_eq!(pool.allocate().rtp.port, 10000);
    }

    #[test]
    fn test_odd_base_rounded_up() {
        let pool = RtpPortPool::new(Ipv4Addr::LOCALHOST, 9999, 11000);
        assert_eq!(pool.allocate().rtp.port, 10000);
    }
}
