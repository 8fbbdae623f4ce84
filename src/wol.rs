//! Wake-on-LAN: MAC parsing, magic packet construction and UDP broadcast.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// 6 x 0xFF followed by 16 copies of the MAC.
pub const MAGIC_PACKET_LEN: usize = 102;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress([u8; 6]);

#[derive(Debug, Error, PartialEq)]
pub enum MacParseError {
    #[error("expected 12 hex digits, found {0}")]
    Length(usize),
    #[error("unexpected character '{0}'")]
    Character(char),
}

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digits = Vec::with_capacity(12);
        for c in s.trim().chars() {
            match c {
                ':' | '-' | '.' => continue,
                c if c.is_ascii_hexdigit() => digits.push(c),
                c => return Err(MacParseError::Character(c)),
            }
        }
        if digits.len() != 12 {
            return Err(MacParseError::Length(digits.len()));
        }

        let mut out = [0u8; 6];
        for (i, pair) in digits.chunks(2).enumerate() {
            let hex: String = pair.iter().collect();
            out[i] = u8::from_str_radix(&hex, 16).map_err(|_| MacParseError::Character(pair[0]))?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

pub fn magic_packet(mac: MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut pkt = [0xFFu8; MAGIC_PACKET_LEN];
    for chunk in pkt[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac.octets());
    }
    pkt
}

/// One-shot request for the remote machine to power on. No acknowledgment exists.
#[async_trait]
pub trait WakeTrigger: Send + Sync {
    async fn wake(&self, mac: MacAddress);
}

pub struct UdpWakeTrigger {
    broadcast: Ipv4Addr,
    port: u16,
}

impl UdpWakeTrigger {
    pub fn new(broadcast: &str, port: u16) -> Self {
        let broadcast = broadcast.parse::<Ipv4Addr>().unwrap_or_else(|_| {
            warn!("Invalid broadcast address '{}', using 255.255.255.255", broadcast);
            Ipv4Addr::BROADCAST
        });
        Self { broadcast, port }
    }

    async fn send(&self, pkt: &[u8]) -> std::io::Result<()> {
        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        sock.set_broadcast(true)?;
        sock.send_to(pkt, SocketAddrV4::new(self.broadcast, self.port)).await?;
        Ok(())
    }
}

#[async_trait]
impl WakeTrigger for UdpWakeTrigger {
    async fn wake(&self, mac: MacAddress) {
        info!("Sending WoL packet to {} via {}:{}", mac, self.broadcast, self.port);
        match self.send(&magic_packet(mac)).await {
            Ok(()) => debug!("WoL packet sent"),
            Err(e) => warn!("Failed to send WoL packet: {}", e),
        }
    }
}
