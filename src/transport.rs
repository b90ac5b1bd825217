use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::{lookup_host, UdpSocket};

/// Default upper bound for a single datagram, safely below a 1500 byte ethernet MTU.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1432;

/// Best-effort UDP sender for rendered StatsD payloads.
///
/// The endpoint is resolved again on every send, so DNS changes are picked up without a
/// restart and a failed lookup only costs the current flush.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    endpoint: String,
    max_packet_size: usize,
    family_warned: AtomicBool,
}

impl UdpTransport {
    /// Binds an ephemeral local socket matching the address family of `endpoint`.
    ///
    /// If the endpoint cannot be resolved yet, an IPv4 socket is used.
    pub async fn bind(endpoint: String, max_packet_size: usize) -> io::Result<Self> {
        let ipv6 = match lookup_host(endpoint.as_str()).await {
            Ok(mut addrs) => addrs.next().map(|a| a.is_ipv6()).unwrap_or(false),
            Err(e) => {
                tracing::warn!("could not resolve statsd endpoint {}: {:?}", endpoint, e);
                false
            }
        };

        let socket = if ipv6 {
            UdpSocket::bind("[::]:0").await?
        } else {
            UdpSocket::bind("0.0.0.0:0").await?
        };

        Ok(Self {
            socket,
            endpoint,
            max_packet_size,
            family_warned: AtomicBool::new(false),
        })
    }

    /// Sends `body` as one or more datagrams, never splitting a line.
    ///
    /// A datagram that fails to send is logged and skipped; the remaining ones are still
    /// attempted. No retries are made. The error returned counts the datagrams that were
    /// lost.
    pub async fn send(&self, body: &str) -> io::Result<()> {
        let target = self.resolve().await?;
        let local_ipv6 = self.socket.local_addr()?.is_ipv6();

        let rebound;
        let socket = if target.is_ipv6() == local_ipv6 {
            &self.socket
        } else {
            if !self.family_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "statsd endpoint {} now resolves to {}, which the bound socket cannot reach; \
                     sending from a temporary socket",
                    self.endpoint,
                    target
                );
            }
            rebound = UdpSocket::bind(unspecified_for(&target)).await?;
            &rebound
        };

        let buf = body.as_bytes();
        let packets = split_in_packets(buf, self.max_packet_size);
        let mut lost = 0;
        for &(start, end) in &packets {
            let datagram = &buf[start..end];
            match socket.send_to(datagram, target).await {
                Ok(n) if n == datagram.len() => {}
                Ok(n) => {
                    tracing::error!(
                        "datagram to {} truncated to {} of {} bytes",
                        target,
                        n,
                        datagram.len()
                    );
                    lost += 1;
                }
                Err(e) => {
                    tracing::error!("failed to send datagram to {}: {:?}", target, e);
                    lost += 1;
                }
            }
        }

        if lost > 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} of {} datagrams to {} were lost", lost, packets.len(), target),
            ));
        }
        Ok(())
    }

    // Prefers an address of the bound socket's family, falling back to the first one.
    async fn resolve(&self) -> io::Result<SocketAddr> {
        let local_ipv6 = self.socket.local_addr()?.is_ipv6();
        let addrs: Vec<SocketAddr> = lookup_host(self.endpoint.as_str()).await?.collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv6() == local_ipv6)
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} did not resolve to any address", self.endpoint),
                )
            })
    }
}

fn unspecified_for(target: &SocketAddr) -> SocketAddr {
    let ip = match target {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

/// Groups the lines of `buf` into datagrams of at most `max_packet_size` bytes.
///
/// Returns `(start, end)` byte ranges. Lines are never split, since a StatsD aggregator
/// parses every datagram on its own, so a line longer than the limit is sent alone.
pub(crate) fn split_in_packets(buf: &[u8], max_packet_size: usize) -> Vec<(usize, usize)> {
    let mut packets = Vec::new();
    let (mut start, mut end) = (0, 0);
    for line in buf.split_inclusive(|&b| b == b'\n') {
        if end > start && end - start + line.len() > max_packet_size {
            packets.push((start, end));
            start = end;
        }
        end += line.len();
    }
    if end > start {
        packets.push((start, end));
    }
    packets
}
