//! Local address resolution.
//!
//! The media URL handed to the cast device has to carry an address of this
//! host that the device can reach. Two strategies are tried in order: the
//! host's own name lookup, then a routing-table probe.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::debug;

use crate::{CasterError, Result};

/// Address used to ask the routing table for the outbound interface.
/// Nothing is ever sent to it.
pub const ROUTING_PROBE_TARGET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);

/// One way of guessing the local address.
pub trait AddressStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self) -> Option<Ipv4Addr>;
}

/// Picks the first IPv4 address outside `127.0.0.0/8`.
pub fn first_non_loopback<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
        _ => None,
    })
}

type AddressSource = Box<dyn Fn() -> io::Result<Vec<IpAddr>> + Send + Sync>;

/// Resolves the host's own name and keeps the first non-loopback address.
pub struct HostnameLookup {
    source: AddressSource,
}

impl HostnameLookup {
    pub fn system() -> Self {
        Self::from_fn(host_addresses)
    }

    pub fn from_fn<F>(source: F) -> Self
    where
        F: Fn() -> io::Result<Vec<IpAddr>> + Send + Sync + 'static,
    {
        Self {
            source: Box::new(source),
        }
    }
}

impl AddressStrategy for HostnameLookup {
    fn name(&self) -> &'static str {
        "hostname lookup"
    }

    fn resolve(&self) -> Option<Ipv4Addr> {
        match (self.source)() {
            Ok(addrs) => first_non_loopback(addrs),
            Err(e) => {
                debug!("Hostname lookup failed: {}", e);
                None
            }
        }
    }
}

fn host_addresses() -> io::Result<Vec<IpAddr>> {
    let host = host_name()?;
    Ok((host.as_str(), 0)
        .to_socket_addrs()?
        .map(|addr| addr.ip())
        .collect())
}

fn host_name() -> io::Result<String> {
    hostname::get()?
        .into_string()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "host name is not valid UTF-8"))
}

/// "Connects" a UDP socket and reads back the local endpoint the OS picked.
pub struct RoutingProbe {
    target: SocketAddr,
}

impl RoutingProbe {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    fn probe(&self) -> io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(self.target)?;
        Ok(socket.local_addr()?.ip())
    }
}

impl Default for RoutingProbe {
    fn default() -> Self {
        Self::new(ROUTING_PROBE_TARGET)
    }
}

impl AddressStrategy for RoutingProbe {
    fn name(&self) -> &'static str {
        "routing probe"
    }

    fn resolve(&self) -> Option<Ipv4Addr> {
        match self.probe() {
            Ok(addr) => first_non_loopback([addr]),
            Err(e) => {
                debug!("Routing probe via {} failed: {}", self.target, e);
                None
            }
        }
    }
}

/// Tries each strategy in order; the first answer wins.
pub struct AddressResolver {
    strategies: Vec<Box<dyn AddressStrategy>>,
}

impl AddressResolver {
    pub fn new(strategies: Vec<Box<dyn AddressStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn resolve(&self) -> Result<Ipv4Addr> {
        for strategy in &self.strategies {
            if let Some(addr) = strategy.resolve() {
                debug!("Local address {} found by {}", addr, strategy.name());
                return Ok(addr);
            }
            debug!("{} found no usable address", strategy.name());
        }
        Err(CasterError::AddressUnavailable)
    }
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(HostnameLookup::system()),
            Box::new(RoutingProbe::default()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        addr: Option<Ipv4Addr>,
        calls: Arc<AtomicUsize>,
    }

    impl AddressStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn resolve(&self) -> Option<Ipv4Addr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.addr
        }
    }

    fn loopback_only() -> HostnameLookup {
        HostnameLookup::from_fn(|| {
            Ok(vec![
                IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
                IpAddr::V4(Ipv4Addr::new(127, 0, 1, 1)),
            ])
        })
    }

    #[test]
    fn skips_loopback_and_ipv6() {
        let addrs = vec![
            "127.0.0.1".parse().unwrap(),
            "::1".parse().unwrap(),
            "fe80::1".parse().unwrap(),
            "192.168.1.50".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        ];
        assert_eq!(first_non_loopback(addrs), Some(Ipv4Addr::new(192, 168, 1, 50)));
    }

    #[test]
    fn hostname_lookup_with_only_loopback_yields_nothing() {
        assert_eq!(loopback_only().resolve(), None);
    }

    #[test]
    fn host_name_comes_from_the_os() {
        let name = host_name().unwrap();
        assert!(!name.is_empty());
        assert!(!name.contains('\0'));
    }

    #[test]
    fn hostname_lookup_error_yields_nothing() {
        let lookup = HostnameLookup::from_fn(|| Err(io::Error::other("no resolver")));
        assert_eq!(lookup.resolve(), None);
    }

    #[test]
    fn falls_through_to_routing_when_all_addresses_are_loopback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = AddressResolver::new(vec![
            Box::new(loopback_only()),
            Box::new(Fixed {
                addr: Some(Ipv4Addr::new(192, 168, 1, 50)),
                calls: Arc::clone(&calls),
            }),
        ]);

        assert_eq!(resolver.resolve().unwrap(), Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_strategy_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = AddressResolver::new(vec![
            Box::new(HostnameLookup::from_fn(|| Ok(vec!["10.1.2.3".parse().unwrap()]))),
            Box::new(Fixed {
                addr: Some(Ipv4Addr::new(192, 168, 1, 50)),
                calls: Arc::clone(&calls),
            }),
        ]);

        assert_eq!(resolver.resolve().unwrap(), Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_candidate_is_fatal() {
        let resolver = AddressResolver::new(vec![
            Box::new(loopback_only()),
            Box::new(Fixed {
                addr: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        ]);

        assert!(matches!(resolver.resolve(), Err(CasterError::AddressUnavailable)));
    }
}
