use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use serde::Serialize;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::{CasterError, Result};

/// Service name for Chromecast mDNS discovery
pub const CHROMECAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// A discovered cast device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CastTarget {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
    pub model: Option<String>,
}

impl CastTarget {
    pub fn new(name: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self {
            name: name.into(),
            ip,
            port,
            model: None,
        }
    }
}

/// Source of cast devices on the local network
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Every device seen during one discovery pass.
    async fn list_devices(&self) -> Result<Vec<CastTarget>>;

    /// Whatever device the directory considers the default.
    async fn default_device(&self) -> Result<Option<CastTarget>> {
        Ok(self.list_devices().await?.into_iter().next())
    }
}

/// Finds the device to cast to: the exact friendly-name match when a name is
/// given, the directory's default otherwise.
pub async fn locate_device(
    directory: &dyn DeviceDirectory,
    name: Option<&str>,
) -> Result<CastTarget> {
    // Exact friendly-name match, or the directory's pick
    let found = match name {
        Some(name) => directory
            .list_devices()
            .await?
            .into_iter()
            .find(|device| device.name == name),
        None => directory.default_device().await?,
    };

    let device = found.ok_or_else(|| CasterError::DeviceNotFound {
        name: name.map(str::to_string),
    })?;

    info!("found cast device '{}'", device.name);
    Ok(device)
}

/// Browses `_googlecast._tcp` for a bounded window.
pub struct MdnsDirectory {
    timeout: Duration,
}

impl MdnsDirectory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn browse(&self, stop_at_first: bool) -> Result<Vec<CastTarget>> {
        // Nothing can resolve in an empty window
        if self.timeout.is_zero() {
            debug!("Discovery window is zero, skipping mDNS browse");
            return Ok(Vec::new());
        }

        info!("Discovering Chromecast devices...");

        // Browse for the cast service
        let mdns = ServiceDaemon::new()
            .map_err(|e| CasterError::Discovery(format!("Failed to create mDNS daemon: {}", e)))?;

        let receiver = mdns.browse(CHROMECAST_SERVICE_TYPE).map_err(|e| {
            CasterError::Discovery(format!("Failed to browse for Chromecast devices: {}", e))
        })?;

        // Collect resolved devices until the window closes
        let deadline = Instant::now() + self.timeout;
        let mut devices: Vec<CastTarget> = Vec::new();

        loop {
            let event = match time::timeout_at(deadline, receiver.recv_async()).await {
                Ok(Ok(event)) => event,
                // Channel closed
                Ok(Err(_)) => break,
                // Discovery window elapsed
                Err(_) => break,
            };

            if let ServiceEvent::ServiceResolved(info) = event {
                let Some(device) = target_from_service(&info) else {
                    continue;
                };
                debug!("Discovered Chromecast: {} at {}:{}", device.name, device.ip, device.port);

                // One entry per friendly name, even with several addresses
                if !devices.iter().any(|d| d.name == device.name) {
                    devices.push(device);
                }
                if stop_at_first {
                    break;
                }
            }
        }

        // Stop browsing
        let _ = mdns.stop_browse(CHROMECAST_SERVICE_TYPE);
        let _ = mdns.shutdown();

        Ok(devices)
    }
}

impl Default for MdnsDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_TIMEOUT)
    }
}

#[async_trait]
impl DeviceDirectory for MdnsDirectory {
    async fn list_devices(&self) -> Result<Vec<CastTarget>> {
        self.browse(false).await
    }

    async fn default_device(&self) -> Result<Option<CastTarget>> {
        Ok(self.browse(true).await?.into_iter().next())
    }
}

fn target_from_service(info: &ServiceInfo) -> Option<CastTarget> {
    let name = info
        .get_property_val_str("fn")
        .map(str::to_string)
        .unwrap_or_else(|| info.get_fullname().trim_end_matches('.').to_string());

    let ip = pick_address(info.get_addresses().iter().copied())?;

    Some(CastTarget {
        name,
        ip,
        port: info.get_port(),
        model: info.get_property_val_str("md").map(str::to_string),
    })
}

/// IPv4 first; rust_cast connects by plain host string.
fn pick_address<I>(addrs: I) -> Option<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    let addrs: Vec<IpAddr> = addrs.into_iter().collect();
    addrs
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| addrs.first().copied())
}
