pub mod address;
pub mod chromecast;
pub mod discovery;

pub use address::{AddressResolver, AddressStrategy, HostnameLookup, RoutingProbe};
pub use chromecast::{MediaController, RustCastController, MEDIA_MIME_TYPE};
pub use discovery::{locate_device, CastTarget, DeviceDirectory, MdnsDirectory};
