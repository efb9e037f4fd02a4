pub mod caster;
pub mod error;
pub mod media;
pub mod network;
pub mod server;

pub use caster::ChromeCaster;
pub use error::{CasterError, Result};
pub use media::{media_url, ServeConfig, StagedFile, DEFAULT_PORT};
pub use network::{
    locate_device, AddressResolver, CastTarget, DeviceDirectory, MdnsDirectory, MediaController,
    RustCastController, MEDIA_MIME_TYPE,
};
pub use server::{LogHooks, MediaServer, ServerHooks};
