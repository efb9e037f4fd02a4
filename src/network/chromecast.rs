use async_trait::async_trait;
use rust_cast::channels::media::{Media, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use rust_cast::CastDevice;
use tracing::{debug, info};

use super::discovery::CastTarget;
use crate::{CasterError, Result};

/// Every file is announced with this type, whatever it really contains.
pub const MEDIA_MIME_TYPE: &str = "video/mp4";

/// Media channel of a cast device
#[async_trait]
pub trait MediaController: Send + Sync {
    async fn play_media(&self, target: &CastTarget, url: &str, mime_type: &str) -> Result<()>;
}

/// Talks CASTV2 to the device through rust_cast.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCastController;

#[async_trait]
impl MediaController for RustCastController {
    async fn play_media(&self, target: &CastTarget, url: &str, mime_type: &str) -> Result<()> {
        let addr = target.ip.to_string();
        let port = target.port;
        let media = Media {
            content_id: url.to_string(),
            content_type: mime_type.to_string(),
            stream_type: StreamType::Buffered,
            duration: None,
            metadata: None,
        };

        // rust_cast blocks on its TLS socket
        tokio::task::spawn_blocking(move || load_media_blocking(&addr, port, &media))
            .await
            .map_err(|e| CasterError::Cast(format!("Cast task failed: {}", e)))??;

        info!("Successfully cast '{}' to {}", url, target.name);
        Ok(())
    }
}

fn load_media_blocking(addr: &str, port: u16, media: &Media) -> Result<()> {
    debug!("Connecting to Chromecast at {}:{}", addr, port);

    let device = CastDevice::connect_without_host_verification(addr, port)
        .map_err(|e| CasterError::Cast(format!("Failed to connect to Chromecast: {}", e)))?;

    device
        .connection
        .connect("receiver-0")
        .map_err(|e| CasterError::Cast(format!("Failed to connect to receiver: {}", e)))?;

    // Default Media Receiver App
    let app = device
        .receiver
        .launch_app(&CastDeviceApp::DefaultMediaReceiver)
        .map_err(|e| CasterError::Cast(format!("Failed to launch app: {}", e)))?;

    debug!("Launched media receiver app: {:?}", app);

    device
        .connection
        .connect(app.transport_id.as_str())
        .map_err(|e| CasterError::Cast(format!("Failed to connect to media app: {}", e)))?;

    device
        .media
        .load(app.transport_id.as_str(), app.session_id.as_str(), media)
        .map_err(|e| CasterError::Cast(format!("Failed to load media: {}", e)))?;

    Ok(())
}
