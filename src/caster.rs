use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::media::{ServeConfig, StagedFile};
use crate::network::{CastTarget, MediaController, MEDIA_MIME_TYPE};
use crate::server::{LogHooks, MediaServer, ServerHooks, DEFAULT_DRAIN_GRACE};
use crate::Result;

/// One cast session: stage the file, tell the device to play it, serve it
/// until stopped, clean up.
pub struct ChromeCaster<C> {
    target: CastTarget,
    config: ServeConfig,
    controller: C,
    hooks: Arc<dyn ServerHooks>,
    staging_root: PathBuf,
    drain_grace: Duration,
}

impl<C: MediaController> ChromeCaster<C> {
    pub fn new(target: CastTarget, config: ServeConfig, controller: C) -> Self {
        Self {
            target,
            config,
            controller,
            hooks: Arc::new(LogHooks),
            staging_root: std::env::temp_dir(),
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ServerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn target(&self) -> &CastTarget {
        &self.target
    }

    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    /// Runs the session until `shutdown` resolves.
    ///
    /// The staged files are removed whether serving stopped normally or
    /// failed; a serving error wins over a cleanup error.
    pub async fn play_file<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let url = self.config.url()?;

        // The announced type is fixed, whatever the file really holds
        if let Some(guess) = mime_guess::from_path(self.config.file()).first() {
            if guess.essence_str() != MEDIA_MIME_TYPE {
                debug!("'{}' looks like {}, announcing it as {}", url, guess, MEDIA_MIME_TYPE);
            }
        }

        // Stage, serve, then clean up no matter how serving ended
        let staged = StagedFile::create_in(&self.staging_root, self.config.file())?;
        let served = self.cast_and_serve(&staged, &url, shutdown).await;
        let cleaned = staged.remove();

        served.and(cleaned)
    }

    async fn cast_and_serve<F>(&self, staged: &StagedFile, url: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Listening before the play request, so the device's first fetch
        // lands in the backlog instead of being refused.
        let server = MediaServer::new(staged.directory(), self.config.port())
            .with_drain_grace(self.drain_grace)
            .bind()
            .await?;

        // Ask the device to play; a refusal is reported but serving goes on
        info!("requesting to cast '{}'", url);
        if let Err(e) = self
            .controller
            .play_media(&self.target, url, MEDIA_MIME_TYPE)
            .await
        {
            error!("Failed to cast '{}' to '{}': {}", url, self.target.name, e);
        }

        // Blocks until the stop condition fires
        info!("starting media server running '{}'", url);
        server.serve_until(shutdown, self.hooks.as_ref()).await
    }
}
