use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{CasterError, Result};

/// How long open responses may keep streaming once a stop is requested.
/// A paused device holds its GET open indefinitely.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Called around one serving session.
pub trait ServerHooks: Send + Sync {
    fn on_start(&self, _addr: SocketAddr, _root: &Path) {}

    fn on_stop(&self) {}
}

/// Hooks that only log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHooks;

impl ServerHooks for LogHooks {
    fn on_start(&self, addr: SocketAddr, root: &Path) {
        info!("media server listening on http://{} serving {}", addr, root.display());
    }

    fn on_stop(&self) {
        info!("media server stopped");
    }
}

/// Static file server for one staged directory.
pub struct MediaServer {
    root: PathBuf,
    port: u16,
    drain_grace: Duration,
}

impl MediaServer {
    pub fn new(root: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            root: root.into(),
            port,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .fallback_service(ServeDir::new(&self.root))
            .layer(TraceLayer::new_for_http())
    }

    /// Binds on every interface; the advertised address is not the bound one.
    pub async fn bind(&self) -> Result<BoundServer> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CasterError::Bind {
                port: self.port,
                source,
            })?;

        Ok(BoundServer {
            listener,
            router: self.router(),
            root: self.root.clone(),
            drain_grace: self.drain_grace,
        })
    }
}

/// A listening server that has not started accepting yet.
pub struct BoundServer {
    listener: TcpListener,
    router: Router,
    root: PathBuf,
    drain_grace: Duration,
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` resolves, then drains open connections for at
    /// most the drain grace before giving up on them.
    pub async fn serve_until<F>(self, shutdown: F, hooks: &dyn ServerHooks) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        hooks.on_start(addr, &self.root);

        let (stopping_tx, mut stopping_rx) = watch::channel(false);
        let signal = async move {
            shutdown.await;
            let _ = stopping_tx.send(true);
        };

        let serve = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .into_future();
        tokio::pin!(serve);

        let grace = self.drain_grace;
        let drain_deadline = async move {
            // Sender gone without a stop means serve already ended on its own.
            if stopping_rx.wait_for(|stopping| *stopping).await.is_err() {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(grace).await;
        };

        let served = tokio::select! {
            served = &mut serve => served,
            _ = drain_deadline => {
                warn!("Clients still streaming after {:?}, closing media server", grace);
                Ok(())
            }
        };

        hooks.on_stop();
        served.map_err(CasterError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const CONTENT: &[u8] = b"0123456789abcdefghij";

    fn staged_dir() -> (tempfile::TempDir, tempfile::TempDir) {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("clip.mp4");
        std::fs::write(&source, CONTENT).unwrap();

        let served = tempfile::tempdir().unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(&source, served.path().join("clip.mp4")).unwrap();
        #[cfg(not(unix))]
        std::fs::copy(&source, served.path().join("clip.mp4")).unwrap();

        (source_dir, served)
    }

    #[tokio::test]
    async fn serves_whole_file_through_symlink() {
        let (_source, served) = staged_dir();
        let router = MediaServer::new(served.path(), 0).router();

        let response = router
            .oneshot(Request::get("/clip.mp4").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], CONTENT);
    }

    #[tokio::test]
    async fn answers_range_requests() {
        let (_source, served) = staged_dir();
        let router = MediaServer::new(served.path(), 0).router();

        let response = router
            .oneshot(
                Request::get("/clip.mp4")
                    .header(header::RANGE, "bytes=10-14")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 10-14/20");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abcde");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (_source, served) = staged_dir();
        let router = MediaServer::new(served.path(), 0).router();

        let response = router
            .oneshot(Request::get("/other.mp4").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn taken_port_is_a_bind_error() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let served = tempfile::tempdir().unwrap();

        match MediaServer::new(served.path(), port).bind().await {
            Err(CasterError::Bind { port: failed, .. }) => assert_eq!(failed, port),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("bound an occupied port"),
        }
    }

    #[tokio::test]
    async fn serve_until_returns_after_shutdown() {
        let served = tempfile::tempdir().unwrap();
        let bound = MediaServer::new(served.path(), 0).bind().await.unwrap();
        assert_ne!(bound.local_addr().unwrap().port(), 0);

        bound.serve_until(async {}, &LogHooks).await.unwrap();
    }

    #[tokio::test]
    async fn stalled_client_does_not_block_shutdown() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let served = tempfile::tempdir().unwrap();
        std::fs::write(served.path().join("big.mp4"), vec![7u8; 32 << 20]).unwrap();

        let bound = MediaServer::new(served.path(), 0)
            .with_drain_grace(Duration::from_millis(200))
            .bind()
            .await
            .unwrap();
        let port = bound.local_addr().unwrap().port();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            bound
                .serve_until(
                    async {
                        let _ = stop_rx.await;
                    },
                    &LogHooks,
                )
                .await
        });

        // Start a download, then stop reading with the response half sent
        let mut client = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        client
            .write_all(b"GET /big.mp4 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 4096];
        client.read_exact(&mut buf).await.unwrap();

        stop_tx.send(()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(5), server).await;

        assert!(stopped.is_ok(), "server kept waiting on the stalled download");
        stopped.unwrap().unwrap().unwrap();
        drop(client);
    }
}
