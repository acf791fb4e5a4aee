//! Health check HTTP server for container orchestration
//!
//! `GET /health` probes the broker handle published in [`HealthState`] and
//! answers 200 or 503. Every other path is a 404 with an empty body. The
//! server runs as its own task so it keeps answering while the subscription
//! loop is blocked on the broker.

use crate::broker::{HealthState, ProbeResult};
use crate::config::HealthSection;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::{Filter, Rejection, Reply};

/// The only path the server answers on
pub const HEALTH_PATH: &str = "/health";

/// Error text reported to probes whenever the broker is unusable
pub const BROKER_FAILURE_MESSAGE: &str = "Redis connection failed";

#[derive(Debug, Error)]
pub enum HealthServerError {
    #[error("Failed to bind health server on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },
}

/// JSON body of `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            error: None,
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            status: "unhealthy".to_string(),
            error: Some(BROKER_FAILURE_MESSAGE.to_string()),
        }
    }
}

/// HTTP health check server
pub struct HealthServer {
    port: u16,
    probe_timeout: Duration,
    state: HealthState,
}

impl HealthServer {
    /// Create new health server
    pub fn new(section: &HealthSection, state: HealthState) -> Self {
        Self {
            port: section.port,
            probe_timeout: section.probe_timeout(),
            state,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address on all interfaces
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Probe the broker and build the `/health` answer
    pub async fn check(&self) -> (StatusCode, HealthResponse) {
        match self.state.probe(self.probe_timeout).await {
            ProbeResult::Alive => (StatusCode::OK, HealthResponse::healthy()),
            ProbeResult::Dead(reason) => {
                debug!("Health check reporting unhealthy: {}", reason);
                (StatusCode::SERVICE_UNAVAILABLE, HealthResponse::unhealthy())
            }
        }
    }

    /// All routes served by the health server
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let health_server = self;

        // Exact match only, `/health/` falls through to 404
        let health_path = warp::path::full()
            .and_then(|path: FullPath| async move {
                if path.as_str() == HEALTH_PATH {
                    Ok(())
                } else {
                    Err(warp::reject::not_found())
                }
            })
            .untuple_one();

        // GET /health - broker probe
        let health_route = health_path
            .clone()
            .and(warp::get())
            .and_then(move || {
                let server = health_server.clone();
                async move {
                    let (status, body) = server.check().await;
                    Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&body), status))
                }
            });

        // Other methods on /health
        let method_route = health_path
            .map(|| warp::reply::with_status(warp::reply(), StatusCode::METHOD_NOT_ALLOWED));

        // Everything else
        let not_found_route = warp::any().and_then(|| async {
            Ok::<_, Rejection>(warp::reply::with_status(
                warp::reply(),
                StatusCode::NOT_FOUND,
            ))
        });

        health_route.or(method_route).or(not_found_route)
    }

    /// Bind the listener; the returned future serves until `shutdown` flips
    /// to true or its sender is dropped.
    pub fn bind(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(SocketAddr, impl Future<Output = ()> + Send + 'static), HealthServerError> {
        let addr = self.bind_address();
        let routes = self.routes();

        let signal = async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            debug!("Health server shutting down");
        };

        warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, signal)
            .map_err(|e| HealthServerError::Bind {
                addr,
                reason: e.to_string(),
            })
    }

    /// Bind and spawn the server as an independent task
    pub fn start(
        self: Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(SocketAddr, JoinHandle<()>), HealthServerError> {
        let (addr, server) = self.bind(shutdown)?;
        let handle = tokio::spawn(server);
        info!("Health check server started on port {}", addr.port());
        Ok((addr, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockHandle;

    fn server_with(state: HealthState) -> Arc<HealthServer> {
        let section = HealthSection {
            port: 0,
            probe_timeout_ms: 50,
        };
        Arc::new(HealthServer::new(&section, state))
    }

    #[test]
    fn test_health_response_bodies() {
        assert_eq!(
            serde_json::to_string(&HealthResponse::healthy()).unwrap(),
            r#"{"status":"healthy"}"#
        );
        assert_eq!(
            serde_json::to_string(&HealthResponse::unhealthy()).unwrap(),
            r#"{"status":"unhealthy","error":"Redis connection failed"}"#
        );
    }

    #[test]
    fn test_bind_address_is_all_interfaces() {
        let section = HealthSection::default();
        let server = HealthServer::new(&section, HealthState::new());
        assert_eq!(server.bind_address(), "0.0.0.0:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn test_health_unhealthy_before_connection() {
        let routes = server_with(HealthState::new()).routes();

        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
        let body: HealthResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, HealthResponse::unhealthy());
    }

    #[tokio::test]
    async fn test_health_healthy_with_live_handle() {
        let state = HealthState::new();
        state.mark_healthy(Arc::new(MockHandle::new()));
        let routes = server_with(state).routes();

        let response = warp::test::request().path("/health").reply(&routes).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#"{"status":"healthy"}"#);
    }

    #[tokio::test]
    async fn test_health_unhealthy_when_ping_fails() {
        let handle = Arc::new(MockHandle::new());
        let state = HealthState::new();
        state.mark_healthy(handle.clone());
        let routes = server_with(state).routes();

        handle.set_alive(false);
        let response = warp::test::request().path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        handle.set_alive(true);
        let response = warp::test::request().path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_unhealthy_when_ping_hangs() {
        let state = HealthState::new();
        state.mark_healthy(Arc::new(
            MockHandle::new().with_ping_delay(Duration::from_secs(5)),
        ));
        let routes = server_with(state).routes();

        let response = warp::test::request().path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_paths_return_404() {
        let state = HealthState::new();
        state.mark_healthy(Arc::new(MockHandle::new()));
        let routes = server_with(state).routes();

        for path in ["/", "/healthz", "/health/", "/health/extra", "/metrics"] {
            let response = warp::test::request().path(path).reply(&routes).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "path {path}");
            assert!(response.body().is_empty(), "path {path}");
        }
    }

    #[tokio::test]
    async fn test_trailing_slash_is_not_health() {
        let state = HealthState::new();
        state.mark_healthy(Arc::new(MockHandle::new()));
        let routes = server_with(state).routes();

        let response = warp::test::request().path("/health/").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_empty());

        let response = warp::test::request()
            .method("POST")
            .path("/health/")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = warp::test::request().path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_get_on_health_is_rejected() {
        let routes = server_with(HealthState::new()).routes();

        let response = warp::test::request()
            .method("POST")
            .path("/health")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (addr, handle) = server_with(HealthState::new()).start(shutdown_rx).unwrap();
        assert_ne!(addr.port(), 0);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server should stop after shutdown signal")
            .unwrap();
    }
}
