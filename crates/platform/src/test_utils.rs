//! Helpers for tests that talk to an in-process HTTP server.

use axum::Router;
use tokio::net::TcpListener;

use crate::config::{Endpoints, SessionConfig};
use crate::session::HttpSession;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Session pointed at `base` for every host, with IP discovery disabled.
pub fn test_session(base: &str) -> HttpSession {
    let config = SessionConfig {
        api_timeout_secs: 5,
        ip_echo_services: Vec::new(),
        ..SessionConfig::default()
    };
    HttpSession::new(config, Endpoints::all_at(base)).unwrap()
}

/// Like [`test_session`], with `<base>/ip?format=json` as the only IP echo
/// service.
pub fn test_session_with_ip(base: &str) -> HttpSession {
    let config = SessionConfig {
        api_timeout_secs: 5,
        ip_echo_timeout_secs: 2,
        ip_echo_services: vec![format!("{base}/ip?format=json")],
        ..SessionConfig::default()
    };
    HttpSession::new(config, Endpoints::all_at(base)).unwrap()
}
