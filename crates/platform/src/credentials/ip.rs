//! Best-effort public IP discovery via third-party echo services.

use tracing::{debug, warn};

use crate::error::Result;
use crate::session::{HttpSession, ensure_success};

#[derive(Debug, Clone)]
pub struct IpDiscovery {
    session: HttpSession,
}

impl IpDiscovery {
    pub fn new(session: HttpSession) -> Self {
        Self { session }
    }

    /// The current public IP from the first echo service that answers, or
    /// `None` when every service fails. Never an error.
    pub async fn current_ip(&self) -> Option<String> {
        for service in &self.session.config().ip_echo_services {
            match self.query(service).await {
                Ok(Some(ip)) => {
                    debug!(service = %service, ip = %ip, "Discovered public IP");
                    return Some(ip);
                }
                Ok(None) => debug!(service = %service, "IP echo service returned no address"),
                Err(e) => debug!(service = %service, error = %e, "IP echo service failed"),
            }
        }

        if !self.session.config().ip_echo_services.is_empty() {
            warn!("Could not discover public IP; continuing without it");
        }
        None
    }

    async fn query(&self, service: &str) -> Result<Option<String>> {
        let response = self
            .session
            .client()
            .get(service)
            .timeout(self.session.config().ip_echo_timeout())
            .send()
            .await?;
        let body = ensure_success(response)?.text().await?;
        Ok(parse_echo_body(service, &body))
    }
}

fn parse_echo_body(service: &str, body: &str) -> Option<String> {
    let ip = if service.contains("json") {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()?
            .get("ip")?
            .as_str()?
            .trim()
            .to_string()
    } else {
        body.trim().to_string()
    };
    (!ip.is_empty()).then_some(ip)
}
