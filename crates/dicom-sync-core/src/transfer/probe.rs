use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::transport::{Endpoint, Transport, TransportSession};
use crate::error::Error;

/// Bare TCP connectivity check, run before any protocol handshake.
pub async fn check_reachable(endpoint: &Endpoint, timeout: Duration) -> Result<(), Error> {
    let unreachable = |reason: String| Error::Unreachable {
        host: endpoint.host.clone(),
        port: endpoint.port,
        reason,
    };

    match tokio::time::timeout(timeout, TcpStream::connect((endpoint.host.as_str(), endpoint.port)))
        .await
    {
        Ok(Ok(_stream)) => {
            debug!("{}:{} accepts connections", endpoint.host, endpoint.port);
            Ok(())
        }
        Ok(Err(e)) => Err(unreachable(e.to_string())),
        Err(_) => Err(unreachable(format!(
            "no answer within {:.1}s",
            timeout.as_secs_f64()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCheck {
    pub reachable: bool,
    pub echo_ok: bool,
    pub message: String,
}

/// Two-level connection test: TCP reachability, then a protocol echo over a
/// fresh session. Never fails; the outcome is described in the result.
pub async fn verify_connection<T: Transport>(
    transport: &T,
    endpoint: &Endpoint,
    timeout: Duration,
) -> ConnectionCheck {
    if let Err(e) = check_reachable(endpoint, timeout).await {
        warn!("{}", e);
        return ConnectionCheck {
            reachable: false,
            echo_ok: false,
            message: e.to_string(),
        };
    }

    let echo = match transport.connect(endpoint).await {
        Ok(mut session) => session.probe().await,
        Err(e) => Err(e),
    };

    let (echo_ok, message) = match echo {
        Ok(true) => (true, "Echo succeeded".to_string()),
        Ok(false) => (
            false,
            format!(
                "{} refused the association (check the AE titles {} -> {})",
                endpoint.host, endpoint.local_ae, endpoint.remote_ae
            ),
        ),
        Err(e) => (false, format!("Echo failed: {}", e)),
    };
    info!("Connection test {}:{}: {}", endpoint.host, endpoint.port, message);

    ConnectionCheck {
        reachable: true,
        echo_ok,
        message,
    }
}
