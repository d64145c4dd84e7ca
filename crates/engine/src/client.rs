//! Plumbing shared by the clients: endpoint selection and RPC deadlines

use keyspan_core::{Config, Error, Result};
use keyspan_driver::Connector;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bound `fut` by `after`, reporting `operation` on expiry
pub(crate) async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}

/// Connect to the first reachable endpoint, trying them in order
pub(crate) async fn connect_any<C: Connector>(
    connector: &C,
    endpoints: Vec<String>,
    config: &Config,
) -> Result<Arc<C::Driver>> {
    config.validate()?;
    if endpoints.is_empty() {
        return Err(Error::Connection("no endpoints given".into()));
    }

    let deadline = config.connect_timeout_duration();
    let mut last_error = None;
    for endpoint in &endpoints {
        match with_timeout("connect", deadline, connector.connect(endpoint)).await {
            Ok(driver) => {
                info!(%endpoint, "connected");
                return Ok(driver);
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "endpoint unreachable");
                last_error = Some(e);
            }
        }
    }

    let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
    Err(Error::Connection(format!(
        "none of {} endpoints reachable: {}",
        endpoints.len(),
        reason
    )))
}
