use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time;
use tracing::trace;

use crate::types::{ProbeOutcome, Protocol};

/// Something that can attempt a connection to `host:port`.
///
/// `Ok(())` means the peer accepted. Implementations must release whatever
/// they opened before returning.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, host: &str, port: u16) -> io::Result<()>;
}

/// Plain TCP connect via the tokio runtime. Host names are resolved as part of the attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<()> {
        let stream = TcpStream::connect((host, port)).await?;
        drop(stream);
        Ok(())
    }
}

/// Try once to reach `host:port` within `timeout`.
///
/// Anything other than an accepted connection (refused, unreachable, DNS
/// failure, deadline hit) is reported as closed. The cause is only traced.
pub async fn probe(
    connector: &dyn Connector,
    protocol: Protocol,
    host: &str,
    port: u16,
    timeout: Duration,
) -> ProbeOutcome {
    match protocol {
        Protocol::Tcp => match time::timeout(timeout, connector.connect(host, port)).await {
            Ok(Ok(())) => {
                trace!(host, port, "open");
                ProbeOutcome::open(port)
            }
            Ok(Err(e)) => {
                trace!(host, port, error = %e, "closed");
                ProbeOutcome::closed(port)
            }
            Err(_) => {
                trace!(host, port, ?timeout, "timed out");
                ProbeOutcome::closed(port)
            }
        },
    }
}
