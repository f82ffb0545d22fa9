// Local TCP transport
//
// The heater listens on port 9798. Each request opens a fresh connection,
// swallows the greeting prompt, writes one command line and reads until
// the device goes quiet or closes the socket. Requests to one endpoint are
// serialised; the firmware handles a single session at a time.

pub mod protocol;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::command::DeviceCommand;
use crate::error::Error;
use crate::model::{PropertyMap, SysInfo};

/// Fixed control port of the heater's network module.
pub const LOCAL_PORT: u16 = 9798;

// ── Endpoint ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalEndpoint {
    pub host: String,
    pub port: u16,
}

impl LocalEndpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: LOCAL_PORT,
        }
    }
}

impl fmt::Display for LocalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for LocalEndpoint {
    type Err = String;

    /// `host` or `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty local endpoint".into());
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port
                    .parse()
                    .map_err(|e| format!("invalid port in '{s}': {e}"))?;
                Ok(Self {
                    host: host.to_owned(),
                    port,
                })
            }
            _ => Ok(Self::new(s)),
        }
    }
}

// ── Timeouts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct LocalTimeouts {
    pub connect: Duration,
    /// Upper bound for the whole reply.
    pub read: Duration,
    /// How long to wait for the greeting prompt before writing anyway.
    pub greeting: Duration,
    /// Silence after the first reply bytes that ends the reply.
    pub idle: Duration,
}

impl Default for LocalTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(5),
            greeting: Duration::from_secs(2),
            idle: Duration::from_millis(500),
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Client for one heater's local control port.
#[derive(Debug)]
pub struct LocalClient {
    endpoint: LocalEndpoint,
    timeouts: LocalTimeouts,
    in_flight: Mutex<()>,
}

impl LocalClient {
    pub fn new(endpoint: LocalEndpoint, timeouts: LocalTimeouts) -> Self {
        Self {
            endpoint,
            timeouts,
            in_flight: Mutex::new(()),
        }
    }

    pub fn endpoint(&self) -> &LocalEndpoint {
        &self.endpoint
    }

    /// `sysinfo`: the device's serial and firmware.
    pub async fn get_sysinfo(&self) -> Result<SysInfo, Error> {
        let reply = self.exchange("sysinfo").await?;
        protocol::parse_sysinfo(&reply).ok_or_else(|| self.protocol_error("sysinfo reply carried no serial"))
    }

    /// `list`: every property the heater reports.
    pub async fn get_status(&self) -> Result<PropertyMap, Error> {
        let reply = self.exchange("list").await?;
        let props = protocol::parse_list(&reply);
        if props.is_empty() {
            return Err(self.protocol_error("list reply contained no properties"));
        }
        Ok(props)
    }

    /// Send every `set` frame of `command`. The final frame must be
    /// acknowledged; earlier preparatory frames only log a missing ack.
    pub async fn send_command(&self, command: &DeviceCommand) -> Result<(), Error> {
        let frames = command.local_frames();
        let last = frames.len().saturating_sub(1);
        for (i, frame) in frames.iter().enumerate() {
            let reply = self.exchange(&frame.line()).await?;
            if protocol::check_ack(&reply, frame.property) {
                continue;
            }
            if i == last {
                return Err(self.protocol_error(&format!(
                    "set '{}' was not acknowledged",
                    frame.property
                )));
            }
            warn!(endpoint = %self.endpoint, property = frame.property, "preparatory set not acknowledged");
        }
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn exchange(&self, line: &str) -> Result<String, Error> {
        let _guard = self.in_flight.lock().await;
        debug!(endpoint = %self.endpoint, command = line, "local request");

        let mut stream = timeout(
            self.timeouts.connect,
            TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port)),
        )
        .await
        .map_err(|_| self.timeout_error(self.timeouts.connect))?
        .map_err(|e| self.network_error(e))?;

        let mut buf = vec![0_u8; 8192];
        // The prompt is informational; its absence is not an error.
        if let Ok(Err(e)) = timeout(self.timeouts.greeting, stream.read(&mut buf)).await {
            return Err(self.network_error(e));
        }

        stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| self.network_error(e))?;

        let reply = self.read_reply(&mut stream, &mut buf).await?;
        debug!(endpoint = %self.endpoint, bytes = reply.len(), "local reply");
        Ok(reply)
    }

    /// Read until EOF, until `idle` passes without data, or until the read
    /// deadline. No data at all by the deadline is a timeout.
    async fn read_reply(&self, stream: &mut TcpStream, buf: &mut [u8]) -> Result<String, Error> {
        let deadline = Instant::now() + self.timeouts.read;
        let mut reply = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() && !reply.is_empty() {
                break;
            }
            let wait = if reply.is_empty() {
                remaining
            } else {
                remaining.min(self.timeouts.idle)
            };

            match timeout(wait, stream.read(buf)).await {
                Err(_) if reply.is_empty() => return Err(self.timeout_error(self.timeouts.read)),
                Err(_) | Ok(Ok(0)) => break,
                Ok(Ok(n)) => reply.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(self.network_error(e)),
            }
        }

        if reply.is_empty() {
            return Err(self.protocol_error("connection closed without a reply"));
        }
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    fn network_error(&self, source: std::io::Error) -> Error {
        warn!(endpoint = %self.endpoint, error = %source, "local network error");
        Error::Network {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }

    fn timeout_error(&self, after: Duration) -> Error {
        let timeout_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
        warn!(endpoint = %self.endpoint, timeout_ms, "local timeout");
        Error::Timeout {
            endpoint: self.endpoint.to_string(),
            timeout_ms,
        }
    }

    fn protocol_error(&self, message: &str) -> Error {
        warn!(endpoint = %self.endpoint, %message, "local protocol error");
        Error::Protocol {
            endpoint: self.endpoint.to_string(),
            message: message.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parsing() {
        assert_eq!(
            "10.0.0.7".parse::<LocalEndpoint>(),
            Ok(LocalEndpoint::new("10.0.0.7"))
        );
        let ep: Result<LocalEndpoint, _> = "heater.lan:9000".parse();
        assert_eq!(ep.map(|e| e.port), Ok(9000));
        assert!("".parse::<LocalEndpoint>().is_err());
        assert!("heater.lan:http".parse::<LocalEndpoint>().is_err());
    }
}
