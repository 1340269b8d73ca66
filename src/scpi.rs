//! SCPI transports.
//!
//! The driver talks to the instrument only through [`ScpiTransport`]. Two
//! implementations are provided:
//!
//! - [`ScpiClient`]: SCPI over a raw TCP socket (the FieldFox listens on 5025).
//! - [`MockScpiClient`]: an in-memory instrument for tests and `--mock` runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default SCPI socket port of Keysight FieldFox analyzers.
pub const DEFAULT_PORT: u16 = 5025;

/// Default reply timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Trait for SCPI communication transports.
///
/// Abstracts the underlying link so the driver can run against hardware or
/// an in-memory instrument.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a command without expecting a response.
    async fn write(&self, command: &str) -> Result<()>;

    /// Send a query and return the trimmed response.
    async fn query(&self, query: &str) -> Result<String>;
}

// =============================================================================
// TCP client
// =============================================================================

/// Async SCPI client over TCP.
pub struct ScpiClient {
    stream: Mutex<BufReader<TcpStream>>,
    timeout: Duration,
}

impl ScpiClient {
    /// Connect to the instrument at `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);

        let stream = timeout(Duration::from_secs(5), TcpStream::connect(&addr))
            .await
            .with_context(|| format!("Connection timeout to {}", addr))?
            .with_context(|| format!("Failed to connect to {}", addr))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        tracing::info!("Connected to FieldFox at {}", addr);

        Ok(Self {
            stream: Mutex::new(BufReader::new(stream)),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    /// Set the reply timeout.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    /// Discard anything left over from an earlier exchange.
    async fn flush_input_buffer(stream: &mut BufReader<TcpStream>) -> Result<()> {
        let buffered = stream.buffer().len();
        if buffered > 0 {
            tracing::debug!("Flushing {} bytes from buffer", buffered);
            stream.consume(buffered);
        }

        let mut discard = [0u8; 256];
        loop {
            match stream.get_mut().try_read(&mut discard) {
                Ok(0) => break,
                Ok(n) => tracing::debug!("Flushed {} stale bytes from stream", n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("Failed to flush input"),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ScpiTransport for ScpiClient {
    async fn write(&self, command: &str) -> Result<()> {
        let mut stream = self.stream.lock().await;

        tracing::debug!("SCPI write: {:?}", command);

        stream
            .get_mut()
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .with_context(|| format!("Failed to write command: {}", command))?;

        stream
            .get_mut()
            .flush()
            .await
            .context("Failed to flush stream")?;

        Ok(())
    }

    async fn query(&self, query: &str) -> Result<String> {
        let mut stream = self.stream.lock().await;

        Self::flush_input_buffer(&mut stream).await?;

        tracing::debug!("SCPI query: {:?}", query);

        stream
            .get_mut()
            .write_all(format!("{}\n", query).as_bytes())
            .await
            .with_context(|| format!("Failed to write query: {}", query))?;

        stream
            .get_mut()
            .flush()
            .await
            .context("Failed to flush stream")?;

        let mut response = String::new();
        match timeout(self.timeout, stream.read_line(&mut response)).await {
            Ok(Ok(0)) => anyhow::bail!("Connection closed by instrument"),
            Ok(Ok(_)) => {
                let trimmed = response.trim().to_string();
                tracing::debug!("SCPI response: {:?}", trimmed);
                Ok(trimmed)
            }
            Ok(Err(e)) => Err(e).context("Failed to read response"),
            Err(_) => anyhow::bail!("Timeout waiting for response to: {}", query),
        }
    }
}

// =============================================================================
// Mock instrument
// =============================================================================

/// Identification string answered by the mock to `*IDN?`.
pub const MOCK_IDN: &str = "Keysight Technologies,N9917A,MY00000000,A.00.00";

/// In-memory SCPI instrument.
///
/// Writes of the form `HEADER value` store `value` under `HEADER`; queries of
/// the form `HEADER?` answer the stored value. Headers are compared
/// case-insensitively. Every call is recorded for test verification.
pub struct MockScpiClient {
    state: Mutex<HashMap<String, String>>,
    call_log: Mutex<Vec<String>>,
    should_fail_next: AtomicBool,
}

impl Default for MockScpiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScpiClient {
    /// Mock with a freshly preset instrument.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Self::preset()),
            call_log: Mutex::new(Vec::new()),
            should_fail_next: AtomicBool::new(false),
        }
    }

    /// Seed a reply for `header` (without the trailing `?`).
    pub fn with_value(mut self, header: &str, reply: &str) -> Self {
        self.state
            .get_mut()
            .insert(header.to_uppercase(), reply.to_string());
        self
    }

    /// Make the next write or query fail as if the link dropped.
    pub fn trigger_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    /// Copy of every command and query received, in order.
    pub async fn call_log(&self) -> Vec<String> {
        self.call_log.lock().await.clone()
    }

    /// Stored value for `header`, if any.
    pub async fn value(&self, header: &str) -> Option<String> {
        self.state.lock().await.get(&header.to_uppercase()).cloned()
    }

    fn preset() -> HashMap<String, String> {
        [
            ("SYST:ERR", "+0,\"No error\""),
            ("OUTP", "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    async fn record(&self, entry: &str) -> Result<()> {
        self.call_log.lock().await.push(entry.to_string());
        if self.should_fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("Mock link failure on: {}", entry);
        }
        Ok(())
    }
}

#[async_trait]
impl ScpiTransport for MockScpiClient {
    async fn write(&self, command: &str) -> Result<()> {
        tracing::debug!("Mock SCPI write: {}", command);
        self.record(command).await?;

        let command = command.trim();
        match command.split_once(char::is_whitespace) {
            Some((header, value)) => {
                self.state
                    .lock()
                    .await
                    .insert(header.to_uppercase(), value.trim().to_string());
            }
            None if command.eq_ignore_ascii_case("*RST") => {
                *self.state.lock().await = Self::preset();
            }
            None => tracing::warn!("Mock command without argument: {}", command),
        }
        Ok(())
    }

    async fn query(&self, query: &str) -> Result<String> {
        tracing::debug!("Mock SCPI query: {}", query);
        self.record(query).await?;

        let header = query
            .trim()
            .strip_suffix('?')
            .with_context(|| format!("Not a query: {}", query))?
            .to_uppercase();

        if header == "*IDN" {
            return Ok(MOCK_IDN.to_string());
        }

        self.state
            .lock()
            .await
            .get(&header)
            .cloned()
            .with_context(|| format!("Unknown mock query: {}", query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_write_then_query() {
        let client = MockScpiClient::new();

        client.write("SENS1:FREQ:STAR 1000000").await.unwrap();
        let reply = client.query("sens1:freq:star?").await.unwrap();
        assert_eq!(reply, "1000000");
    }

    #[tokio::test]
    async fn test_mock_identification_and_preset() {
        let client = MockScpiClient::new();
        assert_eq!(client.query("*IDN?").await.unwrap(), MOCK_IDN);
        assert_eq!(client.query("SYST:ERR?").await.unwrap(), "+0,\"No error\"");
    }

    #[tokio::test]
    async fn test_mock_reset_restores_preset() {
        let client = MockScpiClient::new().with_value("SENS1:SWE:POIN", "201");
        client.write("OUTP 1").await.unwrap();
        client.write("*RST").await.unwrap();

        assert_eq!(client.query("OUTP?").await.unwrap(), "0");
        assert!(client.query("SENS1:SWE:POIN?").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_seeded_values_are_kept() {
        let client = MockScpiClient::new()
            .with_value("sens2:freq:span", "+1.0E+007")
            .with_value("SENS2:SWE:POIN", "401");

        assert_eq!(client.value("SENS2:FREQ:SPAN").await.as_deref(), Some("+1.0E+007"));
        assert_eq!(client.query("SENS2:SWE:POIN?").await.unwrap(), "401");
        // seeding does not count as traffic
        assert_eq!(client.call_log().await, vec!["SENS2:SWE:POIN?"]);
    }

    #[tokio::test]
    async fn test_mock_unknown_query_fails() {
        let client = MockScpiClient::new();
        assert!(client.query("SENS1:SA:BAND?").await.is_err());
        assert!(client.query("SENS1:SA:BAND").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let client = MockScpiClient::new();
        client.trigger_failure();

        assert!(client.write("OUTP 1").await.is_err());
        assert!(client.write("OUTP 1").await.is_ok());
        assert_eq!(client.call_log().await, vec!["OUTP 1", "OUTP 1"]);
    }
}
