//! Serial port setup for the panel link.
//!
//! The panel talks 8N1 at a configurable baud rate.

use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::{Error, Result};

/// Default baud rate for the panel.
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

/// Default serial port.
pub const DEFAULT_PORT: &str = "/dev/ttyS0";

/// Configuration for the serial link.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyS0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Use the first available port when `port` is not present.
    pub port_fallback: bool,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            port_fallback: true,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Enables or disables falling back to the first available port.
    #[must_use]
    pub const fn port_fallback(mut self, enabled: bool) -> Self {
        self.port_fallback = enabled;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

/// Picks the port to open from the available ones.
///
/// The requested port wins if present; otherwise the first available port.
/// Returns `None` if no ports are available.
#[must_use]
pub fn select_port(requested: &str, available: &[String]) -> Option<String> {
    for port in available {
        tracing::debug!("found port: {port}");
    }
    if available.iter().any(|p| p == requested) {
        return Some(requested.to_owned());
    }
    available.first().cloned()
}

/// Opens the serial port described by `config`.
///
/// # Errors
///
/// Returns `Error::NoPorts` if fallback is enabled and no port exists, or
/// `Error::PortUnavailable` if the port cannot be opened.
pub fn open_port(config: &SerialConfig) -> Result<SerialStream> {
    let port = if config.port_fallback {
        let available = list_ports()?;
        let port = select_port(&config.port, &available).ok_or(Error::NoPorts)?;
        if port != config.port {
            tracing::warn!("port {} not found, using {}", config.port, port);
        }
        port
    } else {
        config.port.clone()
    };

    tracing::info!("opening serial port {} at {} baud", port, config.baud_rate);

    tokio_serial::new(&port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .map_err(|source| Error::PortUnavailable { port, source })
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert!(config.port_fallback);
        assert_eq!(SerialConfig::default().port, DEFAULT_PORT);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0")
            .baud_rate(115_200)
            .port_fallback(false);
        assert_eq!(config.baud_rate, 115_200);
        assert!(!config.port_fallback);
    }

    #[test]
    fn test_select_port() {
        let available = vec!["/dev/ttyAMA0".to_owned(), "/dev/ttyS0".to_owned()];
        assert_eq!(select_port("/dev/ttyS0", &available).as_deref(), Some("/dev/ttyS0"));
        assert_eq!(select_port("/dev/ttyUSB0", &available).as_deref(), Some("/dev/ttyAMA0"));
        assert_eq!(select_port("/dev/ttyS0", &[]), None);
    }

    #[test]
    #[ignore = "Requires /sys/class/tty - not available in sandboxed builds"]
    fn test_list_ports() {
        // Just verify it doesn't panic
        let _ = list_ports();
    }
}
