// ── Encrypted streaming transport ──
//
// The DTLS channel to the bridge is an external collaborator. Sessions
// drive it through `EncryptedTransport` and learn about the handshake
// through its event bus. Engines only ever see a `FrameSink`.

use std::io;
use std::sync::Arc;

use huesync_api::{BridgeConfig, EventBus};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::CoreError;

/// UDP port the bridge listens on for entertainment streams.
pub const STREAMING_PORT: u16 = 2100;

/// Where and how to open the encrypted channel.
#[derive(Debug, Clone)]
pub struct DtlsTarget {
    pub host: String,
    pub port: u16,
    /// PSK identity: the application key.
    pub identity: String,
    /// Pre-shared secret: the hex client key.
    pub psk: SecretString,
}

impl DtlsTarget {
    /// Derive the target from a bridge configuration.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, CoreError> {
        let host = config.host().ok_or_else(|| CoreError::Config {
            message: "no bridge address configured".into(),
        })?;
        let (Some(identity), Some(psk)) = (config.application_key(), config.client_key()) else {
            return Err(CoreError::NoStreamingCredentials);
        };

        Ok(Self {
            host,
            port: STREAMING_PORT,
            identity: identity.expose_secret().to_owned(),
            psk: psk.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TransportEvent {
    Connected,
    Disconnected,
}

/// DTLS channel to the bridge.
///
/// `connect_bridge` only begins the handshake; completion and loss are
/// reported as [`TransportEvent`]s.
pub trait EncryptedTransport: Send + Sync {
    fn connect_bridge(&self, target: &DtlsTarget);

    fn close_bridge(&self);

    fn send_encrypted(&self, frame: &[u8]) -> io::Result<()>;

    fn events(&self) -> &EventBus<TransportEvent>;
}

/// Send half of a transport, handed to a running engine.
#[derive(Clone)]
pub struct FrameSink {
    transport: Arc<dyn EncryptedTransport>,
}

impl FrameSink {
    pub fn new(transport: Arc<dyn EncryptedTransport>) -> Self {
        Self { transport }
    }

    /// Send one frame. Send errors are logged and the frame is dropped;
    /// the next tick sends a fresh one.
    pub fn send(&self, frame: &[u8]) -> bool {
        match self.transport.send_encrypted(frame) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, len = frame.len(), "dropping frame");
                false
            }
        }
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn target_uses_keys_and_fixed_port() {
        let config = BridgeConfig::new("192.168.1.20")
            .unwrap()
            .with_application_key("app".to_string().into())
            .with_client_key("C0FFEE".to_string().into());

        let target = DtlsTarget::from_config(&config).unwrap();

        assert_eq!(target.host, "192.168.1.20");
        assert_eq!(target.port, 2100);
        assert_eq!(target.identity, "app");
        assert_eq!(target.psk.expose_secret(), "C0FFEE");
    }

    #[test]
    fn missing_client_key_is_reported() {
        let config = BridgeConfig::new("192.168.1.20")
            .unwrap()
            .with_application_key("app".to_string().into());
        assert!(matches!(
            DtlsTarget::from_config(&config),
            Err(CoreError::NoStreamingCredentials)
        ));
    }
}
