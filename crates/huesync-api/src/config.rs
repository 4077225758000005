// ── Bridge connection configuration ──
//
// Address plus the two bridge-issued credentials. The base URLs are
// derived once when the address is set and reused for every request.

use secrecy::SecretString;
use url::Url;

use crate::error::Error;

/// Base URLs derived from a bridge address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeUrls {
    /// Bridge root, e.g. `https://192.168.1.20/`.
    pub root: Url,
    /// Un-authenticated legacy endpoint used to mint credentials.
    pub plain: Url,
    /// CLIP v2 control API, e.g. `https://192.168.1.20/clip/v2/`.
    pub control: Url,
    /// Push-event endpoint, e.g. `https://192.168.1.20/eventstream/clip/v2`.
    pub events: Url,
}

impl BridgeUrls {
    fn derive(address: &str) -> Result<Option<Self>, Error> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(None);
        }

        // Bare hosts are the normal case; a full URL is accepted so tests and
        // reverse proxies can point the gateway elsewhere.
        let raw = if address.contains("://") {
            address.to_owned()
        } else {
            format!("https://{address}/")
        };

        let mut root = Url::parse(&raw).map_err(|e| Error::InvalidAddress {
            address: address.to_owned(),
            reason: e.to_string(),
        })?;
        if root.cannot_be_a_base() {
            return Err(Error::InvalidAddress {
                address: address.to_owned(),
                reason: "not a base URL".into(),
            });
        }
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }

        Ok(Some(Self {
            plain: root.join("api")?,
            control: root.join("clip/v2/")?,
            events: root.join("eventstream/clip/v2")?,
            root,
        }))
    }
}

/// Connection settings for one bridge.
///
/// Built once per bridge connection. The address can be rebound with
/// [`reconfigure`](Self::reconfigure), which recomputes the base URLs.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    address: String,
    urls: Option<BridgeUrls>,
    application_key: Option<SecretString>,
    client_key: Option<SecretString>,
}

impl BridgeConfig {
    /// Create a configuration for the bridge at `address`.
    ///
    /// An empty address is allowed: the gateway then logs and skips every
    /// request until [`reconfigure`](Self::reconfigure) is called.
    pub fn new(address: impl Into<String>) -> Result<Self, Error> {
        let address = address.into();
        let urls = BridgeUrls::derive(&address)?;
        Ok(Self {
            address,
            urls,
            application_key: None,
            client_key: None,
        })
    }

    /// A configuration with no address yet.
    pub fn unconfigured() -> Self {
        Self {
            address: String::new(),
            urls: None,
            application_key: None,
            client_key: None,
        }
    }

    pub fn with_application_key(mut self, key: SecretString) -> Self {
        self.application_key = Some(key);
        self
    }

    pub fn with_client_key(mut self, key: SecretString) -> Self {
        self.client_key = Some(key);
        self
    }

    /// Rebind to a new address, recomputing the base URLs.
    pub fn reconfigure(&mut self, address: impl Into<String>) -> Result<(), Error> {
        let address = address.into();
        self.urls = BridgeUrls::derive(&address)?;
        self.address = address;
        Ok(())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Derived URLs, `None` while no address is configured.
    pub fn urls(&self) -> Option<&BridgeUrls> {
        self.urls.as_ref()
    }

    /// Host name or IP of the bridge, as used by the streaming transport.
    pub fn host(&self) -> Option<String> {
        self.urls
            .as_ref()
            .and_then(|u| u.root.host_str())
            .map(str::to_owned)
    }

    pub fn application_key(&self) -> Option<&SecretString> {
        self.application_key.as_ref()
    }

    pub fn client_key(&self) -> Option<&SecretString> {
        self.client_key.as_ref()
    }

    pub(crate) fn set_credentials(
        &mut self,
        application_key: SecretString,
        client_key: Option<SecretString>,
    ) {
        self.application_key = Some(application_key);
        if client_key.is_some() {
            self.client_key = client_key;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn bare_host_derives_https_urls() {
        let config = BridgeConfig::new("192.168.1.20").unwrap();
        let urls = config.urls().unwrap();
        assert_eq!(urls.control.as_str(), "https://192.168.1.20/clip/v2/");
        assert_eq!(urls.events.as_str(), "https://192.168.1.20/eventstream/clip/v2");
        assert_eq!(urls.plain.as_str(), "https://192.168.1.20/api");
        assert_eq!(config.host().as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn full_url_keeps_scheme_and_port() {
        let config = BridgeConfig::new("http://127.0.0.1:8080").unwrap();
        let urls = config.urls().unwrap();
        assert_eq!(urls.control.as_str(), "http://127.0.0.1:8080/clip/v2/");
        assert_eq!(config.host().as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn empty_address_has_no_urls() {
        let config = BridgeConfig::new("  ").unwrap();
        assert!(config.urls().is_none());
        assert!(BridgeConfig::unconfigured().host().is_none());
    }

    #[test]
    fn reconfigure_recomputes_urls() {
        let mut config = BridgeConfig::new("10.0.0.2").unwrap();
        config.reconfigure("10.0.0.3").unwrap();
        assert_eq!(config.address(), "10.0.0.3");
        assert_eq!(
            config.urls().unwrap().control.as_str(),
            "https://10.0.0.3/clip/v2/"
        );
    }

    #[test]
    fn credentials_keep_existing_client_key() {
        let mut config = BridgeConfig::unconfigured().with_client_key("old".to_string().into());
        config.set_credentials("user".to_string().into(), None);
        assert_eq!(config.application_key().unwrap().expose_secret(), "user");
        assert_eq!(config.client_key().unwrap().expose_secret(), "old");
    }
}
