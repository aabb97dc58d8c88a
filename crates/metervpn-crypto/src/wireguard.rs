//! WireGuard configuration documents.
//!
//! The document layout is fixed so that the same key, address and deployment
//! constants always render to the same bytes.

use std::fmt::Write;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{TunnelKeyPair, decode_public_key};

/// Server-side peer every client tunnel connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPeer {
    /// Base64 public key of the exit server.
    pub public_key: String,
    /// `host:port` of the exit server.
    pub endpoint: String,
    /// Routed prefixes, verbatim into `AllowedIPs =`.
    pub allowed_ips: String,
    /// Resolver pushed into `DNS =`.
    pub dns: IpAddr,
}

impl Default for DeploymentPeer {
    fn default() -> Self {
        Self {
            public_key: "1t54yXxhTvUHqQE1Wh0nKqieksYm5o/KlpfQI5QUX2I=".to_string(),
            endpoint: "159.89.121.214:52800".to_string(),
            allowed_ips: "0.0.0.0/0".to_string(),
            dns: IpAddr::from([1, 1, 1, 1]),
        }
    }
}

impl DeploymentPeer {
    /// Check that the peer public key is a well-formed 32-byte key.
    pub fn validate(&self) -> Result<(), CryptoError> {
        decode_public_key(&self.public_key).map(|_| ())
    }
}

/// A rendered-on-demand tunnel configuration for one client interface.
#[derive(Clone)]
pub struct TunnelConfig {
    private_key: Zeroizing<String>,
    address: IpAddr,
    peer: DeploymentPeer,
}

impl std::fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("private_key", &"[REDACTED]")
            .field("address", &self.address)
            .field("peer", &self.peer)
            .finish()
    }
}

impl TunnelConfig {
    /// Build a config for `keys` bound to the server-assigned `address`.
    pub fn new(keys: &TunnelKeyPair, address: IpAddr, peer: DeploymentPeer) -> Self {
        Self {
            private_key: keys.secret_base64(),
            address,
            peer,
        }
    }

    /// Host prefix length for the interface address.
    pub const fn prefix_len(&self) -> u8 {
        match self.address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Render the INI document.
    pub fn render(&self) -> Zeroizing<String> {
        let mut doc = Zeroizing::new(String::with_capacity(256));
        // Writing into a String cannot fail.
        let _ = write!(
            doc,
            "[Interface]\n\
             PrivateKey = {}\n\
             Address = {}/{}\n\
             DNS = {}\n\
             \n\
             [Peer]\n\
             PublicKey = {}\n\
             AllowedIPs = {}\n\
             Endpoint = {}\n",
            self.private_key.as_str(),
            self.address,
            self.prefix_len(),
            self.peer.dns,
            self.peer.public_key,
            self.peer.allowed_ips,
            self.peer.endpoint,
        );
        doc
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    fn fixed_keys() -> TunnelKeyPair {
        TunnelKeyPair::from_secret_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn ipv4_document_matches_expected_layout() {
        let keys = fixed_keys();
        let config = TunnelConfig::new(
            &keys,
            IpAddr::V4(Ipv4Addr::new(10, 8, 0, 17)),
            DeploymentPeer::default(),
        );
        let expected = format!(
            "[Interface]\n\
             PrivateKey = {}\n\
             Address = 10.8.0.17/32\n\
             DNS = 1.1.1.1\n\
             \n\
             [Peer]\n\
             PublicKey = 1t54yXxhTvUHqQE1Wh0nKqieksYm5o/KlpfQI5QUX2I=\n\
             AllowedIPs = 0.0.0.0/0\n\
             Endpoint = 159.89.121.214:52800\n",
            keys.secret_base64().as_str()
        );
        assert_eq!(config.render().as_str(), expected);
    }

    #[test]
    fn ipv6_address_uses_128_prefix() {
        let addr: Ipv6Addr = "fd00::2a".parse().unwrap();
        let config = TunnelConfig::new(&fixed_keys(), IpAddr::V6(addr), DeploymentPeer::default());
        assert_eq!(config.prefix_len(), 128);
        assert!(config.render().contains("Address = fd00::2a/128\n"));
    }

    #[test]
    fn render_is_reproducible() {
        let keys = fixed_keys();
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let a = TunnelConfig::new(&keys, addr, DeploymentPeer::default());
        let b = TunnelConfig::new(&keys, addr, DeploymentPeer::default());
        assert_eq!(a.render().as_bytes(), b.render().as_bytes());
    }

    #[test]
    fn debug_impl_redacts_private_key() {
        let keys = fixed_keys();
        let config = TunnelConfig::new(
            &keys,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            DeploymentPeer::default(),
        );
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains(keys.secret_base64().as_str()));
    }

    #[test]
    fn default_peer_key_is_valid() {
        DeploymentPeer::default().validate().unwrap();
    }

    #[test]
    fn malformed_peer_key_fails_validation() {
        let peer = DeploymentPeer {
            public_key: "short".into(),
            ..Default::default()
        };
        assert!(peer.validate().is_err());
    }
}
