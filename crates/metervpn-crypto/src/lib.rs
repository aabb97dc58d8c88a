//! `MeterVPN` tunnel key material.
//!
//! Everything needed to hand a user a working WireGuard configuration once
//! the server has assigned an address:
//!
//! - **Keys**: X25519 key pair, base64-encoded the way WireGuard expects
//! - **Config**: the `[Interface]` / `[Peer]` INI document
//! - **Archive**: deterministic single-entry zip bundle of that document

pub mod archive;
pub mod error;
pub mod keys;
pub mod wireguard;

pub use archive::package_single_entry;
pub use error::CryptoError;
pub use keys::{KEY_SIZE, TunnelKeyPair, decode_public_key};
pub use wireguard::{DeploymentPeer, TunnelConfig};
