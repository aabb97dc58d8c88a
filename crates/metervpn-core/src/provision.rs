//! Tunnel provisioning.
//!
//! Register a fresh public key, read back the address the server assigned to
//! it, and package a WireGuard config for that address. There is no retry:
//! any server failure is returned to the caller.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use metervpn_crypto::{CryptoError, TunnelConfig, TunnelKeyPair, package_single_entry};
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

use crate::api::{ApiError, MeterApi};
use crate::config::TunnelSettings;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to register tunnel key: {0}")]
    KeyRegistration(#[source] ApiError),

    #[error("Failed to fetch assigned address: {0}")]
    AddressAssignment(#[source] ApiError),

    #[error("Server has not assigned an address to this key")]
    NoAddress,

    #[error("Failed to package tunnel config: {0}")]
    Packaging(#[from] CryptoError),
}

/// A packaged tunnel configuration.
pub struct TunnelBundle {
    /// Suggested file name for `archive`.
    pub archive_name: String,
    /// Name of the config entry inside `archive`.
    pub entry_name: String,
    pub archive: Vec<u8>,
    pub address: IpAddr,
    /// Base64 public key registered with the server.
    pub public_key: String,
    config: TunnelConfig,
}

impl fmt::Debug for TunnelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelBundle")
            .field("archive_name", &self.archive_name)
            .field("entry_name", &self.entry_name)
            .field("archive_len", &self.archive.len())
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl TunnelBundle {
    /// The plain config document packaged in `archive`.
    pub fn config_document(&self) -> Zeroizing<String> {
        self.config.render()
    }
}

/// Package a config for `keys` at `address`.
pub fn build_bundle(
    keys: &TunnelKeyPair,
    address: IpAddr,
    settings: &TunnelSettings,
) -> Result<TunnelBundle, ProvisionError> {
    let config = TunnelConfig::new(keys, address, settings.peer.clone());
    let document = config.render();
    let archive = package_single_entry(&settings.config_file_name, document.as_bytes())?;
    Ok(TunnelBundle {
        archive_name: settings.archive_file_name.clone(),
        entry_name: settings.config_file_name.clone(),
        archive,
        address,
        public_key: keys.public_base64(),
        config,
    })
}

/// Provisions tunnel configs for one account.
pub struct TunnelProvisioner<A> {
    api: Arc<A>,
    settings: TunnelSettings,
}

impl<A: MeterApi> TunnelProvisioner<A> {
    pub const fn new(api: Arc<A>, settings: TunnelSettings) -> Self {
        Self { api, settings }
    }

    /// Provision with a newly generated key pair.
    pub async fn generate(&self) -> Result<TunnelBundle, ProvisionError> {
        let keys = TunnelKeyPair::generate();
        self.generate_with_keys(&keys).await
    }

    pub async fn generate_with_keys(
        &self,
        keys: &TunnelKeyPair,
    ) -> Result<TunnelBundle, ProvisionError> {
        let public_key = keys.public_base64();
        self.api
            .register_public_key(&public_key)
            .await
            .map_err(ProvisionError::KeyRegistration)?;

        let assigned = self
            .api
            .assigned_address()
            .await
            .map_err(ProvisionError::AddressAssignment)?;
        let address = assigned
            .select(self.settings.address_family)
            .ok_or(ProvisionError::NoAddress)?;
        info!(%address, public_key = %public_key, "Tunnel address assigned");

        build_bundle(keys, address, &self.settings)
    }
}
