//! Server connection setup from resolved configuration.

use std::path::Path;

use metervpn_core::config::load_config;
use metervpn_core::{Config, MeterClient};

use crate::config::CliConfig;

/// Resolve settings, then apply the saved server and the `--server` flag.
///
/// Precedence, lowest first: settings files and environment, the server
/// saved in `~/.metervpn/config.json`, then `--server`.
pub fn resolve_config(
    config_path: Option<&Path>,
    server_flag: Option<&str>,
    cli: &CliConfig,
) -> anyhow::Result<Config> {
    let mut config = load_config(config_path)?;
    apply_server_overrides(&mut config, server_flag, cli)?;
    Ok(config)
}

pub fn apply_server_overrides(
    config: &mut Config,
    server_flag: Option<&str>,
    cli: &CliConfig,
) -> anyhow::Result<()> {
    let Some(url) = server_flag.or(cli.server_url.as_deref()) else {
        return Ok(());
    };
    config.server.base_url = url.trim().to_string();
    config.validate()?;
    Ok(())
}

/// Client scoped to the stored account, if there is one.
pub fn connect(config: &Config, cli: &CliConfig) -> anyhow::Result<MeterClient> {
    Ok(MeterClient::new(&config.server, cli.account())?)
}
