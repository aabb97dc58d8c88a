//! Account subcommands: create, show, use.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use metervpn_core::api::{AccountId, MeterApi};
use metervpn_core::lease::parse_expiry;
use metervpn_core::{Config, MeterClient};

use crate::config::CliConfig;

/// Account subcommand actions.
#[derive(clap::Subcommand, Debug)]
pub enum AccountAction {
    /// Create a new account on the server and store it.
    Create {
        /// Replace an already stored account.
        #[arg(long)]
        force: bool,
    },
    /// Show the stored account.
    Show,
    /// Store an existing account ID.
    Use {
        /// Account ID issued by the server.
        account_id: String,
    },
}

/// Execute an account subcommand.
pub async fn run(
    action: AccountAction,
    cli_config: &mut CliConfig,
    config: &Config,
) -> anyhow::Result<()> {
    match action {
        AccountAction::Create { force } => create(cli_config, config, force).await,
        AccountAction::Show => show(cli_config, config),
        AccountAction::Use { account_id } => {
            let account = adopt(cli_config, &account_id)?;
            cli_config.save()?;
            writeln!(io::stdout(), "Using account {account}")?;
            Ok(())
        }
    }
}

/// Refuse to overwrite a stored account unless forced.
pub fn ensure_replaceable(cli_config: &CliConfig, force: bool) -> anyhow::Result<()> {
    match cli_config.account() {
        Some(existing) if !force => Err(anyhow::anyhow!(
            "Account {existing} is already stored. Use --force to replace it"
        )),
        _ => Ok(()),
    }
}

/// Store `account_id` as the active account.
pub fn adopt(cli_config: &mut CliConfig, account_id: &str) -> anyhow::Result<AccountId> {
    let account =
        AccountId::new(account_id).ok_or_else(|| anyhow::anyhow!("Account ID must not be empty"))?;
    cli_config.account_id = Some(account.to_string());
    Ok(account)
}

async fn create(cli_config: &mut CliConfig, config: &Config, force: bool) -> anyhow::Result<()> {
    ensure_replaceable(cli_config, force)?;

    let client = MeterClient::new(&config.server, None)?;
    let created = client.create_account().await?;
    adopt(cli_config, created.account_id.as_str())?;
    cli_config.save()?;

    let mut out = io::stdout();
    writeln!(out, "Account created: {}", created.account_id)?;
    if let Some(expiry) = created.expiry_date.as_deref().and_then(parse_expiry) {
        writeln!(out, "Access until:    {}", expiry.to_rfc2822())?;
    }
    writeln!(out, "Keep this ID: it is the only way back into the account.")?;
    Ok(())
}

fn show(cli_config: &CliConfig, config: &Config) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match cli_config.account() {
        Some(account) => {
            writeln!(out, "Account: {account}")?;
            writeln!(out, "Server:  {}", config.server.base_url)?;
        }
        None => writeln!(out, "No account stored. Run: metervpn account create")?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn with_account(id: &str) -> CliConfig {
        CliConfig {
            account_id: Some(id.into()),
            ..Default::default()
        }
    }

    #[test]
    fn create_allowed_without_stored_account() {
        ensure_replaceable(&CliConfig::default(), false).unwrap();
    }

    #[test]
    fn create_refuses_to_replace_without_force() {
        let err = ensure_replaceable(&with_account("ABC"), false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        ensure_replaceable(&with_account("ABC"), true).unwrap();
    }

    #[test]
    fn adopt_trims_and_stores() {
        let mut cfg = CliConfig::default();
        let account = adopt(&mut cfg, "  MFRGGZDFMZTWQ2LK\n").unwrap();
        assert_eq!(account.as_str(), "MFRGGZDFMZTWQ2LK");
        assert_eq!(cfg.account_id.as_deref(), Some("MFRGGZDFMZTWQ2LK"));
    }

    #[test]
    fn adopt_rejects_blank_id() {
        let mut cfg = with_account("OLD");
        assert!(adopt(&mut cfg, "   ").is_err());
        assert_eq!(cfg.account_id.as_deref(), Some("OLD"));
    }
}
