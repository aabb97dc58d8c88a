//! Tunnel subcommand: fetch a WireGuard config for the current account.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metervpn_core::api::MeterApi;
use metervpn_core::config::TunnelSettings;
use metervpn_core::{TunnelBundle, TunnelProvisioner};

/// Arguments for `metervpn tunnel`.
#[derive(clap::Args, Debug)]
pub struct TunnelArgs {
    /// Where to write the zip bundle (default: the bundle name in the current directory).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write the plain `.conf` file here.
    #[arg(long)]
    pub conf: Option<PathBuf>,
}

/// Generate a key pair, register it and write the config bundle.
pub async fn run<A: MeterApi>(
    api: Arc<A>,
    settings: TunnelSettings,
    args: TunnelArgs,
) -> anyhow::Result<()> {
    let bundle = TunnelProvisioner::new(api, settings).generate().await?;
    let written = write_bundle(&bundle, args.output.as_deref(), args.conf.as_deref())?;

    let mut out = io::stdout();
    writeln!(out, "Tunnel address: {}", bundle.address)?;
    writeln!(out, "Public key:     {}", bundle.public_key)?;
    for path in written {
        writeln!(out, "Wrote {}", path.display())?;
    }
    Ok(())
}

/// Write the archive (and optionally the plain config); returns the paths written.
pub fn write_bundle(
    bundle: &TunnelBundle,
    output: Option<&Path>,
    conf: Option<&Path>,
) -> io::Result<Vec<PathBuf>> {
    let archive_path = output.map_or_else(|| PathBuf::from(&bundle.archive_name), Path::to_path_buf);
    write_private(&archive_path, &bundle.archive)?;
    let mut written = vec![archive_path];

    if let Some(conf) = conf {
        write_private(conf, bundle.config_document().as_bytes())?;
        written.push(conf.to_path_buf());
    }
    Ok(written)
}

/// Both files carry the private key.
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, bytes)?;

    // Set restrictive permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
