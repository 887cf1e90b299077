//! [`HostProvisioner`] that rebuilds the libvirt virtual setup locally.
//!
//! The agent repository ships an Ansible playbook under `virtual-setup/` that
//! creates a `jumpbox` VM. Each run tears the previous setup down, creates a
//! fresh one, and asks libvirt for the jumpbox address.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use pipeline::{HostAddress, HostProvisioner, ProvisionError, TargetHost};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, error, info};

/// Settings for [`LibvirtProvisioner`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerSettings {
    /// Local checkout of the agent repository.
    pub agent_dir: PathBuf,
    /// Playbook directory, relative to `agent_dir`.
    pub playbook_dir: String,
    pub playbook: String,
    /// Key the playbook installs on the jumpbox.
    pub ssh_key_name: String,
    /// libvirt domain name of the jumpbox VM.
    pub domain: String,
    /// Address prefix of the libvirt network the jumpbox lives on.
    pub network_prefix: String,
    /// Credentials forwarded to the playbook, filled in from the `[dci]`
    /// section. Never logged.
    #[serde(skip)]
    pub dci_client_id: String,
    #[serde(skip)]
    pub dci_api_secret: String,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            agent_dir: PathBuf::from("/opt/dci-rhel-agent"),
            playbook_dir: "virtual-setup".to_string(),
            playbook: "site.yml".to_string(),
            ssh_key_name: "id_rsa_rhel_ci".to_string(),
            domain: "jumpbox".to_string(),
            network_prefix: "192.168.122.".to_string(),
            dci_client_id: String::new(),
            dci_api_secret: String::new(),
        }
    }
}

impl std::fmt::Debug for ProvisionerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerSettings")
            .field("agent_dir", &self.agent_dir)
            .field("playbook_dir", &self.playbook_dir)
            .field("playbook", &self.playbook)
            .field("ssh_key_name", &self.ssh_key_name)
            .field("domain", &self.domain)
            .field("network_prefix", &self.network_prefix)
            .field("dci_client_id", &self.dci_client_id)
            .field("dci_api_secret", &"<redacted>")
            .finish()
    }
}

/// Provisions the jumpbox by running the virtual-setup playbook.
#[derive(Debug, Clone)]
pub struct LibvirtProvisioner {
    settings: ProvisionerSettings,
}

impl LibvirtProvisioner {
    pub fn new(settings: ProvisionerSettings) -> Self {
        Self { settings }
    }

    fn credentials_args(&self) -> [String; 4] {
        [
            "-e".to_string(),
            format!("dci_client_id={}", self.settings.dci_client_id),
            "-e".to_string(),
            format!("dci_api_secret={}", self.settings.dci_api_secret),
        ]
    }

    async fn run_playbook(&self, label: &str, extra: &[String]) -> Result<(), ProvisionError> {
        let dir = self.settings.agent_dir.join(&self.settings.playbook_dir);
        info!(step = label, dir = %dir.display(), "Running virtual-setup playbook");

        let output = Command::new("ansible-playbook")
            .arg(&self.settings.playbook)
            .args(extra)
            .args(self.credentials_args())
            .current_dir(&dir)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            error!(
                step = label,
                exit_code,
                stdout = %String::from_utf8_lossy(&output.stdout),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Playbook failed"
            );
            return Err(ProvisionError::CommandFailed {
                command: format!("ansible-playbook {} ({label})", self.settings.playbook),
                exit_code,
            });
        }
        Ok(())
    }

    async fn jumpbox_address(&self) -> Result<HostAddress, ProvisionError> {
        let output = Command::new("sudo")
            .args(["virsh", "domifaddr", self.settings.domain.as_str()])
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: format!("virsh domifaddr {}", self.settings.domain),
                exit_code: output.status.code().unwrap_or(-1),
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        debug!(listing = %listing, "virsh domifaddr");
        parse_domifaddr(&listing, &self.settings.network_prefix).ok_or_else(|| {
            ProvisionError::NoAddress(format!(
                "domain '{}' has no address on {}*",
                self.settings.domain, self.settings.network_prefix
            ))
        })
    }
}

#[async_trait]
impl HostProvisioner for LibvirtProvisioner {
    async fn provision(&self) -> Result<TargetHost, ProvisionError> {
        self.run_playbook("cleanup", &["-e".to_string(), "hook_action=cleanup".to_string()])
            .await?;
        self.run_playbook(
            "setup",
            &["-e".to_string(), format!("ssh_key={}", self.settings.ssh_key_name)],
        )
        .await?;
        let address = self.jumpbox_address().await?;
        info!(address = %address, "Jumpbox provisioned");
        Ok(TargetHost::new(address))
    }
}

/// Picks the first address on `network_prefix` from `virsh domifaddr` output.
///
/// ```text
///  Name       MAC address          Protocol     Address
/// -------------------------------------------------------------------------------
///  vnet0      52:54:00:aa:bb:cc    ipv4         192.168.122.34/24
/// ```
pub fn parse_domifaddr(listing: &str, network_prefix: &str) -> Option<HostAddress> {
    listing
        .lines()
        .flat_map(str::split_whitespace)
        .find(|token| token.starts_with(network_prefix))
        .map(|token| token.split('/').next().unwrap_or(token))
        .and_then(HostAddress::new)
}
