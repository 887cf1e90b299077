//! Configuration: a TOML file, command-line flags, and environment overrides.
//!
//! Every section has complete defaults, so a missing file is valid. Only the
//! DCI credentials have no default; they must come from the file, a flag, or
//! the `DCI_CLIENT_ID` / `DCI_API_SECRET` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use listener::{StreamOptions, DEFAULT_SUBSCRIPTION};
use pipeline::{FilterCriteria, PipelineSettings, SettingsError};
use remote::{ProvisionerSettings, SshTarget};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zuul::ZuulSettings;

use crate::observability::{LogFormat, ObservabilitySettings};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/dci-thirdparty/config.toml";

/// DCI third-party CI: votes on dci-rhel-agent reviews after running the
/// agent against each new build.
#[derive(Debug, Parser)]
#[command(name = "dci-thirdparty")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file.
    #[arg(long, env = "DCI_THIRDPARTY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Private key of the Gerrit bot account.
    #[arg(long, env = "GERRIT_SSH_KEY_FILENAME")]
    pub gerrit_ssh_key: Option<PathBuf>,

    /// Private key used to reach the jumpbox.
    #[arg(long, env = "HOST_SSH_KEY_FILENAME")]
    pub host_ssh_key: Option<PathBuf>,

    /// Local checkout of dci-rhel-agent holding the virtual-setup playbook.
    #[arg(long, env = "RHEL_AGENT_DIR")]
    pub agent_dir: Option<PathBuf>,

    #[arg(long, env = "DCI_CLIENT_ID")]
    pub dci_client_id: Option<String>,

    #[arg(long, env = "DCI_API_SECRET", hide_env_values = true)]
    pub dci_api_secret: Option<String>,

    /// Overrides `observability.log_format`.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Invalid(#[from] SettingsError),
}

/// The `[gerrit]` section: where events are read and reviews are posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GerritSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub key_file: PathBuf,
    /// Command run over SSH to open the event stream.
    pub subscription: String,
}

impl Default for GerritSettings {
    fn default() -> Self {
        Self {
            host: "softwarefactory-project.io".to_string(),
            port: 29418,
            username: "dci-ci-bot".to_string(),
            key_file: PathBuf::from("/home/dci/dci_ci_bot_id_rsa"),
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
        }
    }
}

impl GerritSettings {
    pub fn ssh_target(&self) -> SshTarget {
        SshTarget::new(&self.host, &self.username)
            .with_port(self.port)
            .with_key_file(&self.key_file)
    }
}

/// The `[stream]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub poll_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Only events for this project are enqueued.
    pub project_filter: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            reconnect_delay_ms: 2000,
            project_filter: None,
        }
    }
}

impl StreamSettings {
    pub fn options(&self) -> StreamOptions {
        StreamOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            project_filter: self.project_filter.clone(),
        }
    }
}

/// The `[jumpbox]` section: credentials for the provisioned host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpboxSettings {
    pub username: String,
    pub key_file: PathBuf,
}

impl Default for JumpboxSettings {
    fn default() -> Self {
        Self {
            username: "dci".to_string(),
            key_file: PathBuf::from("/home/dci/.ssh/id_rsa"),
        }
    }
}

impl JumpboxSettings {
    /// Credentials template; the host is supplied per command.
    pub fn credentials(&self) -> SshTarget {
        SshTarget::new("jumpbox", &self.username).with_key_file(&self.key_file)
    }
}

/// The `[dci]` section.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DciSettings {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
}

impl std::fmt::Debug for DciSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DciSettings")
            .field("client_id", &self.client_id)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gerrit: GerritSettings,
    pub stream: StreamSettings,
    pub filter: FilterCriteria,
    pub zuul: ZuulSettings,
    pub jumpbox: JumpboxSettings,
    pub provisioner: ProvisionerSettings,
    pub dci: DciSettings,
    pub pipeline: PipelineSettings,
    pub observability: ObservabilitySettings,
}

impl Config {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Loads the file named by `args`, applies flag and environment
    /// overrides, and validates the result.
    pub fn resolve(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Self::load(&args.config)?;
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(key) = &args.gerrit_ssh_key {
            self.gerrit.key_file = key.clone();
        }
        if let Some(key) = &args.host_ssh_key {
            self.jumpbox.key_file = key.clone();
        }
        if let Some(dir) = &args.agent_dir {
            self.provisioner.agent_dir = dir.clone();
        }
        if let Some(id) = &args.dci_client_id {
            self.dci.client_id = id.clone();
        }
        if let Some(secret) = &args.dci_api_secret {
            self.dci.api_secret = secret.clone();
        }
        if let Some(format) = args.log_format {
            self.observability.log_format = format;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.gerrit.host.trim().is_empty() {
            return Err(SettingsError::new("gerrit.host", "must not be empty"));
        }
        if self.gerrit.subscription.trim().is_empty() {
            return Err(SettingsError::new("gerrit.subscription", "must not be empty"));
        }
        if self.stream.poll_interval_ms == 0 {
            return Err(SettingsError::new(
                "stream.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.stream.reconnect_delay_ms == 0 {
            return Err(SettingsError::new(
                "stream.reconnect_delay_ms",
                "must be greater than zero",
            ));
        }
        if self.zuul.api_base.trim().is_empty() {
            return Err(SettingsError::new("zuul.api_base", "must not be empty"));
        }
        if self.dci.client_id.trim().is_empty() {
            return Err(SettingsError::new(
                "dci.client_id",
                "must be set (or DCI_CLIENT_ID)",
            ));
        }
        if self.dci.api_secret.trim().is_empty() {
            return Err(SettingsError::new(
                "dci.api_secret",
                "must be set (or DCI_API_SECRET)",
            ));
        }
        self.filter.validate()?;
        self.pipeline.validate()
    }

    /// Provisioner settings with the DCI credentials filled in.
    pub fn provisioner_settings(&self) -> ProvisionerSettings {
        ProvisionerSettings {
            dci_client_id: self.dci.client_id.clone(),
            dci_api_secret: self.dci.api_secret.clone(),
            ..self.provisioner.clone()
        }
    }
}
