//! [`ArtifactResolver`] over the Zuul REST API.
//!
//! Resolution takes two requests: the build record gives the build's log
//! URL, and the manifest stored next to the logs lists the files the build
//! published. The package is the second entry of the innermost directory under
//! `buildset`.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{ArtifactResolver, ArtifactUrl, BuildUrl, ResolveError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Where the Zuul API lives and how its manifests are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZuulSettings {
    /// Tenant API root; build records are at `<api_base>/build/<id>`.
    pub api_base: String,
    /// Path under the log URL where the package is published.
    pub platform_suffix: String,
    pub manifest_name: String,
    pub timeout_secs: u64,
}

impl Default for ZuulSettings {
    fn default() -> Self {
        Self {
            api_base: "https://softwarefactory-project.io/zuul/api/tenant/local".to_string(),
            platform_suffix: "buildset/el/7/x86_64".to_string(),
            manifest_name: "zuul-manifest.json".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Extracts `log_url` from a Zuul build record.
pub fn log_url_from_build(build: &Value) -> Option<&str> {
    build
        .get("log_url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
}

/// Finds the package file name in a Zuul manifest.
pub fn artifact_name_from_manifest(manifest: &Value) -> Option<&str> {
    manifest
        .get("tree")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("name").and_then(Value::as_str) == Some("buildset"))?
        .pointer("/children/0/children/0/children/0/children/1/name")?
        .as_str()
}

/// Joins the log URL, the platform path and the package name.
pub fn artifact_url(log_url: &str, platform_suffix: &str, name: &str) -> String {
    format!(
        "{}/{}/{}",
        log_url.trim_end_matches('/'),
        platform_suffix.trim_matches('/'),
        name
    )
}

/// Resolves build URLs through the Zuul API with a shared HTTP client.
#[derive(Debug, Clone)]
pub struct ZuulResolver {
    settings: ZuulSettings,
    client: reqwest::Client,
}

impl ZuulResolver {
    pub fn new(settings: ZuulSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { settings, client }
    }

    fn build_record_url(&self, build_id: &str) -> String {
        format!(
            "{}/build/{}",
            self.settings.api_base.trim_end_matches('/'),
            build_id
        )
    }

    async fn get_json(&self, url: &str) -> Result<Value, ResolveError> {
        let http_error = |message: String| ResolveError::Http {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| http_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_error(format!("status {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| http_error(format!("invalid JSON body: {e}")))
    }
}

#[async_trait]
impl ArtifactResolver for ZuulResolver {
    #[instrument(skip(self), fields(build = %locator))]
    async fn resolve(&self, locator: &BuildUrl) -> Result<ArtifactUrl, ResolveError> {
        let not_found = |reason: &str| ResolveError::NotFound {
            build: locator.to_string(),
            reason: reason.to_string(),
        };

        let build_id = locator
            .build_id()
            .ok_or_else(|| not_found("build URL has no build id"))?;
        let build = self.get_json(&self.build_record_url(build_id)).await?;
        let log_url = log_url_from_build(&build).ok_or_else(|| not_found("build has no log_url"))?;
        debug!(log_url, "Build record fetched");

        let manifest_url = format!(
            "{}/{}",
            log_url.trim_end_matches('/'),
            self.settings.manifest_name
        );
        let manifest = self.get_json(&manifest_url).await?;
        let name = artifact_name_from_manifest(&manifest)
            .ok_or_else(|| not_found("manifest has no package under buildset"))?;

        let url = artifact_url(log_url, &self.settings.platform_suffix, name);
        info!(artifact = %url, "Artifact resolved");
        ArtifactUrl::new(url).ok_or_else(|| not_found("empty artifact URL"))
    }
}
