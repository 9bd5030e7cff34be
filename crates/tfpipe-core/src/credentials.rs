//! Credential loading from the secrets service.
//!
//! Flow: exchange the CI-issued identity token for a session token, then
//! fetch one namespaced secret bundle per configured provider at
//! `secret/<provider>/<environment>`, falling back to the non-namespaced
//! `secret/<provider>` path on a 404 where the provider allows it.
//!
//! Secrets live in a [`CredentialBundle`] scoped to one environment and are
//! wiped when the bundle drops. The only durable form is the short-lived
//! [`ExportGuard`] file (0600, deleted on drop) consumed by a later
//! pipeline stage.

use crate::config::{ProviderConfig, SecretsConfig};
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// CredentialBundle
// ---------------------------------------------------------------------------

/// Logical secret name → value, scoped to one environment.
///
/// Keys are `<provider>_<field>` (e.g. `backend_username`). Values are
/// overwritten with zeros and cleared on drop so a bundle never outlives
/// its stage.
#[derive(Debug, Default)]
pub struct CredentialBundle {
    pub environment: String,
    values: BTreeMap<String, String>,
}

impl CredentialBundle {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// (KEY, value) pairs with uppercased `TFPIPE_`-prefixed names, the
    /// shape consumed by the export file and by tool invocations.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(k, v)| (format!("TFPIPE_{}", k.to_uppercase()), v.clone()))
            .collect()
    }
}

impl Drop for CredentialBundle {
    fn drop(&mut self) {
        for value in self.values.values_mut() {
            // Overwrite the retained buffer before freeing. Best-effort
            // scrub; the allocator may have copied the string during growth.
            let len = value.len();
            value.clear();
            value.push_str(&"\0".repeat(len));
        }
        self.values.clear();
    }
}

// ---------------------------------------------------------------------------
// ExportGuard
// ---------------------------------------------------------------------------

/// A short-lived KEY=VALUE credential export file, access-restricted to the
/// owner and deleted when the guard drops.
#[derive(Debug)]
pub struct ExportGuard {
    path: PathBuf,
}

impl ExportGuard {
    /// The mode is restricted before any secret byte lands on disk, and the
    /// rename into place preserves it.
    pub fn write(path: &Path, bundle: &CredentialBundle) -> Result<Self> {
        use std::io::Write;

        let content: String = bundle
            .env_pairs()
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(content.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detach without deleting, for stages that hand the file to a
    /// successor which takes over deletion.
    pub fn into_path(self) -> PathBuf {
        let path = self.path.clone();
        std::mem::forget(self);
        path
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to delete credential export {}: {e}", self.path.display());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SecretsClient
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Debug, Deserialize)]
struct SecretResponse {
    data: BTreeMap<String, String>,
}

/// Blocking client for the secrets service.
pub struct SecretsClient {
    http: reqwest::blocking::Client,
    address: String,
    auth_path: String,
    token: Option<String>,
}

impl SecretsClient {
    pub fn new(address: impl Into<String>, auth_path: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            http,
            address: address.into().trim_end_matches('/').to_string(),
            auth_path: auth_path.into(),
            token: None,
        }
    }

    pub fn from_config(config: &SecretsConfig) -> Self {
        Self::new(config.effective_address(), config.auth_path.clone())
    }

    /// Exchange the CI identity token for a session token.
    pub fn login(&mut self, jwt: &str) -> Result<()> {
        let url = format!("{}/{}", self.address, self.auth_path);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "jwt": jwt }))
            .send()
            .map_err(|e| PipelineError::Authentication(format!("token exchange failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Authentication(format!(
                "token exchange rejected with status {status}"
            )));
        }

        let body: LoginResponse = response
            .json()
            .map_err(|e| PipelineError::Authentication(format!("malformed login response: {e}")))?;
        self.token = Some(body.auth.client_token);
        Ok(())
    }

    /// Fetch one provider's secret map for an environment. Returns
    /// `Ok(None)` on a 404 with no usable fallback; all other non-2xx
    /// statuses are errors for the caller to classify.
    fn fetch_provider(
        &self,
        provider: &ProviderConfig,
        environment: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let namespaced = format!("{}/v1/secret/{}/{}", self.address, provider.name, environment);
        match self.fetch_path(&namespaced)? {
            FetchResult::Found(data) => return Ok(Some(data)),
            FetchResult::NotFound => {}
            FetchResult::Denied(status) => return Err(denial(provider, environment, status)),
        }

        if !provider.allow_default_path {
            return Ok(None);
        }

        debug!(
            "no secret at secret/{}/{environment}, trying default path",
            provider.name
        );
        let default = format!("{}/v1/secret/{}", self.address, provider.name);
        match self.fetch_path(&default)? {
            FetchResult::Found(data) => Ok(Some(data)),
            FetchResult::NotFound => Ok(None),
            FetchResult::Denied(status) => Err(denial(provider, environment, status)),
        }
    }

    fn fetch_path(&self, url: &str) -> Result<FetchResult> {
        let token = self.token.as_deref().ok_or_else(|| {
            PipelineError::Authentication("not logged in to the secrets service".to_string())
        })?;
        let response = self
            .http
            .get(url)
            .header("X-Vault-Token", token)
            .send()
            .map_err(|e| PipelineError::Authentication(format!("secrets service unreachable: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchResult::NotFound);
        }
        if !status.is_success() {
            return Ok(FetchResult::Denied(status.as_u16()));
        }
        let body: SecretResponse = response.json()?;
        Ok(FetchResult::Found(body.data))
    }

    /// Load the full credential bundle for an environment.
    ///
    /// Mandatory providers missing or denied are hard failures; optional
    /// providers are logged and skipped.
    pub fn load_bundle(
        &self,
        config: &SecretsConfig,
        environment: &str,
    ) -> Result<CredentialBundle> {
        let mut bundle = CredentialBundle::new(environment);

        for provider in &config.providers {
            let fetched = match self.fetch_provider(provider, environment) {
                Ok(Some(data)) => Some(data),
                Ok(None) => None,
                Err(e) if provider.mandatory => return Err(e),
                Err(e) => {
                    warn!("skipping optional provider '{}': {e}", provider.name);
                    None
                }
            };

            match fetched {
                Some(data) => {
                    debug!(
                        "loaded {} secret(s) for provider '{}'",
                        data.len(),
                        provider.name
                    );
                    for (key, value) in data {
                        bundle.insert(format!("{}_{}", provider.name, key), value);
                    }
                }
                None if provider.mandatory => {
                    return Err(PipelineError::RequiredSecretMissing {
                        provider: provider.name.clone(),
                        environment: environment.to_string(),
                    });
                }
                None => {
                    warn!(
                        "no secret for optional provider '{}' in environment '{environment}'",
                        provider.name
                    );
                }
            }
        }

        Ok(bundle)
    }
}

enum FetchResult {
    Found(BTreeMap<String, String>),
    NotFound,
    Denied(u16),
}

/// Classify a non-404 denial. A mandatory provider's secret is hard-missing;
/// an optional provider surfaces an authentication problem the caller skips.
fn denial(provider: &ProviderConfig, environment: &str, status: u16) -> PipelineError {
    warn!(
        "secret fetch for '{}' in '{environment}' returned {status}",
        provider.name
    );
    if provider.mandatory {
        PipelineError::RequiredSecretMissing {
            provider: provider.name.clone(),
            environment: environment.to_string(),
        }
    } else {
        PipelineError::Authentication(format!(
            "secret fetch for '{}' returned {status}",
            provider.name
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
