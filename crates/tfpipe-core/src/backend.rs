//! Remote-state backend configuration.
//!
//! Derives the per-environment state/lock/unlock addresses from the backend
//! base URL and installs them, plus the backend credentials from the
//! loaded bundle, as the state client's transport configuration via
//! `init -reconfigure`.

use crate::credentials::CredentialBundle;
use crate::error::{PipelineError, Result};
use crate::tool::ToolInvocation;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BackendAddresses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddresses {
    pub state: String,
    pub lock: String,
    pub unlock: String,
}

impl BackendAddresses {
    /// Derive the addresses for one (project, environment) state document.
    pub fn derive(base_url: &str, project: &str, environment: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let state = format!("{base}/state/{project}-{environment}");
        let lock = format!("{state}/lock");
        Self {
            unlock: lock.clone(),
            lock,
            state,
        }
    }
}

// ---------------------------------------------------------------------------
// Connectivity probe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// State document exists and is readable.
    Existing,
    /// 404: no state yet for this (project, environment). Informational.
    NotCreated,
    /// Unexpected status; surfaced as a warning, the run continues.
    Degraded(u16),
}

/// Probe the state address with the backend credentials.
///
/// 401 is fatal (bad credentials reach no further), a transport error is
/// `BackendUnreachable`, 404 means "not yet created", anything else
/// unexpected degrades to a warning.
pub fn probe(addresses: &BackendAddresses, bundle: &CredentialBundle) -> Result<ProbeOutcome> {
    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut request = http.get(&addresses.state);
    if let Some(username) = bundle.get("backend_username") {
        request = request.basic_auth(username, bundle.get("backend_password"));
    }

    let response = request
        .send()
        .map_err(|e| PipelineError::BackendUnreachable(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(PipelineError::Authentication(format!(
            "state backend rejected credentials at {}",
            addresses.state
        )));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        info!("no remote state yet at {}", addresses.state);
        return Ok(ProbeOutcome::NotCreated);
    }
    if status.is_success() {
        return Ok(ProbeOutcome::Existing);
    }
    warn!(
        "state backend probe returned {status} for {}, continuing",
        addresses.state
    );
    Ok(ProbeOutcome::Degraded(status.as_u16()))
}

// ---------------------------------------------------------------------------
// Backend initialization
// ---------------------------------------------------------------------------

/// Initialize the state client against the derived addresses with
/// reconfigure semantics, replacing any previously configured backend in
/// the working directory.
pub fn init(workdir: &Path, addresses: &BackendAddresses, bundle: &CredentialBundle) -> Result<()> {
    let address_arg = format!("-backend-config=address={}", addresses.state);
    let lock_arg = format!("-backend-config=lock_address={}", addresses.lock);
    let unlock_arg = format!("-backend-config=unlock_address={}", addresses.unlock);

    let mut invocation = ToolInvocation::new(
        workdir,
        &[
            "init",
            "-reconfigure",
            "-input=false",
            "-no-color",
            &address_arg,
            &lock_arg,
            &unlock_arg,
        ],
    )?;

    // Credentials travel as transport env vars, never as CLI arguments.
    if let Some(username) = bundle.get("backend_username") {
        invocation = invocation.env("TF_HTTP_USERNAME", username);
    }
    if let Some(password) = bundle.get("backend_password") {
        invocation = invocation.env("TF_HTTP_PASSWORD", password);
    }

    let output = invocation.run()?;
    if !output.success {
        return Err(PipelineError::InitializationFailed(
            output.combined().trim().to_string(),
        ));
    }
    info!("backend initialized at {}", addresses.state);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_with_backend_creds() -> CredentialBundle {
        let mut bundle = CredentialBundle::new("dev");
        bundle.insert("backend_username", "svc");
        bundle.insert("backend_password", "pw");
        bundle
    }

    #[test]
    fn addresses_derive_from_base_project_env() {
        let addrs = BackendAddresses::derive("https://state.example.com/", "payments", "dev");
        assert_eq!(addrs.state, "https://state.example.com/state/payments-dev");
        assert_eq!(addrs.lock, "https://state.example.com/state/payments-dev/lock");
        assert_eq!(addrs.unlock, addrs.lock);
    }

    #[test]
    fn addresses_differ_per_environment() {
        let dev = BackendAddresses::derive("https://s.example.com", "p", "dev");
        let prd = BackendAddresses::derive("https://s.example.com", "p", "prd");
        assert_ne!(dev.state, prd.state);
    }

    #[test]
    fn probe_existing_state() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev")
            .with_status(200)
            .with_body("{}")
            .create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        let outcome = probe(&addrs, &bundle_with_backend_creds()).unwrap();
        assert_eq!(outcome, ProbeOutcome::Existing);
    }

    #[test]
    fn probe_404_is_informational() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/state/p-dev").with_status(404).create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        let outcome = probe(&addrs, &bundle_with_backend_creds()).unwrap();
        assert_eq!(outcome, ProbeOutcome::NotCreated);
    }

    #[test]
    fn probe_401_is_fatal() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/state/p-dev").with_status(401).create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        let result = probe(&addrs, &bundle_with_backend_creds());
        assert!(matches!(result, Err(PipelineError::Authentication(_))));
    }

    #[test]
    fn probe_other_status_degrades() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/state/p-dev").with_status(503).create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        let outcome = probe(&addrs, &bundle_with_backend_creds()).unwrap();
        assert_eq!(outcome, ProbeOutcome::Degraded(503));
    }

    #[test]
    fn probe_unreachable_backend() {
        // Port 1 should refuse connections everywhere.
        let addrs = BackendAddresses::derive("http://127.0.0.1:1", "p", "dev");
        let result = probe(&addrs, &bundle_with_backend_creds());
        assert!(matches!(result, Err(PipelineError::BackendUnreachable(_))));
    }
}
