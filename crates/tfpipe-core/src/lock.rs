//! Remote state lock detection and the operator-supervised override.
//!
//! The orchestration layer checks the backend's lock, it never owns it.
//! A present lock is a hard failure unless the force-unlock override is
//! set, in which case the lock ID is extracted and an unlock is forced.
//! The override does not verify that the previous holder is dead; that
//! risk stays with the operator who set the flag.

use crate::backend::BackendAddresses;
use crate::credentials::CredentialBundle;
use crate::error::{PipelineError, Result};
use crate::plan::credentialed;
use crate::tool::ToolInvocation;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

// ---------------------------------------------------------------------------
// LockInfo / LockStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LockInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Who", default)]
    pub who: Option<String>,
    #[serde(rename = "Created", default)]
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockStatus {
    Unlocked,
    Locked(LockInfo),
}

// ---------------------------------------------------------------------------
// Free-text fallback
// ---------------------------------------------------------------------------

static LOCK_ID_RE: OnceLock<Regex> = OnceLock::new();

fn lock_id_re() -> &'static Regex {
    LOCK_ID_RE.get_or_init(|| Regex::new(r"ID:\s*([0-9a-fA-F][0-9a-fA-F-]+)").unwrap())
}

/// Extract a lock record from a free-text lock listing. Only used when the
/// backend returns a non-JSON body; fails explicitly on non-match.
pub fn parse_lock_listing(text: &str) -> Result<LockInfo> {
    if !text.contains("Lock Info") {
        let hint: String = text.chars().take(200).collect();
        return Err(PipelineError::LockListingUnparsable(hint));
    }
    let caps = lock_id_re().captures(text).ok_or_else(|| {
        let hint: String = text.chars().take(200).collect();
        PipelineError::LockListingUnparsable(hint)
    })?;
    Ok(LockInfo {
        id: caps[1].to_string(),
        who: None,
        created: None,
    })
}

// ---------------------------------------------------------------------------
// Lock query
// ---------------------------------------------------------------------------

/// Query the backend's lock address. Only a 2xx body is read as a lock
/// listing: a JSON lock record is the structured path, free text falls
/// back to [`parse_lock_listing`]. 401 is fatal and any other non-2xx is
/// an unreachable backend, never a silent "unlocked".
pub fn status(addresses: &BackendAddresses, bundle: &CredentialBundle) -> Result<LockStatus> {
    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut request = http.get(&addresses.lock);
    if let Some(username) = bundle.get("backend_username") {
        request = request.basic_auth(username, bundle.get("backend_password"));
    }
    let response = request
        .send()
        .map_err(|e| PipelineError::BackendUnreachable(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(LockStatus::Unlocked);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(PipelineError::Authentication(format!(
            "state backend rejected credentials at {}",
            addresses.lock
        )));
    }
    if !status.is_success() {
        return Err(PipelineError::BackendUnreachable(format!(
            "lock query returned {status} for {}",
            addresses.lock
        )));
    }
    let body = response.text()?;
    if body.trim().is_empty() {
        return Ok(LockStatus::Unlocked);
    }
    match serde_json::from_str::<LockInfo>(&body) {
        Ok(info) => Ok(LockStatus::Locked(info)),
        Err(_) => Ok(LockStatus::Locked(parse_lock_listing(&body)?)),
    }
}

/// Fail on a held lock, or force-release it when the override is set.
pub fn ensure_unlocked(
    workdir: &Path,
    addresses: &BackendAddresses,
    bundle: &CredentialBundle,
    force_override: bool,
) -> Result<()> {
    match status(addresses, bundle)? {
        LockStatus::Unlocked => Ok(()),
        LockStatus::Locked(info) => {
            if !force_override {
                return Err(PipelineError::StateLocked { id: info.id });
            }
            warn!(
                "force-unlock override set: releasing lock {} held by {} without liveness check",
                info.id,
                info.who.as_deref().unwrap_or("<unknown>")
            );
            force_unlock(workdir, &info.id, bundle)
        }
    }
}

/// Issue `force-unlock -force <id>` in the environment's working directory.
pub fn force_unlock(workdir: &Path, id: &str, bundle: &CredentialBundle) -> Result<()> {
    let output = credentialed(
        ToolInvocation::new(workdir, &["force-unlock", "-force", id])?,
        bundle,
    )
    .run()?;
    if !output.success {
        warn!("force-unlock failed: {}", output.combined().trim());
        return Err(PipelineError::StateLocked { id: id.to_string() });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Error: Error acquiring the state lock\n\n\
        Lock Info:\n  ID:        4cb62c0a-7a24-9d71-1e9c-1e7b0046e886\n  \
        Path:      state/payments-dev\n  Who:       ci@runner-17\n";

    #[test]
    fn listing_with_lock_info_yields_id() {
        let info = parse_lock_listing(LISTING).unwrap();
        assert_eq!(info.id, "4cb62c0a-7a24-9d71-1e9c-1e7b0046e886");
    }

    #[test]
    fn listing_without_lock_info_is_unparsable() {
        let result = parse_lock_listing("something else entirely");
        assert!(matches!(
            result,
            Err(PipelineError::LockListingUnparsable(_))
        ));
    }

    #[test]
    fn listing_with_lock_info_but_no_id_is_unparsable() {
        let result = parse_lock_listing("Lock Info:\n  Path: state/p-dev\n");
        assert!(matches!(
            result,
            Err(PipelineError::LockListingUnparsable(_))
        ));
    }

    fn bundle() -> CredentialBundle {
        let mut bundle = CredentialBundle::new("dev");
        bundle.insert("backend_username", "svc");
        bundle.insert("backend_password", "pw");
        bundle
    }

    #[test]
    fn no_lock_record_is_unlocked() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev/lock")
            .with_status(404)
            .create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        assert_eq!(status(&addrs, &bundle()).unwrap(), LockStatus::Unlocked);
    }

    #[test]
    fn json_lock_record_is_locked() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev/lock")
            .with_status(200)
            .with_body(r#"{"ID":"abc-123","Who":"ci@runner-3"}"#)
            .create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        match status(&addrs, &bundle()).unwrap() {
            LockStatus::Locked(info) => {
                assert_eq!(info.id, "abc-123");
                assert_eq!(info.who.as_deref(), Some("ci@runner-3"));
            }
            other => panic!("expected locked, got {other:?}"),
        }
    }

    #[test]
    fn free_text_lock_record_falls_back_to_listing_parser() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev/lock")
            .with_status(200)
            .with_body(LISTING)
            .create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        match status(&addrs, &bundle()).unwrap() {
            LockStatus::Locked(info) => {
                assert_eq!(info.id, "4cb62c0a-7a24-9d71-1e9c-1e7b0046e886")
            }
            other => panic!("expected locked, got {other:?}"),
        }
    }

    #[test]
    fn rejected_credentials_never_read_as_unlocked() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev/lock")
            .with_status(401)
            .create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        let result = status(&addrs, &bundle());
        assert!(matches!(result, Err(PipelineError::Authentication(_))));
    }

    #[test]
    fn server_error_on_lock_query_is_backend_unreachable() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev/lock")
            .with_status(500)
            .with_body("<html>internal server error</html>")
            .create();

        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        let result = status(&addrs, &bundle());
        assert!(matches!(
            result,
            Err(PipelineError::BackendUnreachable(_))
        ));
    }

    #[test]
    fn held_lock_without_override_is_fatal() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev/lock")
            .with_status(200)
            .with_body(r#"{"ID":"abc-123"}"#)
            .create();

        let dir = tempfile::TempDir::new().unwrap();
        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        let result = ensure_unlocked(dir.path(), &addrs, &bundle(), false);
        assert!(matches!(
            result,
            Err(PipelineError::StateLocked { ref id }) if id == "abc-123"
        ));
    }

    #[test]
    fn unlocked_state_passes_check() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/state/p-dev/lock")
            .with_status(404)
            .create();

        let dir = tempfile::TempDir::new().unwrap();
        let addrs = BackendAddresses::derive(&server.url(), "p", "dev");
        ensure_unlocked(dir.path(), &addrs, &bundle(), false).unwrap();
    }
}
