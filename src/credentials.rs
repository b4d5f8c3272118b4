//! Automation profile credentials.
//!
//! One record per automation profile, loaded from a JSON file before a run
//! starts and treated as read-only for the duration of the run. The secret
//! is never logged in plaintext; `Debug` and `Display` redact it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Clone, Deserialize)]
pub struct Credential {
    /// Identifier of the browser profile this credential belongs to.
    pub profile_id: String,
    /// Login email for the profile manager account.
    pub email: String,
    /// Login secret. Redacted from all formatted output.
    pub secret: String,
    /// Name of the bookmark/page the workflow navigates to.
    pub target_page: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("profile_id", &self.profile_id)
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("target_page", &self.target_page)
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "profile {} ({} -> {})",
            self.profile_id, self.email, self.target_page
        )
    }
}

/// Loads a credential record from a JSON file.
pub fn load_credential(path: &Path) -> Result<Credential> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read credential file {}", path.display()))?;
    let credential: Credential = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse credential file {}", path.display()))?;
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credential {
        Credential {
            profile_id: "p-17".into(),
            email: "creator@example.com".into(),
            secret: "hunter2".into(),
            target_page: "My Shop".into(),
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let formatted = format!("{:?}", sample());
        assert!(!formatted.contains("hunter2"));
        assert!(formatted.contains("<redacted>"));
        assert!(formatted.contains("creator@example.com"));
    }

    #[test]
    fn test_display_omits_secret() {
        let formatted = format!("{}", sample());
        assert!(!formatted.contains("hunter2"));
    }

    #[test]
    fn test_load_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        std::fs::write(
            &path,
            r#"{
                "profile_id": "p-1",
                "email": "a@b.c",
                "secret": "s",
                "target_page": "Shop"
            }"#,
        )
        .unwrap();

        let credential = load_credential(&path).unwrap();
        assert_eq!(credential.profile_id, "p-1");
        assert_eq!(credential.target_page, "Shop");
    }

    #[test]
    fn test_load_credential_missing_file() {
        assert!(load_credential(Path::new("nope.json")).is_err());
    }
}
