//! Bridge configuration.
//!
//! Loaded once from a JSON file and handed to each component at construction.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the submission and inbox paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Submission root watched by the engine.
    /// Default: `msg_out`
    pub outbox_dir: PathBuf,

    /// Delivery folder the engine writes received messages to.
    /// Default: `msg_in`
    pub inbox_dir: PathBuf,

    pub limits: Limits,

    pub agreement: AgreementConfig,

    /// P-Mode activation; submissions skip it when absent.
    pub routing: Option<RoutingConfig>,

    /// JSON trading-partner directory.
    pub partners_file: Option<PathBuf>,

    /// Template rendered for each partner added to the directory.
    pub response_pmode_template: Option<PathBuf>,

    /// Where per-partner response P-Modes are written.
    pub pmode_dir: Option<PathBuf>,

    pub keystore: Option<KeystoreConfig>,

    /// Prefix joined with a part location to form its download URL.
    /// Default: `/attachments/`
    pub attachment_url_prefix: String,

    /// File extensions considered during inbox scans.
    /// Default: `["xml", "mmd"]`
    pub candidate_extensions: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            outbox_dir: PathBuf::from("msg_out"),
            inbox_dir: PathBuf::from("msg_in"),
            limits: Limits::default(),
            agreement: AgreementConfig::default(),
            routing: None,
            partners_file: None,
            response_pmode_template: None,
            pmode_dir: None,
            keystore: None,
            attachment_url_prefix: "/attachments/".to_string(),
            candidate_extensions: vec!["xml".to_string(), "mmd".to_string()],
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|err| Error::io(path, err))?;
        let config: BridgeConfig = serde_json::from_slice(&data)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.candidate_extensions.is_empty() {
            return Err(Error::Config(
                "candidate_extensions must name at least one extension".to_string(),
            ));
        }
        if self.limits.max_attachments == 0 {
            return Err(Error::Config("limits.max_attachments must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Default: 5
    pub max_attachments: usize,
    /// Default: 20 MiB
    pub max_total_attachment_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_attachments: 5,
            max_total_attachment_bytes: 20 * 1024 * 1024, // 20 MiB
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementConfig {
    pub push_pmode: String,
    pub response_pmode: String,
    pub default_conversation_id: String,
}

impl Default for AgreementConfig {
    fn default() -> Self {
        Self {
            push_pmode: "current-pmode-push".to_string(),
            response_pmode: "current-pmode-response".to_string(),
            default_conversation_id: "org:holodeckb2b:test:conversation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub push_template: PathBuf,
    pub response_template: PathBuf,
    /// File the engine reads its active P-Mode from; overwritten atomically.
    pub active_pmode: PathBuf,
    /// Substrings of a caller hint that select push mode.
    #[serde(default = "default_push_markers")]
    pub push_markers: Vec<String>,
}

fn default_push_markers() -> Vec<String> {
    vec!["push".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreConfig {
    #[serde(default = "default_keytool")]
    pub program: String,
    pub path: PathBuf,
    pub storepass: String,
}

fn default_keytool() -> String {
    "keytool".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_engine_conventions() {
        let config = BridgeConfig::default();
        assert_eq!(config.limits.max_attachments, 5);
        assert_eq!(config.limits.max_total_attachment_bytes, 20 * 1024 * 1024);
        assert_eq!(config.agreement.push_pmode, "current-pmode-push");
        assert_eq!(
            config.agreement.default_conversation_id,
            "org:holodeckb2b:test:conversation"
        );
        assert_eq!(config.candidate_extensions, ["xml", "mmd"]);
        assert_eq!(config.attachment_url_prefix, "/attachments/");
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        fs::write(
            &path,
            r#"{
                "inbox_dir": "/srv/as4/msg_in",
                "limits": { "max_attachments": 3 },
                "keystore": { "path": "/srv/as4/keys.jks", "storepass": "secret" }
            }"#,
        )
        .unwrap();

        let config = BridgeConfig::load(&path).expect("load");
        assert_eq!(config.inbox_dir, PathBuf::from("/srv/as4/msg_in"));
        assert_eq!(config.outbox_dir, PathBuf::from("msg_out"));
        assert_eq!(config.limits.max_attachments, 3);
        assert_eq!(config.limits.max_total_attachment_bytes, 20 * 1024 * 1024);
        assert_eq!(config.keystore.unwrap().program, "keytool");
    }

    #[test]
    fn rejects_unusable_config() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        fs::write(&path, r#"{ "candidate_extensions": [] }"#).unwrap();
        assert!(matches!(BridgeConfig::load(&path), Err(Error::Config(_))));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(BridgeConfig::load(&path), Err(Error::Config(_))));
    }
}
