//! Keystore inspection through the external `keytool` program.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use serde::Serialize;

use crate::config::KeystoreConfig;
use crate::error::{Error, Result};

const CERTIFICATE_EXTENSIONS: [&str; 4] = ["cert", "pem", "crt", "jks"];

pub trait KeystoreQuery: Send + Sync {
    /// Owner distinguished name of the certificate stored under `alias`.
    fn distinguished_name(&self, alias: &str) -> Result<String>;

    fn aliases(&self) -> Result<Vec<String>>;
}

pub struct KeytoolKeystore {
    program: String,
    path: PathBuf,
    storepass: String,
}

impl KeytoolKeystore {
    pub fn new(config: &KeystoreConfig) -> Self {
        Self {
            program: config.program.clone(),
            path: config.path.clone(),
            storepass: config.storepass.clone(),
        }
    }

    fn list(&self, extra: &[&str]) -> Result<String> {
        // Arguments go straight to the process; no shell is involved.
        let output = Command::new(&self.program)
            .arg("-list")
            .arg("-v")
            .arg("-keystore")
            .arg(&self.path)
            .arg("-storepass")
            .arg(&self.storepass)
            .args(extra)
            .output()
            .map_err(|err| Error::Lookup(format!("failed to run {}: {err}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("{} exited with {}: {}", self.program, output.status, stderr.trim());
            return Err(Error::Lookup(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl KeystoreQuery for KeytoolKeystore {
    fn distinguished_name(&self, alias: &str) -> Result<String> {
        let text = self.list(&["-alias", alias])?;
        parse_dname(&text).ok_or_else(|| Error::Lookup(format!("no owner line for alias {alias}")))
    }

    fn aliases(&self) -> Result<Vec<String>> {
        Ok(parse_aliases(&self.list(&[])?))
    }
}

/// Value of the first `Owner:` or `Subject:` line.
pub fn parse_dname(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| {
            line.strip_prefix("Owner:")
                .or_else(|| line.strip_prefix("Subject:"))
        })
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_aliases(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("alias name")
                .then(|| value.trim().to_string())
        })
        .filter(|alias| !alias.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    pub file_name: String,
    pub kind: String,
    pub size: u64,
}

/// Certificate and keystore files directly inside `dir`, sorted by name.
pub fn list_certificates(dir: &Path) -> Result<Vec<CertificateInfo>> {
    let entries = fs::read_dir(dir).map_err(|err| Error::io(dir, err))?;
    let mut certificates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(dir, err))?;
        let path = entry.path();
        let Some(kind) = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| CERTIFICATE_EXTENSIONS.contains(&ext.as_str()))
        else {
            continue;
        };
        let metadata = entry.metadata().map_err(|err| Error::io(&path, err))?;
        if !metadata.is_file() {
            continue;
        }
        certificates.push(CertificateInfo {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            kind,
            size: metadata.len(),
        });
    }
    certificates.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(certificates)
}
