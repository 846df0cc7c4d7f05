//! Trading partner directory: partner name to endpoint and party id.
//!
//! The file backend re-reads its JSON file on every call; nothing is cached.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::{sanitize_file_name, write_atomic};
use crate::template::render_response_pmode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub party_id: String,
}

pub trait PartnerDirectory: Send + Sync {
    /// Fails with `Error::NotFound` when no partner has this name.
    fn lookup(&self, name: &str) -> Result<Endpoint>;

    /// Keystore alias registered for a party id.
    fn keystore_alias(&self, party_id: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub party_id: String,
    pub name: String,
    pub endpoint_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore_alias: Option<String>,
}

impl Partner {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            address: self.endpoint_url.clone(),
            party_id: self.party_id.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("party_id", &self.party_id),
            ("name", &self.name),
            ("endpoint_url", &self.endpoint_url),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("partner {field} is required")));
            }
        }
        url::Url::parse(&self.endpoint_url).map_err(|err| {
            Error::Validation(format!("invalid endpoint_url {}: {err}", self.endpoint_url))
        })?;
        Ok(())
    }
}

/// Response P-Mode generated for each partner on `add`.
#[derive(Debug, Clone)]
pub struct ResponsePModeOutput {
    pub template: PathBuf,
    pub dir: PathBuf,
}

impl ResponsePModeOutput {
    pub fn path_for(&self, partner_name: &str) -> PathBuf {
        self.dir
            .join(format!("pmode-resp-{}.xml", sanitize_file_name(partner_name)))
    }
}

pub struct JsonPartnerDirectory {
    path: PathBuf,
    response_pmode: Option<ResponsePModeOutput>,
}

impl JsonPartnerDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            response_pmode: None,
        }
    }

    pub fn with_response_pmode(mut self, output: ResponsePModeOutput) -> Self {
        self.response_pmode = Some(output);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All partners; a missing file is an empty directory.
    pub fn list(&self) -> Result<Vec<Partner>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::io(&self.path, err)),
        };
        serde_json::from_slice(&data).map_err(|err| Error::Parse {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    pub fn add(&self, partner: Partner) -> Result<()> {
        partner.validate()?;
        let mut partners = self.list()?;
        if partners.iter().any(|p| p.party_id == partner.party_id) {
            return Err(Error::Validation(format!(
                "partner {} already exists",
                partner.party_id
            )));
        }
        if let Some(output) = &self.response_pmode {
            write_response_pmode(output, &partner)?;
        }
        info!("added partner party_id={} name={}", partner.party_id, partner.name);
        partners.push(partner);
        self.store(&partners)
    }

    pub fn update(&self, partner: Partner) -> Result<()> {
        partner.validate()?;
        let mut partners = self.list()?;
        let slot = partners
            .iter_mut()
            .find(|p| p.party_id == partner.party_id)
            .ok_or_else(|| Error::NotFound(format!("partner {}", partner.party_id)))?;
        *slot = partner;
        self.store(&partners)
    }

    pub fn remove(&self, party_id: &str) -> Result<Partner> {
        let mut partners = self.list()?;
        let index = partners
            .iter()
            .position(|p| p.party_id == party_id)
            .ok_or_else(|| Error::NotFound(format!("partner {party_id}")))?;
        let removed = partners.remove(index);
        self.store(&partners)?;
        info!("removed partner party_id={party_id}");
        Ok(removed)
    }

    fn store(&self, partners: &[Partner]) -> Result<()> {
        let data = serde_json::to_vec_pretty(partners)
            .map_err(|err| Error::Serialization(err.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
        write_atomic(&self.path, &data).map_err(|err| Error::io(&self.path, err))
    }
}

fn write_response_pmode(output: &ResponsePModeOutput, partner: &Partner) -> Result<()> {
    let template =
        fs::read_to_string(&output.template).map_err(|err| Error::io(&output.template, err))?;
    let rendered = render_response_pmode(&template, &partner.party_id)?;
    fs::create_dir_all(&output.dir).map_err(|err| Error::io(&output.dir, err))?;
    let path = output.path_for(&partner.name);
    write_atomic(&path, rendered.as_bytes()).map_err(|err| Error::io(&path, err))?;
    info!("wrote response pmode {}", path.display());
    Ok(())
}

impl PartnerDirectory for JsonPartnerDirectory {
    /// Matches on partner name, then on party id.
    fn lookup(&self, name: &str) -> Result<Endpoint> {
        let partners = self.list()?;
        partners
            .iter()
            .find(|p| p.name == name)
            .or_else(|| partners.iter().find(|p| p.party_id == name))
            .map(Partner::endpoint)
            .ok_or_else(|| Error::NotFound(format!("trading partner {name}")))
    }

    fn keystore_alias(&self, party_id: &str) -> Result<String> {
        let partners = self.list()?;
        let partner = partners
            .iter()
            .find(|p| p.party_id == party_id)
            .ok_or_else(|| Error::NotFound(format!("trading partner {party_id}")))?;
        match partner.keystore_alias.as_deref().map(str::trim) {
            Some(alias) if !alias.is_empty() => Ok(alias.to_string()),
            _ => {
                warn!("partner {party_id} has no keystore alias");
                Err(Error::Lookup(format!("no keystore alias for {party_id}")))
            }
        }
    }
}

/// In-memory directory for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPartnerDirectory {
    endpoints: HashMap<String, Endpoint>,
    aliases: HashMap<String, String>,
}

impl StaticPartnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partner(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoints.insert(name.into(), endpoint);
        self
    }

    pub fn with_alias(mut self, party_id: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.insert(party_id.into(), alias.into());
        self
    }
}

impl PartnerDirectory for StaticPartnerDirectory {
    fn lookup(&self, name: &str) -> Result<Endpoint> {
        self.endpoints
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("trading partner {name}")))
    }

    fn keystore_alias(&self, party_id: &str) -> Result<String> {
        self.aliases
            .get(party_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("keystore alias for {party_id}")))
    }
}
