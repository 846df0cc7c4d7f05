//! Placeholder substitution for routing P-Mode templates.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::directory::PartnerDirectory;
use crate::error::{Error, Result};
use crate::layout::write_atomic;

pub const ADDRESS_TOKEN: &str = "${dynamic_address}";
pub const RESPONDER_PARTY_TOKEN: &str = "${dynamic_responder_party_id}";
pub const SENDER_TOKEN: &str = "${sender}";

/// Literal substitution of the address and responder tokens. Values are
/// inserted as-is; callers own their well-formedness in the target document.
pub fn fill_template(template: &str, address: &str, party_id: &str) -> Result<String> {
    if template.is_empty() {
        return Err(Error::Template("template text is empty".to_string()));
    }
    Ok(template
        .replace(ADDRESS_TOKEN, address)
        .replace(RESPONDER_PARTY_TOKEN, party_id))
}

/// Response P-Mode for one trading partner: every `${sender}` becomes its party id.
pub fn render_response_pmode(template: &str, party_id: &str) -> Result<String> {
    if template.is_empty() {
        return Err(Error::Template("response template is empty".to_string()));
    }
    Ok(template.replace(SENDER_TOKEN, party_id))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum RoutingMode {
    /// Initiate an exchange towards the receiver; placeholders are filled.
    #[default]
    Push,
    /// Answer a partner's request; the template is used verbatim.
    Response,
}

impl RoutingMode {
    /// Coarse selection from an incidental signal such as a referrer or a
    /// payload marker: push when the hint contains any marker.
    pub fn from_hint(hint: &str, push_markers: &[String]) -> Self {
        let hint = hint.to_ascii_lowercase();
        let is_push = push_markers
            .iter()
            .filter(|marker| !marker.is_empty())
            .any(|marker| hint.contains(&marker.to_ascii_lowercase()));
        if is_push {
            RoutingMode::Push
        } else {
            RoutingMode::Response
        }
    }
}

/// What the active P-Mode file held at one point; empty when it did not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PModeSnapshot(Option<Vec<u8>>);

/// Writes the active routing P-Mode for a submission.
pub struct PModeActivator {
    push_template: PathBuf,
    response_template: PathBuf,
    active_pmode: PathBuf,
    directory: Arc<dyn PartnerDirectory>,
}

impl PModeActivator {
    pub fn new(config: &RoutingConfig, directory: Arc<dyn PartnerDirectory>) -> Self {
        Self {
            push_template: config.push_template.clone(),
            response_template: config.response_template.clone(),
            active_pmode: config.active_pmode.clone(),
            directory,
        }
    }

    pub fn active_pmode(&self) -> &Path {
        &self.active_pmode
    }

    /// Renders the template for `mode` and atomically replaces the active
    /// P-Mode file. In push mode the receiver is resolved through the
    /// partner directory first.
    pub fn activate(&self, receiver: &str, mode: RoutingMode) -> Result<String> {
        let rendered = match mode {
            RoutingMode::Push => {
                let endpoint = self.directory.lookup(receiver)?;
                let template = read_template(&self.push_template)?;
                fill_template(&template, &endpoint.address, &endpoint.party_id)?
            }
            RoutingMode::Response => {
                let template = read_template(&self.response_template)?;
                if template.is_empty() {
                    return Err(Error::Template(format!(
                        "{} is empty",
                        self.response_template.display()
                    )));
                }
                template
            }
        };
        write_atomic(&self.active_pmode, rendered.as_bytes())
            .map_err(|err| Error::io(&self.active_pmode, err))?;
        info!(
            "activated {:?} pmode for receiver={} at {}",
            mode,
            receiver,
            self.active_pmode.display()
        );
        Ok(rendered)
    }
}

impl PModeActivator {
    pub fn snapshot(&self) -> Result<PModeSnapshot> {
        match fs::read(&self.active_pmode) {
            Ok(data) => Ok(PModeSnapshot(Some(data))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(PModeSnapshot(None)),
            Err(err) => Err(Error::io(&self.active_pmode, err)),
        }
    }

    /// Puts the active P-Mode back to `snapshot`.
    pub fn restore(&self, snapshot: PModeSnapshot) -> Result<()> {
        let result = match snapshot.0 {
            Some(data) => write_atomic(&self.active_pmode, &data),
            None => match fs::remove_file(&self.active_pmode) {
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        result.map_err(|err| Error::io(&self.active_pmode, err))?;
        info!("restored active pmode at {}", self.active_pmode.display());
        Ok(())
    }
}

fn read_template(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| Error::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Endpoint, StaticPartnerDirectory};
    use tempfile::tempdir;

    #[test]
    fn fills_both_tokens_everywhere() {
        let template = "<PMode><To>${dynamic_responder_party_id}</To>\
            <Address>${dynamic_address}</Address><Again>${dynamic_address}</Again></PMode>";
        let out = fill_template(template, "https://b.example/as4", "org:b").unwrap();
        assert_eq!(
            out,
            "<PMode><To>org:b</To><Address>https://b.example/as4</Address>\
             <Again>https://b.example/as4</Again></PMode>"
        );
    }

    #[test]
    fn empty_template_is_an_error() {
        assert!(matches!(fill_template("", "a", "b"), Err(Error::Template(_))));
        assert!(matches!(render_response_pmode("", "b"), Err(Error::Template(_))));
    }

    #[test]
    fn response_pmode_replaces_sender() {
        let out = render_response_pmode("<Id>resp-${sender}</Id><P>${sender}</P>", "org:a").unwrap();
        assert_eq!(out, "<Id>resp-org:a</Id><P>org:a</P>");
    }

    #[test]
    fn hint_selects_mode() {
        let markers = vec!["push".to_string(), "<Initiate".to_string()];
        assert_eq!(RoutingMode::from_hint("https://ui/PushForm", &markers), RoutingMode::Push);
        assert_eq!(RoutingMode::from_hint("<initiate/>", &markers), RoutingMode::Push);
        assert_eq!(RoutingMode::from_hint("https://ui/reply", &markers), RoutingMode::Response);
        assert_eq!(RoutingMode::from_hint("anything", &[]), RoutingMode::Response);
    }

    fn activator(dir: &Path) -> PModeActivator {
        fs::write(
            dir.join("push.xml"),
            "<PMode><Address>${dynamic_address}</Address><To>${dynamic_responder_party_id}</To></PMode>",
        )
        .unwrap();
        fs::write(dir.join("response.xml"), "<PMode>${dynamic_address}</PMode>").unwrap();
        let config = RoutingConfig {
            push_template: dir.join("push.xml"),
            response_template: dir.join("response.xml"),
            active_pmode: dir.join("active.xml"),
            push_markers: vec!["push".to_string()],
        };
        let directory = StaticPartnerDirectory::new().with_partner(
            "Beta",
            Endpoint {
                address: "https://beta.example/as4".to_string(),
                party_id: "org:beta".to_string(),
            },
        );
        PModeActivator::new(&config, Arc::new(directory))
    }

    #[test]
    fn push_activation_resolves_receiver() {
        let dir = tempdir().expect("tempdir");
        let activator = activator(dir.path());
        activator.activate("Beta", RoutingMode::Push).unwrap();
        let written = fs::read_to_string(dir.path().join("active.xml")).unwrap();
        assert_eq!(
            written,
            "<PMode><Address>https://beta.example/as4</Address><To>org:beta</To></PMode>"
        );
        assert!(!dir.path().join("active.xml.tmp").exists());
    }

    #[test]
    fn response_activation_is_verbatim() {
        let dir = tempdir().expect("tempdir");
        let activator = activator(dir.path());
        activator.activate("Unknown", RoutingMode::Response).unwrap();
        let written = fs::read_to_string(dir.path().join("active.xml")).unwrap();
        assert_eq!(written, "<PMode>${dynamic_address}</PMode>");
    }

    #[test]
    fn restore_returns_to_snapshot() {
        let dir = tempdir().expect("tempdir");
        let activator = activator(dir.path());
        let active = dir.path().join("active.xml");

        let absent = activator.snapshot().unwrap();
        activator.activate("Beta", RoutingMode::Push).unwrap();
        activator.restore(absent).unwrap();
        assert!(!active.exists());

        fs::write(&active, "<PMode>old</PMode>").unwrap();
        let before = activator.snapshot().unwrap();
        activator.activate("Beta", RoutingMode::Push).unwrap();
        activator.restore(before).unwrap();
        assert_eq!(fs::read_to_string(&active).unwrap(), "<PMode>old</PMode>");
    }

    #[test]
    fn unknown_receiver_fails_push_activation() {
        let dir = tempdir().expect("tempdir");
        let activator = activator(dir.path());
        let err = activator.activate("Gamma", RoutingMode::Push).unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("active.xml").exists());
    }
}
