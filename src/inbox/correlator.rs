//! Locates a message by id among the inbox's candidate documents.
//!
//! Every candidate is tried as a metadata document first. Only when none
//! matches is the directory re-tried as self-contained envelopes. When
//! several files of the winning dialect carry the same id, the most
//! recently modified one wins, ties broken by the greatest file name.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, warn};

use crate::document::{Dialect, EnvelopeDocument, MetadataDocument, PayloadPart};
use crate::error::{Error, Result};
use crate::layout::{resolve_location, validate_component, PAYLOADS_DIR};
use crate::xml::Element;

use super::assembler::{InboundAttachment, MatchedFields};
use super::ScanOptions;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    /// File the message id was found in.
    pub source: PathBuf,
    pub fields: MatchedFields,
    pub attachments: Vec<InboundAttachment>,
}

struct Candidate {
    path: PathBuf,
    modified: SystemTime,
    root: Element,
}

impl Candidate {
    fn newer_than(&self, other: &Candidate) -> bool {
        match self.modified.cmp(&other.modified) {
            Ordering::Equal => self.path.file_name() > other.path.file_name(),
            ordering => ordering == Ordering::Greater,
        }
    }
}

pub fn find_message(dir: &Path, message_id: &str, options: &ScanOptions) -> Result<Correlation> {
    let candidates = load_candidates(dir, options)?;

    let metadata = best_match(&candidates, |root| {
        MetadataDocument::from_element(root).filter(|doc| doc.message_id == message_id)
    });
    if let Some((candidate, doc)) = metadata {
        debug!("{message_id} matched metadata {}", candidate.path.display());
        return Ok(from_metadata(dir, &candidate.path, doc, options));
    }

    let envelope = best_match(&candidates, |root| {
        EnvelopeDocument::from_element(root).filter(|doc| doc.message_id == message_id)
    });
    if let Some((candidate, doc)) = envelope {
        debug!("{message_id} matched envelope {}", candidate.path.display());
        return Ok(from_envelope(dir, &candidate.path, doc, options));
    }

    Err(Error::NotFound(format!("message {message_id}")))
}

fn best_match<'a, T>(
    candidates: &'a [Candidate],
    matches: impl Fn(&Element) -> Option<T>,
) -> Option<(&'a Candidate, T)> {
    let mut best: Option<(&Candidate, T)> = None;
    for candidate in candidates {
        let Some(doc) = matches(&candidate.root) else {
            continue;
        };
        let replace = match &best {
            Some((current, _)) => {
                warn!(
                    "duplicate message id in {} and {}",
                    current.path.display(),
                    candidate.path.display()
                );
                candidate.newer_than(current)
            }
            None => true,
        };
        if replace {
            best = Some((candidate, doc));
        }
    }
    best
}

fn load_candidates(dir: &Path, options: &ScanOptions) -> Result<Vec<Candidate>> {
    let entries = fs::read_dir(dir).map_err(|err| Error::io(dir, err))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry in {}: {err}", dir.display());
                continue;
            }
        };
        let path = entry.path();
        if !options.is_candidate(&path) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match load_document(&path) {
            Ok(root) => candidates.push(Candidate {
                path,
                modified,
                root,
            }),
            Err(reason) => debug!("skipping {}: {reason}", path.display()),
        }
    }
    Ok(candidates)
}

/// Reads and parses one candidate file. Regular files only.
pub(crate) fn load_document(path: &Path) -> std::result::Result<Element, String> {
    let meta = fs::metadata(path).map_err(|err| err.to_string())?;
    if !meta.is_file() {
        return Err("not a regular file".to_string());
    }
    let text = fs::read_to_string(path).map_err(|err| err.to_string())?;
    Element::parse(&text).map_err(|err| err.to_string())
}

fn from_metadata(
    dir: &Path,
    source: &Path,
    doc: MetadataDocument,
    options: &ScanOptions,
) -> Correlation {
    let mut fields = MatchedFields::empty(Dialect::Metadata, &doc.message_id);
    fields.service = doc.service.clone();
    fields.action = doc.action.clone();

    match doc.envelope_part() {
        Some(part) => match read_envelope(dir, &part.location) {
            Ok(envelope) => merge_envelope(&mut fields, envelope),
            Err(reason) => warn!(
                "envelope {} of {} unavailable: {reason}",
                part.location, doc.message_id
            ),
        },
        None => debug!("{} has no envelope part", doc.message_id),
    }

    let attachments = doc
        .attachment_parts()
        .map(|part| InboundAttachment {
            file_name: file_name_of(&part.location),
            mime_type: if part.mime_type.is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                part.mime_type.clone()
            },
            url: options.attachment_url(&part.location),
        })
        .collect();

    Correlation {
        source: source.to_path_buf(),
        fields,
        attachments,
    }
}

fn from_envelope(
    dir: &Path,
    source: &Path,
    doc: EnvelopeDocument,
    options: &ScanOptions,
) -> Correlation {
    let mut fields = MatchedFields::empty(Dialect::Envelope, &doc.message_id);
    let parts = doc.parts.clone();
    merge_envelope(&mut fields, doc);

    let mut attachments = Vec::new();
    for part in &parts {
        let Some(name) = part.original_file_name() else {
            continue;
        };
        if let Err(err) = validate_component("filename", name) {
            warn!("ignoring part of {}: {err}", fields.message_id);
            continue;
        }
        let Some(location) = locate_part(dir, name) else {
            warn!(
                "attachment {name} of {} is missing on disk",
                fields.message_id
            );
            continue;
        };
        if is_embedded_envelope(name) {
            match read_envelope(dir, &location) {
                Ok(envelope) => {
                    fill_missing(&mut fields, envelope);
                    continue;
                }
                Err(reason) => debug!("{name} is not an envelope: {reason}"),
            }
        }
        attachments.push(InboundAttachment {
            file_name: name.to_string(),
            mime_type: part_mime_type(part),
            url: options.attachment_url(&location),
        });
    }

    Correlation {
        source: source.to_path_buf(),
        fields,
        attachments,
    }
}

fn read_envelope(dir: &Path, location: &str) -> std::result::Result<EnvelopeDocument, String> {
    let path = resolve_inbound(dir, location)?;
    let text = fs::read_to_string(&path).map_err(|err| format!("{}: {err}", path.display()))?;
    EnvelopeDocument::parse(&text).map_err(|err| err.to_string())
}

/// Part locations are relative to the inbox; absolute ones are accepted
/// only when they point inside it.
fn resolve_inbound(dir: &Path, location: &str) -> std::result::Result<PathBuf, String> {
    let as_path = Path::new(location);
    let relative = if as_path.is_absolute() {
        as_path
            .strip_prefix(dir)
            .map_err(|_| format!("{location} is outside {}", dir.display()))?
            .to_string_lossy()
            .into_owned()
    } else {
        location.to_string()
    };
    resolve_location(dir, &relative).map_err(|err| err.to_string())
}

/// Relative location of an attachment named by part properties: directly in
/// the inbox, or under its payload directory.
fn locate_part(dir: &Path, name: &str) -> Option<String> {
    [name.to_string(), format!("{PAYLOADS_DIR}/{name}")]
        .into_iter()
        .find(|location| dir.join(location).is_file())
}

fn is_embedded_envelope(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xml") && lower.contains("soap")
}

fn part_mime_type(part: &PayloadPart) -> String {
    part.properties
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case("MimeType"))
        .map(|p| p.value.clone())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

fn merge_envelope(fields: &mut MatchedFields, envelope: EnvelopeDocument) {
    fields.content = envelope.content;
    fields.sender = envelope.sender;
    fields.receiver = envelope.receiver;
    fields.date = envelope.timestamp;
    fields.subject = envelope.subject;
    if !envelope.service.is_empty() {
        fields.service = envelope.service;
    }
    if !envelope.action.is_empty() {
        fields.action = envelope.action;
    }
}

fn fill_missing(fields: &mut MatchedFields, envelope: EnvelopeDocument) {
    let pairs = [
        (&mut fields.content, envelope.content),
        (&mut fields.sender, envelope.sender),
        (&mut fields.receiver, envelope.receiver),
        (&mut fields.date, envelope.timestamp),
        (&mut fields.subject, envelope.subject),
        (&mut fields.service, envelope.service),
        (&mut fields.action, envelope.action),
    ];
    for (slot, value) in pairs {
        if slot.is_empty() {
            *slot = value;
        }
    }
}

fn file_name_of(location: &str) -> String {
    location
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(location)
        .to_string()
}
