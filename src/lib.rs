//! Submission and inbox correlation layer for a file-based AS4/ebMS gateway.
//!
//! Outbound, [`Submitter`] turns a request into the engine's on-disk package:
//! attachments, an envelope document and a metadata document. Inbound,
//! [`Inbox`] finds a message by id among the delivered documents, follows
//! cross-references between them and returns one dialect-independent view.

pub mod clock;
pub mod config;
pub mod directory;
pub mod document;
pub mod error;
pub mod inbox;
pub mod keystore;
pub mod layout;
pub mod submission;
pub mod template;
pub mod xml;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::BridgeConfig;
pub use directory::{Endpoint, JsonPartnerDirectory, Partner, PartnerDirectory, StaticPartnerDirectory};
pub use error::{Error, Result};
pub use inbox::{Inbox, InboundMessage, MessageSummary, ScanOptions, SecurityResolver};
pub use submission::{AttachmentUpload, SubmissionReceipt, SubmissionRequest, Submitter};
pub use template::{fill_template, PModeActivator, RoutingMode};
