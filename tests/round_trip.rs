use std::fs;
use std::sync::Arc;

use as4_bridge::document::MetadataDocument;
use as4_bridge::{
    AttachmentUpload, BridgeConfig, FixedClock, Inbox, RoutingMode, SubmissionRequest, Submitter,
};
use tempfile::tempdir;
use time::OffsetDateTime;

fn config(root: &std::path::Path) -> BridgeConfig {
    BridgeConfig {
        outbox_dir: root.to_path_buf(),
        inbox_dir: root.to_path_buf(),
        ..BridgeConfig::default()
    }
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        OffsetDateTime::from_unix_timestamp(1_769_243_400).expect("timestamp"),
    ))
}

#[test]
fn submitted_message_reads_back_by_id() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let submitter = Submitter::new(&config, clock());

    let payload = "<Invoice xmlns=\"urn:inv\"><Line qty=\"2\">Widget &amp; bolt</Line></Invoice>";
    let receipt = submitter
        .submit(SubmissionRequest {
            sender: "org:alpha".into(),
            receiver: "org:beta".into(),
            service: "Invoicing".into(),
            action: "Submit".into(),
            payload: payload.into(),
            subject: Some("March invoice".into()),
            routing: RoutingMode::Push,
            attachments: vec![AttachmentUpload {
                file_name: "invoice.pdf".into(),
                content_type: "application/pdf".into(),
                data: b"%PDF-1.7".to_vec(),
            }],
            ..SubmissionRequest::default()
        })
        .expect("submit");

    let message = Inbox::new(&config)
        .find_message(&receipt.message_id)
        .expect("find");
    assert_eq!(message.id, receipt.message_id);
    assert_eq!(message.sender, "org:alpha");
    assert_eq!(message.receiver, "org:beta");
    assert_eq!(message.service, "Invoicing");
    assert_eq!(message.action, "Submit");
    assert_eq!(message.subject, "March invoice");
    assert_eq!(message.content, payload);
    assert_eq!(message.date, "2026-01-24T08:30:00Z");
    assert_eq!(message.attachments.len(), 1);
    assert_eq!(message.attachments[0].file_name, "invoice.pdf");
    assert_eq!(message.attachments[0].url, "/attachments/payloads/invoice.pdf");

    let download = Inbox::new(&config)
        .open_attachment("payloads/invoice.pdf")
        .expect("download");
    assert_eq!(download.len, 8);
}

#[test]
fn payload_only_submission_references_its_envelope_first() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let receipt = Submitter::new(&config, clock())
        .submit(SubmissionRequest {
            sender: "org:alpha".into(),
            receiver: "org:beta".into(),
            service: "Orders".into(),
            action: "Place".into(),
            message_id: Some("M-42".into()),
            payload: "plain text & more".into(),
            ..SubmissionRequest::default()
        })
        .expect("submit");
    assert_eq!(receipt.message_id, "M-42");

    let mmd = fs::read_to_string(dir.path().join("M-42.mmd")).expect("metadata");
    let doc = MetadataDocument::parse(&mmd).expect("parse metadata");
    let envelope = doc.envelope_part().expect("envelope part");
    assert_eq!(doc.parts[0], *envelope);
    assert_eq!(envelope.location, "payloads/M-42_payload.xml");

    let message = Inbox::new(&config).find_message("M-42").expect("find");
    assert_eq!(message.content, "plain text & more");
    assert!(message.attachments.is_empty());
}

#[test]
fn unusual_payloads_read_back_as_submitted() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let submitter = Submitter::new(&config, clock());
    let inbox = Inbox::new(&config);

    let payloads = [
        "<Doc href=\"a&b\">x</Doc>",
        "<Doc flag>x</Doc>",
        "<![CDATA[<raw> & stuff]]>",
        "<!-- note -->",
    ];
    for (i, payload) in payloads.iter().enumerate() {
        let id = format!("M-{i}");
        submitter
            .submit(SubmissionRequest {
                sender: "org:alpha".into(),
                receiver: "org:beta".into(),
                service: "Orders".into(),
                action: "Place".into(),
                message_id: Some(id.clone()),
                payload: payload.to_string(),
                ..SubmissionRequest::default()
            })
            .expect("submit");

        let message = inbox.find_message(&id).expect("find");
        assert_eq!(message.sender, "org:alpha", "payload {payload}");
        assert_eq!(message.receiver, "org:beta", "payload {payload}");
        assert_eq!(message.content, *payload);
    }
}
