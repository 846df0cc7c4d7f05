use std::fs;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::tempdir;

use as4_bridge::{Inbox, ScanOptions};

fn envelope(id: &str) -> String {
    format!(
        r#"<SOAP:Envelope xmlns:SOAP="http://www.w3.org/2003/05/soap-envelope" xmlns:eb="urn:eb">
  <SOAP:Header><eb:Messaging><eb:UserMessage>
    <eb:MessageInfo><eb:MessageId>{id}</eb:MessageId><eb:Timestamp>2026-01-24T08:30:00Z</eb:Timestamp></eb:MessageInfo>
    <eb:PartyInfo><eb:From><eb:PartyId>org:a</eb:PartyId></eb:From><eb:To><eb:PartyId>org:b</eb:PartyId></eb:To></eb:PartyInfo>
    <eb:CollaborationInfo><eb:Service>s</eb:Service><eb:Action>a</eb:Action></eb:CollaborationInfo>
  </eb:UserMessage></eb:Messaging></SOAP:Header>
  <SOAP:Body><MessageContent><Order><Line n="1"/><Line n="2"/></Order></MessageContent></SOAP:Body>
</SOAP:Envelope>"#
    )
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("inbox_scan");
    for &files in &[100_usize, 1_000] {
        let dir = tempdir().expect("tempdir");
        for i in 0..files {
            fs::write(dir.path().join(format!("m{i}.xml")), envelope(&format!("M-{i}")))
                .expect("write");
        }
        let inbox = Inbox::at(dir.path(), ScanOptions::default());
        let last = format!("M-{}", files - 1);

        group.bench_with_input(BenchmarkId::new("find_message", files), &files, |b, _| {
            b.iter(|| inbox.find_message(black_box(&last)).expect("find"));
        });
        group.bench_with_input(BenchmarkId::new("list_messages", files), &files, |b, _| {
            b.iter(|| inbox.list_messages().expect("list").count());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
