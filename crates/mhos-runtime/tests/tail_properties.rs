//! Tailer properties over a file that grows in arbitrary chunks.

use std::io::Write;
use std::path::Path;

use mhos_core::{AuditLevel, AuditRecord};
use mhos_runtime::{LogCursor, StartAt};

fn append(path: &Path, bytes: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(bytes).unwrap();
}

/// Deterministic chunk sizes between 1 and 39 bytes.
fn chunk_sizes(seed: u64) -> impl Iterator<Item = usize> {
    let mut state = seed;
    std::iter::repeat_with(move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        usize::try_from(state >> 59).unwrap() + 1 + usize::try_from((state >> 40) & 0x7).unwrap()
    })
}

#[tokio::test]
async fn chunked_growth_delivers_every_line_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("2026-04-01.ndjson");

    let expected: Vec<String> = (0..200)
        .map(|i| format!("{{\"seq\":{i},\"text\":\"line number {i}\"}}"))
        .collect();
    let content: Vec<u8> = expected
        .iter()
        .flat_map(|line| line.bytes().chain(std::iter::once(b'\n')))
        .collect();

    for seed in [1_u64, 7, 42] {
        let path = path.with_extension(format!("{seed}.ndjson"));
        let mut cursor = LogCursor::new(&path);
        let mut delivered = Vec::new();

        let mut written = 0;
        let mut sizes = chunk_sizes(seed);
        while written < content.len() {
            let size = sizes.next().unwrap().min(content.len() - written);
            append(&path, &content[written..written + size]);
            written += size;
            delivered.extend(cursor.poll().await.unwrap());
        }
        delivered.extend(cursor.poll().await.unwrap());

        assert_eq!(delivered, expected, "seed {seed}");
        assert_eq!(cursor.offset(), content.len() as u64);
        assert_eq!(cursor.pending_bytes(), 0);
    }
}

#[tokio::test]
async fn truncate_then_append_reads_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.ndjson");
    append(&path, b"one\ntwo\nthree\n");

    let mut cursor = LogCursor::open(&path, StartAt::Beginning).await.unwrap();
    assert_eq!(cursor.poll().await.unwrap().len(), 3);

    std::fs::write(&path, b"").unwrap();
    append(&path, b"fresh\n");

    assert_eq!(cursor.poll().await.unwrap(), ["fresh"]);
    assert_eq!(cursor.stats().resets, 1);
}

#[tokio::test]
async fn audit_records_survive_split_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.ndjson");

    let record = AuditRecord::new(AuditLevel::Info, "llm", "model_call")
        .with_details(serde_json::json!({ "role": "persona", "latencyMs": 120 }));
    let line = format!("{}\n", serde_json::to_string(&record).unwrap());
    let (head, tail) = line.as_bytes().split_at(line.len() / 2);

    let mut cursor = LogCursor::new(&path);
    append(&path, head);
    assert!(cursor.poll_records::<AuditRecord>().await.unwrap().is_empty());

    append(&path, tail);
    let records: Vec<AuditRecord> = cursor.poll_records().await.unwrap();
    assert_eq!(records, [record]);
    assert_eq!(cursor.stats().malformed, 0);
}
