//! Domain fixtures shared by store and application suites.

use chrono::Utc;
use mooring_core::{FilePriority, InfoHash, MetaFile, Metainfo, Task, TaskFile, TaskStatus};
use uuid::Uuid;

/// Identity made of `ch` repeated 40 times.
///
/// # Panics
///
/// Panics when `ch` is not a hex digit.
#[must_use]
pub fn info_hash(ch: char) -> InfoHash {
    match InfoHash::parse(&ch.to_string().repeat(40)) {
        Ok(hash) => hash,
        Err(err) => panic!("fixture identity must be hex: {err}"),
    }
}

/// Metainfo for a multi-file task named `name`.
#[must_use]
pub fn metainfo(ch: char, name: &str, files: &[(&str, u64)]) -> Metainfo {
    Metainfo {
        info_hash: info_hash(ch),
        name: name.to_string(),
        files: files
            .iter()
            .map(|(path, size)| MetaFile {
                path: (*path).to_string(),
                size: *size,
            })
            .collect(),
        comment: Some("fixture".to_string()),
        created_by: Some("mooring-test-support".to_string()),
        creation_date: None,
    }
}

/// Persisted task in `status` with no transfer history.
#[must_use]
pub fn task(ch: char, name: &str, status: TaskStatus) -> Task {
    Task {
        id: Uuid::new_v4(),
        info_hash: info_hash(ch),
        name: name.to_string(),
        origin: format!("magnet:?xt=urn:btih:{}", info_hash(ch)),
        total_size: None,
        downloaded_bytes: 0,
        uploaded_bytes: 0,
        status,
        progress: 0.0,
        download_rate: 0,
        upload_rate: 0,
        peers: 0,
        seeds: 0,
        save_path: "/downloads".to_string(),
        added_at: Utc::now(),
        completed_at: None,
        error_message: None,
        comment: None,
        created_by: None,
        creation_date: None,
    }
}

/// Files at normal priority owned by `task_id`.
#[must_use]
pub fn task_files(task_id: Uuid, files: &[(&str, u64)]) -> Vec<TaskFile> {
    files
        .iter()
        .map(|(path, size)| TaskFile {
            id: Uuid::new_v4(),
            task_id,
            path: (*path).to_string(),
            size: *size,
            downloaded_bytes: 0,
            progress: 0.0,
            priority: FilePriority::NORMAL,
        })
        .collect()
}

/// Bencoded multi-file metainfo document with one dummy piece.
#[must_use]
pub fn torrent_document(name: &str, files: &[(&str, u64)]) -> Vec<u8> {
    let mut doc = b"d4:infod5:filesl".to_vec();
    for (path, size) in files {
        doc.extend_from_slice(format!("d6:lengthi{size}e4:pathl").as_bytes());
        for segment in path.split('/') {
            push_bytes(&mut doc, segment.as_bytes());
        }
        doc.extend_from_slice(b"ee");
    }
    doc.extend_from_slice(b"e4:name");
    push_bytes(&mut doc, name.as_bytes());
    doc.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
    doc.extend_from_slice(&[9_u8; 20]);
    doc.extend_from_slice(b"ee");
    doc
}

fn push_bytes(doc: &mut Vec<u8>, bytes: &[u8]) {
    doc.extend_from_slice(format!("{}:", bytes.len()).as_bytes());
    doc.extend_from_slice(bytes);
}
