//! `.torrent` document parsing.

use std::path::Path;

use chrono::DateTime;
use mooring_core::{EngineError, EngineResult, InfoHash, MetaFile, Metainfo};
use sha1::{Digest, Sha1};

/// Parse a bencoded metainfo document.
///
/// The identity is the SHA-1 of the bencoded `info` dictionary.
///
/// # Errors
///
/// Returns [`EngineError::InvalidMetainfo`] when the document is malformed or
/// lists no files.
pub fn parse_bytes(bytes: &[u8]) -> EngineResult<Metainfo> {
    parse(bytes, None)
}

/// Read and parse a metainfo document from disk.
///
/// # Errors
///
/// Returns [`EngineError::Io`] when the file cannot be read and
/// [`EngineError::InvalidMetainfo`] when it cannot be parsed.
pub async fn load_file(path: &Path) -> EngineResult<Metainfo> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| EngineError::Io {
            operation: "metainfo.read",
            path: path.to_path_buf(),
            source,
        })?;
    parse(&bytes, Some(path))
}

fn parse(bytes: &[u8], path: Option<&Path>) -> EngineResult<Metainfo> {
    let invalid = |reason: &'static str, detail: Option<String>| EngineError::InvalidMetainfo {
        path: path.map(Path::to_path_buf),
        reason,
        detail,
    };

    let document = bip_metainfo::Metainfo::from_bytes(bytes)
        .map_err(|err| invalid("undecodable document", Some(err.to_string())))?;
    let info = document.info();

    let digest = Sha1::digest(info.to_bytes());
    let info_hash = InfoHash::parse(&hex::encode(digest))
        .map_err(|err| invalid("identity digest rejected", Some(err.value)))?;

    let files: Vec<MetaFile> = info
        .files()
        .map(|file| MetaFile {
            path: file.path().to_string_lossy().into_owned(),
            size: file.length(),
        })
        .collect();
    if files.is_empty() {
        return Err(invalid("document lists no files", None));
    }

    let name = info
        .directory()
        .map(|dir| dir.to_string_lossy().into_owned())
        .or_else(|| files.first().map(|file| file.path.clone()))
        .unwrap_or_else(|| info_hash.to_string());

    Ok(Metainfo {
        info_hash,
        name,
        files,
        comment: document.comment().map(str::to_string),
        created_by: document.created_by().map(str::to_string),
        creation_date: document
            .creation_date()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}
