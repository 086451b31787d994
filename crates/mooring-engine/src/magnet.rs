//! Magnet URI parsing.

use data_encoding::BASE32;
use mooring_core::{EngineError, EngineResult, InfoHash};
use url::Url;

const BTIH_PREFIX: &str = "urn:btih:";
const BASE32_LEN: usize = 32;

/// Parsed `magnet:` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// Identity taken from the `xt=urn:btih:` parameter.
    pub info_hash: InfoHash,
    /// Optional `dn` display name.
    pub display_name: Option<String>,
    /// `tr` tracker URLs in order of appearance.
    pub trackers: Vec<String>,
}

impl MagnetLink {
    /// Parse a magnet URI.
    ///
    /// The `btih` identity may be 40 hex digits or 32 base32 characters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMagnet`] for anything that is not a
    /// magnet link carrying a usable identity.
    pub fn parse(uri: &str) -> EngineResult<Self> {
        let invalid = |reason: &'static str| EngineError::InvalidMagnet {
            uri: uri.to_string(),
            reason,
        };

        let url = Url::parse(uri.trim()).map_err(|_| invalid("not a uri"))?;
        if url.scheme() != "magnet" {
            return Err(invalid("scheme is not magnet"));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    if info_hash.is_some() {
                        continue;
                    }
                    let Some(raw) = strip_prefix_ignore_case(&value, BTIH_PREFIX) else {
                        continue;
                    };
                    let parsed = decode_btih(raw)
                        .ok_or_else(|| invalid("info hash is neither hex nor base32"))?;
                    info_hash = Some(parsed);
                }
                "dn" if !value.trim().is_empty() => display_name = Some(value.into_owned()),
                "tr" if !value.trim().is_empty() => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            info_hash: info_hash.ok_or_else(|| invalid("missing urn:btih identity"))?,
            display_name,
            trackers,
        })
    }
}

fn decode_btih(raw: &str) -> Option<InfoHash> {
    if raw.len() != BASE32_LEN {
        return InfoHash::parse(raw).ok();
    }
    let digest = BASE32.decode(raw.to_ascii_uppercase().as_bytes()).ok()?;
    InfoHash::parse(&hex::encode(digest)).ok()
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}
