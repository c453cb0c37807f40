//! Commitment payloads and cluster identifiers.
//!
//! A commitment carries a list of typed data fields. The cluster peer id is
//! published as the first field, as raw UTF-8 bytes. Peer ids are libp2p
//! identifiers, either base58btc (`12D3KooW…`, `Qm…`) or the CIDv1 form in
//! lowercase multibase base32 (`bafz…`). Anything else is rejected before it
//! can reach the cluster configuration.
//!
//! Field decoding never fails: a field the gateway sends in an unexpected
//! shape becomes [`CommitmentField::Unreadable`] and surfaces as a
//! [`ParseError`] only when the cluster id is read from it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Longest accepted peer id, matching the chain's raw field limit.
pub const MAX_CLUSTER_ID_LEN: usize = 128;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BASE32_LOWER_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz234567";

/// Commitment payload as stored on chain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitmentInfo {
    #[serde(default)]
    pub fields: Vec<CommitmentField>,
}

impl CommitmentInfo {
    /// Single raw field holding `text`.
    pub fn raw(text: &str) -> Self {
        Self {
            fields: vec![CommitmentField::Raw(text.as_bytes().to_vec())],
        }
    }
}

/// One typed commitment field.
///
/// On the wire a field is either `"none"` or a single-key object mapping the
/// field kind to `0x`-prefixed hex data, e.g. `{ "raw": "0x516d31" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum CommitmentField {
    Empty,
    Raw(Vec<u8>),
    BlakeTwo256(Vec<u8>),
    Sha256(Vec<u8>),
    Keccak256(Vec<u8>),
    ShaThree256(Vec<u8>),
    /// A field that could not be decoded.
    Unreadable { kind: String, reason: String },
}

impl CommitmentField {
    fn kind(&self) -> &str {
        match self {
            Self::Empty => "none",
            Self::Raw(_) => "raw",
            Self::BlakeTwo256(_) => "blake_two256",
            Self::Sha256(_) => "sha256",
            Self::Keccak256(_) => "keccak256",
            Self::ShaThree256(_) => "sha_three256",
            Self::Unreadable { kind, .. } => kind,
        }
    }

    fn unreadable(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreadable {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

impl From<Value> for CommitmentField {
    fn from(value: Value) -> Self {
        let (kind, data) = match value {
            Value::String(kind) if kind == "none" => return Self::Empty,
            Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
                Some(entry) => entry,
                None => return Self::unreadable("unknown", "empty field object"),
            },
            other => return Self::unreadable("unknown", format!("unexpected field {other}")),
        };

        let variant: fn(Vec<u8>) -> Self = match kind.as_str() {
            "raw" => Self::Raw,
            "blake_two256" => Self::BlakeTwo256,
            "sha256" => Self::Sha256,
            "keccak256" => Self::Keccak256,
            "sha_three256" => Self::ShaThree256,
            _ => return Self::unreadable(kind, "unknown field kind"),
        };
        let Some(text) = data.as_str() else {
            return Self::unreadable(kind, "field data is not a string");
        };
        match hex::decode(text.strip_prefix("0x").unwrap_or(text)) {
            Ok(bytes) => variant(bytes),
            Err(e) => Self::unreadable(kind, e.to_string()),
        }
    }
}

impl From<CommitmentField> for Value {
    fn from(field: CommitmentField) -> Self {
        let kind = field.kind().to_string();
        let data = match field {
            CommitmentField::Empty => return Value::String(kind),
            CommitmentField::Raw(bytes)
            | CommitmentField::BlakeTwo256(bytes)
            | CommitmentField::Sha256(bytes)
            | CommitmentField::Keccak256(bytes)
            | CommitmentField::ShaThree256(bytes) => {
                Value::String(format!("0x{}", hex::encode(bytes)))
            }
            CommitmentField::Unreadable { .. } => Value::Null,
        };
        let mut object = Map::new();
        object.insert(kind, data);
        Value::Object(object)
    }
}

/// Commitment payload parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("commitment has no fields")]
    NoFields,

    #[error("expected a raw field, found {0}")]
    UnsupportedField(String),

    #[error("unreadable {kind} field: {reason}")]
    UnreadableField { kind: String, reason: String },

    #[error("raw field is not valid UTF-8")]
    InvalidUtf8,

    #[error("cluster id is empty")]
    EmptyIdentifier,

    #[error("cluster id is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("cluster id has invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },
}

/// Validated storage-cluster peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterId(String);

impl ClusterId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if trimmed.is_empty() {
            return Err(ParseError::EmptyIdentifier);
        }
        let len = trimmed.chars().count();
        if len > MAX_CLUSTER_ID_LEN {
            return Err(ParseError::TooLong {
                len,
                max: MAX_CLUSTER_ID_LEN,
            });
        }
        if is_base32_cid(trimmed) {
            return Ok(Self(trimmed.to_string()));
        }
        if let Some((position, ch)) = trimmed
            .chars()
            .enumerate()
            .find(|(_, c)| !BASE58_ALPHABET.contains(*c))
        {
            return Err(ParseError::InvalidCharacter { ch, position });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Multibase `b` prefix followed by lowercase base32.
fn is_base32_cid(input: &str) -> bool {
    match input.strip_prefix('b') {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| BASE32_LOWER_ALPHABET.contains(c)),
        None => false,
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClusterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClusterId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClusterId> for String {
    fn from(value: ClusterId) -> Self {
        value.0
    }
}

/// Extract the cluster id from a commitment payload.
pub fn parse_cluster_id(info: &CommitmentInfo) -> Result<ClusterId, ParseError> {
    let field = info.fields.first().ok_or(ParseError::NoFields)?;
    let bytes = match field {
        CommitmentField::Raw(bytes) => bytes,
        CommitmentField::Unreadable { kind, reason } => {
            return Err(ParseError::UnreadableField {
                kind: kind.clone(),
                reason: reason.clone(),
            })
        }
        other => return Err(ParseError::UnsupportedField(other.kind().to_string())),
    };
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
    ClusterId::parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_peer_id() {
        let info = CommitmentInfo::raw("12D3KooWQYhTNQdmr3ArTeUHRYzFg94BKyTkoWBDWez9kSCVe2Xo");
        let id = parse_cluster_id(&info).unwrap();
        assert_eq!(
            id.as_str(),
            "12D3KooWQYhTNQdmr3ArTeUHRYzFg94BKyTkoWBDWez9kSCVe2Xo"
        );
    }

    #[test]
    fn test_parse_trims_padding() {
        let info = CommitmentInfo {
            fields: vec![CommitmentField::Raw(b" Qm1\0\0".to_vec())],
        };
        assert_eq!(parse_cluster_id(&info).unwrap().as_str(), "Qm1");
    }

    #[test]
    fn test_parse_rejects_empty_commitment() {
        assert_eq!(
            parse_cluster_id(&CommitmentInfo::default()),
            Err(ParseError::NoFields)
        );
        assert_eq!(
            parse_cluster_id(&CommitmentInfo::raw("   ")),
            Err(ParseError::EmptyIdentifier)
        );
    }

    #[test]
    fn test_parse_rejects_hashed_field() {
        let info = CommitmentInfo {
            fields: vec![CommitmentField::Sha256(vec![0u8; 32])],
        };
        assert_eq!(
            parse_cluster_id(&info),
            Err(ParseError::UnsupportedField("sha256".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_invalid_utf8() {
        let info = CommitmentInfo {
            fields: vec![CommitmentField::Raw(vec![0xff, 0xfe])],
        };
        assert_eq!(parse_cluster_id(&info), Err(ParseError::InvalidUtf8));
    }

    #[test]
    fn test_parse_rejects_non_base58() {
        // '0', 'O', 'I' and 'l' are excluded from base58btc
        assert_eq!(
            ClusterId::parse("Qm0abc"),
            Err(ParseError::InvalidCharacter {
                ch: '0',
                position: 2
            })
        );
        assert!(ClusterId::parse("peer id").is_err());
        assert!(ClusterId::parse("{\"id\":1}").is_err());
    }

    #[test]
    fn test_parse_rejects_overlong_id() {
        let long = "a".repeat(MAX_CLUSTER_ID_LEN + 1);
        assert_eq!(
            ClusterId::parse(&long),
            Err(ParseError::TooLong {
                len: MAX_CLUSTER_ID_LEN + 1,
                max: MAX_CLUSTER_ID_LEN
            })
        );
    }

    #[test]
    fn test_commitment_info_json_shape() {
        let info: CommitmentInfo =
            serde_json::from_str(r#"{ "fields": [ { "raw": "0x516d31" }, "none" ] }"#).unwrap();
        assert_eq!(info.fields[0], CommitmentField::Raw(b"Qm1".to_vec()));
        assert_eq!(info.fields[1], CommitmentField::Empty);
        assert_eq!(parse_cluster_id(&info).unwrap().as_str(), "Qm1");
    }

    #[test]
    fn test_malformed_fields_decode_as_unreadable() {
        let info: CommitmentInfo = serde_json::from_str(
            r#"{ "fields": [ { "raw": "0x5" }, { "raw64": "0x00" }, 7 ] }"#,
        )
        .unwrap();

        assert!(matches!(
            &info.fields[0],
            CommitmentField::Unreadable { kind, .. } if kind == "raw"
        ));
        assert!(matches!(
            &info.fields[1],
            CommitmentField::Unreadable { kind, .. } if kind == "raw64"
        ));
        assert!(matches!(&info.fields[2], CommitmentField::Unreadable { .. }));
        assert!(matches!(
            parse_cluster_id(&info),
            Err(ParseError::UnreadableField { .. })
        ));
    }

    #[test]
    fn test_commitment_field_json_round_trip() {
        let info = CommitmentInfo {
            fields: vec![
                CommitmentField::Raw(b"Qm1".to_vec()),
                CommitmentField::Empty,
                CommitmentField::Sha256(vec![0xab; 2]),
            ],
        };
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(
            json,
            r#"{"fields":[{"raw":"0x516d31"},"none",{"sha256":"0xabab"}]}"#
        );
        let back: CommitmentInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_accepts_base32_cid_peer_id() {
        let cid = "bafzbeiaxl2cbe7yjhmzrmqzjlgkomm7gqu2hagwuqoe3mh4qvwenlt4ubm";
        assert_eq!(ClusterId::parse(cid).unwrap().as_str(), cid);
        // Uppercase and base58-only digits are not base32.
        assert!(ClusterId::parse("bafzBEIA0l").is_err());
    }
}
