//! Store event envelope and object-key codec.
//!
//! Queue messages carry the JSON the object store emits when an object is
//! created: a `Records` array of entries naming the bucket and the encoded
//! object key. Some stores interpose a notification service that wraps the
//! whole event as a JSON string under a `Message` field; [`StoreEvent::parse`]
//! accepts both shapes.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

/// An object-store notification event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEvent {
    #[serde(rename = "Records")]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,

    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Form-encoded object key. Decode with [`decode_object_key`] before use.
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Notification-service wrapper: the store event serialized as a JSON
/// string under `Message`.
#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Message")]
    message: String,
}

impl StoreEvent {
    /// Parse a queue message body into an event.
    ///
    /// Tries the notification wrapper first, then the bare event. Bodies
    /// that decode as neither are malformed and will never parse on a
    /// retry.
    pub fn parse(body: &str) -> Result<Self> {
        if let Ok(wrapped) = serde_json::from_str::<Notification>(body) {
            return serde_json::from_str(&wrapped.message)
                .map_err(|e| Error::MalformedEvent(format!("undecodable wrapped event: {e}")));
        }
        serde_json::from_str(body)
            .map_err(|e| Error::MalformedEvent(format!("undecodable event body: {e}")))
    }

    /// The record to process. Events are expected to carry exactly one.
    pub fn first_record(&self) -> Result<&EventRecord> {
        self.records
            .first()
            .ok_or_else(|| Error::MalformedEvent("event has no records".into()))
    }

    /// Build an object-created event, encoding the key the way the store
    /// would.
    pub fn object_created(bucket: &str, key: &str, size: u64) -> Self {
        Self {
            records: vec![EventRecord {
                event_name: "ObjectCreated:Put".into(),
                s3: S3Entity {
                    bucket: BucketRef {
                        name: bucket.to_string(),
                    },
                    object: ObjectRef {
                        key: encode_object_key(key),
                        size: Some(size),
                    },
                },
            }],
        }
    }

    /// Serialize for enqueueing.
    pub fn to_body(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Other(format!("encode event: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Key codec
// ---------------------------------------------------------------------------

/// Characters left bare in form-encoded object keys. Everything else is
/// percent-escaped, except spaces which become `+`.
const KEY_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Form-encode an object key: percent-escape, then spaces as `+`.
pub fn encode_object_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ESCAPES)
        .to_string()
        .replace("%20", "+")
}

/// Decode a form-encoded object key: `+` back to space, then
/// percent-unescape. A literal `+` in the original key arrives as `%2B`
/// and survives the round trip.
pub fn decode_object_key(key: &str) -> Result<String> {
    let unplussed = key.replace('+', " ");
    percent_decode_str(&unplussed)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|e| Error::MalformedEvent(format!("object key is not valid UTF-8: {e}")))
}

// ---------------------------------------------------------------------------
// Suffix filter
// ---------------------------------------------------------------------------

/// Audio extensions accepted by default.
pub const DEFAULT_AUDIO_SUFFIXES: [&str; 4] = [".mp3", ".wav", ".flac", ".aac"];

/// Case-insensitive filename-suffix filter. Decides which uploads become
/// transcription jobs.
#[derive(Debug, Clone)]
pub struct SuffixFilter {
    suffixes: Vec<String>,
}

impl SuffixFilter {
    pub fn new(suffixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        let lower = key.to_ascii_lowercase();
        self.suffixes.iter().any(|s| lower.ends_with(s.as_str()))
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

impl Default for SuffixFilter {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_SUFFIXES)
    }
}
