use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use sha2::{Digest, Sha256};
use std::io::{self, Write};

use crate::error::Result;
use crate::models::{GradingContext, GradingRequest};

// Stored scorer response, append-only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResult {
    pub cache_key: String,
    pub raw_response: String,
    pub created_at: DateTime<Utc>,
}

impl CachedResult {
    pub fn new(cache_key: impl Into<String>, raw_response: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            raw_response: raw_response.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persistence the gateway needs: newest row per key, and append.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn find_latest(&self, cache_key: &str) -> Result<Option<CachedResult>>;
    async fn insert(&self, entry: CachedResult) -> Result<()>;
}

// In-process store, rows kept per key in insertion order
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<CachedResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.entries.iter().map(|rows| rows.len()).sum()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn find_latest(&self, cache_key: &str) -> Result<Option<CachedResult>> {
        // max_by_key keeps the last of equal timestamps, so later inserts win
        Ok(self.entries.get(cache_key).and_then(|rows| {
            rows.iter().max_by_key(|row| row.created_at).cloned()
        }))
    }

    async fn insert(&self, entry: CachedResult) -> Result<()> {
        self.entries
            .entry(entry.cache_key.clone())
            .or_default()
            .push(entry);
        Ok(())
    }
}

// One field of the request, as hashed
enum KeyValue<'a> {
    Text(&'a str),
    Context(&'a GradingContext),
}

impl Serialize for KeyValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeyValue::Text(text) => serializer.serialize_str(text),
            KeyValue::Context(context) => context.serialize(serializer),
        }
    }
}

// Single-entry `{key: value}` object
struct Wrapped<'a>(&'static str, &'a KeyValue<'a>);

impl Serialize for Wrapped<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0, self.1)?;
        map.end()
    }
}

/// Compact JSON that also escapes `/` and every non-ASCII char as `\uXXXX`,
/// so keys match rows written by the previous grading service.
struct LegacyJsonFormatter;

impl Formatter for LegacyJsonFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch != '/' && ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            if ch == '/' {
                writer.write_all(b"\\/")?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// The exact bytes the cache key is computed over:
/// `[{"audio_base64":..},{"audio_format":..},{"context":{..}},{"expected_text":..}]`
pub fn canonical_payload(req: &GradingRequest) -> Result<Vec<u8>> {
    let mut fields: Vec<(&'static str, KeyValue<'_>)> = vec![
        ("audio_format", KeyValue::Text(&req.audio_format)),
        ("audio_base64", KeyValue::Text(&req.audio_base64)),
    ];
    if let Some(text) = &req.expected_text {
        fields.push(("expected_text", KeyValue::Text(text)));
    }
    if let Some(context) = &req.context {
        fields.push(("context", KeyValue::Context(context)));
    }
    fields.sort_by_key(|(name, _)| *name);

    let wrapped: Vec<Wrapped<'_>> = fields
        .iter()
        .map(|(name, value)| Wrapped(*name, value))
        .collect();

    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, LegacyJsonFormatter);
    wrapped.serialize(&mut ser)?;
    Ok(out)
}

// Create a cache key (sha256 of the canonical payload)
pub fn make_cache_key(req: &GradingRequest) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(canonical_payload(req)?);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hello_world() -> GradingRequest {
        GradingRequest::scripted("hello world", "QUJD")
    }

    #[test]
    fn payload_is_sorted_and_wrapped_per_field() {
        let payload = canonical_payload(&hello_world()).unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            r#"[{"audio_base64":"QUJD"},{"audio_format":"wav"},{"expected_text":"hello world"}]"#
        );
    }

    #[test]
    fn known_key_for_hello_world() {
        assert_eq!(
            make_cache_key(&hello_world()).unwrap(),
            "4de436dca1ae3511206f848b697f0b5657f000d11bb40c23b7688d3562bfa06e"
        );
    }

    #[test]
    fn slashes_and_non_ascii_are_escaped() {
        let context = GradingContext::new(Some("Caf\u{e9}?"), None, Some("x"));
        let req = GradingRequest::unscripted(context, "a/b+");
        let payload = String::from_utf8(canonical_payload(&req).unwrap()).unwrap();
        assert_eq!(
            payload,
            r#"[{"audio_base64":"a\/b+"},{"audio_format":"wav"},{"context":{"question":"Caf\u00e9?","valid_answer_description":"x"}}]"#
        );
        assert_eq!(
            make_cache_key(&req).unwrap(),
            "85324b6fde6932e4f17d6f96531bea2bbab385b152675f5dfefd94df00cd309a"
        );
    }

    #[test]
    fn astral_chars_escape_as_surrogate_pairs() {
        let req = GradingRequest::scripted("\u{1F600}", "QUJD");
        let payload = String::from_utf8(canonical_payload(&req).unwrap()).unwrap();
        assert!(payload.contains(r#""expected_text":"\ud83d\ude00""#));
    }

    #[test]
    fn key_depends_on_content_only() {
        let a = hello_world();
        let b = GradingRequest {
            context: None,
            audio_base64: "QUJD".to_string(),
            expected_text: Some("hello world".to_string()),
            audio_format: "wav".to_string(),
        };
        assert_eq!(make_cache_key(&a).unwrap(), make_cache_key(&b).unwrap());
        assert_eq!(make_cache_key(&a).unwrap().len(), 64);
    }

    #[test]
    fn any_field_change_changes_the_key() {
        let base = make_cache_key(&hello_world()).unwrap();
        let other_audio = GradingRequest::scripted("hello world", "QUJE");
        let other_text = GradingRequest::scripted("hello there", "QUJD");
        assert_ne!(base, make_cache_key(&other_audio).unwrap());
        assert_ne!(base, make_cache_key(&other_text).unwrap());

        let ctx_a = GradingContext::new(Some("q"), Some("d"), None);
        let ctx_b = GradingContext::new(Some("q"), Some("d2"), None);
        assert_ne!(
            make_cache_key(&GradingRequest::unscripted(ctx_a.clone(), "QUJD")).unwrap(),
            make_cache_key(&GradingRequest::unscripted(ctx_b, "QUJD")).unwrap()
        );
        assert_ne!(
            make_cache_key(&GradingRequest::unscripted(ctx_a, "QUJD")).unwrap(),
            make_cache_key(&GradingRequest::unscripted(None, "QUJD")).unwrap()
        );
    }

    #[tokio::test]
    async fn memory_store_returns_newest_row() {
        let store = MemoryStore::new();
        assert!(store.find_latest("k").await.unwrap().is_none());

        let now = Utc::now();
        let older = CachedResult {
            cache_key: "k".into(),
            raw_response: r#"{"overall_score":1}"#.into(),
            created_at: now - Duration::seconds(10),
        };
        let newer = CachedResult {
            cache_key: "k".into(),
            raw_response: r#"{"overall_score":2}"#.into(),
            created_at: now,
        };
        store.insert(newer.clone()).await.unwrap();
        store.insert(older).await.unwrap();

        assert_eq!(store.find_latest("k").await.unwrap(), Some(newer));
        assert_eq!(store.row_count(), 2);
    }

    #[tokio::test]
    async fn memory_store_later_insert_wins_on_equal_timestamps() {
        let store = MemoryStore::new();
        let at = Utc::now();
        for body in ["first", "second"] {
            store
                .insert(CachedResult {
                    cache_key: "k".into(),
                    raw_response: body.into(),
                    created_at: at,
                })
                .await
                .unwrap();
        }
        let latest = store.find_latest("k").await.unwrap().unwrap();
        assert_eq!(latest.raw_response, "second");
    }
}
