//! Codec selection cache: memoized media-type token to codec instance.
//!
//! Two independent instances exist per dispatcher, one strict and one
//! lenient, so the same media type can yield two distinct codec
//! configurations without cross-contamination.

use std::sync::Arc;

use dashmap::DashMap;
use restgate_core::codec::{codec_for, Codec, CodecError, Strictness};

/// Factory constructing the codec for an unseen media-type token.
pub type CodecFactory = Box<dyn Fn(&str) -> Result<Arc<dyn Codec>, CodecError> + Send + Sync>;

/// Thread-safe memoized `media-type token -> codec` mapping.
///
/// Concurrent first requests for the same unseen token may both run the
/// factory, but exactly one constructed codec wins the insert and every
/// caller converges on it; the losing construction is discarded. A factory
/// failure propagates to the caller and is never cached, so a later
/// request for the same token retries construction.
pub struct CodecCache {
    name: String,
    strictness: Strictness,
    entries: DashMap<String, Arc<dyn Codec>>,
    factory: CodecFactory,
}

impl CodecCache {
    /// Creates a cache with a caller-supplied construction factory.
    #[must_use]
    pub fn new(name: impl Into<String>, strictness: Strictness, factory: CodecFactory) -> Self {
        Self {
            name: name.into(),
            strictness,
            entries: DashMap::new(),
            factory,
        }
    }

    /// Creates a cache backed by the built-in media-type codecs, all
    /// constructed in this cache's strictness mode.
    #[must_use]
    pub fn with_default_codecs(name: impl Into<String>, strictness: Strictness) -> Self {
        Self::new(name, strictness, Box::new(move |token| codec_for(token, strictness)))
    }

    /// Returns the codec for a media-type token, constructing and caching
    /// it on first access.
    ///
    /// # Errors
    ///
    /// Propagates the factory's [`CodecError`] for unsupported tokens.
    pub fn get(&self, token: &str) -> Result<Arc<dyn Codec>, CodecError> {
        if let Some(hit) = self.entries.get(token) {
            return Ok(Arc::clone(hit.value()));
        }
        let built = (self.factory)(token)?;
        let entry = self.entries.entry(token.to_string()).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Number of distinct tokens cached so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;

    #[test]
    fn caches_one_entry_per_token() {
        let cache = CodecCache::with_default_codecs("lenient", Strictness::Lenient);
        let first = cache.get("application/json").unwrap();
        let again = cache.get("application/json").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.len(), 1);

        cache.get("text/yaml").unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn strict_and_lenient_caches_are_independent() {
        let strict = CodecCache::with_default_codecs("strict", Strictness::Strict);
        let lenient = CodecCache::with_default_codecs("lenient", Strictness::Lenient);

        let s = strict.get("application/json").unwrap();
        let l = lenient.get("application/json").unwrap();
        assert_eq!(s.strictness(), Strictness::Strict);
        assert_eq!(l.strictness(), Strictness::Lenient);
    }

    #[test]
    fn factory_failure_is_not_cached() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let cache = CodecCache::new(
            "counting",
            Strictness::Lenient,
            Box::new(move |token| {
                counted.fetch_add(1, Ordering::SeqCst);
                codec_for(token, Strictness::Lenient)
            }),
        );

        assert!(cache.get("application/msgpack").is_err());
        assert!(cache.get("application/msgpack").is_err());
        // The factory ran both times: no poisoned entry was retained.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn factory_runs_at_most_once_per_cached_token() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let cache = CodecCache::new(
            "counting",
            Strictness::Lenient,
            Box::new(move |token| {
                counted.fetch_add(1, Ordering::SeqCst);
                codec_for(token, Strictness::Lenient)
            }),
        );

        cache.get("application/json").unwrap();
        cache.get("application/json").unwrap();
        cache.get("application/json").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_converges_on_one_instance() {
        let cache = Arc::new(CodecCache::with_default_codecs("shared", Strictness::Lenient));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.get("application/json").unwrap()
            }));
        }

        let mut codecs = Vec::new();
        for handle in handles {
            codecs.push(handle.await.unwrap());
        }

        // All callers see behaviorally equivalent codecs, and the cache
        // holds exactly one entry afterward.
        let expected = json!({"n": 1});
        for codec in &codecs {
            assert_eq!(codec.parse(br#"{"n":1}"#).unwrap(), expected);
        }
        assert_eq!(cache.len(), 1);

        // Later gets all return the single surviving instance.
        let survivor = cache.get("application/json").unwrap();
        let again = cache.get("application/json").unwrap();
        assert!(Arc::ptr_eq(&survivor, &again));
    }
}
