//! JWKS fetching and caching
//!
//! The key set is fetched lazily from the identity provider and cached for a
//! configurable TTL. A refresh is triggered by a reader that sees a stale set
//! or misses a key id; concurrent refreshes coalesce onto a single outbound
//! fetch, and readers never observe a partially populated set because the
//! cache slot is replaced atomically under a write lock.

use std::time::{Duration, Instant};

use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Network or parse error while fetching the JWKS document.
///
/// Treated as an authentication failure by callers (fail closed).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network or HTTP error
    #[error("JWKS fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("JWKS endpoint returned status {0}")]
    Status(reqwest::StatusCode),
}

/// A fetched key set plus its fetch instant.
struct CachedKeySet {
    keys: JwkSet,
    fetched_at: Instant,
}

impl CachedKeySet {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// Cache of the identity provider's public signing keys.
pub struct KeySetCache {
    jwks_uri: String,
    http: reqwest::Client,
    ttl: Duration,
    cached: RwLock<Option<CachedKeySet>>,
    /// At-most-one outstanding fetch. Waiters re-check the cache after
    /// acquiring the lock and reuse a refresh that completed while they
    /// queued.
    refresh: Mutex<()>,
}

impl KeySetCache {
    /// Create a cache for the given JWKS endpoint.
    #[must_use]
    pub fn new(jwks_uri: String, ttl: Duration) -> Self {
        if !jwks_uri.starts_with("https://") {
            warn!(jwks_uri = %jwks_uri, "JWKS endpoint is not HTTPS");
        }
        Self {
            jwks_uri,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            ttl,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Look up a decoding key by key id.
    ///
    /// Returns `Ok(None)` when the key is absent even after a refresh.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the JWKS document cannot be fetched or
    /// parsed (after one immediate retry).
    pub async fn get_key(&self, kid: &str) -> Result<Option<DecodingKey>, FetchError> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if !cached.is_stale(self.ttl) {
                    if let Some(key) = find_key(&cached.keys, kid) {
                        return Ok(Some(key));
                    }
                }
            }
        }

        // Stale set or unknown kid: refresh once and retry the lookup
        debug!(kid = %kid, "Key not in cached JWKS, refreshing");
        let keys = self.refresh().await?;
        Ok(find_key(&keys, kid))
    }

    /// Refresh the cached key set, coalescing concurrent callers.
    async fn refresh(&self) -> Result<JwkSet, FetchError> {
        let started = Instant::now();
        let _flight = self.refresh.lock().await;

        // A refresh that completed while we queued for the lock is good
        // enough; reuse it instead of fetching again.
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at >= started {
                    return Ok(cached.keys.clone());
                }
            }
        }

        // One immediate retry on failure, no retry loop
        let keys = match self.fetch().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "JWKS fetch failed, retrying once");
                self.fetch().await?
            }
        };

        debug!(key_count = keys.keys.len(), jwks_uri = %self.jwks_uri, "Fetched JWKS");
        *self.cached.write().await = Some(CachedKeySet {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }

    async fn fetch(&self) -> Result<JwkSet, FetchError> {
        let response = self.http.get(&self.jwks_uri).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

/// Find a JWK by `kid` and convert it to a [`DecodingKey`].
fn find_key(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    for jwk in &jwks.keys {
        if jwk.common.key_id.as_deref() != Some(kid) {
            continue;
        }

        return match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y).ok()
            }
            AlgorithmParameters::OctetKey(oct) => {
                let secret = base64::Engine::decode(
                    &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                    &oct.value,
                )
                .ok()?;
                Some(DecodingKey::from_secret(&secret))
            }
            AlgorithmParameters::OctetKeyPair(_) => None,
        };
    }
    None
}

/// Derive the JWKS URI from the issuer URL using OIDC discovery conventions.
#[must_use]
pub fn default_jwks_uri(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    format!("{base}/.well-known/jwks.json")
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Json, Router, routing::get};
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn default_jwks_uri_appends_well_known() {
        assert_eq!(
            default_jwks_uri("https://id.example.com"),
            "https://id.example.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn default_jwks_uri_handles_trailing_slash() {
        assert_eq!(
            default_jwks_uri("https://id.example.com/"),
            "https://id.example.com/.well-known/jwks.json"
        );
    }

    fn oct_jwk(kid: &str, secret: &[u8]) -> Value {
        json!({
            "kty": "oct",
            "kid": kid,
            "alg": "HS256",
            "k": base64::Engine::encode(
                &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                secret,
            ),
        })
    }

    #[test]
    fn find_key_matches_kid() {
        let jwks: JwkSet =
            serde_json::from_value(json!({ "keys": [oct_jwk("key-1", b"secret")] })).unwrap();

        assert!(find_key(&jwks, "key-1").is_some());
        assert!(find_key(&jwks, "key-2").is_none());
    }

    /// Spawn a loopback JWKS endpoint whose body is produced per request
    /// from the running hit count.
    async fn serve_jwks<F>(body_fn: F, delay: Duration) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(usize) -> Value + Clone + Send + Sync + 'static,
    {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_handler = Arc::clone(&hits);

        let app = Router::new().route(
            "/jwks.json",
            get(move || {
                let hits = Arc::clone(&hits_handler);
                let body_fn = body_fn.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    Json(body_fn(n))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/jwks.json"), hits)
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_fetch() {
        let (uri, hits) = serve_jwks(
            |_| json!({ "keys": [oct_jwk("key-1", b"secret")] }),
            Duration::from_millis(50),
        )
        .await;

        let cache = Arc::new(KeySetCache::new(uri, Duration::from_secs(3600)));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(
                async move { cache.get_key("key-1").await },
            ));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_kid_triggers_single_refresh() {
        // First response lacks the rotated key; the refresh picks it up.
        let (uri, hits) = serve_jwks(
            |n| {
                if n == 0 {
                    json!({ "keys": [oct_jwk("old-key", b"secret")] })
                } else {
                    json!({ "keys": [oct_jwk("old-key", b"secret"), oct_jwk("new-key", b"secret")] })
                }
            },
            Duration::ZERO,
        )
        .await;

        let cache = KeySetCache::new(uri, Duration::from_secs(3600));

        assert!(cache.get_key("old-key").await.unwrap().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Miss on the cached set forces exactly one more fetch
        assert!(cache.get_key("new-key").await.unwrap().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        // Subsequent lookups are served from cache
        assert!(cache.get_key("new-key").await.unwrap().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn absent_kid_after_refresh_is_not_found() {
        let (uri, hits) = serve_jwks(
            |_| json!({ "keys": [oct_jwk("key-1", b"secret")] }),
            Duration::ZERO,
        )
        .await;

        let cache = KeySetCache::new(uri, Duration::from_secs(3600));

        assert!(cache.get_key("ghost").await.unwrap().is_none());
        // One fetch for the initial miss; the kid simply does not exist
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_fetch_error() {
        // Reserved port with nothing listening
        let cache = KeySetCache::new(
            "http://127.0.0.1:1/jwks.json".to_string(),
            Duration::from_secs(3600),
        );
        assert!(cache.get_key("any").await.is_err());
    }
}
