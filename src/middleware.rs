use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::errors::AppError;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// External Game API rate limiting (§4.F), keyed by `(service_name,
/// endpoint)` instead of by IP. An API key's own `rate_limit` column
/// overrides the process-wide default; any endpoint with no configured
/// quota still gets the fail-secure default rather than going unlimited
/// (testable property #7). One keyed `RateLimiter` bucket is shared per
/// distinct quota value rather than one per key, since governor's keyed
/// limiter is bound to a single `Quota` for its whole lifetime.
#[derive(Clone)]
pub struct GameApiRateLimiter {
    buckets: Arc<Mutex<HashMap<u32, Arc<KeyedLimiter>>>>,
    default_per_min: u32,
}

impl GameApiRateLimiter {
    pub fn new(default_per_min: u32) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            default_per_min: default_per_min.max(1),
        }
    }

    /// Checks and consumes one token for `(service_name, endpoint)`. Returns
    /// the resolved per-minute limit on success, so callers can echo it back
    /// as a rate-limit response header.
    pub fn check(
        &self,
        service_name: &str,
        endpoint: &str,
        override_per_min: Option<i32>,
    ) -> Result<u32, AppError> {
        let per_min = override_per_min
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(self.default_per_min);

        let limiter = {
            let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
            buckets
                .entry(per_min)
                .or_insert_with(|| {
                    let quota = Quota::per_minute(NonZeroU32::new(per_min).unwrap_or(NonZeroU32::new(1).unwrap()));
                    Arc::new(RateLimiter::keyed(quota))
                })
                .clone()
        };

        let key = format!("{service_name}:{endpoint}");
        limiter.check_key(&key).map(|_| per_min).map_err(|_| {
            tracing::warn!(service_name, endpoint, per_min, "External Game API rate limit exceeded");
            AppError::RateLimited { retry_after_secs: 60 }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_endpoint_gets_the_fail_secure_default() {
        let limiter = GameApiRateLimiter::new(30);
        let limit = limiter.check("trivia-service", "rooms.validate", None).unwrap();
        assert_eq!(limit, 30);
    }

    #[test]
    fn per_key_override_replaces_the_default() {
        let limiter = GameApiRateLimiter::new(30);
        let limit = limiter.check("trivia-service", "rooms.validate", Some(5)).unwrap();
        assert_eq!(limit, 5);
    }

    #[test]
    fn zero_or_negative_override_falls_back_to_default() {
        let limiter = GameApiRateLimiter::new(30);
        assert_eq!(limiter.check("svc", "ep", Some(0)).unwrap(), 30);
        assert_eq!(limiter.check("svc", "ep", Some(-1)).unwrap(), 30);
    }

    #[test]
    fn exhausting_the_quota_rejects_further_calls() {
        let limiter = GameApiRateLimiter::new(30);
        for _ in 0..2 {
            limiter.check("svc", "ep", Some(2)).unwrap();
        }
        let err = limiter.check("svc", "ep", Some(2)).unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));
    }

    #[test]
    fn distinct_endpoints_get_independent_quotas() {
        let limiter = GameApiRateLimiter::new(30);
        limiter.check("svc", "rooms.heartbeat", Some(1)).unwrap();
        assert!(limiter.check("svc", "rooms.heartbeat", Some(1)).is_err());
        assert!(limiter.check("svc", "rooms.status", Some(1)).is_ok());
    }
}

/// CORS configuration using multiple allowed origins from env.
pub fn cors_layer() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string())
        .split(',')
        .map(|s| s.trim().parse().unwrap())
        .collect::<Vec<_>>();

    tracing::info!("CORS allowed origins: {:?}", allowed_origins);

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            "x-api-key".parse().unwrap(),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
