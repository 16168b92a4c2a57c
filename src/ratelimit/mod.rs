//! Traffic guardrails / rate limiter (§4.4): per-identity rolling counters
//! plus the non-counter traffic rules (geo, business hours, context length,
//! upload size) evaluated ahead of them.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use chrono::{Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::policy::RateRules;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Context a single request brings to the rate limiter (§3 Request context,
/// the traffic-facing subset).
#[derive(Debug, Clone)]
pub struct TrafficContext<'a> {
    pub identity: &'a str,
    pub context_tokens: u32,
    pub upload_bytes: u64,
    pub geo: &'a str,
}

/// Why a request was denied. `retry_after_ms` is only meaningful for the
/// rolling-window reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Geo,
    BusinessHours,
    ContextLength,
    UploadSize,
    PerMinute,
    PerHour,
    PerDay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Denial {
    pub kind: DenialKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// The window's configured limit, when `kind` is one of the rolling-window
    /// reasons; `None` for the non-counter traffic rules (geo, business
    /// hours, context length, upload size), which have no `X-RateLimit-*`
    /// equivalent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Always `0` when present: the denial fired because the window is
    /// already exhausted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    /// Milliseconds until the window resets, same quantity as
    /// `retry_after_ms` for window denials, named separately because
    /// `X-RateLimit-Reset` and `Retry-After` are conceptually distinct
    /// headers even when they carry the same value here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub denial: Option<Denial>,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            denial: None,
        }
    }

    fn deny(kind: DenialKind, retry_after_ms: Option<u64>) -> Self {
        Self {
            allowed: false,
            denial: Some(Denial {
                kind,
                retry_after_ms,
                limit: None,
                remaining: None,
                reset_ms: None,
            }),
        }
    }

    fn deny_window(kind: DenialKind, limit: u32, retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            denial: Some(Denial {
                kind,
                retry_after_ms: Some(retry_after_ms),
                limit: Some(limit),
                remaining: Some(0),
                reset_ms: Some(retry_after_ms),
            }),
        }
    }
}

/// A single fixed-granularity rolling window: advanced lazily on access,
/// never by a background sweeper (§4.4).
#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self { start: now, count: 0 }
    }

    /// Advances the window if it has aged out, then returns whether `limit`
    /// would be exceeded by counting one more hit, along with the time until
    /// the window resets.
    fn check_and_increment(&mut self, now: Instant, span: Duration, limit: Option<u32>) -> (bool, Duration) {
        if now.duration_since(self.start) >= span {
            self.start = now;
            self.count = 0;
        }

        let retry_after = span.saturating_sub(now.duration_since(self.start));

        match limit {
            Some(limit) if self.count >= limit => (false, retry_after),
            _ => {
                self.count += 1;
                (true, retry_after)
            }
        }
    }

    fn is_idle(&self, now: Instant, span: Duration) -> bool {
        now.duration_since(self.start) >= span
    }
}

/// Per-identity counters at minute/hour/day resolution (§3 `RateBucket`).
struct RateBucket {
    minute: Window,
    hour: Window,
    day: Window,
    last_seen: Instant,
}

impl RateBucket {
    fn new(now: Instant) -> Self {
        Self {
            minute: Window::new(now),
            hour: Window::new(now),
            day: Window::new(now),
            last_seen: now,
        }
    }
}

/// Snapshot returned by `/rate-limit/stats/{identity}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterStats {
    pub identity: String,
    pub minute_count: u32,
    pub hour_count: u32,
    pub day_count: u32,
}

/// Owns every identity's `RateBucket`. Counter updates for one identity run
/// under that identity's own lock; the map itself uses a read-mostly lock
/// with lazy insertion, so two different identities never contend (§5).
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Mutex<RateBucket>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Evaluates the full decision order of §4.4: geo → business hours →
    /// context length → upload size → per-minute → per-hour → per-day. The
    /// first violation terminates the check.
    pub fn check(&self, ctx: &TrafficContext<'_>, rules: &RateRules) -> RateDecision {
        if let Some(allowed_geos) = &rules.allowed_geos {
            if !allowed_geos.is_empty() && !allowed_geos.iter().any(|g| g == ctx.geo) {
                return RateDecision::deny(DenialKind::Geo, None);
            }
        }

        if let Some(hours) = &rules.business_hours {
            // Only UTC wall-clock hours are actually evaluated; `tz` is
            // accepted but not resolved against a timezone database.
            let hour = Utc::now().hour();
            let within = if hours.start <= hours.end {
                hour >= hours.start && hour < hours.end
            } else {
                hour >= hours.start || hour < hours.end
            };
            if !within {
                return RateDecision::deny(DenialKind::BusinessHours, None);
            }
        }

        if let Some(max_tokens) = rules.max_context_tokens {
            if ctx.context_tokens > max_tokens {
                return RateDecision::deny(DenialKind::ContextLength, None);
            }
        }

        if let Some(max_bytes) = rules.max_upload_bytes {
            if ctx.upload_bytes > max_bytes {
                return RateDecision::deny(DenialKind::UploadSize, None);
            }
        }

        self.check_windows(ctx.identity, rules)
    }

    fn check_windows(&self, identity: &str, rules: &RateRules) -> RateDecision {
        let now = Instant::now();

        {
            let buckets = self.buckets.read();
            if let Some(bucket) = buckets.get(identity) {
                return Self::run_windows(bucket, now, rules);
            }
        }

        let mut buckets = self.buckets.write();
        let bucket = buckets
            .entry(identity.to_string())
            .or_insert_with(|| Mutex::new(RateBucket::new(now)));
        Self::run_windows(bucket, now, rules)
    }

    fn run_windows(bucket: &Mutex<RateBucket>, now: Instant, rules: &RateRules) -> RateDecision {
        let mut bucket = bucket.lock();
        bucket.last_seen = now;

        let (minute_ok, minute_retry) = bucket.minute.check_and_increment(now, MINUTE, rules.per_minute);
        if !minute_ok {
            // rules.per_minute is Some: check_and_increment only denies against a configured limit.
            return RateDecision::deny_window(
                DenialKind::PerMinute,
                rules.per_minute.unwrap_or_default(),
                minute_retry.as_millis() as u64,
            );
        }

        let (hour_ok, hour_retry) = bucket.hour.check_and_increment(now, HOUR, rules.per_hour);
        if !hour_ok {
            return RateDecision::deny_window(
                DenialKind::PerHour,
                rules.per_hour.unwrap_or_default(),
                hour_retry.as_millis() as u64,
            );
        }

        let (day_ok, day_retry) = bucket.day.check_and_increment(now, DAY, rules.per_day);
        if !day_ok {
            return RateDecision::deny_window(
                DenialKind::PerDay,
                rules.per_day.unwrap_or_default(),
                day_retry.as_millis() as u64,
            );
        }

        RateDecision::allow()
    }

    /// Drops buckets idle past the longest configured window. Call
    /// periodically; not required for correctness (windows self-advance on
    /// access), only for bounding memory.
    pub fn evict_idle(&self) {
        let now = Instant::now();
        self.buckets
            .write()
            .retain(|_, bucket| !bucket.lock().day.is_idle(now, DAY));
    }

    pub fn stats(&self, identity: &str) -> Option<RateLimiterStats> {
        let buckets = self.buckets.read();
        let bucket = buckets.get(identity)?.lock();
        Some(RateLimiterStats {
            identity: identity.to_string(),
            minute_count: bucket.minute.count,
            hour_count: bucket.hour.count,
            day_count: bucket.day.count,
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(identity: &str) -> TrafficContext<'_> {
        TrafficContext {
            identity,
            context_tokens: 10,
            upload_bytes: 10,
            geo: "US",
        }
    }

    #[test]
    fn allows_requests_under_the_limit() {
        let limiter = RateLimiter::new();
        let rules = RateRules {
            per_minute: Some(2),
            ..Default::default()
        };
        assert!(limiter.check(&ctx("alice"), &rules).allowed);
        assert!(limiter.check(&ctx("alice"), &rules).allowed);
    }

    #[test]
    fn denies_the_mth_plus_one_request_in_a_window() {
        let limiter = RateLimiter::new();
        let rules = RateRules {
            per_minute: Some(2),
            ..Default::default()
        };
        assert!(limiter.check(&ctx("bob"), &rules).allowed);
        assert!(limiter.check(&ctx("bob"), &rules).allowed);
        let decision = limiter.check(&ctx("bob"), &rules);
        assert!(!decision.allowed);
        assert_eq!(decision.denial.unwrap().kind, DenialKind::PerMinute);
    }

    #[test]
    fn identities_do_not_share_counters() {
        let limiter = RateLimiter::new();
        let rules = RateRules {
            per_minute: Some(1),
            ..Default::default()
        };
        assert!(limiter.check(&ctx("carol"), &rules).allowed);
        assert!(limiter.check(&ctx("dave"), &rules).allowed);
    }

    #[test]
    fn rejects_disallowed_geo_before_touching_counters() {
        let limiter = RateLimiter::new();
        let rules = RateRules {
            allowed_geos: Some(vec!["EU".to_string()]),
            ..Default::default()
        };
        let decision = limiter.check(&ctx("erin"), &rules);
        assert!(!decision.allowed);
        assert_eq!(decision.denial.unwrap().kind, DenialKind::Geo);
        assert!(limiter.stats("erin").is_none());
    }

    #[test]
    fn rejects_oversized_upload_before_counters() {
        let limiter = RateLimiter::new();
        let rules = RateRules {
            max_upload_bytes: Some(5),
            ..Default::default()
        };
        let mut context = ctx("frank");
        context.upload_bytes = 100;
        let decision = limiter.check(&context, &rules);
        assert!(!decision.allowed);
        assert_eq!(decision.denial.unwrap().kind, DenialKind::UploadSize);
    }

    #[test]
    fn stats_reflect_counted_hits() {
        let limiter = RateLimiter::new();
        let rules = RateRules::default();
        limiter.check(&ctx("gina"), &rules);
        limiter.check(&ctx("gina"), &rules);
        let stats = limiter.stats("gina").unwrap();
        assert_eq!(stats.minute_count, 2);
        assert_eq!(stats.hour_count, 2);
        assert_eq!(stats.day_count, 2);
    }
}
