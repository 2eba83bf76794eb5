//! Token-bucket rate limiting, keyed per tenant and per source IP.
//!
//! Two independent keyed buckets guard every query: the tenant budget
//! protects a creator's quota, the IP budget blunts single-source floods.
//! Buckets live in-process (the single-node fallback); a multi-instance
//! deployment would move them behind a shared store.

#[cfg(test)]
mod tests;

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::Serialize;

use crate::config::RateLimitConfig;

/// Which bucket denied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// The per-tenant budget.
    Tenant,
    /// The per-source-IP budget.
    SourceIp,
}

/// Structured denial carrying the retry hint.
#[derive(Debug, Clone, Copy)]
pub struct RateLimited {
    /// Bucket that denied.
    pub scope: LimitScope,
    /// Time until a token is available.
    pub retry_after: Duration,
}

impl RateLimited {
    /// Retry hint in whole seconds, rounded up and never zero.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.as_secs_f64().ceil().max(1.0) as u64
    }
}

/// Keyed token buckets for the query path.
pub struct RequestRateLimiter {
    tenant: DefaultKeyedRateLimiter<String>,
    ip: DefaultKeyedRateLimiter<IpAddr>,
    clock: DefaultClock,
}

impl RequestRateLimiter {
    /// Buckets sized from configuration (requests per minute).
    pub fn new(config: RateLimitConfig) -> Self {
        let tenant_quota = Quota::per_minute(
            NonZeroU32::new(config.tenant_per_minute).unwrap_or(NonZeroU32::MIN),
        );
        let ip_quota =
            Quota::per_minute(NonZeroU32::new(config.ip_per_minute).unwrap_or(NonZeroU32::MIN));

        Self::from_quotas(tenant_quota, ip_quota)
    }

    /// Buckets with explicit quotas (used by tests for fast refill).
    pub fn from_quotas(tenant_quota: Quota, ip_quota: Quota) -> Self {
        Self {
            tenant: RateLimiter::keyed(tenant_quota),
            ip: RateLimiter::keyed(ip_quota),
            clock: DefaultClock::default(),
        }
    }

    /// Admits or denies one request for `(tenant, source_ip)`.
    pub fn check(&self, tenant_id: &str, source_ip: IpAddr) -> Result<(), RateLimited> {
        self.check_tenant(tenant_id)?;
        self.check_ip(source_ip)
    }

    /// Tenant bucket only.
    pub fn check_tenant(&self, tenant_id: &str) -> Result<(), RateLimited> {
        match self.tenant.check_key(&tenant_id.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => Err(RateLimited {
                scope: LimitScope::Tenant,
                retry_after: not_until.wait_time_from(self.clock.now()),
            }),
        }
    }

    /// Source-IP bucket only.
    pub fn check_ip(&self, source_ip: IpAddr) -> Result<(), RateLimited> {
        match self.ip.check_key(&source_ip) {
            Ok(()) => Ok(()),
            Err(not_until) => Err(RateLimited {
                scope: LimitScope::SourceIp,
                retry_after: not_until.wait_time_from(self.clock.now()),
            }),
        }
    }
}
