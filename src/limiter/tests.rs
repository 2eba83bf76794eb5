use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::time::Duration;

use governor::Quota;

use super::*;
use crate::config::RateLimitConfig;

const IP_A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
const IP_B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

#[test]
fn tenant_budget_admits_burst_then_denies_with_retry_hint() {
    let limiter = RequestRateLimiter::new(RateLimitConfig {
        tenant_per_minute: 60,
        ip_per_minute: 1_000,
    });

    for i in 0..60 {
        assert!(
            limiter.check("tenant-a", IP_A).is_ok(),
            "request {i} should be admitted"
        );
    }

    let denial = limiter.check("tenant-a", IP_A).unwrap_err();
    assert_eq!(denial.scope, LimitScope::Tenant);
    assert!(denial.retry_after > Duration::ZERO);
    assert!(denial.retry_after_secs() >= 1);
}

#[test]
fn tenants_have_independent_buckets() {
    let limiter = RequestRateLimiter::new(RateLimitConfig {
        tenant_per_minute: 5,
        ip_per_minute: 1_000,
    });

    for _ in 0..5 {
        limiter.check("tenant-a", IP_A).unwrap();
    }
    assert!(limiter.check("tenant-a", IP_A).is_err());

    // A different tenant still has a full bucket.
    assert!(limiter.check("tenant-b", IP_B).is_ok());
}

#[test]
fn ip_budget_is_enforced_separately() {
    let limiter = RequestRateLimiter::new(RateLimitConfig {
        tenant_per_minute: 1_000,
        ip_per_minute: 3,
    });

    // Different tenants, same source address.
    limiter.check("t1", IP_A).unwrap();
    limiter.check("t2", IP_A).unwrap();
    limiter.check("t3", IP_A).unwrap();

    let denial = limiter.check("t4", IP_A).unwrap_err();
    assert_eq!(denial.scope, LimitScope::SourceIp);

    // Another address is unaffected.
    assert!(limiter.check("t5", IP_B).is_ok());
}

#[test]
fn bucket_recovers_after_refill_interval() {
    // One token per 50ms keeps the test quick.
    let quota = Quota::with_period(Duration::from_millis(50))
        .unwrap()
        .allow_burst(NonZeroU32::new(2).unwrap());
    let limiter = RequestRateLimiter::from_quotas(quota, quota);

    limiter.check_tenant("t").unwrap();
    limiter.check_tenant("t").unwrap();
    assert!(limiter.check_tenant("t").is_err());

    std::thread::sleep(Duration::from_millis(60));
    assert!(limiter.check_tenant("t").is_ok());
}

#[test]
fn admissions_never_exceed_burst_plus_refill() {
    let quota = Quota::with_period(Duration::from_millis(20))
        .unwrap()
        .allow_burst(NonZeroU32::new(5).unwrap());
    let limiter = RequestRateLimiter::from_quotas(quota, quota);

    let start = std::time::Instant::now();
    let mut admitted = 0u32;
    while start.elapsed() < Duration::from_millis(200) {
        if limiter.check_tenant("t").is_ok() {
            admitted += 1;
        }
    }

    // Bound: burst (5) + refill during the window (200ms / 20ms = 10),
    // plus one token of slop for timing jitter.
    assert!(admitted <= 16, "admitted {admitted} requests");
}
