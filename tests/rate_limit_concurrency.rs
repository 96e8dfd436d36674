//! Concurrency behavior of the fixed-window limiter.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use festival_gate::security::rate_limit::{
    MemoryWindowStore, MockClock, RateLimiter, RatePolicies, RatePolicy, RatePurpose,
};

fn mock_limiter(max: u32, window: Duration) -> (Arc<RateLimiter>, MockClock) {
    let clock = MockClock::new(1_700_000_000_000);
    let limiter = RateLimiter::new(
        Arc::new(MemoryWindowStore::new()),
        Arc::new(clock.clone()),
        RatePolicies::uniform(RatePolicy::new(max, window)),
    );
    (Arc::new(limiter), clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_simultaneous_checks_admit_exactly_max() {
    const MAX: u32 = 25;
    const CALLERS: usize = 400;
    let (limiter, _clock) = mock_limiter(MAX, Duration::from_secs(60));

    let tasks = (0..CALLERS).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter
                .check_purpose(RatePurpose::Registration, "203.0.113.7")
                .await
                .unwrap()
        })
    });

    let decisions: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = decisions.iter().filter(|d| d.admitted).count();
    assert_eq!(admitted, MAX as usize);
    assert!(decisions.iter().filter(|d| d.admitted).all(|d| d.remaining < MAX));
    assert_eq!(limiter.tracked_windows(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_callers_do_not_share_windows() {
    let (limiter, _clock) = mock_limiter(3, Duration::from_secs(60));

    let tasks = (0..40).map(|i| {
        let limiter = limiter.clone();
        let caller = format!("10.0.0.{}", i % 4);
        tokio::spawn(async move { limiter.check_purpose(RatePurpose::Api, &caller).await.unwrap() })
    });

    let admitted = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| joined.as_ref().map(|d| d.admitted).unwrap_or(false))
        .count();
    assert_eq!(admitted, 4 * 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_window_reopens_and_sweep_clears() {
    let window = Duration::from_secs(900);
    let (limiter, clock) = mock_limiter(5, window);

    for _ in 0..5 {
        assert!(limiter.check_purpose(RatePurpose::Login, "a").await.unwrap().admitted);
    }
    assert!(!limiter.check_purpose(RatePurpose::Login, "a").await.unwrap().admitted);

    clock.advance(window + Duration::from_millis(1));
    assert_eq!(limiter.sweep().await.unwrap(), 1);
    assert_eq!(limiter.tracked_windows(), 0);

    let fresh = limiter.check_purpose(RatePurpose::Login, "a").await.unwrap();
    assert!(fresh.admitted);
    assert_eq!(fresh.remaining, 4);
}
