mod common;

use chrono::Duration;
use common::Harness;
use futures_util::future::join_all;
use sessionkeeper::application_impl::*;
use sessionkeeper::application_port::SessionService;
use sessionkeeper::domain_model::*;
use sessionkeeper::domain_port::AppLifecycleSignal;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn refreshes_never_overlap_even_when_ticks_outpace_the_network() {
    // Access tokens are minted already inside the margin, so every tick wants a refresh.
    let h = Harness::with_tokens(|tokens| {
        tokens
            .with_access_ttl(Duration::minutes(1))
            .with_latency(StdDuration::from_secs(6))
    });
    h.initialized_session().await;
    h.clock.advance(Duration::minutes(58));

    let ticks = join_all((0..25).map(|_| h.manager.tick()));
    let refreshes = join_all((0..25).map(|_| h.manager.refresh()));
    let (_, outcomes) = tokio::join!(ticks, refreshes);

    assert_eq!(h.tokens.peak_concurrent_refreshes(), 1);
    assert!(outcomes.contains(&RefreshOutcome::InFlight));
    assert!(h.tokens.refresh_calls() <= 2);
}

#[tokio::test(start_paused = true)]
async fn armed_ticker_keeps_refreshing_single_flight() {
    let h = Harness::with_tokens(|tokens| {
        tokens
            .with_access_ttl(Duration::minutes(1))
            .with_latency(StdDuration::from_secs(10))
    });
    h.initialized_session().await;
    h.clock.advance(Duration::minutes(58));

    h.manager.handle_app_state(AppState::Active);
    tokio::time::sleep(StdDuration::from_secs(60)).await;
    h.manager.shutdown().await;

    assert!(h.tokens.refresh_calls() >= 2);
    assert_eq!(h.tokens.peak_concurrent_refreshes(), 1);
}

#[tokio::test(start_paused = true)]
async fn backgrounded_app_makes_no_network_calls() {
    let h = Harness::new();
    h.stored_session(Duration::hours(1), Duration::days(10)).await;
    h.manager.handle_app_state(AppState::Background);
    h.manager.initialize().await;

    tokio::time::sleep(StdDuration::from_secs(30)).await;

    assert!(!h.manager.is_armed());
    assert_eq!(h.tokens.refresh_calls(), 0);
    assert_eq!(h.tokens.validate_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn going_to_background_stops_the_health_check() {
    let h = Harness::new();
    h.initialized_session().await;

    h.manager.handle_app_state(AppState::Active);
    tokio::time::sleep(StdDuration::from_secs(9)).await;
    let while_active = h.tokens.validate_calls();
    assert!(while_active >= 2);

    h.manager.handle_app_state(AppState::Inactive);
    tokio::task::yield_now().await;
    let at_disarm = h.tokens.validate_calls();
    tokio::time::sleep(StdDuration::from_secs(60)).await;

    assert!(!h.manager.is_armed());
    assert_eq!(h.tokens.validate_calls(), at_disarm);
}

#[tokio::test(start_paused = true)]
async fn repeated_foreground_signals_arm_a_single_interval() {
    let h = Harness::new();
    h.initialized_session().await;

    for _ in 0..5 {
        h.manager.handle_app_state(AppState::Active);
    }
    assert!(h.manager.is_armed());
    assert!(!h.manager.arm());

    tokio::time::sleep(StdDuration::from_secs(9)).await;
    assert!(h.tokens.validate_calls() <= 3);

    assert!(h.manager.disarm());
    assert!(!h.manager.disarm());
    tokio::task::yield_now().await;
    assert!(h.manager.arm());
    h.manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_refresh_cannot_resurrect_a_logged_out_session() {
    let h = Harness::with_tokens(|tokens| tokens.with_latency(StdDuration::from_secs(3)));
    h.initialized_session().await;
    h.clock.advance(Duration::minutes(58));

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.refresh().await });
    tokio::time::sleep(StdDuration::from_secs(1)).await;

    h.manager.on_logout().await;
    let outcome = pending.await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Stale);
    assert_eq!(h.manager.current_access_token(), None);
    assert!(h.manager.is_refresh_expired());
    assert!(h.persistence.stored().is_none());
}

#[tokio::test(start_paused = true)]
async fn readers_never_see_a_torn_clear() {
    let h = Harness::with_tokens(|tokens| tokens.with_latency(StdDuration::from_millis(500)));
    h.stored_session(Duration::hours(1), Duration::days(1)).await;
    h.manager.initialize().await;

    let mut rx = h.manager.store().subscribe();
    let watcher = tokio::spawn(async move {
        let mut torn = 0;
        while rx.changed().await.is_ok() {
            let seen = rx.borrow_and_update().clone();
            if seen.access_token.is_some() && seen.flags.refresh_expired {
                torn += 1;
            }
            if seen.last_sign_out.is_some() {
                break;
            }
        }
        torn
    });

    h.clock.advance(Duration::days(1) - Duration::minutes(3));
    h.manager.tick().await;

    assert_eq!(watcher.await.unwrap(), 0);
    assert_eq!(h.navigator.redirects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_follows_lifecycle_signal_until_cancelled() {
    let h = Harness::new();
    h.stored_session(Duration::hours(1), Duration::days(10)).await;
    let signal = ChannelLifecycleSignal::new(AppState::Active);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(Arc::clone(&h.manager).run(signal.subscribe(), cancel.clone()));
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert_eq!(h.manager.phase(), SessionPhase::HydratedValid);
    assert!(h.manager.is_armed());

    signal.set(AppState::Background);
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert!(!h.manager.is_armed());

    signal.set(AppState::Active);
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    assert!(h.manager.is_armed());

    cancel.cancel();
    handle.await.unwrap();
    assert!(!h.manager.is_armed());
}

#[tokio::test(start_paused = true)]
async fn login_while_foregrounded_arms_the_health_check() {
    let h = Harness::new();
    h.manager.handle_app_state(AppState::Active);
    assert!(!h.manager.is_armed());

    let record = h
        .tokens
        .issue_session("grace", Duration::hours(1), Duration::days(30));
    h.manager.on_login(record).await.unwrap();

    assert!(h.manager.is_armed());
    h.manager.shutdown().await;
}
