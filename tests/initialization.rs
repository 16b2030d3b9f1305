mod common;

use chrono::Duration;
use common::Harness;
use sessionkeeper::application_impl::InitOutcome;
use sessionkeeper::application_port::SessionService;
use sessionkeeper::domain_port::Clock;
use sessionkeeper::domain_model::*;
use std::time::Duration as StdDuration;

#[tokio::test]
async fn refresh_token_inside_margin_at_startup_signs_out_without_refreshing() {
    for refresh_left in [
        Duration::minutes(2),
        Duration::minutes(5) - Duration::seconds(1),
        Duration::zero(),
        -Duration::days(3),
    ] {
        let h = Harness::new();
        h.stored_session(Duration::hours(1), refresh_left).await;

        let outcome = h.manager.initialize().await;

        assert_eq!(outcome, InitOutcome::Expired, "refresh_left={refresh_left}");
        assert_eq!(h.tokens.refresh_calls(), 0);
        assert!(h.persistence.stored().is_none());
        assert!(h.manager.is_refresh_expired());
        assert_eq!(h.manager.current_access_token(), None);
        assert_eq!(h.manager.phase(), SessionPhase::ExpiredRefresh);
    }
}

#[tokio::test]
async fn access_token_inside_margin_at_startup_is_refreshed_once() {
    let h = Harness::new();
    let stored = h
        .stored_session(Duration::minutes(2), Duration::days(10))
        .await;

    let outcome = h.manager.initialize().await;

    assert_eq!(outcome, InitOutcome::Ready);
    assert_eq!(h.tokens.refresh_calls(), 1);

    let snapshot = h.snapshot();
    let access = snapshot.access_token.clone().unwrap();
    assert!(access.expires_at > h.clock.now() + Duration::minutes(2));
    assert_ne!(access.token, stored.access_token.token);
    assert!(!snapshot.flags.access_expired);
    assert!(!snapshot.flags.refresh_expired);
    assert_eq!(snapshot.refresh_token, Some(stored.refresh_token));

    assert_eq!(h.persistence.stored().unwrap().access_token, access);
}

#[tokio::test]
async fn fresh_stored_session_is_hydrated_as_is() {
    let h = Harness::new();
    let stored = h.stored_session(Duration::hours(1), Duration::days(10)).await;

    assert_eq!(h.manager.initialize().await, InitOutcome::Ready);

    assert_eq!(h.tokens.refresh_calls(), 0);
    assert_eq!(h.snapshot().to_record(), Some(stored.clone()));
    assert_eq!(
        h.manager.current_access_token(),
        Some(stored.access_token.token)
    );
    assert!(!h.manager.is_access_expired());
    assert_eq!(h.manager.phase(), SessionPhase::HydratedValid);
}

#[tokio::test]
async fn nothing_stored_starts_signed_out() {
    let h = Harness::new();
    assert_eq!(h.manager.phase(), SessionPhase::Uninitialized);

    assert_eq!(h.manager.initialize().await, InitOutcome::NoSession);

    assert!(h.manager.is_refresh_expired());
    assert_eq!(h.tokens.refresh_calls(), 0);
    assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
}

#[tokio::test]
async fn unreadable_storage_is_treated_as_no_session() {
    let h = Harness::new();
    h.stored_session(Duration::hours(1), Duration::days(10)).await;
    h.persistence.set_fail_reads(true);

    assert_eq!(h.manager.initialize().await, InitOutcome::NoSession);

    assert!(h.manager.is_refresh_expired());
    assert_eq!(h.manager.current_access_token(), None);
    assert_eq!(h.tokens.refresh_calls(), 0);
}

#[tokio::test]
async fn failed_startup_refresh_keeps_session_for_the_next_tick() {
    let h = Harness::new();
    h.tokens.fail_next_refreshes([
        sessionkeeper::domain_port::TokenClientError::NetworkTransient("offline".into()),
    ]);
    let stored = h
        .stored_session(Duration::minutes(1), Duration::days(10))
        .await;

    assert_eq!(h.manager.initialize().await, InitOutcome::Ready);

    let snapshot = h.snapshot();
    assert_eq!(snapshot.refresh_token, Some(stored.refresh_token));
    assert!(snapshot.access_token.is_none());
    assert!(snapshot.flags.access_expired);
    assert_eq!(h.manager.phase(), SessionPhase::HydratedNearAccessExpiry);

    h.manager.tick().await;
    assert_eq!(h.tokens.refresh_calls(), 2);
    assert!(!h.manager.is_access_expired());
    assert!(h.manager.current_access_token().is_some());
}

#[tokio::test]
async fn login_installs_and_persists_session() {
    let h = Harness::new();
    h.manager.initialize().await;
    let record = h
        .tokens
        .issue_session("grace", Duration::hours(1), Duration::days(30));

    h.manager.on_login(record.clone()).await.unwrap();

    assert_eq!(h.persistence.stored(), Some(record.clone()));
    assert_eq!(
        h.manager.current_access_token(),
        Some(record.access_token.token)
    );
    assert!(!h.manager.is_refresh_expired());
}

#[tokio::test]
async fn login_with_refresh_token_inside_margin_is_rejected() {
    let h = Harness::new();
    let record = h
        .tokens
        .issue_session("grace", Duration::hours(1), Duration::minutes(1));

    let result = h.manager.on_login(record).await;

    assert!(matches!(
        result,
        Err(sessionkeeper::application_port::SessionError::InvalidSession(_))
    ));
    assert!(h.persistence.stored().is_none());
    assert_eq!(h.manager.current_access_token(), None);
}

#[tokio::test]
async fn login_write_fault_is_reported_but_session_is_live() {
    let h = Harness::new();
    h.persistence.set_fail_writes(true);
    let record = h
        .tokens
        .issue_session("grace", Duration::hours(1), Duration::days(30));

    let result = h.manager.on_login(record.clone()).await;

    assert!(matches!(
        result,
        Err(sessionkeeper::application_port::SessionError::Store(_))
    ));
    assert_eq!(h.snapshot().to_record(), Some(record));
}

#[tokio::test]
async fn logout_clears_memory_and_storage_without_navigation() {
    let h = Harness::new();
    h.initialized_session().await;

    h.manager.on_logout().await;

    let snapshot = h.snapshot();
    assert!(snapshot.access_token.is_none());
    assert!(snapshot.refresh_token.is_none());
    assert!(snapshot.flags.refresh_expired);
    assert_eq!(snapshot.last_sign_out, Some(SignOutReason::Logout));
    assert!(h.persistence.stored().is_none());
    assert!(h.navigator.redirects().is_empty());
    assert_eq!(h.manager.phase(), SessionPhase::SignedOut);
}

#[tokio::test(start_paused = true)]
async fn login_during_startup_load_survives_an_empty_or_unreadable_store() {
    for unreadable in [false, true] {
        let h = Harness::new();
        h.persistence.set_load_latency(StdDuration::from_secs(1));
        h.persistence.set_fail_reads(unreadable);

        let manager = h.manager.clone();
        let startup = tokio::spawn(async move { manager.initialize().await });
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        let record = h
            .tokens
            .issue_session("ada", Duration::hours(1), Duration::days(30));
        h.manager.on_login(record.clone()).await.unwrap();

        assert_eq!(startup.await.unwrap(), InitOutcome::NoSession);

        let snapshot = h.snapshot();
        assert_eq!(snapshot.to_record(), Some(record.clone()), "unreadable={unreadable}");
        assert!(!snapshot.flags.refresh_expired);
        assert!(!h.manager.is_refresh_expired());
        assert_eq!(h.manager.phase(), SessionPhase::HydratedValid);
        assert_eq!(h.persistence.stored(), Some(record));
    }
}

#[tokio::test(start_paused = true)]
async fn login_during_startup_load_survives_an_expired_stored_session() {
    let h = Harness::new();
    h.stored_session(Duration::hours(1), Duration::minutes(2))
        .await;
    h.persistence.set_load_latency(StdDuration::from_secs(1));

    let manager = h.manager.clone();
    let startup = tokio::spawn(async move { manager.initialize().await });
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    let record = h
        .tokens
        .issue_session("grace", Duration::hours(1), Duration::days(30));
    h.manager.on_login(record.clone()).await.unwrap();

    assert_eq!(startup.await.unwrap(), InitOutcome::Expired);
    assert_eq!(h.snapshot().to_record(), Some(record.clone()));
    assert!(!h.manager.is_refresh_expired());
    assert_eq!(h.persistence.stored(), Some(record));
    assert_eq!(h.persistence.deletes(), 0);
}
