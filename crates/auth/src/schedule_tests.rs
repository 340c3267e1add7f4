// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::broadcast;
use tokio::time::sleep;

use super::*;
use crate::store::{CredentialPair, CredentialStore};
use crate::test_support::{mint_in, tokio_clock, FakeRenewer};

fn setup(config: &SessionConfig) -> (Arc<RefreshCoordinator>, Arc<FakeRenewer>, CredentialClock) {
    let clock = tokio_clock();
    let renewer = FakeRenewer::new(clock.clone());
    let (tx, _) = broadcast::channel(16);
    let coordinator = RefreshCoordinator::new(
        config,
        Arc::new(CredentialStore::in_memory()),
        clock.clone(),
        Arc::clone(&renewer) as Arc<dyn crate::refresh::Renewer>,
        tx,
    );
    (coordinator, renewer, clock)
}

fn pair(clock: &CredentialClock, access_secs: i64, refresh_secs: i64) -> CredentialPair {
    CredentialPair::new(mint_in(clock, access_secs, "access"), mint_in(clock, refresh_secs, "refresh"))
}

#[tokio::test(start_paused = true)]
async fn access_check_renews_once_inside_threshold() {
    let (coordinator, renewer, clock) = setup(&SessionConfig::default());
    coordinator.install(&pair(&clock, 600, 7 * 24 * 3600));
    let initial = coordinator.store().access_token();

    // Ticks at 60..240 see 540..360 s remaining.
    sleep(Duration::from_secs(250)).await;
    assert_eq!(renewer.calls(), 0);

    // Tick at 300 sees exactly the threshold; the next one sees a fresh token.
    sleep(Duration::from_secs(120)).await;
    assert_eq!(renewer.calls(), 1);
    assert_ne!(coordinator.store().access_token(), initial);
    assert!(coordinator.scheduler().is_running());
}

#[tokio::test(start_paused = true)]
async fn expired_token_renews_on_first_tick() {
    let (coordinator, renewer, clock) = setup(&SessionConfig::default());
    coordinator.install(&pair(&clock, -10, 7 * 24 * 3600));

    sleep(Duration::from_secs(59)).await;
    assert_eq!(renewer.calls(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(renewer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_check_renews_expiring_refresh_token() {
    let config = SessionConfig { refresh_check_ms: 120_000, ..SessionConfig::default() };
    let (coordinator, renewer, clock) = setup(&config);
    // Access is fresh for an hour; refresh is inside the 24 h threshold.
    coordinator.install(&pair(&clock, 3600, 20 * 3600));

    sleep(Duration::from_secs(110)).await;
    assert_eq!(renewer.calls(), 0);

    sleep(Duration::from_secs(20)).await;
    assert_eq!(renewer.calls(), 1);
    assert_eq!(coordinator.scheduler().threshold(TokenKind::Refresh), Duration::from_secs(86_400));
}

#[tokio::test(start_paused = true)]
async fn clear_stops_both_timers() {
    let (coordinator, renewer, clock) = setup(&SessionConfig::default());
    coordinator.install(&pair(&clock, -10, 60));
    assert!(coordinator.scheduler().is_running());

    coordinator.clear();
    assert!(!coordinator.scheduler().is_running());

    sleep(Duration::from_secs(3600)).await;
    assert_eq!(renewer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn start_without_pair_does_nothing() {
    let (coordinator, renewer, _clock) = setup(&SessionConfig::default());
    assert!(!coordinator.scheduler().start(&coordinator));
    assert!(!coordinator.scheduler().is_running());

    sleep(Duration::from_secs(600)).await;
    assert_eq!(renewer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_running_timers() {
    let (coordinator, renewer, clock) = setup(&SessionConfig::default());
    coordinator.install(&pair(&clock, 600, 7 * 24 * 3600));

    // Restarting at 30 s pushes the first tick out to 90 s.
    sleep(Duration::from_secs(30)).await;
    assert!(coordinator.scheduler().start(&coordinator));
    assert!(coordinator.scheduler().is_running());

    coordinator.scheduler().stop();
    assert!(!coordinator.scheduler().is_running());
    sleep(Duration::from_secs(600)).await;
    assert_eq!(renewer.calls(), 0);
}
