//! Cycle-level behavior of the attestation engine against collaborator fakes.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use mailattest::attest::engine::MSG_ALREADY_ATTESTED;
use mailattest::attest::submitter::MSG_MISSING_PASSPHRASE;
use mailattest::attest::{
    Appended, AttestResponse, Attester, AttesterRegistry, Completion, CycleAbort, CycleSkip,
    EngineOptions, PacketOutcome, Rejection, RemoteError, StoreError, SubmitOutcome,
};
use mailattest::AttestError;

fn two_attester_harness() -> TestHarness {
    let harness = TestHarness::with_options(EngineOptions {
        attesters: AttesterRegistry::new(vec![
            Attester {
                id: "CRYPTUP".to_string(),
                senders: vec!["attest@cryptup.org".to_string()],
            },
            Attester {
                id: "OTHER".to_string(),
                senders: vec!["keys@other.org".to_string()],
            },
        ]),
        schedule: TestHarness::schedule(),
        ..EngineOptions::default()
    });
    harness
        .engine
        .request_attestation(ACCOUNT, "CRYPTUP")
        .unwrap();
    harness.engine.request_attestation(ACCOUNT, "OTHER").unwrap();
    harness
}

fn signed_text() -> String {
    PacketBuilder::new().packet().to_text().replace('\n', "\r\n")
}

#[tokio::test]
async fn test_happy_path_attests_and_stops_watching() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert!(matches!(
        report.outcomes[0],
        PacketOutcome::Submitted(SubmitOutcome::Attested(Completion::Transitioned(
            Appended::Stored(_)
        )))
    ));
    assert!(report.stopped_watching);
    assert!(report.aborted.is_none());

    assert_eq!(h.api.initial_count(), 1);
    assert_eq!(h.api.replace_count(), 0);
    assert_eq!(h.processed(), vec!["CRYPTUP".to_string()]);
    assert!(h.requested().is_empty());

    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);
    assert_eq!(entries[0].result, "Successfully attested alice@example.com");
    assert_eq!(entries[0].attempt, 1);
    assert!(!h.engine.is_watching(ACCOUNT));
}

#[tokio::test]
async fn test_signs_exact_packet_block() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());

    h.engine.run_cycle(ACCOUNT).await.unwrap();

    let signed = h.crypto.signed.lock().unwrap().clone();
    assert_eq!(signed, vec![signed_text()]);
    assert_eq!(entries_packet(&h), signed_text());
    assert_eq!(
        h.api.initial_calls.lock().unwrap()[0],
        fake_signature(&signed_text())
    );
}

fn entries_packet(h: &TestHarness) -> String {
    h.entries()[0].packet.clone()
}

#[tokio::test]
async fn test_email_hash_mismatch_is_rejected_and_watch_continues() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(
        PacketBuilder::new()
            .for_account("mallory@example.com")
            .email_body(),
    );
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(
        report.outcomes,
        vec![PacketOutcome::Rejected(Rejection::EmailMismatch)]
    );
    assert_eq!(h.api.total_calls(), 0);

    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert!(entries[0].result.contains("does not match your settings"));
    assert!(entries[0].result.contains("(email mismatch)"));
    assert_eq!(h.requested(), vec!["CRYPTUP".to_string()]);
    assert!(h.engine.is_watching(ACCOUNT));
    h.engine.shutdown();
}

#[tokio::test]
async fn test_fingerprint_mismatch_is_never_signed() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(
        PacketBuilder::new()
            .fingerprint(OTHER_FINGERPRINT)
            .email_body(),
    );

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(
        report.outcomes,
        vec![PacketOutcome::Rejected(Rejection::KeyMismatch)]
    );
    assert_eq!(h.crypto.sign_count(), 0);
    assert_eq!(h.api.total_calls(), 0);
    assert!(h.entries()[0].result.contains("(key mismatch)"));
    assert!(h.processed().is_empty());
}

#[tokio::test]
async fn test_unknown_attester_is_rejected() {
    let h = TestHarness::new();
    h.request();
    h.fetcher
        .deliver(PacketBuilder::new().attester("EVIL").email_body());

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(
        report.outcomes,
        vec![PacketOutcome::Rejected(Rejection::UnrecognizedAttester)]
    );
    assert!(h.entries()[0].result.contains("(unrecognized attester)"));
}

#[tokio::test]
async fn test_already_processed_attester_is_not_resubmitted() {
    let h = two_attester_harness();
    h.fetcher.deliver(PacketBuilder::new().email_body());

    h.engine.run_cycle(ACCOUNT).await.unwrap();
    assert_eq!(h.api.initial_count(), 1);

    for round in 0..3 {
        h.engine.start_watching(ACCOUNT);
        let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

        assert_eq!(report.outcomes, vec![PacketOutcome::AlreadyAttested]);
        assert!(report.stopped_watching);
        assert!(!h.engine.is_watching(ACCOUNT));
        assert_eq!(h.api.initial_count(), 1, "round {}", round);

        let last = h.entries().pop().unwrap();
        assert!(last.success);
        assert_eq!(last.result, MSG_ALREADY_ATTESTED);
    }

    assert_eq!(h.crypto.sign_count(), 1);
    assert_eq!(h.entries().len(), 4);
    assert_eq!(h.processed(), vec!["CRYPTUP".to_string()]);
    assert_eq!(h.requested(), vec!["OTHER".to_string()]);
}

#[tokio::test]
async fn test_forged_packet_for_processed_attester_is_rejected() {
    let h = two_attester_harness();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.engine.run_cycle(ACCOUNT).await.unwrap();

    h.fetcher.messages.lock().unwrap().clear();
    h.fetcher.deliver(
        PacketBuilder::new()
            .fingerprint(OTHER_FINGERPRINT)
            .email_body(),
    );
    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(
        report.outcomes,
        vec![PacketOutcome::Rejected(Rejection::KeyMismatch)]
    );
    assert!(!h.entries().pop().unwrap().success);
}

#[tokio::test]
async fn test_duplicate_packet_in_one_cycle() {
    let h = two_attester_harness();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.fetcher.deliver(PacketBuilder::new().email_body());

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes[0].stops_watch());
    assert_eq!(report.outcomes[1], PacketOutcome::AlreadyAttested);
    assert_eq!(h.api.initial_count(), 1);
    assert_eq!(
        h.entries().iter().filter(|e| e.success).count(),
        2,
        "one success entry plus one already-attested entry"
    );
}

#[tokio::test]
async fn test_replacement_uses_replace_endpoint() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(
        PacketBuilder::new()
            .replacement(OTHER_FINGERPRINT)
            .email_body(),
    );

    h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(h.api.initial_count(), 0);
    assert_eq!(h.api.replace_count(), 1);
    assert_eq!(h.processed(), vec!["CRYPTUP".to_string()]);
}

#[tokio::test]
async fn test_transient_api_error_leaves_no_trace() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.api
        .respond(Err(RemoteError::Network("connection reset".to_string())));
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(report.outcomes.len(), 1, "cycle aborts after the failure");
    assert!(matches!(
        report.aborted,
        Some(CycleAbort::Remote(RemoteError::Network(_)))
    ));
    assert_eq!(h.api.initial_count(), 1);
    assert!(h.entries().is_empty());
    assert_eq!(h.requested(), vec!["CRYPTUP".to_string()]);
    assert!(h.processed().is_empty());
    assert!(h.engine.is_watching(ACCOUNT));
    h.engine.shutdown();
}

#[tokio::test]
async fn test_server_and_auth_errors_are_transient() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.api.respond(Err(RemoteError::Server {
        status: 503,
        detail: "maintenance".to_string(),
    }));
    h.api
        .respond(Err(RemoteError::Auth("token expired".to_string())));

    h.engine.run_cycle(ACCOUNT).await.unwrap();
    h.engine.run_cycle(ACCOUNT).await.unwrap();
    assert!(h.entries().is_empty());

    // The next tick succeeds.
    h.engine.run_cycle(ACCOUNT).await.unwrap();
    assert_eq!(h.api.initial_count(), 3);
    assert_eq!(h.processed(), vec!["CRYPTUP".to_string()]);
    assert_eq!(h.entries().len(), 1);
}

#[tokio::test]
async fn test_rejected_request_is_logged_with_detail() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.api.respond(Err(RemoteError::Rejected {
        status: 400,
        detail: "signature invalid".to_string(),
    }));
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert!(report.aborted.is_none());
    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert_eq!(entries[0].result, "Attester request failed: signature invalid");
    assert!(h.engine.is_watching(ACCOUNT));
    h.engine.shutdown();
}

#[tokio::test]
async fn test_refused_attestation_is_logged() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.api.respond(Ok(AttestResponse { attested: false }));

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(
        report.outcomes,
        vec![PacketOutcome::Submitted(SubmitOutcome::Refused)]
    );
    let entries = h.entries();
    assert!(entries[0].result.starts_with("Refused by attester CRYPTUP"));
    assert_eq!(h.requested(), vec!["CRYPTUP".to_string()]);
}

#[tokio::test]
async fn test_wrong_passphrase_logs_missing_passphrase() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    *h.key_store.passphrase.lock().unwrap() = Some("wrong".to_string());

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert!(matches!(
        report.outcomes[0],
        PacketOutcome::Submitted(SubmitOutcome::KeyLocked(_))
    ));
    assert_eq!(h.entries()[0].result, MSG_MISSING_PASSPHRASE);
    assert_eq!(h.api.total_calls(), 0);
}

#[tokio::test]
async fn test_sign_failure_is_logged() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.crypto.fail_sign.store(true, Ordering::SeqCst);

    h.engine.run_cycle(ACCOUNT).await.unwrap();

    let entries = h.entries();
    assert!(entries[0]
        .result
        .starts_with("Error signing the attest message:"));
    assert_eq!(h.api.total_calls(), 0);
}

#[tokio::test]
async fn test_no_primary_key_skips_silently() {
    let h = TestHarness::new();
    h.request();
    h.key_store.remove_key();

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(report.skipped, Some(CycleSkip::NoPrimaryKey));
    assert_eq!(h.fetcher.search_count(), 0);
    assert!(h.entries().is_empty());
}

#[tokio::test]
async fn test_no_passphrase_skips_silently() {
    let h = TestHarness::new();
    h.request();
    h.key_store.forget_passphrase();
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(report.skipped, Some(CycleSkip::NoPassphrase));
    assert_eq!(h.fetcher.search_count(), 0);
    assert!(h.entries().is_empty());
    assert!(h.engine.is_watching(ACCOUNT));
    h.engine.shutdown();
}

#[tokio::test]
async fn test_key_store_failure_aborts_without_log() {
    let h = TestHarness::new();
    h.request();
    h.key_store
        .fail_with(StoreError::Unavailable("keyring locked".to_string()));

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert!(matches!(report.aborted, Some(CycleAbort::KeyStore(_))));
    assert!(h.entries().is_empty());
}

#[tokio::test]
async fn test_nothing_requested_stops_watching() {
    let h = TestHarness::new();
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert!(report.cannot_fetch);
    assert!(report.stopped_watching);
    assert!(!h.engine.is_watching(ACCOUNT));
    assert_eq!(h.fetcher.search_count(), 0);

    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert_eq!(
        entries[0].result,
        "cannot fetch attest emails for alice@example.com"
    );
}

#[tokio::test]
async fn test_unreadable_inbox_stops_watching() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.readable.store(false, Ordering::SeqCst);
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert!(report.cannot_fetch);
    assert!(!h.engine.is_watching(ACCOUNT));
    assert_eq!(h.entries().len(), 1);
}

#[tokio::test]
async fn test_transient_fetch_error_leaves_no_trace() {
    let h = TestHarness::new();
    h.request();
    h.fetcher
        .fail_with(RemoteError::Network("timeout".to_string()));
    h.engine.start_watching(ACCOUNT);

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert!(matches!(report.aborted, Some(CycleAbort::Remote(_))));
    assert!(h.entries().is_empty());
    assert!(h.engine.is_watching(ACCOUNT));
    h.engine.shutdown();
}

#[tokio::test]
async fn test_permanent_fetch_error_is_logged() {
    let h = TestHarness::new();
    h.request();
    h.fetcher
        .fail_with(RemoteError::Protocol("folder missing".to_string()));

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert!(report.aborted.is_none());
    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].result.starts_with("Error fetching attest emails:"));
}

#[tokio::test]
async fn test_unparseable_message_does_not_block_others() {
    let h = TestHarness::new();
    h.request();
    h.fetcher.deliver(broken_email_body());
    h.fetcher.deliver(PacketBuilder::new().email_body());

    let report = h.engine.run_cycle(ACCOUNT).await.unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(report.outcomes[0], PacketOutcome::ParseFailed(_)));
    assert!(report.outcomes[1].stops_watch());

    let entries = h.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]
        .result
        .starts_with("Could not parse attest message (alice@example.com):"));
    assert!(entries[1].success);
}

#[tokio::test]
async fn test_mailbox_query_targets_attester_senders() {
    let h = TestHarness::new();
    h.request();

    h.engine.run_cycle(ACCOUNT).await.unwrap();

    let queries = h.fetcher.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].from, vec!["attest@cryptup.org".to_string()]);
    assert_eq!(queries[0].to, ACCOUNT);
    assert!(queries[0]
        .to_gmail_query()
        .starts_with("from:attest@cryptup.org to:alice@example.com"));
}

#[tokio::test]
async fn test_log_cap_through_engine() {
    let h = TestHarness::with_options(EngineOptions {
        max_log_entries: 3,
        schedule: TestHarness::schedule(),
        ..EngineOptions::default()
    });
    h.request();
    h.fetcher.deliver(
        PacketBuilder::new()
            .for_account("mallory@example.com")
            .email_body(),
    );

    for _ in 0..3 {
        h.engine.run_cycle(ACCOUNT).await.unwrap();
    }
    assert_eq!(h.entries().len(), 3);

    h.engine.run_cycle(ACCOUNT).await.unwrap();
    let entries = h.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, "DELETED 3 LOGS");
    assert_eq!(entries[0].attempt, 1);
}

#[tokio::test]
async fn test_request_unknown_attester() {
    let h = TestHarness::new();
    let result = h.engine.request_attestation(ACCOUNT, "EVIL");
    assert!(matches!(result, Err(AttestError::UnknownAttester(ref id)) if id == "EVIL"));
    assert!(h.requested().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_cycles_for_one_account_do_not_overlap() {
    let h = two_attester_harness();
    h.fetcher.deliver(PacketBuilder::new().email_body());
    h.fetcher.delay_search(Duration::from_secs(10));

    let (first, second) = tokio::join!(h.engine.run_cycle(ACCOUNT), h.engine.run_cycle(ACCOUNT));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(matches!(
        first.outcomes[..],
        [PacketOutcome::Submitted(SubmitOutcome::Attested(_))]
    ));
    assert_eq!(second.outcomes, vec![PacketOutcome::AlreadyAttested]);
    assert_eq!(h.api.total_calls(), 1);
    assert_eq!(h.crypto.sign_count(), 1);

    let started = h.fetcher.search_started.lock().unwrap().clone();
    assert_eq!(started.len(), 2);
    assert!(started[1] - started[0] >= Duration::from_secs(10));
}
