mod common;

use common::{day, engine_with, hashes};
use remitrec::application::ledger::MatchGroup;
use remitrec::domain::actor::Actor;
use remitrec::domain::order::Order;
use remitrec::domain::status::ReconciliationStatus;
use remitrec::domain::transaction::BankTransaction;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_acme_full_lifecycle() {
    let engine = engine_with(
        vec![BankTransaction::new("h1", "ACME CORP", day(2), dec!(500.00)).with_reference("AB123456")],
        vec![Order::new("o1", "ACME CORP", day(1), dec!(500.00)).with_reference("AB123456")],
    )
    .await;
    let actor = Actor::operator("dana");

    let report = engine.run_suggestions().await.unwrap();
    assert_eq!(report.suggestions_count, 1);
    let stats = report.suggestions[0].stats;
    assert!(stats.reference_match);
    assert_eq!(stats.name_similarity, 100);
    assert_eq!(stats.amount_diff, dec!(0.00));

    let tx = engine.get_transaction("h1").await.unwrap().unwrap();
    assert_eq!(tx.reconciliation_status, ReconciliationStatus::SuggestedMatch);
    assert_eq!(tx.candidate_order_id.as_deref(), Some("o1"));
    assert_eq!(tx.order_id, None);

    engine
        .approve_match(&actor, &hashes(&["h1"]), "o1", None)
        .await
        .unwrap();
    let tx = engine.get_transaction("h1").await.unwrap().unwrap();
    assert_eq!(tx.reconciliation_status, ReconciliationStatus::TemporarilyMatched);
    assert_eq!(tx.order_id.as_deref(), Some("o1"));
    assert_eq!(tx.candidate_order_id, None);

    let receipt = engine
        .reconcile_batch(&actor, &[MatchGroup::new("o1", hashes(&["h1"]))])
        .await
        .unwrap();
    let tx = engine.get_transaction("h1").await.unwrap().unwrap();
    let order = engine.get_order("o1").await.unwrap().unwrap();
    assert_eq!(tx.reconciliation_status, ReconciliationStatus::Reconciled);
    assert_eq!(order.reconciliation_status, ReconciliationStatus::Reconciled);
    assert_eq!(tx.batch_id, Some(receipt.batch_id));
    assert_eq!(order.batch_id, Some(receipt.batch_id));
    assert_eq!(tx.reconciled_at, order.reconciled_at);
    assert_eq!(order.reconciled_by.as_deref(), Some("dana"));

    engine
        .unconciliate(&actor, &hashes(&["h1"]), "o1")
        .await
        .unwrap();
    let tx = engine.get_transaction("h1").await.unwrap().unwrap();
    let order = engine.get_order("o1").await.unwrap().unwrap();
    assert_eq!(tx.reconciliation_status, ReconciliationStatus::Unmatched);
    assert_eq!(order.reconciliation_status, ReconciliationStatus::Unmatched);
    assert_eq!(tx.batch_id, None);
    assert_eq!(order.batch_id, None);
    assert_eq!(tx.order_id, None);
    assert!(order.transaction_ids.is_empty());
    assert!(engine.check_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tolerance_boundary() {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(99.00)),
            BankTransaction::new("h2", "ACME", day(1), dec!(98.99)),
        ],
        vec![
            Order::new("o1", "ACME", day(1), dec!(100.00)),
            Order::new("o2", "ACME", day(1), dec!(100.00)),
        ],
    )
    .await;
    let admin = Actor::admin("alice");

    // Shortfall of exactly 1.00 is within tolerance.
    engine
        .approve_match(&admin, &hashes(&["h1"]), "o1", None)
        .await
        .unwrap();

    // 1.01 needs a reason; blank reasons do not count.
    let err = engine
        .approve_match(&admin, &hashes(&["h2"]), "o2", None)
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    let err = engine
        .approve_match(&admin, &hashes(&["h2"]), "o2", Some("   "))
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());

    engine
        .approve_match(&admin, &hashes(&["h2"]), "o2", Some("bank fee"))
        .await
        .unwrap();
    let tx = engine.get_transaction("h2").await.unwrap().unwrap();
    assert_eq!(tx.reason_to_override.as_deref(), Some("bank fee"));
    assert_eq!(tx.overridden_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_overpayment_needs_no_override() {
    let engine = engine_with(
        vec![BankTransaction::new("h1", "ACME", day(1), dec!(150.00))],
        vec![Order::new("o1", "ACME", day(1), dec!(100.00))],
    )
    .await;
    engine
        .approve_match(&Actor::operator("bob"), &hashes(&["h1"]), "o1", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_approval_leaves_state_untouched() {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(50.00)),
            BankTransaction::new("h2", "ACME", day(1), dec!(50.00)),
        ],
        vec![Order::new("o1", "ACME", day(1), dec!(100.00))],
    )
    .await;
    let before_txs = engine.list_transactions(None).await.unwrap();
    let before_orders = engine.list_orders(None).await.unwrap();

    // The second hash does not exist, so the first must not be linked either.
    let err = engine
        .approve_match(&Actor::operator("bob"), &hashes(&["h1", "missing"]), "o1", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = engine
        .approve_match(&Actor::operator("bob"), &hashes(&["h1"]), "nope", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(engine.list_transactions(None).await.unwrap(), before_txs);
    assert_eq!(engine.list_orders(None).await.unwrap(), before_orders);
}

#[tokio::test]
async fn test_transaction_cannot_be_linked_twice() {
    let engine = engine_with(
        vec![BankTransaction::new("h1", "ACME", day(1), dec!(10.00))],
        vec![
            Order::new("o1", "ACME", day(1), dec!(10.00)),
            Order::new("o2", "ACME", day(1), dec!(10.00)),
        ],
    )
    .await;
    let actor = Actor::operator("bob");
    engine
        .approve_match(&actor, &hashes(&["h1"]), "o1", None)
        .await
        .unwrap();

    let err = engine
        .approve_match(&actor, &hashes(&["h1"]), "o2", None)
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    let o2 = engine.get_order("o2").await.unwrap().unwrap();
    assert!(o2.transaction_ids.is_empty());
    assert_eq!(o2.reconciliation_status, ReconciliationStatus::Unmatched);
}

#[tokio::test]
async fn test_unmatch_always_resets_order() {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(30.00)),
            BankTransaction::new("h2", "ACME", day(1), dec!(30.00)),
            BankTransaction::new("h3", "ACME", day(1), dec!(40.00)),
        ],
        vec![Order::new("o1", "ACME", day(1), dec!(100.00))],
    )
    .await;
    let actor = Actor::operator("bob");
    engine
        .approve_match(&actor, &hashes(&["h1", "h2", "h3"]), "o1", None)
        .await
        .unwrap();

    engine.unmatch(&actor, "h2").await.unwrap();

    let order = engine.get_order("o1").await.unwrap().unwrap();
    assert_eq!(order.reconciliation_status, ReconciliationStatus::Unmatched);
    assert!(order.transaction_ids.is_empty());
    for hash in ["h1", "h2", "h3"] {
        let tx = engine.get_transaction(hash).await.unwrap().unwrap();
        assert_eq!(tx.reconciliation_status, ReconciliationStatus::Unmatched);
        assert_eq!(tx.order_id, None);
    }
    assert!(engine.check_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unmatch_refuses_other_statuses() {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(10.00)),
            BankTransaction::new("h2", "ACME", day(1), dec!(10.00)),
        ],
        vec![Order::new("o1", "ACME", day(1), dec!(10.00))],
    )
    .await;
    let actor = Actor::operator("bob");

    assert!(engine.unmatch(&actor, "h1").await.unwrap_err().is_policy_violation());
    assert!(engine.unmatch(&actor, "nope").await.unwrap_err().is_not_found());

    engine
        .reconcile_batch(&actor, &[MatchGroup::new("o1", hashes(&["h2"]))])
        .await
        .unwrap();
    assert!(engine.unmatch(&actor, "h2").await.unwrap_err().is_policy_violation());
}

#[tokio::test]
async fn test_reject_returns_both_to_unmatched() {
    let engine = engine_with(
        vec![BankTransaction::new("h1", "ACME CORP", day(2), dec!(500.00)).with_reference("AB123456")],
        vec![Order::new("o1", "ACME CORP", day(2), dec!(500.00)).with_reference("AB123456")],
    )
    .await;
    let actor = Actor::operator("bob");
    engine.run_suggestions().await.unwrap();

    engine.reject_suggestion(&actor, "h1", "o1").await.unwrap();
    let tx = engine.get_transaction("h1").await.unwrap().unwrap();
    let order = engine.get_order("o1").await.unwrap().unwrap();
    assert_eq!(tx.reconciliation_status, ReconciliationStatus::Unmatched);
    assert_eq!(tx.candidate_order_id, None);
    assert_eq!(order.reconciliation_status, ReconciliationStatus::Unmatched);

    // Already gone: a no-op.
    engine.reject_suggestion(&actor, "h1", "o1").await.unwrap();
}

#[tokio::test]
async fn test_failed_batch_commits_nothing_and_keeps_batch_id() {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(10.00)),
            BankTransaction::new("h2", "Globex", day(1), dec!(20.00)),
        ],
        vec![
            Order::new("o1", "ACME", day(1), dec!(10.00)),
            Order::new("o2", "Globex", day(1), dec!(20.00)),
        ],
    )
    .await;
    let actor = Actor::operator("bob");

    let err = engine
        .reconcile_batch(
            &actor,
            &[
                MatchGroup::new("o1", hashes(&["h1"])),
                MatchGroup::new("o2", hashes(&["missing"])),
            ],
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let o1 = engine.get_order("o1").await.unwrap().unwrap();
    assert_eq!(o1.reconciliation_status, ReconciliationStatus::Unmatched);
    assert_eq!(o1.batch_id, None);

    let err = engine
        .reconcile_batch(
            &actor,
            &[
                MatchGroup::new("o1", hashes(&["h1"])),
                MatchGroup::new("o2", hashes(&["h1"])),
            ],
        )
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());

    assert!(engine.reconcile_batch(&actor, &[]).await.unwrap_err().is_policy_violation());

    let receipt = engine
        .reconcile_batch(
            &actor,
            &[
                MatchGroup::new("o1", hashes(&["h1"])),
                MatchGroup::new("o2", hashes(&["h2"])),
            ],
        )
        .await
        .unwrap();
    assert_eq!(receipt.batch_id, 1);
    let batch = engine.batch(1).await.unwrap().unwrap();
    assert_eq!(batch.orders.len(), 2);
    assert_eq!(batch.transactions.len(), 2);
}

#[tokio::test]
async fn test_reconciled_records_are_final_until_unconciliated() {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(10.00)),
            BankTransaction::new("h2", "ACME", day(1), dec!(10.00)),
        ],
        vec![
            Order::new("o1", "ACME", day(1), dec!(10.00)),
            Order::new("o2", "ACME", day(1), dec!(10.00)),
        ],
    )
    .await;
    let actor = Actor::admin("alice");
    engine
        .reconcile_batch(&actor, &[MatchGroup::new("o1", hashes(&["h1"]))])
        .await
        .unwrap();

    let err = engine
        .reconcile_batch(&actor, &[MatchGroup::new("o2", hashes(&["h1"]))])
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    let err = engine
        .approve_match(&actor, &hashes(&["h2"]), "o1", None)
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    let err = engine.remove_transaction(&actor, "h1").await.unwrap_err();
    assert!(err.is_policy_violation());
    let err = engine
        .unconciliate(&actor, &hashes(&["h2"]), "o1")
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    assert!(engine.check_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_approval_counts_already_linked_transactions() {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(60.00)),
            BankTransaction::new("h2", "ACME", day(1), dec!(40.00)),
        ],
        vec![Order::new("o1", "ACME", day(1), dec!(100.00))],
    )
    .await;
    let actor = Actor::operator("bob");

    // 40.00 short on its own, but inside tolerance once h2 joins.
    let err = engine
        .approve_match(&actor, &hashes(&["h1"]), "o1", None)
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    engine
        .approve_match(&actor, &hashes(&["h1"]), "o1", Some("partial"))
        .await
        .unwrap_err();

    let admin = Actor::admin("alice");
    engine
        .approve_match(&admin, &hashes(&["h1"]), "o1", Some("partial payment"))
        .await
        .unwrap();
    engine
        .approve_match(&actor, &hashes(&["h2"]), "o1", None)
        .await
        .unwrap();

    let order = engine.get_order("o1").await.unwrap().unwrap();
    assert_eq!(order.transaction_ids, hashes(&["h1", "h2"]));
    assert!(engine.check_consistency().await.unwrap().is_empty());
}

async fn partially_unconciliated() -> remitrec::application::engine::ReconciliationEngine {
    let engine = engine_with(
        vec![
            BankTransaction::new("h1", "ACME", day(1), dec!(60.00)),
            BankTransaction::new("h2", "ACME", day(1), dec!(40.00)),
            BankTransaction::new("h3", "ACME", day(1), dec!(100.00)),
        ],
        vec![Order::new("o1", "ACME", day(1), dec!(100.00))],
    )
    .await;
    let actor = Actor::operator("bob");
    engine
        .reconcile_batch(&actor, &[MatchGroup::new("o1", hashes(&["h1", "h2"]))])
        .await
        .unwrap();
    engine
        .unconciliate(&actor, &hashes(&["h1"]), "o1")
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn test_undo_batch_unlinks_partially_unconciliated_order() {
    let engine = partially_unconciliated().await;
    let order = engine.get_order("o1").await.unwrap().unwrap();
    assert_eq!(order.reconciliation_status, ReconciliationStatus::Unmatched);
    assert_eq!(order.transaction_ids, hashes(&["h2"]));
    assert!(engine.check_consistency().await.unwrap().is_empty());

    let released = engine.undo_batch(&Actor::operator("bob"), 1).await.unwrap();
    assert_eq!(released, 1);

    let order = engine.get_order("o1").await.unwrap().unwrap();
    assert!(order.transaction_ids.is_empty());
    assert_eq!(order.reconciliation_status, ReconciliationStatus::Unmatched);
    let h2 = engine.get_transaction("h2").await.unwrap().unwrap();
    assert_eq!(h2.reconciliation_status, ReconciliationStatus::Unmatched);
    assert_eq!(h2.order_id, None);
    assert!(engine.check_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_leftover_reconciled_transactions_block_new_matches() {
    let engine = partially_unconciliated().await;
    let actor = Actor::admin("alice");

    let err = engine
        .reconcile_batch(&actor, &[MatchGroup::new("o1", hashes(&["h3"]))])
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());
    assert!(err.to_string().contains("unconciliate the remaining transactions first"));

    let err = engine
        .approve_match(&actor, &hashes(&["h1"]), "o1", Some("retry"))
        .await
        .unwrap_err();
    assert!(err.is_policy_violation());

    let h2 = engine.get_transaction("h2").await.unwrap().unwrap();
    assert_eq!(h2.reconciliation_status, ReconciliationStatus::Reconciled);
    assert_eq!(h2.batch_id, Some(1));
    let h3 = engine.get_transaction("h3").await.unwrap().unwrap();
    assert_eq!(h3.reconciliation_status, ReconciliationStatus::Unmatched);

    // The order is not offered as a suggestion target either.
    assert_eq!(engine.run_suggestions().await.unwrap().suggestions_count, 0);

    // Once the rest is unconciliated the order can be reconciled again.
    engine
        .unconciliate(&actor, &hashes(&["h2"]), "o1")
        .await
        .unwrap();
    let receipt = engine
        .reconcile_batch(&actor, &[MatchGroup::new("o1", hashes(&["h3"]))])
        .await
        .unwrap();
    assert_eq!(receipt.batch_id, 1);
    assert!(engine.check_consistency().await.unwrap().is_empty());
}
