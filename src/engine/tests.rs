use super::{BalanceCalculator, PointsService, SpendAllocator, TransactionRecorder};

use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};

use crate::models::{Balances, LedgerError, SpendableEntry, SpendingDetail, Transaction};
use crate::storage::{LedgerSession, LedgerStore, MemoryLedger, MemorySession};
use crate::types::{Payer, Points, TransactionId};

fn at(day: u32, hour: u32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2020, 11, day, hour, 0, 0).single()
        .ok_or_else(|| anyhow!("Invalid test timestamp"))
}

fn payer(name: &str) -> Result<Payer> {
    Ok(Payer::from_str(name)?)
}

fn earn(name: &str, points: Points, timestamp: DateTime<Utc>) -> Result<Transaction> {
    Ok(Transaction { payer: payer(name)?, points, timestamp })
}

fn detail(name: &str, points: Points) -> Result<SpendingDetail> {
    Ok(SpendingDetail::new(payer(name)?, points))
}

fn balances(pairs: &[(&str, Points)]) -> Result<Balances> {
    pairs.iter().map(|(name, points)| Ok((payer(name)?, *points))).collect()
}

fn create_service(ledger: &Arc<MemoryLedger>) -> PointsService<MemoryLedger> {
    PointsService::new(ledger.clone(), Duration::from_secs(5))
}

/// A, B and C earned 100, 200 and 300 points, in that order.
async fn create_abc_service() -> Result<(Arc<MemoryLedger>, PointsService<MemoryLedger>)> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = create_service(&ledger);

    service.add(&earn("A", 100, at(1, 10)?)?).await?;
    service.add(&earn("B", 200, at(1, 11)?)?).await?;
    service.add(&earn("C", 300, at(1, 12)?)?).await?;

    Ok((ledger, service))
}

async fn assert_ledger_invariants(ledger: &MemoryLedger) -> Result<()> {
    for entry in ledger.entries().await {
        assert!(entry.remaining_points >= 0, "transaction [{}] went negative", entry.id);
        assert!(entry.remaining_points <= entry.points.max(0), "transaction [{}] exceeds its face value", entry.id);
    }

    let session = ledger.begin().await?;

    for (payer, points) in BalanceCalculator::balance(&session)? {
        assert!(points >= 0, "payer [{payer}] has a negative balance");
    }

    Ok(())
}

#[tokio::test]
async fn test_positive_adds_sum_per_payer() -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = create_service(&ledger);

    service.add(&earn("DANNON", 300, at(1, 10)?)?).await?;
    service.add(&earn("UNILEVER", 200, at(1, 11)?)?).await?;
    service.add(&earn("DANNON", 1000, at(2, 14)?)?).await?;
    service.add(&earn("MILLER COORS", 10_000, at(1, 14)?)?).await?;

    assert_eq!(service.balance().await?, balances(&[("DANNON", 1300), ("UNILEVER", 200), ("MILLER COORS", 10_000)])?);
    assert_ledger_invariants(&ledger).await?;

    Ok(())
}

#[tokio::test]
async fn test_balance_is_idempotent_without_writes() -> Result<()> {
    let (_, service) = create_abc_service().await?;

    let first = service.balance().await?;
    let second = service.balance().await?;

    assert_eq!(first, second);

    Ok(())
}

#[tokio::test]
async fn test_spend_within_oldest_transaction() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;

    let spent = service.spend(100).await?;

    assert_eq!(spent, vec![detail("A", -100)?]);
    assert_eq!(service.balance().await?, balances(&[("A", 0), ("B", 200), ("C", 300)])?);
    assert_ledger_invariants(&ledger).await?;

    Ok(())
}

#[tokio::test]
async fn test_spend_across_payers_in_timestamp_order() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;

    let spent = service.spend(200).await?;

    assert_eq!(spent, vec![detail("A", -100)?, detail("B", -100)?]);
    assert_eq!(service.balance().await?, balances(&[("A", 0), ("B", 100), ("C", 300)])?);
    assert_ledger_invariants(&ledger).await?;

    Ok(())
}

#[tokio::test]
async fn test_spend_order_follows_timestamps_not_insertion() -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = create_service(&ledger);

    service.add(&earn("DANNON", 1000, at(2, 14)?)?).await?;
    service.add(&earn("UNILEVER", 200, at(1, 11)?)?).await?;
    service.add(&earn("MILLER COORS", 10_000, at(1, 14)?)?).await?;
    service.add(&earn("DANNON", 300, at(1, 10)?)?).await?;

    let spent = service.spend(5000).await?;

    assert_eq!(spent, vec![detail("DANNON", -300)?, detail("UNILEVER", -200)?, detail("MILLER COORS", -4500)?]);
    assert_eq!(service.balance().await?, balances(&[("DANNON", 1000), ("UNILEVER", 0), ("MILLER COORS", 5500)])?);

    Ok(())
}

#[tokio::test]
async fn test_spend_sums_several_transactions_of_one_payer() -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = create_service(&ledger);

    service.add(&earn("DANNON", 100, at(1, 10)?)?).await?;
    service.add(&earn("UNILEVER", 50, at(1, 11)?)?).await?;
    service.add(&earn("DANNON", 100, at(1, 9)?)?).await?;

    let spent = service.spend(230).await?;

    assert_eq!(spent, vec![detail("DANNON", -200)?, detail("UNILEVER", -30)?]);
    assert_eq!(service.balance().await?, balances(&[("DANNON", 0), ("UNILEVER", 20)])?);

    Ok(())
}

#[tokio::test]
async fn test_spend_exactly_at_transaction_boundary_consumes_it_whole() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;

    assert_eq!(service.spend(300).await?, vec![detail("A", -100)?, detail("B", -200)?]);
    assert_eq!(service.spend(1).await?, vec![detail("C", -1)?]);

    let entries = ledger.entries().await;

    assert_eq!(entries[0].remaining_points, 0);
    assert_eq!(entries[1].remaining_points, 0);
    assert_eq!(entries[2].remaining_points, 299);

    Ok(())
}

#[tokio::test]
async fn test_spend_records_negative_audit_rows() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;

    service.spend(200).await?;

    let entries = ledger.entries().await;
    let audit: Vec<(Payer, Points, Points)> = entries[3..].iter()
        .map(|entry| (entry.payer.clone(), entry.points, entry.remaining_points))
        .collect();

    assert_eq!(entries.len(), 5);
    assert_eq!(audit, vec![(payer("A")?, -100, 0), (payer("B")?, -100, 0)]);

    Ok(())
}

#[tokio::test]
async fn test_insufficient_points_leaves_ledger_unchanged() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;
    let before = ledger.entries().await;

    let result = service.spend(1000).await;

    assert!(matches!(result, Err(LedgerError::InsufficientPoints { requested: 1000, available: 600 })));
    assert_eq!(ledger.entries().await, before);
    assert_eq!(service.balance().await?, balances(&[("A", 100), ("B", 200), ("C", 300)])?);

    Ok(())
}

#[tokio::test]
async fn test_non_positive_spend_allocates_nothing() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;

    assert!(service.spend(0).await?.is_empty());
    assert!(service.spend(-5).await?.is_empty());
    assert_eq!(ledger.entries().await.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_negative_add_corrects_balance() -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = create_service(&ledger);

    service.add(&earn("A", 50, at(1, 10)?)?).await?;
    service.add(&earn("A", -20, at(1, 11)?)?).await?;

    assert_eq!(service.balance().await?, balances(&[("A", 30)])?);
    assert_ledger_invariants(&ledger).await?;

    Ok(())
}

#[tokio::test]
async fn test_negative_add_beyond_balance_is_rejected_atomically() -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = create_service(&ledger);

    service.add(&earn("A", 50, at(1, 10)?)?).await?;
    service.add(&earn("A", -20, at(1, 11)?)?).await?;
    let before = ledger.entries().await;

    let result = service.add(&earn("A", -100, at(1, 12)?)?).await;

    assert!(matches!(result, Err(LedgerError::InvalidCorrection { points: -100, .. })));
    assert_eq!(ledger.entries().await, before);
    assert_eq!(service.balance().await?, balances(&[("A", 30)])?);

    Ok(())
}

#[tokio::test]
async fn test_negative_add_debits_oldest_points_across_payers() -> Result<()> {
    let (_, service) = create_abc_service().await?;

    service.add(&earn("B", -150, at(1, 13)?)?).await?;

    assert_eq!(service.balance().await?, balances(&[("A", 0), ("B", 150), ("C", 300)])?);

    Ok(())
}

#[tokio::test]
async fn test_most_negative_correction_is_rejected() -> Result<()> {
    let (_, service) = create_abc_service().await?;

    let result = service.add(&earn("A", Points::MIN, at(1, 13)?)?).await;

    assert!(matches!(result, Err(LedgerError::InvalidCorrection { .. })));
    assert_eq!(service.balance().await?, balances(&[("A", 100), ("B", 200), ("C", 300)])?);

    Ok(())
}

#[tokio::test]
async fn test_earn_overflowing_payer_balance_is_rejected() -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = create_service(&ledger);

    service.add(&earn("A", Points::MAX, at(1, 10)?)?).await?;
    let before = ledger.entries().await;

    let result = service.add(&earn("A", 1, at(1, 11)?)?).await;

    assert!(matches!(result, Err(LedgerError::BalanceOverflow { points: 1, .. })));
    assert_eq!(ledger.entries().await, before);
    assert_eq!(service.balance().await?, balances(&[("A", Points::MAX)])?);

    service.add(&earn("B", 5, at(1, 12)?)?).await?;

    assert_eq!(service.spend(5).await?, vec![detail("A", -5)?]);
    assert_eq!(service.balance().await?, balances(&[("A", Points::MAX - 5), ("B", 5)])?);
    assert_ledger_invariants(&ledger).await?;

    Ok(())
}

#[tokio::test]
async fn test_allocator_is_speculative_until_recorded() -> Result<()> {
    let (ledger, _) = create_abc_service().await?;
    let session = ledger.begin().await?;

    let allocation = SpendAllocator::allocate(&session, 150)?;

    assert_eq!(allocation.details, vec![detail("A", -100)?, detail("B", -50)?]);
    assert_eq!(allocation.updated_remaining, BTreeMap::from([(1, 0), (2, 150)]));
    assert_eq!(session.query_positive_remaining()?[0].remaining_points, 100);

    Ok(())
}

#[tokio::test]
async fn test_recorder_stages_spend_on_the_session() -> Result<()> {
    let (ledger, _) = create_abc_service().await?;
    let mut session = ledger.begin().await?;

    let allocation = SpendAllocator::allocate(&session, 150)?;
    TransactionRecorder::record_spend(&mut session, &allocation, at(3, 9)?)?;

    assert_eq!(BalanceCalculator::balance(&session)?, balances(&[("A", 0), ("B", 150), ("C", 300)])?);

    drop(session);

    let session = ledger.begin().await?;

    assert_eq!(BalanceCalculator::balance(&session)?, balances(&[("A", 100), ("B", 200), ("C", 300)])?);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spends_never_double_spend() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;
    let service = Arc::new(service);

    let first = tokio::spawn({
        let service = service.clone();
        async move { service.spend(400).await }
    });
    let second = tokio::spawn({
        let service = service.clone();
        async move { service.spend(400).await }
    });

    let results = [first.await?, second.await?];
    let successes = results.iter().filter(|result| result.is_ok()).count();
    let rejections = results.iter()
        .filter(|result| matches!(result, Err(LedgerError::InsufficientPoints { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(rejections, 1);
    assert_eq!(service.balance().await?.values().sum::<Points>(), 200);
    assert_ledger_invariants(&ledger).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_spends_drain_exactly_the_balance() -> Result<()> {
    let (ledger, service) = create_abc_service().await?;
    let service = Arc::new(service);

    let handles: Vec<_> = (0..650)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.spend(1).await })
        })
        .collect();

    let mut successes = 0;

    for handle in handles {
        if handle.await?.is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 600);
    assert_eq!(service.balance().await?, balances(&[("A", 0), ("B", 0), ("C", 0)])?);
    assert_ledger_invariants(&ledger).await?;

    Ok(())
}

#[tokio::test]
async fn test_service_times_out_when_ledger_is_held() -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let service = PointsService::new(ledger.clone(), Duration::from_millis(50));

    let held = ledger.begin().await?;
    let result = service.balance().await;
    drop(held);

    assert!(matches!(result, Err(LedgerError::StorageFailure { operation: "begin", .. })));
    assert!(service.balance().await?.is_empty());

    Ok(())
}

/// Delegates to a memory session but refuses to commit.
struct BrokenSession(MemorySession);

impl LedgerSession for BrokenSession {
    fn insert(&mut self, payer: &Payer, points: Points, timestamp: DateTime<Utc>) -> Result<TransactionId, LedgerError> {
        self.0.insert(payer, points, timestamp)
    }

    fn query_positive_remaining(&self) -> Result<Vec<SpendableEntry>, LedgerError> {
        self.0.query_positive_remaining()
    }

    fn update_remaining(&mut self, updates: &BTreeMap<TransactionId, Points>) -> Result<(), LedgerError> {
        self.0.update_remaining(updates)
    }

    fn aggregate_balances(&self) -> Result<Balances, LedgerError> {
        self.0.aggregate_balances()
    }

    fn commit(self) -> Result<(), LedgerError> {
        Err(LedgerError::storage("commit", "disk full"))
    }
}

struct BrokenLedger(Arc<MemoryLedger>);

impl LedgerStore for BrokenLedger {
    type Session = BrokenSession;

    fn begin(&self) -> impl Future<Output = Result<Self::Session, LedgerError>> + Send {
        let ledger = self.0.clone();

        async move { Ok(BrokenSession(ledger.begin().await?)) }
    }
}

#[tokio::test]
async fn test_storage_failure_on_commit_applies_nothing() -> Result<()> {
    let (ledger, _) = create_abc_service().await?;
    let before = ledger.entries().await;
    let service = PointsService::new(Arc::new(BrokenLedger(ledger.clone())), Duration::from_secs(5));

    let spend = service.spend(150).await;
    let add = service.add(&earn("D", 10, at(1, 13)?)?).await;

    assert!(matches!(spend, Err(LedgerError::StorageFailure { .. })));
    assert!(matches!(add, Err(LedgerError::StorageFailure { .. })));
    assert_eq!(ledger.entries().await, before);

    Ok(())
}
