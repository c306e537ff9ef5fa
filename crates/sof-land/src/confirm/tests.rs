//! Confirmation module unit tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use solana_hash::Hash;
use solana_signature::Signature;
use tokio::time::Instant;

use super::*;
use crate::{
    ledger::{BlockReference, LedgerClient, SimulationOutcome, TransportError, TxStatus},
    signed::{SignedTransaction, test_support::signed_tx},
};

/// Responses returned in order, repeating the last one once exhausted.
#[derive(Debug)]
struct Scripted<T> {
    /// Ordered responses.
    responses: Vec<T>,
    /// Number of responses handed out.
    calls: Mutex<usize>,
}

impl<T: Clone> Scripted<T> {
    fn new(responses: Vec<T>) -> Self {
        Self {
            responses,
            calls: Mutex::new(0),
        }
    }

    fn next(&self) -> Option<T> {
        let mut calls = self.calls.lock().expect("scripted lock");
        let index = *calls;
        *calls += 1;
        self.responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
    }

    fn calls(&self) -> usize {
        *self.calls.lock().expect("scripted lock")
    }
}

/// Mock ledger that de-duplicates accepted payloads by signature, like the real network.
#[derive(Debug)]
struct MockLedger {
    /// Status responses per poll.
    statuses: Scripted<Result<TxStatus, TransportError>>,
    /// Send responses per call; `Ok` means accepted.
    sends: Scripted<Result<(), TransportError>>,
    /// Block height responses.
    heights: Scripted<u64>,
    /// Block reference expiry heights.
    expiries: Scripted<u64>,
    /// Simulation response.
    simulation: Result<SimulationOutcome, TransportError>,
    /// Distinct signatures accepted by the ledger.
    accepted: Mutex<HashSet<Signature>>,
    /// Simulation calls.
    simulations: Mutex<u64>,
}

impl MockLedger {
    fn with_statuses(statuses: Vec<Result<TxStatus, TransportError>>) -> Self {
        Self {
            statuses: Scripted::new(statuses),
            sends: Scripted::new(vec![Ok(())]),
            heights: Scripted::new(vec![0]),
            expiries: Scripted::new(vec![1_000]),
            simulation: Ok(SimulationOutcome::default()),
            accepted: Mutex::new(HashSet::new()),
            simulations: Mutex::new(0),
        }
    }

    fn send_calls(&self) -> usize {
        self.sends.calls()
    }

    fn accepted_count(&self) -> usize {
        self.accepted.lock().map(|set| set.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn latest_block_reference(&self) -> Result<BlockReference, TransportError> {
        let height = self.expiries.next().unwrap_or_default();
        Ok(BlockReference {
            blockhash: Hash::new_from_array([(height % 251) as u8; 32]),
            last_valid_block_height: height,
        })
    }

    async fn block_height(&self) -> Result<u64, TransportError> {
        Ok(self.heights.next().unwrap_or_default())
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<TxStatus, TransportError> {
        self.statuses.next().unwrap_or(Ok(TxStatus::Unknown))
    }

    async fn send_raw(&self, tx_bytes: &[u8]) -> Result<Signature, TransportError> {
        self.sends.next().unwrap_or(Ok(()))?;
        let signature = SignedTransaction::from_wire_bytes(tx_bytes.to_vec())
            .map(|tx| tx.signature())
            .map_err(|error| TransportError::Failure {
                message: error.to_string(),
            })?;
        if let Ok(mut accepted) = self.accepted.lock() {
            let _ = accepted.insert(signature);
        }
        Ok(signature)
    }

    async fn simulate(&self, _tx_bytes: &[u8]) -> Result<SimulationOutcome, TransportError> {
        if let Ok(mut calls) = self.simulations.lock() {
            *calls += 1;
        }
        self.simulation.clone()
    }
}

/// Observer event captured for ordering assertions.
#[derive(Debug, Clone, Eq, PartialEq)]
enum Event {
    Sent,
    Status(TxStatus),
    Success,
}

/// Observer that records hook invocations.
#[derive(Debug, Default)]
struct RecordingObserver {
    /// Recorded events in call order.
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<Event> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    fn statuses(&self) -> Vec<TxStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Status(status) => Some(status),
                Event::Sent | Event::Success => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ConfirmationObserver for RecordingObserver {
    fn on_sent(&self, _signature: &Signature) {
        self.push(Event::Sent);
    }

    fn on_status_change(&self, _signature: &Signature, status: &TxStatus) {
        self.push(Event::Status(status.clone()));
    }

    fn on_success(&self, _signature: &Signature) {
        self.push(Event::Success);
    }
}

fn failure(message: &str) -> TransportError {
    TransportError::Failure {
        message: message.to_owned(),
    }
}

#[tokio::test(start_paused = true)]
async fn confirms_after_repeated_not_confirmed_statuses() {
    let ledger = Arc::new(MockLedger::with_statuses(vec![
        Ok(TxStatus::Unknown),
        Ok(TxStatus::NotConfirmed),
        Ok(TxStatus::NotConfirmed),
        Ok(TxStatus::Confirmed),
    ]));
    let engine = ConfirmationEngine::new(ledger.clone());
    let observer = RecordingObserver::default();
    let tx = signed_tx([1_u8; 32]);

    let started = Instant::now();
    let result = engine
        .confirm_with_observer(&tx, Duration::from_secs(10), &observer)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result, Ok(tx.signature()));
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(4));
    assert_eq!(
        observer.statuses(),
        vec![
            TxStatus::Unknown,
            TxStatus::NotConfirmed,
            TxStatus::NotConfirmed,
            TxStatus::Confirmed,
        ]
    );
    let events = observer.events();
    assert_eq!(events.first(), Some(&Event::Sent));
    assert_eq!(events.last(), Some(&Event::Success));
    assert_eq!(ledger.statuses.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn timeout_surfaces_last_program_log_from_simulation() {
    let mut ledger = MockLedger::with_statuses(vec![Ok(TxStatus::NotConfirmed)]);
    ledger.simulation = Ok(SimulationOutcome {
        error: Some("{\"InstructionError\":[2,{\"Custom\":1}]}".to_owned()),
        logs: vec![
            "Program 6EF8 invoke [1]".to_owned(),
            "Program log: Instruction: Buy".to_owned(),
            "Program log: insufficient funds".to_owned(),
            "Program 6EF8 failed: custom program error: 0x1".to_owned(),
        ],
    });
    let ledger = Arc::new(ledger);
    let engine = ConfirmationEngine::new(ledger.clone());
    let observer = RecordingObserver::default();
    let tx = signed_tx([2_u8; 32]);

    let started = Instant::now();
    let result = engine
        .confirm_with_observer(&tx, Duration::from_secs(10), &observer)
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11));
    let error = result.expect_err("confirmation must time out");
    assert!(matches!(error, ConfirmationError::ProgramFailure { .. }));
    assert_eq!(error.reason(), "insufficient funds");
    assert_eq!(error.signature(), Some(tx.signature()));
    assert_eq!(observer.statuses().len(), 10);
    assert!(!observer.events().contains(&Event::Success));
    assert_eq!(*ledger.simulations.lock().expect("lock"), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_without_simulation_error_is_generic() {
    let ledger = Arc::new(MockLedger::with_statuses(vec![Ok(TxStatus::Unknown)]));
    let engine = ConfirmationEngine::new(ledger);
    let tx = signed_tx([3_u8; 32]);

    let result = engine.confirm(&tx, Duration::from_secs(5)).await;

    assert_eq!(
        result,
        Err(ConfirmationError::TimedOut {
            signature: tx.signature()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn failed_simulation_call_still_reports_timeout() {
    let mut ledger = MockLedger::with_statuses(vec![Ok(TxStatus::NotConfirmed)]);
    ledger.simulation = Err(failure("connection reset"));
    let engine = ConfirmationEngine::new(Arc::new(ledger));
    let tx = signed_tx([4_u8; 32]);

    let result = engine.confirm(&tx, Duration::from_secs(3)).await;

    assert!(matches!(result, Err(ConfirmationError::TimedOut { .. })));
}

#[tokio::test(start_paused = true)]
async fn ledger_error_resolves_failure_and_stops_rebroadcast() {
    let ledger = Arc::new(MockLedger::with_statuses(vec![
        Ok(TxStatus::NotConfirmed),
        Ok(TxStatus::NotConfirmed),
        Ok(TxStatus::Failed("InstructionError".to_owned())),
    ]));
    let engine = ConfirmationEngine::new(ledger.clone());
    let observer = RecordingObserver::default();
    let tx = signed_tx([5_u8; 32]);

    let result = engine
        .confirm_with_observer(&tx, Duration::from_secs(30), &observer)
        .await;

    assert_eq!(
        result,
        Err(ConfirmationError::Rejected {
            signature: tx.signature(),
            reason: "InstructionError".to_owned(),
        })
    );
    let sends_at_resolution = ledger.send_calls();
    let statuses_at_resolution = observer.statuses().len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ledger.send_calls(), sends_at_resolution);
    assert_eq!(observer.statuses().len(), statuses_at_resolution);
    assert_eq!(*ledger.simulations.lock().expect("lock"), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let ledger = Arc::new(MockLedger::with_statuses(vec![
        Err(failure("timeout")),
        Err(failure("503")),
        Ok(TxStatus::Finalized),
    ]));
    let engine = ConfirmationEngine::new(ledger);
    let observer = RecordingObserver::default();
    let tx = signed_tx([6_u8; 32]);

    let result = engine
        .confirm_with_observer(&tx, Duration::from_secs(10), &observer)
        .await;

    assert_eq!(result, Ok(tx.signature()));
    assert_eq!(observer.statuses(), vec![TxStatus::Finalized]);
}

#[tokio::test(start_paused = true)]
async fn repeated_rebroadcast_lands_exactly_one_transaction() {
    let mut statuses = vec![Ok(TxStatus::NotConfirmed); 6];
    statuses.push(Ok(TxStatus::Confirmed));
    let ledger = Arc::new(MockLedger::with_statuses(statuses));
    let engine = ConfirmationEngine::new(ledger.clone());
    let tx = signed_tx([7_u8; 32]);

    let result = engine.confirm(&tx, Duration::from_secs(30)).await;

    assert_eq!(result, Ok(tx.signature()));
    assert!(ledger.send_calls() >= 6);
    assert_eq!(ledger.accepted_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn initial_send_failure_is_recovered_by_rebroadcast() {
    let mut ledger = MockLedger::with_statuses(vec![
        Ok(TxStatus::Unknown),
        Ok(TxStatus::Unknown),
        Ok(TxStatus::Unknown),
        Ok(TxStatus::Confirmed),
    ]);
    ledger.sends = Scripted::new(vec![Err(failure("node unreachable")), Ok(())]);
    let engine = ConfirmationEngine::new(Arc::new(ledger));
    let observer = RecordingObserver::default();
    let tx = signed_tx([8_u8; 32]);

    let result = engine
        .confirm_with_observer(&tx, Duration::from_secs(10), &observer)
        .await;

    assert_eq!(result, Ok(tx.signature()));
    let sent = observer
        .events()
        .into_iter()
        .filter(|event| *event == Event::Sent)
        .count();
    assert_eq!(sent, 1);
    assert_eq!(observer.events().first(), Some(&Event::Status(TxStatus::Unknown)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_confirmations_are_independent() {
    let fast = Arc::new(MockLedger::with_statuses(vec![Ok(TxStatus::Confirmed)]));
    let slow = Arc::new(MockLedger::with_statuses(vec![Ok(TxStatus::NotConfirmed)]));
    let fast_engine = ConfirmationEngine::new(fast);
    let slow_engine = ConfirmationEngine::new(slow);
    let first = signed_tx([9_u8; 32]);
    let second = signed_tx([10_u8; 32]);

    let (landed, timed_out) = tokio::join!(
        fast_engine.confirm(&first, Duration::from_secs(5)),
        slow_engine.confirm(&second, Duration::from_secs(2)),
    );

    assert_eq!(landed, Ok(first.signature()));
    assert!(matches!(timed_out, Err(ConfirmationError::TimedOut { .. })));
}

#[tokio::test(start_paused = true)]
async fn resubmission_returns_first_landed_signature() {
    let ledger = Arc::new(MockLedger::with_statuses(vec![Ok(TxStatus::Confirmed)]));
    let engine = ConfirmationEngine::new(ledger.clone());
    let signed: Mutex<Vec<Signature>> = Mutex::new(Vec::new());

    let result = engine
        .resubmit_until_expired(
            |reference: &BlockReference| {
                let tx = signed_tx(reference.blockhash.to_bytes());
                signed.lock().expect("lock").push(tx.signature());
                Ok::<_, TransportError>(tx)
            },
            Duration::from_secs(30),
        )
        .await;

    let signed = signed.lock().expect("lock").clone();
    assert_eq!(signed.len(), 1);
    assert_eq!(result, Ok(signed[0]));
    assert_eq!(ledger.accepted_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn resubmission_stops_when_block_height_passes_first_expiry() {
    let mut ledger = MockLedger::with_statuses(vec![Ok(TxStatus::Unknown)]);
    ledger.expiries = Scripted::new(vec![150, 160, 170]);
    ledger.heights = Scripted::new(vec![100, 151]);
    let engine = ConfirmationEngine::new(Arc::new(ledger));

    let result = engine
        .resubmit_until_expired(
            |reference: &BlockReference| {
                Ok::<_, TransportError>(signed_tx(reference.blockhash.to_bytes()))
            },
            Duration::from_secs(30),
        )
        .await;

    assert!(matches!(
        result,
        Err(ConfirmationError::Expired {
            signature: Some(_),
            last_valid_block_height: 150
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn resubmission_never_sends_against_an_already_expired_reference() {
    let mut ledger = MockLedger::with_statuses(vec![Ok(TxStatus::Unknown)]);
    ledger.expiries = Scripted::new(vec![150]);
    ledger.heights = Scripted::new(vec![151]);
    let ledger = Arc::new(ledger);
    let engine = ConfirmationEngine::new(ledger.clone());

    let result = engine
        .resubmit_until_expired(
            |reference: &BlockReference| {
                Ok::<_, TransportError>(signed_tx(reference.blockhash.to_bytes()))
            },
            Duration::from_secs(30),
        )
        .await;

    assert_eq!(
        result,
        Err(ConfirmationError::Expired {
            signature: None,
            last_valid_block_height: 150
        })
    );
    assert_eq!(ledger.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn blockhash_not_found_simulation_reports_plain_timeout() {
    let mut ledger = MockLedger::with_statuses(vec![Ok(TxStatus::Unknown)]);
    ledger.simulation = Ok(SimulationOutcome {
        error: Some("\"BlockhashNotFound\"".to_owned()),
        logs: Vec::new(),
    });
    let ledger = Arc::new(ledger);
    let engine = ConfirmationEngine::new(ledger.clone());
    let tx = signed_tx([11_u8; 32]);

    let result = engine.confirm(&tx, Duration::from_secs(3)).await;

    assert_eq!(
        result,
        Err(ConfirmationError::TimedOut {
            signature: tx.signature()
        })
    );
    assert_eq!(*ledger.simulations.lock().expect("lock"), 1);
}

#[tokio::test(start_paused = true)]
async fn resubmission_surfaces_resign_failure() {
    let ledger = Arc::new(MockLedger::with_statuses(vec![Ok(TxStatus::Unknown)]));
    let engine = ConfirmationEngine::new(ledger.clone());

    let result = engine
        .resubmit_until_expired(
            |_reference: &BlockReference| Err::<SignedTransaction, _>("signer offline"),
            Duration::from_secs(30),
        )
        .await;

    assert_eq!(
        result,
        Err(ConfirmationError::Resign {
            message: "signer offline".to_owned()
        })
    );
    assert_eq!(ledger.send_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn waits_until_block_reference_advances() {
    let mut ledger = MockLedger::with_statuses(Vec::new());
    ledger.expiries = Scripted::new(vec![100, 120, 140, 160]);
    let engine = ConfirmationEngine::new(Arc::new(ledger));

    let started = Instant::now();
    let reached = engine
        .wait_for_new_blocks(50, Duration::from_secs(10))
        .await;

    assert_eq!(reached, Ok(160));
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn block_wait_times_out_when_chain_stalls() {
    let mut ledger = MockLedger::with_statuses(Vec::new());
    ledger.expiries = Scripted::new(vec![100]);
    let engine = ConfirmationEngine::new(Arc::new(ledger));

    let reached = engine.wait_for_new_blocks(5, Duration::from_secs(4)).await;

    assert_eq!(reached, Err(BlockWaitError::TimedOut { target_height: 105 }));
}
