// Integration test: login, balance disclosure and end-to-end withdrawals
// through a session

use async_trait::async_trait;
use curve25519_dalek::scalar::Scalar;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rime_core::crypto::encrypt;
use rime_core::ledger::ReceiptStatus;
use rime_core::store::{MemoryStorage, SledStorage};
use rime_core::{
    AccountKeys, Address, ApprovalPrompt, ClientConfig, Collaborators, FixedGasOracle,
    HostBridge, InMemoryLedger, PreconditionViolation, ProverError, RelayError, RelayTransport,
    RimeError, RimeSession, SessionStore, TransactRequest, TxHash, WithdrawalError,
    WithdrawalPayload, WithdrawalProof, WithdrawalProver, WithdrawalWitness,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const ADDRESS: &str = "0x1111111111111111111111111111111111111111";
const OP_MAINNET: u64 = 10;
const START: u64 = 125;

struct Host {
    approve: bool,
    prompts: Mutex<Vec<ApprovalPrompt>>,
}

#[async_trait]
impl HostBridge for Host {
    async fn confirm(&self, prompt: &ApprovalPrompt) -> bool {
        self.prompts.lock().push(prompt.clone());
        self.approve
    }
}

#[derive(Default)]
struct RecordingProver {
    residuals: Mutex<Vec<u64>>,
}

impl WithdrawalProver for RecordingProver {
    fn prove(&self, witness: &WithdrawalWitness) -> Result<WithdrawalProof, ProverError> {
        self.residuals.lock().push(witness.residual);
        Ok(WithdrawalProof::new(vec![1, 2, 3]))
    }
}

/// Relay that lands every payload on the ledger immediately.
struct InstantRelay {
    ledger: InMemoryLedger,
    calls: AtomicUsize,
    endpoints: Mutex<Vec<String>>,
}

#[async_trait]
impl RelayTransport for InstantRelay {
    async fn submit(&self, endpoint: &str, payload: &WithdrawalPayload) -> Result<TxHash, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().push(endpoint.to_string());
        let hash = TxHash(payload.commitment_hash());
        self.ledger.mine(hash, ReceiptStatus::Success);
        Ok(hash)
    }
}

struct Harness {
    store: SessionStore,
    ledger: InMemoryLedger,
    keys: AccountKeys,
    host: Arc<Host>,
    prover: Arc<RecordingProver>,
    relay: Arc<InstantRelay>,
}

impl Harness {
    fn new(approve: bool) -> Self {
        let store = SessionStore::new(Arc::new(MemoryStorage::new()));
        store.login(ADDRESS, b"wallet signature").unwrap();
        let keys = store.load(ADDRESS).unwrap().unwrap();

        let ledger = InMemoryLedger::new(START);
        let decoys = (0..16)
            .map(|_| *AccountKeys::generate(&mut OsRng).public())
            .collect();
        ledger.set_anonset(decoys);

        Self {
            store,
            relay: Arc::new(InstantRelay {
                ledger: ledger.clone(),
                calls: AtomicUsize::new(0),
                endpoints: Mutex::new(Vec::new()),
            }),
            ledger,
            keys,
            host: Arc::new(Host {
                approve,
                prompts: Mutex::new(Vec::new()),
            }),
            prover: Arc::new(RecordingProver::default()),
        }
    }

    fn fund(&self, epoch: u64, amount: u64) {
        self.ledger.set_account(
            self.keys.public(),
            epoch,
            encrypt(amount, self.keys.public(), &Scalar::random(&mut OsRng)),
        );
    }

    fn parts(&self, gas_wei: u128) -> Collaborators {
        Collaborators {
            ledger: Arc::new(self.ledger.clone()),
            relay: self.relay.clone(),
            prover: self.prover.clone(),
            gas: Arc::new(FixedGasOracle(gas_wei)),
            host: self.host.clone(),
        }
    }

    fn open(&self, gas_wei: u128) -> RimeSession {
        RimeSession::open(
            &self.store,
            ADDRESS,
            OP_MAINNET,
            ClientConfig::default(),
            self.parts(gas_wei),
        )
        .unwrap()
    }
}

fn request(amount: u64) -> TransactRequest {
    TransactRequest {
        destination: Address([0xbb; 20]),
        amount,
        data: vec![],
    }
}

#[tokio::test]
async fn test_open_requires_login_and_known_chain() {
    let harness = Harness::new(true);

    let err = RimeSession::open(
        &harness.store,
        "0x2222222222222222222222222222222222222222",
        OP_MAINNET,
        ClientConfig::default(),
        harness.parts(0),
    )
    .err()
    .unwrap();
    assert!(matches!(err, RimeError::NotLoggedIn(_)));

    let err = RimeSession::open(
        &harness.store,
        ADDRESS,
        5,
        ClientConfig::default(),
        harness.parts(0),
    )
    .err()
    .unwrap();
    assert!(matches!(err, RimeError::UnsupportedChain(5)));
}

#[tokio::test]
async fn test_session_public_key_matches_login() {
    let harness = Harness::new(true);
    let session = harness.open(0);
    assert_eq!(session.public_key(), harness.keys.public());
}

#[tokio::test]
async fn test_disclose_balance() {
    let harness = Harness::new(true);
    harness.fund(2, 1234);
    let session = harness.open(0);

    assert_eq!(session.disclose_balance("https://dapp.example").await.unwrap(), 1234);

    let prompts = harness.host.prompts.lock();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].lines().iter().any(|line| line.contains("1.234 ETH")));
    assert!(prompts[0].lines()[0].contains("OP Mainnet"));
}

#[tokio::test]
async fn test_disclose_balance_rejected() {
    let harness = Harness::new(false);
    harness.fund(2, 10);
    let session = harness.open(0);

    let err = session.disclose_balance("https://dapp.example").await.unwrap_err();
    assert!(matches!(err, RimeError::UserRejected));
}

#[tokio::test]
async fn test_transact_end_to_end() {
    let harness = Harness::new(true);
    harness.fund(2, 1000);
    let session = harness.open(2_400_000_000_000_000);

    let hash = session
        .transact("https://dapp.example", request(500))
        .await
        .unwrap();

    // fee = 500 / 128 = 3, tip = 2
    assert_eq!(*harness.prover.residuals.lock(), vec![495]);
    assert_eq!(harness.relay.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*harness.relay.endpoints.lock(), vec!["withdrawal10".to_string()]);
    assert_ne!(hash, TxHash([0u8; 32]));

    let prompts = harness.host.prompts.lock();
    match &prompts[0] {
        ApprovalPrompt::Transaction { amount, fees, .. } => {
            assert_eq!(*amount, 500);
            assert_eq!(*fees, 5);
        }
        other => panic!("unexpected prompt {:?}", other),
    }
}

#[tokio::test]
async fn test_insufficient_balance_fails_before_prompt() {
    let harness = Harness::new(true);
    harness.fund(2, 100);
    let session = harness.open(0);

    let err = session
        .transact("https://dapp.example", request(100_000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RimeError::Withdrawal(WithdrawalError::PreconditionViolation(
            PreconditionViolation::InsufficientBalance { available: 100, .. }
        ))
    ));
    assert!(harness.host.prompts.lock().is_empty());
    assert_eq!(harness.relay.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_user_rejects_transaction() {
    let harness = Harness::new(false);
    harness.fund(2, 1000);
    let session = harness.open(0);

    let err = session
        .transact("https://dapp.example", request(10))
        .await
        .unwrap_err();
    assert!(matches!(err, RimeError::UserRejected));
    assert_eq!(harness.relay.calls.load(Ordering::SeqCst), 0);
    assert!(harness.prover.residuals.lock().is_empty());
}

#[tokio::test]
async fn test_pending_funds_defer_to_next_epoch() {
    let harness = Harness::new(true);
    // 10 settled now, 15 once epoch 3 begins.
    harness.fund(2, 10);
    harness.fund(3, 15);
    let session = harness.open(0);

    {
        // Both the scheduled rollover and the deferral wait on the boundary.
        let ledger = harness.ledger.clone();
        tokio::spawn(async move {
            while ledger.block_subscriber_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            ledger.push_block(180);
        });
    }

    let hash = tokio::time::timeout(
        Duration::from_secs(10),
        session.transact("https://dapp.example", request(12)),
    )
    .await
    .expect("withdrawal should not hang")
    .unwrap();

    assert_ne!(hash, TxHash([0u8; 32]));
    assert_eq!(*harness.prover.residuals.lock(), vec![3]);
    assert_eq!(session.balance().available, 15);
    assert_eq!(session.balance().pending, 0);
}

#[tokio::test]
async fn test_large_balance_sync_keeps_runtime_responsive() {
    let harness = Harness::new(true);
    harness.fund(2, 300_000);
    let session = harness.open(0);

    let started = Instant::now();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        started.elapsed()
    });

    let state = session.synchronize().await.unwrap();
    assert_eq!(state.available, 300_000);

    // The current-thread runtime kept polling while the search ran.
    let fired_after = timer.await.unwrap();
    assert!(
        fired_after < Duration::from_millis(250),
        "timer starved for {:?}",
        fired_after
    );
}

#[tokio::test]
async fn test_large_balance_disclosure_keeps_runtime_responsive() {
    let harness = Harness::new(true);
    harness.fund(2, 300_000);
    let session = harness.open(0);

    let started = Instant::now();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        started.elapsed()
    });

    assert_eq!(
        session.disclose_balance("https://dapp.example").await.unwrap(),
        300_000
    );
    let fired_after = timer.await.unwrap();
    assert!(
        fired_after < Duration::from_millis(250),
        "timer starved for {:?}",
        fired_after
    );
}

#[tokio::test]
async fn test_logout_clears_material() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions").to_str().unwrap().to_string();
    let store = SessionStore::new(Arc::new(SledStorage::new(&path).unwrap()));
    store.login(ADDRESS, b"wallet signature").unwrap();

    let harness = Harness::new(true);
    let session = RimeSession::open(
        &store,
        ADDRESS,
        OP_MAINNET,
        ClientConfig::default(),
        harness.parts(0),
    )
    .unwrap();
    session.logout(&store).unwrap();

    assert!(store.load(ADDRESS).unwrap().is_none());
    assert!(RimeSession::open(
        &store,
        ADDRESS,
        OP_MAINNET,
        ClientConfig::default(),
        harness.parts(0)
    )
    .is_err());
}
