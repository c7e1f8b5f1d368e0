//! In-memory driver used by the crate's tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, doc};
use docpool_core::{
    ConnectOptions, DocPoolError, Driver, Operation, OperationOutput, PoolConfig, Result, Session,
    StoreConfig, StoreSettings, UpdateOutcome,
};
use parking_lot::Mutex;

use crate::{ConnectionFactory, ConnectionPool, PoolRegistry};

/// Number of documents every mock collection pretends to hold
pub(crate) const MOCK_COLLECTION_SIZE: u64 = 25;

/// Countdown of injected failures; `usize::MAX` fails forever
#[derive(Default)]
pub(crate) struct FailureBudget(AtomicUsize);

impl FailureBudget {
    pub(crate) fn set(&self, count: usize) {
        self.0.store(count, Ordering::SeqCst);
    }

    pub(crate) fn always(&self) {
        self.set(usize::MAX);
    }

    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// Shared counters and failure switches for every session of a `MockDriver`
#[derive(Default)]
pub(crate) struct MockState {
    /// Every call to `Driver::open`, successful or not
    pub open_attempts: AtomicUsize,
    /// Sessions successfully opened
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub pings: AtomicUsize,
    pub executes: AtomicUsize,
    pub fail_open: FailureBudget,
    pub fail_ping: FailureBudget,
    pub fail_execute: FailureBudget,
    pub reject_auth: AtomicBool,
    pub execute_delay_ms: AtomicU64,
    /// (session number, operation) for every operation that reached a session
    pub executed: Mutex<Vec<(usize, Operation)>>,
    /// Every operation handed to a session, including injected failures
    pub attempted: Mutex<Vec<Operation>>,
}

impl MockState {
    pub(crate) fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub(crate) fn set_execute_delay(&self, delay: Duration) {
        self.execute_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Session numbers that executed operations, in order
    pub(crate) fn executing_sessions(&self) -> Vec<usize> {
        self.executed.lock().iter().map(|(session, _)| *session).collect()
    }
}

pub(crate) struct MockDriver {
    pub state: Arc<MockState>,
}

impl MockDriver {
    pub(crate) fn new() -> (Arc<Self>, Arc<MockState>) {
        let state = Arc::new(MockState::default());
        (
            Arc::new(Self {
                state: state.clone(),
            }),
            state,
        )
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn open(&self, _options: &ConnectOptions) -> Result<Box<dyn Session>> {
        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.reject_auth.load(Ordering::SeqCst) {
            return Err(DocPoolError::Auth("bad credentials".into()));
        }
        if self.state.fail_open.take() {
            return Err(DocPoolError::TransientConnectivity("connection refused".into()));
        }
        let number = self.state.opens.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockSession {
            number,
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct MockSession {
    number: usize,
    state: Arc<MockState>,
    closed: bool,
}

fn mock_oid(n: u64) -> ObjectId {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&n.to_be_bytes());
    ObjectId::from_bytes(bytes)
}

fn mock_documents(skip: u64, limit: u64) -> Vec<bson::Document> {
    (skip..MOCK_COLLECTION_SIZE.min(skip.saturating_add(limit)))
        .map(|n| doc! { "_id": mock_oid(n), "n": n as i64 })
        .collect()
}

#[async_trait]
impl Session for MockSession {
    async fn execute(&mut self, operation: &Operation) -> Result<OperationOutput> {
        let delay = self.state.execute_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.state.attempted.lock().push(operation.clone());
        if self.state.fail_execute.take() {
            return Err(DocPoolError::TransientConnectivity("connection reset by peer".into()));
        }
        self.state.executes.fetch_add(1, Ordering::SeqCst);
        self.state
            .executed
            .lock()
            .push((self.number, operation.clone()));

        let output = match operation {
            Operation::FindOne { filter, .. } => {
                let id = filter.get("_id").cloned().unwrap_or(Bson::ObjectId(mock_oid(0)));
                OperationOutput::Document(Some(doc! { "_id": id, "n": 0_i64 }))
            }
            Operation::FindAll { options, .. } => {
                let limit = options.limit.map_or(MOCK_COLLECTION_SIZE, |l| l as u64);
                OperationOutput::Documents(mock_documents(options.skip.unwrap_or(0), limit))
            }
            Operation::InsertOne { document, .. } => OperationOutput::InsertedId(
                document
                    .get("_id")
                    .cloned()
                    .unwrap_or(Bson::ObjectId(mock_oid(100))),
            ),
            Operation::InsertMany { documents, .. } => OperationOutput::InsertedIds(
                documents
                    .iter()
                    .zip(100..)
                    .map(|(document, i)| {
                        document
                            .get("_id")
                            .cloned()
                            .unwrap_or(Bson::ObjectId(mock_oid(i)))
                    })
                    .collect(),
            ),
            Operation::Update { multi, .. } => {
                let matched = if *multi { 3 } else { 1 };
                OperationOutput::Updated(UpdateOutcome {
                    matched,
                    modified: matched,
                })
            }
            Operation::Delete { multi, .. } => OperationOutput::Deleted(if *multi { 3 } else { 1 }),
            Operation::Count { .. } => OperationOutput::Count(MOCK_COLLECTION_SIZE),
            Operation::Aggregate { pipeline, .. } => OperationOutput::Documents(
                pipeline
                    .iter()
                    .enumerate()
                    .map(|(stage, _)| doc! { "stage": stage as i64 })
                    .collect(),
            ),
        };
        Ok(output)
    }

    async fn ping(&mut self) -> Result<()> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.closed || self.state.fail_ping.take() {
            return Err(DocPoolError::TransientConnectivity("ping failed".into()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub(crate) fn settings(pool: PoolConfig) -> StoreSettings {
    StoreSettings::new("mock.internal", "app").with_pool(pool)
}

pub(crate) fn factory(driver: Arc<MockDriver>, pool: PoolConfig) -> Arc<ConnectionFactory> {
    match ConnectionFactory::new("default", driver, &settings(pool)) {
        Ok(factory) => Arc::new(factory),
        Err(err) => panic!("mock settings rejected: {}", err),
    }
}

pub(crate) fn pool(config: PoolConfig) -> (Arc<ConnectionPool>, Arc<MockState>) {
    let (driver, state) = MockDriver::new();
    let factory = factory(driver, config.clone());
    (
        Arc::new(ConnectionPool::new("default", config, factory)),
        state,
    )
}

pub(crate) fn registry(config: StoreConfig) -> (Arc<PoolRegistry>, Arc<MockState>) {
    let (driver, state) = MockDriver::new();
    (Arc::new(PoolRegistry::new(Arc::new(config), driver)), state)
}

/// A registry with one `default` pool using `pool`
pub(crate) fn single_pool_registry(pool: PoolConfig) -> (Arc<PoolRegistry>, Arc<MockState>) {
    registry(StoreConfig::new().with_pool("default", settings(pool)))
}
