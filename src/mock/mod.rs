//! Mock replay channel.
//!
//! Stands in for the live transport when the contract runs in mock mode.
//! Records are looked up by the route's response name. In interactive mode
//! each call is announced as a [`MockFlow`] and suspends until a listener
//! resolves or rejects it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::contract::Invocation;
use crate::error::ContractError;
use crate::transport::Transport;

const SOURCE: &str = "mock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub data: Value,
}

/// Mock records keyed by response name.
pub type MockSet = HashMap<String, Vec<MockRecord>>;

type Responder = oneshot::Sender<Result<Value, String>>;

/// A suspended mock call waiting for a listener to settle it.
///
/// Clones share one settlement: the first `resolve` or `reject` wins and
/// later calls return `false`. Dropping every clone unsettled fails the call.
#[derive(Clone)]
pub struct MockFlow {
    argv: Invocation,
    mocks: Vec<MockRecord>,
    responder: Arc<Mutex<Option<Responder>>>,
}

impl fmt::Debug for MockFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFlow")
            .field("route", &self.argv.route.name())
            .field("mocks", &self.mocks.len())
            .finish()
    }
}

impl MockFlow {
    pub fn argv(&self) -> &Invocation {
        &self.argv
    }

    pub fn mocks(&self) -> &[MockRecord] {
        &self.mocks
    }

    /// Deliver `data` as the call's output.
    pub fn resolve(&self, data: Value) -> bool {
        self.settle(Ok(data))
    }

    /// Fail the call with `reason`.
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.settle(Err(reason.into()))
    }

    fn settle(&self, outcome: Result<Value, String>) -> bool {
        match mutex_lock(&*self.responder, SOURCE, "settle").take() {
            Some(responder) => responder.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Receives interactive mock calls.
pub trait MockFlowListener: Send + Sync {
    fn on_mock_flow(&self, flow: MockFlow);
}

impl<F> MockFlowListener for F
where
    F: Fn(MockFlow) + Send + Sync,
{
    fn on_mock_flow(&self, flow: MockFlow) {
        self(flow)
    }
}

pub struct MockChannel {
    interactive: bool,
    records: RwLock<MockSet>,
    listeners: RwLock<Vec<Arc<dyn MockFlowListener>>>,
}

impl MockChannel {
    pub fn new(interactive: bool) -> Self {
        Self {
            interactive,
            records: RwLock::new(MockSet::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Replace every registered record.
    pub fn replace(&self, records: MockSet) {
        *rw_write(&self.records, SOURCE, "replace") = records;
    }

    /// Add records, replacing the lists of response names already present.
    pub fn extend(&self, records: MockSet) {
        rw_write(&self.records, SOURCE, "extend").extend(records);
    }

    pub fn records_for(&self, response: &str) -> Vec<MockRecord> {
        rw_read(&self.records, SOURCE, "records_for")
            .get(response)
            .cloned()
            .unwrap_or_default()
    }

    pub fn on_mock_flow(&self, listener: impl MockFlowListener + 'static) {
        rw_write(&self.listeners, SOURCE, "on_mock_flow").push(Arc::new(listener));
    }

    async fn settle_interactively(
        &self,
        response: String,
        argv: &Invocation,
        mocks: Vec<MockRecord>,
    ) -> Result<Value, ContractError> {
        let listeners: Vec<Arc<dyn MockFlowListener>> =
            rw_read(&self.listeners, SOURCE, "emit").clone();
        if listeners.is_empty() {
            warn!(response = %response, "Interactive mock call has no listener");
        }

        let (tx, rx) = oneshot::channel();
        let flow = MockFlow {
            argv: argv.clone(),
            mocks,
            responder: Arc::new(Mutex::new(Some(tx))),
        };
        for listener in &listeners {
            listener.on_mock_flow(flow.clone());
        }
        drop(flow);

        match rx.await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(reason)) => Err(ContractError::MockRejected { response, reason }),
            Err(_) => Err(ContractError::MockFlowAbandoned { response }),
        }
    }
}

#[async_trait]
impl Transport for MockChannel {
    async fn request(&self, argv: &Invocation) -> Result<Value, ContractError> {
        let response = argv.response_name().to_string();
        let mut mocks = self.records_for(&response);
        if mocks.is_empty() {
            return Err(ContractError::MissingMock { response });
        }

        debug!(
            route = argv.route.name(),
            response = %response,
            records = mocks.len(),
            interactive = self.interactive,
            "Replaying mock"
        );

        if self.interactive {
            return self.settle_interactively(response, argv, mocks).await;
        }
        Ok(mocks.swap_remove(0).data)
    }
}
