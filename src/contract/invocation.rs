use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::routing::Route;
use crate::state::MappingSpec;

/// Per-call record threaded through resolution, dispatch and mapping.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: Uuid,
    pub route: Arc<Route>,
    pub params: Map<String, Value>,
    pub query: Option<Map<String, Value>>,
    pub data: Map<String, Value>,
    /// `params`, `query` and `data` merged, then validated.
    pub input: Map<String, Value>,
    /// Compiled path.
    pub url: String,
    pub method: Method,
    /// Raw response, from the cache or the transport.
    pub output: Option<Value>,
    /// Overrides the route's TTL for this call.
    pub ttl: Option<Duration>,
    /// Overrides the route's mapping for this call.
    pub map_state: MappingSpec,
    /// Fold the ambient location's params and query in during resolution.
    pub merge: bool,
}

impl Invocation {
    pub fn new(route: Arc<Route>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: route.method().clone(),
            url: route.path().to_string(),
            route,
            params: Map::new(),
            query: None,
            data: Map::new(),
            input: Map::new(),
            output: None,
            ttl: None,
            map_state: MappingSpec::None,
            merge: false,
        }
    }

    pub fn from_args(route: Arc<Route>, args: InvocationArgs) -> Self {
        let mut argv = Self::new(route);
        argv.params = args.params;
        argv.query = args.query;
        argv.data = args.data.unwrap_or_default();
        argv.ttl = args.ttl.filter(|secs| *secs > 0).map(Duration::from_secs);
        argv.map_state = args.map_state;
        argv.merge = args.merge;
        argv
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_map_state(mut self, map_state: MappingSpec) -> Self {
        self.map_state = map_state;
        self
    }

    /// Name the mock records and the default cache group are filed under.
    pub fn response_name(&self) -> &str {
        self.route
            .action()
            .response
            .as_deref()
            .unwrap_or_else(|| self.route.name())
    }

    pub(crate) fn merge_input(&mut self) {
        let mut input = self.params.clone();
        if let Some(query) = &self.query {
            input.extend(query.clone());
        }
        input.extend(self.data.clone());
        self.input = input;
    }
}

/// Wire form of an invocation payload, as passed to a flux action.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvocationArgs {
    pub params: Map<String, Value>,
    pub query: Option<Map<String, Value>>,
    pub data: Option<Map<String, Value>>,
    /// Seconds.
    pub ttl: Option<u64>,
    pub map_state: MappingSpec,
    pub merge: bool,
}
