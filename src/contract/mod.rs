//! Invocation orchestrator.
//!
//! [`Contract`] owns the registries (routes, schemas, mocks), the response
//! cache and the transport. A call goes through resolution, input
//! validation, cache lookup, dispatch, output validation, group
//! invalidation and finally state mapping.

mod actions;
mod invocation;
mod manifest;
mod options;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use metrics::counter;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::cache::lock::{rw_read, rw_write};
use crate::cache::{CacheConfig, TtlStore, derive_key};
use crate::error::ContractError;
use crate::mock::{MockChannel, MockFlowListener};
use crate::routing::{Route, RouteTable};
use crate::schema::{SchemaError, SchemaGateway, SchemaType};
use crate::state;
use crate::transport::Transport;

pub use actions::{ActionKind, ActionTable, InvokeMode, StateSink, pascal_case};
pub use invocation::{Invocation, InvocationArgs};
pub use manifest::{Declarations, Manifest, ManifestError, Project};
pub use options::ContractOptions;

const SOURCE: &str = "contract";

type RouteIndex = Arc<RwLock<HashMap<String, Arc<Route>>>>;

/// A request to run a named route (or seed a named schema's state).
#[derive(Debug, Default, Deserialize)]
pub struct PayloadRequest {
    pub name: String,
    #[serde(flatten)]
    pub args: InvocationArgs,
}

impl PayloadRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: InvocationArgs::default(),
        }
    }
}

/// Params and query of the caller's current location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Location {
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
}

/// Outcome of resolving a [`PayloadRequest`].
#[derive(Debug)]
pub enum Payload {
    /// A prepared call against a declared route.
    Invoke(Box<Invocation>),
    /// State seeded straight from a schema; nothing to dispatch.
    State(Value),
}

pub struct Contract {
    options: ContractOptions,
    router: RouteTable,
    routes: RouteIndex,
    schema: SchemaGateway,
    mocks: MockChannel,
    transport: Arc<dyn Transport>,
    cache: TtlStore,
    project: RwLock<Option<Project>>,
}

impl Contract {
    pub fn new(
        options: ContractOptions,
        cache: &CacheConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let router = RouteTable::new();
        let routes: RouteIndex = Arc::default();
        let index = Arc::clone(&routes);
        router.on_declare_action(move |route| {
            rw_write(&index, SOURCE, "declare_action")
                .insert(route.name().to_string(), Arc::clone(route));
        });

        Self {
            options,
            router,
            routes,
            schema: SchemaGateway::new(options.strict),
            mocks: MockChannel::new(options.mock_flow),
            transport,
            cache: TtlStore::new(cache),
            project: RwLock::new(None),
        }
    }

    pub fn options(&self) -> &ContractOptions {
        &self.options
    }

    /// Declare everything in `manifest`. Mocks and project replace what was
    /// there before.
    pub fn load(&self, manifest: Manifest) -> Result<(), ContractError> {
        let Manifest {
            project,
            declarations,
        } = manifest;
        let Declarations {
            schemas,
            modals,
            mocks,
        } = declarations;

        self.schema.declare(schemas);
        self.router.declare(modals)?;
        if let Some(mocks) = mocks {
            self.mocks.replace(mocks);
        }
        if let Some(project) = project {
            info!(project = %project.name, "Loaded contract project");
            *rw_write(&self.project, SOURCE, "load") = Some(project);
        }
        Ok(())
    }

    /// Add declarations. Mocks are merged into the existing set.
    pub fn declare(&self, declarations: Declarations) -> Result<(), ContractError> {
        self.schema.declare(declarations.schemas);
        self.router.declare(declarations.modals)?;
        if let Some(mocks) = declarations.mocks {
            self.mocks.extend(mocks);
        }
        Ok(())
    }

    pub fn route(&self, name: &str) -> Option<Arc<Route>> {
        rw_read(&self.routes, SOURCE, "route").get(name).cloned()
    }

    /// Every declared route, ordered by name.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        let mut routes: Vec<Arc<Route>> = rw_read(&self.routes, SOURCE, "routes")
            .values()
            .cloned()
            .collect();
        routes.sort_by(|a, b| a.name().cmp(b.name()));
        routes
    }

    pub fn schema(&self) -> &SchemaGateway {
        &self.schema
    }

    pub fn cache(&self) -> &TtlStore {
        &self.cache
    }

    pub fn mocks(&self) -> &MockChannel {
        &self.mocks
    }

    pub fn project_name(&self) -> Option<String> {
        rw_read(&self.project, SOURCE, "project_name")
            .as_ref()
            .map(|project| project.name.clone())
    }

    /// Subscribe to interactive mock calls.
    pub fn on_mock_flow(&self, listener: impl MockFlowListener + 'static) {
        self.mocks.on_mock_flow(listener);
    }

    /// Turn a named request into a prepared invocation, or into a state-only
    /// payload when only a schema carries that name.
    pub fn resolve_payload(
        &self,
        request: PayloadRequest,
        location: &Location,
    ) -> Result<Payload, ContractError> {
        let PayloadRequest { name, mut args } = request;

        if let Some(route) = self.route(&name) {
            if args.merge {
                let mut params = location.params.clone();
                params.extend(args.params);
                args.params = params;

                let mut query = location.query.clone();
                query.extend(args.query.unwrap_or_default());
                args.query = Some(query);
            }
            let mut argv = Invocation::from_args(route, args);
            argv.url = argv.route.compile(&argv.params)?;
            return Ok(Payload::Invoke(Box::new(argv)));
        }

        let Some(schema) = self.schema.get_schema(&name) else {
            return Err(ContractError::UnresolvedRoute { name });
        };

        let mut data = self.schema.seed_state(&schema);
        if schema.schema_type() == SchemaType::Struct && args.merge {
            if let Value::Object(fields) = &mut data {
                fields.extend(location.params.clone());
                fields.extend(location.query.clone());
            }
        }
        let state_name = schema.opts().state_name.clone().unwrap_or(name);
        debug!(state = %state_name, "Resolved state-only payload");

        let mut state = Map::new();
        state.insert(state_name, data);
        Ok(Payload::State(Value::Object(state)))
    }

    /// Resolve and run `name` in fetch mode.
    pub async fn request(
        &self,
        name: &str,
        args: InvocationArgs,
    ) -> Result<Option<Value>, ContractError> {
        let request = PayloadRequest {
            name: name.to_string(),
            args,
        };
        match self.resolve_payload(request, &Location::default())? {
            Payload::Invoke(argv) => self.invoke(*argv, InvokeMode::Fetch).await,
            Payload::State(state) => Ok(Some(state)),
        }
    }

    /// Run the invocation pipeline and return the mapped state.
    ///
    /// `argv.output` holds the raw response afterwards, whether it came from
    /// the cache or the transport.
    #[instrument(skip(self, argv), fields(route = %argv.route.name(), id = %argv.id))]
    pub async fn invoke_payload(
        &self,
        argv: &mut Invocation,
    ) -> Result<Option<Value>, ContractError> {
        let route = Arc::clone(&argv.route);
        let action = route.action();

        argv.url = route.compile(&argv.params)?;
        argv.method = route.method().clone();
        argv.merge_input();

        let ttl = if self.options.no_cache || self.options.mock_state {
            None
        } else {
            argv.ttl.filter(|ttl| !ttl.is_zero()).or(action.ttl)
        };

        let slot = match ttl {
            Some(ttl) => {
                let key = derive_key(&argv.url, argv.query.as_ref());
                if let Some(cached) = self.cache.get(&key, ttl) {
                    debug!(key = %key, "Serving cached response");
                    argv.output = Some(cached);
                    return Ok(self.map_payload_state(argv));
                }
                Some((key, ttl))
            }
            None => None,
        };

        if let Some(schema) = action
            .request
            .as_deref()
            .and_then(|name| self.schema.get_schema(name))
        {
            let input = std::mem::take(&mut argv.input);
            argv.input = self
                .schema
                .extract(&schema, input)
                .map_err(|source| ContractError::Validation {
                    route: route.name().to_string(),
                    source,
                })?;
        }

        let output = self.fetch(argv).await?;

        let response_schema = action
            .response
            .as_deref()
            .and_then(|name| self.schema.get_schema(name));
        let mut group = None;
        if let Some(schema) = &response_schema {
            self.schema
                .check(schema, &output)
                .map_err(|source| ContractError::OutputValidation {
                    route: route.name().to_string(),
                    source,
                })?;
            group = schema.opts().cache.clone();
        }

        if !self.options.mock_state {
            if let Some(group) = &group {
                self.cache.remove_by_name(group);
            }
        }
        if let Some((key, ttl)) = slot {
            let tag = group.unwrap_or_else(|| argv.response_name().to_string());
            debug!(key = %key, ttl = ttl.as_secs(), group = %tag, "Caching response");
            self.cache.set(key, ttl, tag, output.clone());
        }

        argv.output = Some(output);
        Ok(self.map_payload_state(argv))
    }

    /// Dispatch to the mock channel in mock mode, otherwise to the transport.
    pub async fn fetch(&self, argv: &Invocation) -> Result<Value, ContractError> {
        if self.options.mock_state {
            counter!("flux_contract_dispatch_total", "source" => "mock").increment(1);
            return self.mocks.request(argv).await;
        }
        counter!("flux_contract_dispatch_total", "source" => "transport").increment(1);
        self.transport.request(argv).await
    }

    pub fn map_payload_state(&self, argv: &Invocation) -> Option<Value> {
        state::map_payload_state(argv)
    }

    /// Action bindings for every declared route. Names carry the project name
    /// unless `is_default` is set.
    pub fn actions(&self, is_default: bool) -> ActionTable {
        let prefix = if is_default {
            String::new()
        } else {
            self.project_name().unwrap_or_default()
        };
        ActionTable::build(&self.routes(), &self.schema, &prefix)
    }

    /// Run an invocation and either hand back or commit its result.
    ///
    /// In fetch mode the result is the mapped state, or the raw output when
    /// nothing was mapped. In commit mode a mapped state is pushed to the sink
    /// and also returned.
    pub async fn invoke(
        &self,
        mut argv: Invocation,
        mode: InvokeMode<'_>,
    ) -> Result<Option<Value>, ContractError> {
        let state = self.invoke_payload(&mut argv).await?;
        match mode {
            InvokeMode::Fetch => Ok(state.or(argv.output)),
            InvokeMode::Commit(sink) => {
                if let Some(fragment) = &state {
                    sink.update_state(fragment.clone());
                }
                Ok(state)
            }
        }
    }

    /// Run the action called `name` from `table` with `payload`.
    pub async fn dispatch(
        &self,
        table: &ActionTable,
        name: &str,
        payload: Value,
        mode: InvokeMode<'_>,
    ) -> Result<Option<Value>, ContractError> {
        let Some(action) = table.get(name) else {
            return Err(ContractError::UnknownAction {
                name: name.to_string(),
            });
        };

        match action {
            ActionKind::Invoke(route) => {
                let args: InvocationArgs = if payload.is_null() {
                    InvocationArgs::default()
                } else {
                    serde_json::from_value(payload)?
                };
                let argv = Invocation::from_args(Arc::clone(route), args);
                self.invoke(argv, mode).await
            }
            ActionKind::InvokeData(route) => {
                let data = object_payload(route.name(), payload)?;
                let argv = Invocation::new(Arc::clone(route)).with_data(data);
                self.invoke(argv, mode).await
            }
            ActionKind::Check(schema) => {
                self.schema.check(schema, &payload)?;
                Ok(Some(payload))
            }
            ActionKind::Extract(schema) => {
                let input = object_payload(schema.name(), payload)?;
                let extracted = self.schema.extract(schema, input)?;
                Ok(Some(Value::Object(extracted)))
            }
        }
    }
}

fn object_payload(owner: &str, payload: Value) -> Result<Map<String, Value>, SchemaError> {
    match payload {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(SchemaError::NotAnObject {
            schema: owner.to_string(),
        }),
    }
}

/// In-memory [`StateSink`] that shallow-merges committed fragments.
#[derive(Debug, Default)]
pub struct MemoryState {
    state: RwLock<Map<String, Value>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Value {
        Value::Object(rw_read(&self.state, SOURCE, "snapshot").clone())
    }
}

impl StateSink for MemoryState {
    fn update_state(&self, fragment: Value) {
        if let Value::Object(fields) = fragment {
            rw_write(&self.state, SOURCE, "update_state").extend(fields);
        }
    }
}
