//! Route table.
//!
//! Routes are grouped into modals (a named module with a path prefix) and
//! declared in bulk. Every declared route is announced to `declare_action`
//! subscribers, which is how the orchestrator builds its own index.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::cache::lock::{rw_read, rw_write};
use crate::state::{MappingSpec, ResState};

const SOURCE: &str = "routing";

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route `{route}` is missing path parameter `{key}`")]
    MissingParam { route: String, key: String },
    #[error("route `{route}` declares an invalid method `{method}`")]
    InvalidMethod { route: String, method: String },
}

/// What a route does once its path is compiled.
#[derive(Debug, Clone, Default)]
pub struct ActionDescriptor {
    pub request: Option<String>,
    pub response: Option<String>,
    pub ttl: Option<Duration>,
    pub res_state: ResState,
    pub map_state: MappingSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { key: String, optional: bool },
}

/// A named remote operation. Immutable once declared.
#[derive(Debug)]
pub struct Route {
    name: String,
    method: Method,
    path: String,
    keys: Vec<String>,
    segments: Vec<Segment>,
    action: ActionDescriptor,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        method: Method,
        path: impl Into<String>,
        action: ActionDescriptor,
    ) -> Self {
        let path = path.into();
        let segments = parse_segments(&path);
        let keys = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param { key, .. } => Some(key.clone()),
                Segment::Literal(_) => None,
            })
            .collect();
        Self {
            name: name.into(),
            method,
            path,
            keys,
            segments,
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path parameter names in template order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn action(&self) -> &ActionDescriptor {
        &self.action
    }

    /// Substitute `params` into the path template.
    pub fn compile(&self, params: &Map<String, Value>) -> Result<String, RouteError> {
        let mut compiled = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    compiled.push('/');
                    compiled.push_str(text);
                }
                Segment::Param { key, optional } => match params.get(key) {
                    Some(value) if !value.is_null() => {
                        compiled.push('/');
                        compiled.push_str(&encode_segment(value));
                    }
                    _ if *optional => {}
                    _ => {
                        return Err(RouteError::MissingParam {
                            route: self.name.clone(),
                            key: key.clone(),
                        });
                    }
                },
            }
        }
        if compiled.is_empty() {
            compiled.push('/');
        }
        Ok(compiled)
    }
}

fn parse_segments(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|part| !part.is_empty())
        .map(|part| match part.strip_prefix(':') {
            Some(key) => match key.strip_suffix('?') {
                Some(key) => Segment::Param {
                    key: key.to_string(),
                    optional: true,
                },
                None => Segment::Param {
                    key: key.to_string(),
                    optional: false,
                },
            },
            None => Segment::Literal(part.to_string()),
        })
        .collect()
}

fn encode_segment(value: &Value) -> String {
    let raw = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Declarative form of one route inside a modal.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteDeclaration {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    /// Cache lifetime in seconds.
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub res_state: ResState,
    #[serde(default)]
    pub map_state: MappingSpec,
}

fn default_method() -> String {
    "GET".to_string()
}

/// A group of routes sharing a path prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct ModalDeclaration {
    pub name: String,
    /// Defaults to `/<name>`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteDeclaration>,
}

impl ModalDeclaration {
    fn prefix(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name))
    }
}

type DeclareActionListener = Box<dyn Fn(&Arc<Route>) + Send + Sync>;

/// Declared routes plus the `declare_action` subscriber list.
#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<Vec<Arc<Route>>>,
    listeners: RwLock<Vec<DeclareActionListener>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every route declared from now on.
    pub fn on_declare_action(&self, listener: impl Fn(&Arc<Route>) + Send + Sync + 'static) {
        rw_write(&self.listeners, SOURCE, "on_declare_action").push(Box::new(listener));
    }

    pub fn declare(
        &self,
        modals: impl IntoIterator<Item = ModalDeclaration>,
    ) -> Result<(), RouteError> {
        for modal in modals {
            let prefix = modal.prefix();
            for decl in modal.routes {
                let route = Arc::new(build_route(&prefix, decl)?);
                self.insert(route);
            }
        }
        Ok(())
    }

    pub fn insert(&self, route: Arc<Route>) {
        debug!(
            route = route.name(),
            method = %route.method(),
            path = route.path(),
            "Declared route"
        );
        rw_write(&self.routes, SOURCE, "insert").push(Arc::clone(&route));
        for listener in rw_read(&self.listeners, SOURCE, "notify").iter() {
            listener(&route);
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.routes, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_route(prefix: &str, decl: RouteDeclaration) -> Result<Route, RouteError> {
    let method = Method::from_bytes(decl.method.to_uppercase().as_bytes()).map_err(|_| {
        RouteError::InvalidMethod {
            route: decl.name.clone(),
            method: decl.method.clone(),
        }
    })?;

    let path = match decl.path.as_deref() {
        Some(path) if path.starts_with('/') => path.to_string(),
        Some(path) => join_path(prefix, path),
        None => join_path(prefix, &decl.name),
    };

    let action = ActionDescriptor {
        request: decl.request,
        response: decl.response,
        ttl: decl.ttl.filter(|secs| *secs > 0).map(Duration::from_secs),
        res_state: decl.res_state,
        map_state: decl.map_state,
    };
    Ok(Route::new(decl.name, method, path, action))
}

fn join_path(prefix: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn modal(value: Value) -> ModalDeclaration {
        serde_json::from_value(value).expect("modal declaration")
    }

    #[test]
    fn route_exposes_keys_in_order() {
        let route = Route::new("Post", Method::GET, "/users/:uid/posts/:pid", ActionDescriptor::default());
        assert_eq!(route.keys().to_vec(), vec!["uid".to_string(), "pid".to_string()]);
    }

    #[test]
    fn compile_substitutes_and_encodes_params() {
        let route = Route::new("Post", Method::GET, "/users/:uid/posts/:pid", ActionDescriptor::default());
        let path = route
            .compile(&params(json!({"uid": 7, "pid": "a b/c"})))
            .expect("compiles");
        assert_eq!(path, "/users/7/posts/a%20b%2Fc");
    }

    #[test]
    fn compile_skips_optional_params() {
        let route = Route::new("List", Method::GET, "/posts/:page?", ActionDescriptor::default());
        assert_eq!(route.compile(&Map::new()).expect("compiles"), "/posts");
    }

    #[test]
    fn compile_requires_mandatory_params() {
        let route = Route::new("User", Method::GET, "/users/:id", ActionDescriptor::default());
        let err = route.compile(&Map::new()).expect_err("missing id");
        assert!(matches!(err, RouteError::MissingParam { ref key, .. } if key == "id"));
    }

    #[test]
    fn declare_builds_paths_from_modal_prefix() {
        let table = RouteTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        table.on_declare_action(move |route| {
            sink.lock()
                .expect("listener lock")
                .push((route.name().to_string(), route.path().to_string()));
        });

        table
            .declare([modal(json!({
                "name": "account",
                "routes": [
                    {"name": "AccountLogin", "method": "post", "path": "login", "response": "Session"},
                    {"name": "AccountProfile", "path": "/me/:id", "ttl": 30},
                    {"name": "AccountInfo"}
                ]
            }))])
            .expect("declares");

        assert_eq!(table.len(), 3);
        let seen = seen.lock().expect("listener lock").clone();
        assert_eq!(
            seen,
            vec![
                ("AccountLogin".to_string(), "/account/login".to_string()),
                ("AccountProfile".to_string(), "/me/:id".to_string()),
                ("AccountInfo".to_string(), "/account/AccountInfo".to_string()),
            ]
        );
    }

    #[test]
    fn declare_parses_action_descriptor() {
        let table = RouteTable::new();
        let captured = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&captured);
        table.on_declare_action(move |route| {
            *sink.lock().expect("listener lock") = Some(Arc::clone(route));
        });
        table
            .declare([modal(json!({
                "name": "user",
                "routes": [{
                    "name": "UserGet",
                    "method": "get",
                    "path": ":id",
                    "request": "UserQuery",
                    "response": "User",
                    "ttl": 60,
                    "res_state": false,
                    "map_state": ["name"]
                }]
            }))])
            .expect("declares");

        let route = captured.lock().expect("listener lock").clone().expect("announced");
        assert_eq!(route.method(), &Method::GET);
        assert_eq!(route.path(), "/user/:id");
        let action = route.action();
        assert_eq!(action.request.as_deref(), Some("UserQuery"));
        assert_eq!(action.ttl, Some(Duration::from_secs(60)));
        assert_eq!(action.res_state, ResState::Disabled);
        assert!(matches!(action.map_state, MappingSpec::List(ref names) if names == &["name".to_string()]));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let table = RouteTable::new();
        let err = table
            .declare([modal(json!({"name": "x", "routes": [{"name": "Bad", "method": "NOT A METHOD"}]}))])
            .expect_err("invalid method");
        assert!(matches!(err, RouteError::InvalidMethod { .. }));
    }
}
