//! Flux action table.
//!
//! Every declared route becomes an invoke action named after its method and
//! route name; routes without path keys also get a `…Data` variant that takes
//! the request body directly. Request and response schemas get `Check…` and
//! `Extract…` actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::routing::Route;
use crate::schema::{Schema, SchemaGateway};

#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Payload is a full set of invocation arguments.
    Invoke(Arc<Route>),
    /// Payload is the request body.
    InvokeData(Arc<Route>),
    Check(Arc<Schema>),
    Extract(Arc<Schema>),
}

/// Receives state fragments produced by committed invocations.
pub trait StateSink: Send + Sync {
    fn update_state(&self, fragment: Value);
}

/// Whether an invocation hands its result back or commits it to a sink.
#[derive(Clone, Copy)]
pub enum InvokeMode<'a> {
    /// Return the mapped state, or the raw output when nothing was mapped.
    Fetch,
    Commit(&'a dyn StateSink),
}

#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    actions: BTreeMap<String, ActionKind>,
}

impl ActionTable {
    pub(crate) fn build(
        routes: &[Arc<Route>],
        schemas: &SchemaGateway,
        prefix: &str,
    ) -> Self {
        let mut actions = BTreeMap::new();

        for route in routes {
            let name = pascal_case(&format!(
                "{}_{}{}",
                route.method().as_str().to_lowercase(),
                prefix,
                route.name()
            ));
            if route.keys().is_empty() {
                actions.insert(
                    format!("{name}Data"),
                    ActionKind::InvokeData(Arc::clone(route)),
                );
            }
            actions.insert(name, ActionKind::Invoke(Arc::clone(route)));

            let action = route.action();
            for schema_name in [&action.request, &action.response].into_iter().flatten() {
                if let Some(schema) = schemas.get_schema(schema_name) {
                    actions.insert(
                        format!("Check{prefix}{schema_name}"),
                        ActionKind::Check(Arc::clone(&schema)),
                    );
                    actions.insert(
                        format!("Extract{prefix}{schema_name}"),
                        ActionKind::Extract(schema),
                    );
                }
            }
        }

        Self { actions }
    }

    pub fn get(&self, name: &str) -> Option<&ActionKind> {
        self.actions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// `get_shopWidgetList` → `GetShopWidgetList`.
pub fn pascal_case(text: &str) -> String {
    text.split(['_', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::routing::ActionDescriptor;
    use crate::schema::SchemaDeclaration;

    #[test]
    fn pascal_case_joins_words() {
        assert_eq!(pascal_case("get_shopWidgetList"), "GetShopWidgetList");
        assert_eq!(pascal_case("post_account-login"), "PostAccountLogin");
        assert_eq!(pascal_case("__get"), "Get");
    }

    fn route(name: &str, method: Method, path: &str, request: Option<&str>, response: Option<&str>) -> Arc<Route> {
        let action = ActionDescriptor {
            request: request.map(str::to_string),
            response: response.map(str::to_string),
            ..Default::default()
        };
        Arc::new(Route::new(name, method, path, action))
    }

    fn gateway() -> SchemaGateway {
        let gateway = SchemaGateway::new(true);
        let decls: Vec<SchemaDeclaration> = serde_json::from_value(json!([
            {"name": "LoginForm"},
            {"name": "Session"}
        ]))
        .expect("declarations");
        gateway.declare(decls);
        gateway
    }

    #[test]
    fn default_table_has_unprefixed_names() {
        let routes = vec![
            route("AccountLogin", Method::POST, "/account/login", Some("LoginForm"), Some("Session")),
            route("UserGet", Method::GET, "/users/:id", None, Some("Missing")),
        ];
        let table = ActionTable::build(&routes, &gateway(), "");
        let names: Vec<&str> = table.names().collect();
        assert_eq!(
            names,
            vec![
                "CheckLoginForm",
                "CheckSession",
                "ExtractLoginForm",
                "ExtractSession",
                "GetUserGet",
                "PostAccountLogin",
                "PostAccountLoginData",
            ]
        );
        assert!(matches!(table.get("GetUserGet"), Some(ActionKind::Invoke(_))));
        assert!(matches!(table.get("PostAccountLoginData"), Some(ActionKind::InvokeData(_))));
    }

    #[test]
    fn project_prefix_is_applied() {
        let routes = vec![route("AccountLogin", Method::POST, "/account/login", Some("LoginForm"), None)];
        let table = ActionTable::build(&routes, &gateway(), "shop");
        assert!(table.get("PostShopAccountLogin").is_some());
        assert!(table.get("CheckshopLoginForm").is_some());
        assert_eq!(table.len(), 4);
    }
}
