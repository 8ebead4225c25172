//! State mapping.
//!
//! Projects a response payload into the state fragment handed back to the
//! caller. The projection is described by a [`MappingSpec`], resolved once
//! when a route is declared, and the fragment is wrapped under a single
//! state key chosen by [`ResState`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::contract::Invocation;

/// A structure whose children can be reached by string keys.
///
/// Only JSON objects are keyed; arrays and scalars end a dotted path.
pub trait Keyed {
    fn is_keyed(&self) -> bool;

    /// The child stored under `key`, or `None` when absent or when `self` is
    /// not keyed.
    fn child(&self, key: &str) -> Option<&Self>;
}

impl Keyed for Value {
    fn is_keyed(&self) -> bool {
        self.is_object()
    }

    fn child(&self, key: &str) -> Option<&Self> {
        self.as_object().and_then(|map| map.get(key))
    }
}

/// Follow a dotted path such as `user.profile.age`.
///
/// Traversal stops with `None` as soon as a segment is missing or an
/// intermediate value is not keyed.
pub fn lookup_path<'a, T: Keyed>(root: &'a T, path: &str) -> Option<&'a T> {
    path.split('.')
        .try_fold(root, |current, segment| current.child(segment))
}

pub type MapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// How an output payload is projected into a state fragment.
#[derive(Clone, Default, Deserialize)]
#[serde(from = "RawMapping")]
pub enum MappingSpec {
    #[default]
    None,
    /// Each entry is both the state key and the dotted source path.
    List(Vec<String>),
    /// `(state key, dotted source path)` pairs.
    Rename(Vec<(String, String)>),
    Custom(MapFn),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMapping {
    List(Vec<String>),
    Rename(BTreeMap<String, String>),
}

impl From<RawMapping> for MappingSpec {
    fn from(raw: RawMapping) -> Self {
        match raw {
            RawMapping::List(names) => MappingSpec::List(names),
            RawMapping::Rename(pairs) => MappingSpec::Rename(pairs.into_iter().collect()),
        }
    }
}

impl fmt::Debug for MappingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingSpec::None => f.write_str("None"),
            MappingSpec::List(names) => f.debug_tuple("List").field(names).finish(),
            MappingSpec::Rename(pairs) => f.debug_tuple("Rename").field(pairs).finish(),
            MappingSpec::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl MappingSpec {
    pub fn custom(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        MappingSpec::Custom(Arc::new(f))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, MappingSpec::None)
    }

    /// Apply the projection. `None` means this spec has no opinion and the
    /// next candidate should be tried.
    pub fn apply(&self, output: &Value) -> Option<Value> {
        let mapped = match self {
            MappingSpec::None => return None,
            MappingSpec::List(names) => Value::Object(
                names
                    .iter()
                    .map(|name| (name.clone(), lookup_owned(output, name)))
                    .collect(),
            ),
            MappingSpec::Rename(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(target, source)| (target.clone(), lookup_owned(output, source)))
                    .collect::<Map<String, Value>>(),
            ),
            MappingSpec::Custom(f) => f(output),
        };
        is_truthy(&mapped).then_some(mapped)
    }
}

fn lookup_owned(output: &Value, path: &str) -> Value {
    lookup_path(output, path).cloned().unwrap_or(Value::Null)
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Which state key the mapped fragment is wrapped under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawResState")]
pub enum ResState {
    /// Wrap under the route's response schema name.
    #[default]
    Inherit,
    Named(String),
    /// Return the mapped value without a wrapping key.
    Disabled,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResState {
    Flag(bool),
    Name(String),
}

impl From<RawResState> for ResState {
    fn from(raw: RawResState) -> Self {
        match raw {
            RawResState::Flag(false) => ResState::Disabled,
            RawResState::Flag(true) => ResState::Inherit,
            RawResState::Name(name) if name.is_empty() => ResState::Inherit,
            RawResState::Name(name) => ResState::Named(name),
        }
    }
}

/// Map an output payload into a state fragment.
///
/// The per-call spec wins over the route's spec, which wins over the raw
/// output; a spec that produces an empty object still wins. Outputs that are
/// not objects are not mapped at all.
pub fn map_output(
    output: &Value,
    call_spec: &MappingSpec,
    route_spec: &MappingSpec,
    res_state: &ResState,
    response: Option<&str>,
) -> Option<Value> {
    if !output.is_keyed() {
        return None;
    }

    let mapped = call_spec
        .apply(output)
        .or_else(|| route_spec.apply(output))
        .unwrap_or_else(|| output.clone());

    let name = match res_state {
        ResState::Disabled => return Some(mapped),
        ResState::Named(name) => Some(name.as_str()),
        ResState::Inherit => response,
    };

    match name {
        Some(name) => {
            let mut wrapped = Map::new();
            wrapped.insert(name.to_string(), mapped);
            Some(Value::Object(wrapped))
        }
        None => Some(mapped),
    }
}

/// Map the output recorded on an invocation into its state fragment.
pub fn map_payload_state(argv: &Invocation) -> Option<Value> {
    let output = argv.output.as_ref()?;
    let action = argv.route.action();
    map_output(
        output,
        &argv.map_state,
        &action.map_state,
        &action.res_state,
        action.response.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn profile() -> Value {
        json!({"user": {"name": "jetiny", "profile": {"age": 5}}})
    }

    #[test]
    fn lookup_follows_dotted_paths() {
        let output = profile();
        assert_eq!(lookup_path(&output, "user.name"), Some(&json!("jetiny")));
        assert_eq!(lookup_path(&output, "user.profile.age"), Some(&json!(5)));
        assert_eq!(lookup_path(&output, "user.missing.age"), None);
        assert_eq!(lookup_path(&output, "user.name.first"), None);
    }

    #[test]
    fn lookup_stops_at_arrays() {
        let output = json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(lookup_path(&output, "items"), Some(&json!([{"id": 1}, {"id": 2}])));
        assert_eq!(lookup_path(&output, "items.1.id"), None);
        assert_eq!(lookup_path(&output, "items.0"), None);
    }

    #[test]
    fn array_output_is_not_mapped() {
        let output = json!([1, 2]);
        let spec = MappingSpec::List(vec!["0".into()]);

        assert_eq!(
            map_output(&output, &MappingSpec::None, &MappingSpec::None, &ResState::Inherit, Some("Items")),
            None
        );
        assert_eq!(
            map_output(&output, &spec, &MappingSpec::None, &ResState::Disabled, None),
            None
        );
    }

    #[test]
    fn rename_spec_projects_paths() {
        let spec: MappingSpec = serde_json::from_value(json!({
            "userName": "user.name",
            "userAge": "user.profile.age",
            "lost": "user.missing.age"
        }))
        .expect("rename spec");

        let mapped = map_output(&profile(), &spec, &MappingSpec::None, &ResState::Disabled, None);
        assert_eq!(
            mapped,
            Some(json!({"userName": "jetiny", "userAge": 5, "lost": null}))
        );
    }

    #[test]
    fn list_spec_uses_path_as_key() {
        let spec: MappingSpec = serde_json::from_value(json!(["user"])).expect("list spec");
        let mapped = map_output(&profile(), &spec, &MappingSpec::None, &ResState::Inherit, Some("UserInfo"));
        assert_eq!(
            mapped,
            Some(json!({"UserInfo": {"user": {"name": "jetiny", "profile": {"age": 5}}}}))
        );
    }

    #[test]
    fn custom_spec_receives_output() {
        let spec = MappingSpec::custom(|output| json!({"age": output["user"]["profile"]["age"]}));
        let mapped = map_output(&profile(), &spec, &MappingSpec::None, &ResState::Named("me".into()), Some("UserInfo"));
        assert_eq!(mapped, Some(json!({"me": {"age": 5}})));
    }

    #[test]
    fn call_spec_takes_precedence_over_route_spec() {
        let call = MappingSpec::List(vec![]);
        let route = MappingSpec::List(vec!["user".into()]);
        let mapped = map_output(&profile(), &call, &route, &ResState::Disabled, None);
        assert_eq!(mapped, Some(json!({})));
    }

    #[test]
    fn falsy_custom_result_falls_back_to_route_spec() {
        let call = MappingSpec::custom(|_| Value::Null);
        let route = MappingSpec::List(vec!["user.name".into()]);
        let mapped = map_output(&profile(), &call, &route, &ResState::Disabled, None);
        assert_eq!(mapped, Some(json!({"user.name": "jetiny"})));
    }

    #[test]
    fn raw_output_is_wrapped_under_response_name() {
        let mapped = map_output(&json!({"id": 1}), &MappingSpec::None, &MappingSpec::None, &ResState::Inherit, Some("Widget"));
        assert_eq!(mapped, Some(json!({"Widget": {"id": 1}})));
    }

    #[test]
    fn non_keyed_output_is_not_mapped() {
        let mapped = map_output(&json!("plain"), &MappingSpec::None, &MappingSpec::None, &ResState::Inherit, Some("Widget"));
        assert_eq!(mapped, None);
    }

    #[test]
    fn res_state_parses_false_and_names() {
        let disabled: ResState = serde_json::from_value(json!(false)).expect("flag");
        let named: ResState = serde_json::from_value(json!("profile")).expect("name");
        assert_eq!(disabled, ResState::Disabled);
        assert_eq!(named, ResState::Named("profile".into()));
    }
}
