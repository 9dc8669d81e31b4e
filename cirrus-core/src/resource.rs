//! Resource - Desired configuration and observed state of remote objects

use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "emr_cluster", "ssm_maintenance_window")
    pub resource_type: String,
    /// Resource name (identifier given by the caller)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Convert a JSON value into an attribute value
    ///
    /// `null` and non-integral numbers have no attribute representation, at
    /// any depth; a list or map containing one converts to `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
            serde_json::Value::Array(arr) => arr
                .iter()
                .map(Value::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                .collect::<Option<HashMap<_, _>>>()
                .map(Value::Map),
            serde_json::Value::Null => None,
        }
    }

    /// Convert an attribute value into JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "String",
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Typed getters over an attribute map
pub trait AttributesExt {
    fn get_string(&self, key: &str) -> Option<&str>;
    fn get_int(&self, key: &str) -> Option<i64>;
    fn get_bool(&self, key: &str) -> Option<bool>;

    /// Get a list attribute, keeping only its string members
    fn get_strings(&self, key: &str) -> Option<Vec<String>>;

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

impl AttributesExt for HashMap<String, Value> {
    fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    fn get_strings(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key) {
            Some(Value::List(items)) => Some(
                items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Lifecycle phase of a remote object
///
/// Phases form a partial order: pending/bootstrapping -> active <-> terminating
/// -> terminated, with failed reachable from every phase but terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pending,
    Bootstrapping,
    Active,
    Terminating,
    Terminated,
    Failed,
}

impl Phase {
    /// Terminated objects never change again
    pub fn is_terminal(self) -> bool {
        self == Phase::Terminated
    }

    /// Whether `next` is reachable from this phase through zero or more transitions.
    ///
    /// Observations are snapshots, so intermediate phases may be skipped.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;

        if self == next {
            return true;
        }
        match self {
            Pending => true,
            Bootstrapping => next != Pending,
            Active | Terminating => matches!(next, Active | Terminating | Terminated | Failed),
            Failed => matches!(next, Terminating | Terminated),
            Terminated => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Pending => "pending",
            Phase::Bootstrapping => "bootstrapping",
            Phase::Active => "active",
            Phase::Terminating => "terminating",
            Phase::Terminated => "terminated",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Vendor status of a remote object together with its lifecycle phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Status string as reported by the vendor (e.g., "BOOTSTRAPPING")
    pub raw: String,
    pub phase: Phase,
}

impl Status {
    pub fn new(raw: impl Into<String>, phase: Phase) -> Self {
        Self {
            raw: raw.into(),
            phase,
        }
    }
}

/// Desired configuration supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Observed state fetched from the remote system
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Identity assigned by the remote system (ARN, cluster ID, window ID)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Vendor status, for resources that have one
    pub status: Option<Status>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            status: None,
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            status: None,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Phase of the observed object, if it reports one
    pub fn phase(&self) -> Option<Phase> {
        self.status.as_ref().map(|s| s.phase)
    }
}
