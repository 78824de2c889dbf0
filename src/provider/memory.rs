//! In-memory control plane
//!
//! Mirrors the Compute Engine semantics the engine relies on:
//!
//! - operations stay `RUNNING` for a configurable number of polls
//! - every resource carries a fingerprint; updates with a stale one fail
//! - deleting a resource that another resource still references fails with
//!   "in use"
//! - creating a resource that references a missing one fails
//!
//! Faults can be injected per call, and every call is journaled so tests can
//! assert on ordering.

use super::ComputeApi;
use crate::error::ApiError;
use crate::gcp::client::SELF_LINK_PREFIX;
use crate::operation::{Operation, OperationError, OperationStatus};
use crate::resource::{canonical_link, ResourceKind, Scope};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

/// What a journaled call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Insert,
    Get,
    Update,
    Delete,
    Invoke(String),
    ListInstances,
    GetOperation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    pub kind: Option<ResourceKind>,
    pub name: String,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.verb,
            Verb::Insert | Verb::Update | Verb::Delete | Verb::Invoke(_)
        )
    }
}

/// Injected failure
#[derive(Debug, Clone)]
pub enum Fault {
    /// The call itself fails
    Api(ApiError),
    /// The call is accepted but its operation finishes with this error and
    /// has no effect
    Operation(OperationError),
}

type ResourceKey = (ResourceKind, Scope, String);

struct PendingOperation {
    scope: Scope,
    remaining_polls: u32,
    error: Option<OperationError>,
}

#[derive(Default)]
struct State {
    resources: BTreeMap<ResourceKey, Value>,
    group_members: BTreeMap<ResourceKey, Vec<String>>,
    operations: HashMap<String, PendingOperation>,
    faults: Vec<(Verb, ResourceKind, String, Fault)>,
    journal: Vec<Call>,
    next_id: u64,
}

/// [`ComputeApi`] held entirely in process memory
pub struct InMemoryCompute {
    project_id: String,
    pending_polls: u32,
    state: Mutex<State>,
}

impl InMemoryCompute {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            pending_polls: 0,
            state: Mutex::new(State::default()),
        }
    }

    /// Operations report RUNNING for `polls` polls before DONE
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Fail every matching call with `fault`
    pub async fn inject_fault(&self, verb: Verb, kind: ResourceKind, name: &str, fault: Fault) {
        self.state
            .lock()
            .await
            .faults
            .push((verb, kind, name.to_string(), fault));
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Every call made so far, in order
    pub async fn journal(&self) -> Vec<Call> {
        self.state.lock().await.journal.clone()
    }

    /// Only the calls that change state
    pub async fn mutations(&self) -> Vec<Call> {
        self.journal()
            .await
            .into_iter()
            .filter(Call::is_mutation)
            .collect()
    }

    pub async fn operation_polls(&self) -> usize {
        self.state
            .lock()
            .await
            .journal
            .iter()
            .filter(|c| c.verb == Verb::GetOperation)
            .count()
    }

    pub async fn contains(&self, kind: ResourceKind, scope: &Scope, name: &str) -> bool {
        self.state
            .lock()
            .await
            .resources
            .contains_key(&(kind, scope.clone(), name.to_string()))
    }

    pub async fn resource_count(&self) -> usize {
        self.state.lock().await.resources.len()
    }

    /// Operations submitted but not yet reported DONE
    pub async fn pending_operation_count(&self) -> usize {
        self.state.lock().await.operations.len()
    }

    /// Canonical self link the provider assigns
    pub fn self_link(&self, kind: ResourceKind, scope: &Scope, name: &str) -> String {
        format!(
            "{}projects/{}/{}/{}/{}",
            SELF_LINK_PREFIX,
            self.project_id,
            scope.path(),
            kind.collection(),
            name
        )
    }

    fn find_fault(state: &State, verb: &Verb, kind: ResourceKind, name: &str) -> Option<Fault> {
        state
            .faults
            .iter()
            .find(|(v, k, n, _)| v == verb && *k == kind && n == name)
            .map(|(_, _, _, fault)| fault.clone())
    }

    fn record(state: &mut State, verb: Verb, kind: Option<ResourceKind>, name: &str) {
        state.journal.push(Call {
            verb,
            kind,
            name: name.to_string(),
        });
    }

    fn new_operation(&self, state: &mut State, scope: &Scope, error: Option<OperationError>) -> Operation {
        let name = format!("operation-{}", uuid::Uuid::new_v4());
        if self.pending_polls == 0 {
            return Operation {
                name,
                scope: scope.clone(),
                status: OperationStatus::Done,
                error,
            };
        }
        state.operations.insert(
            name.clone(),
            PendingOperation {
                scope: scope.clone(),
                remaining_polls: self.pending_polls,
                error,
            },
        );
        Operation {
            name,
            scope: scope.clone(),
            status: OperationStatus::Pending,
            error: None,
        }
    }

    /// Resolve a link to a stored resource key, if it names a managed collection
    fn key_for_link(&self, link: &str) -> Option<ResourceKey> {
        let link = canonical_link(link);
        let rest = link.strip_prefix(&format!("projects/{}/", self.project_id))?;
        let parts: Vec<&str> = rest.split('/').collect();
        let (scope, collection, name) = match parts.as_slice() {
            ["global", collection, name] => (Scope::Global, *collection, *name),
            ["regions", region, collection, name] => {
                (Scope::Regional(region.to_string()), *collection, *name)
            }
            ["zones", zone, collection, name] => (Scope::Zonal(zone.to_string()), *collection, *name),
            _ => return None,
        };
        let kind = ResourceKind::all().find(|k| k.collection() == collection)?;
        Some((kind, scope, name.to_string()))
    }

    /// All links to managed collections found anywhere in `value`
    fn referenced_keys(&self, value: &Value, out: &mut Vec<ResourceKey>) {
        match value {
            Value::String(s) => {
                if let Some(key) = self.key_for_link(s) {
                    out.push(key);
                }
            }
            Value::Array(items) => items.iter().for_each(|v| self.referenced_keys(v, out)),
            Value::Object(map) => {
                for (field, v) in map {
                    // back-references, not dependencies
                    if field != "selfLink" && field != "users" {
                        self.referenced_keys(v, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn allocate_ip(state: &mut State) -> String {
        state.next_id += 1;
        format!("10.250.{}.{}", (state.next_id / 256) % 256, state.next_id % 256)
    }

    fn materialize(&self, state: &mut State, kind: ResourceKind, scope: &Scope, name: &str, mut body: Value) -> Value {
        state.next_id += 1;
        let id = state.next_id;
        let self_link = self.self_link(kind, scope, name);
        if let Value::Object(map) = &mut body {
            map.insert("id".to_string(), json!(id.to_string()));
            map.insert("selfLink".to_string(), json!(self_link));
            map.insert("fingerprint".to_string(), json!(format!("fp-{}", id)));
            map.insert(
                "creationTimestamp".to_string(),
                json!(chrono::Utc::now().to_rfc3339()),
            );
        }

        match kind {
            ResourceKind::Address if body.get("address").is_none() => {
                let ip = Self::allocate_ip(state);
                body["address"] = json!(ip);
            }
            ResourceKind::ForwardingRule => {
                let address_key = body
                    .get("IPAddress")
                    .and_then(|v| v.as_str())
                    .and_then(|link| self.key_for_link(link));
                let reserved = match address_key.and_then(|key| state.resources.get_mut(&key)) {
                    // The address records its user, like Compute's `users` field
                    Some(address) => {
                        address["status"] = json!("IN_USE");
                        match address.get_mut("users").and_then(|v| v.as_array_mut()) {
                            Some(users) => users.push(json!(self_link)),
                            None => address["users"] = json!([self_link]),
                        }
                        address.get("address").and_then(|v| v.as_str()).map(str::to_string)
                    }
                    None => None,
                };
                let ip = match (reserved, body.get("IPAddress").and_then(|v| v.as_str())) {
                    (Some(ip), _) => ip,
                    (None, Some(literal)) => literal.to_string(),
                    (None, None) => Self::allocate_ip(state),
                };
                body["IPAddress"] = json!(ip);
            }
            _ => {}
        }
        body
    }

    fn bump_fingerprint(state: &mut State, resource: &mut Value) {
        state.next_id += 1;
        resource["fingerprint"] = json!(format!("fp-{}", state.next_id));
    }
}

#[async_trait]
impl ComputeApi for InMemoryCompute {
    async fn insert(&self, kind: ResourceKind, scope: &Scope, body: &Value) -> Result<Operation, ApiError> {
        let name = body
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::from_status(400, "required", "Required field 'name' not specified"))?
            .to_string();

        let mut state = self.state.lock().await;
        Self::record(&mut state, Verb::Insert, Some(kind), &name);

        match Self::find_fault(&state, &Verb::Insert, kind, &name) {
            Some(Fault::Api(err)) => return Err(err),
            Some(Fault::Operation(err)) => return Ok(self.new_operation(&mut state, scope, Some(err))),
            None => {}
        }

        let key = (kind, scope.clone(), name.clone());
        if state.resources.contains_key(&key) {
            return Err(ApiError::AlreadyExists(format!(
                "The resource '{}' already exists",
                self.self_link(kind, scope, &name)
            )));
        }

        let mut refs = Vec::new();
        self.referenced_keys(body, &mut refs);
        if let Some((rk, rs, rn)) = refs.iter().find(|k| !state.resources.contains_key(*k)) {
            return Err(ApiError::from_status(
                400,
                "invalid",
                &format!("The resource '{}' was not found", self.self_link(*rk, rs, rn)),
            ));
        }

        let resource = self.materialize(&mut state, kind, scope, &name, body.clone());
        state.resources.insert(key, resource);
        Ok(self.new_operation(&mut state, scope, None))
    }

    async fn get(&self, kind: ResourceKind, scope: &Scope, name: &str) -> Result<Value, ApiError> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, Verb::Get, Some(kind), name);

        if let Some(Fault::Api(err)) = Self::find_fault(&state, &Verb::Get, kind, name) {
            return Err(err);
        }

        state
            .resources
            .get(&(kind, scope.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "The resource '{}' was not found",
                    self.self_link(kind, scope, name)
                ))
            })
    }

    async fn update(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        name: &str,
        body: &Value,
    ) -> Result<Operation, ApiError> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, Verb::Update, Some(kind), name);

        match Self::find_fault(&state, &Verb::Update, kind, name) {
            Some(Fault::Api(err)) => return Err(err),
            Some(Fault::Operation(err)) => return Ok(self.new_operation(&mut state, scope, Some(err))),
            None => {}
        }

        let key = (kind, scope.clone(), name.to_string());
        let current_fingerprint = match state.resources.get(&key) {
            Some(current) => current.get("fingerprint").cloned(),
            None => {
                return Err(ApiError::NotFound(format!(
                    "The resource '{}' was not found",
                    self.self_link(kind, scope, name)
                )))
            }
        };

        if body.get("fingerprint") != current_fingerprint.as_ref() {
            return Err(ApiError::PreconditionFailed(
                "Invalid fingerprint: the resource was modified since it was read".to_string(),
            ));
        }

        let mut updated = body.clone();
        if let (Value::Object(new), Some(Value::Object(old))) = (&mut updated, state.resources.get(&key)) {
            for field in ["id", "selfLink", "creationTimestamp"] {
                if let Some(v) = old.get(field) {
                    new.insert(field.to_string(), v.clone());
                }
            }
        }
        Self::bump_fingerprint(&mut state, &mut updated);
        state.resources.insert(key, updated);
        Ok(self.new_operation(&mut state, scope, None))
    }

    async fn delete(&self, kind: ResourceKind, scope: &Scope, name: &str) -> Result<Operation, ApiError> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, Verb::Delete, Some(kind), name);

        match Self::find_fault(&state, &Verb::Delete, kind, name) {
            Some(Fault::Api(err)) => return Err(err),
            Some(Fault::Operation(err)) => return Ok(self.new_operation(&mut state, scope, Some(err))),
            None => {}
        }

        let key = (kind, scope.clone(), name.to_string());
        if !state.resources.contains_key(&key) {
            return Err(ApiError::NotFound(format!(
                "The resource '{}' was not found",
                self.self_link(kind, scope, name)
            )));
        }

        let referrer = state.resources.iter().find_map(|(other, value)| {
            if *other == key {
                return None;
            }
            let mut refs = Vec::new();
            self.referenced_keys(value, &mut refs);
            refs.contains(&key)
                .then(|| self.self_link(other.0, &other.1, &other.2))
        });
        let user = referrer.or_else(|| {
            state.resources[&key]
                .get("users")
                .and_then(|v| v.as_array())
                .and_then(|users| users.first())
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        if let Some(user) = user {
            return Err(ApiError::ResourceInUse(format!(
                "The {} resource '{}' is already being used by '{}'",
                kind,
                self.self_link(kind, scope, name),
                user
            )));
        }

        state.resources.remove(&key);
        state.group_members.remove(&key);
        let link = self.self_link(kind, scope, name);
        for value in state.resources.values_mut() {
            if let Some(users) = value.get_mut("users").and_then(|v| v.as_array_mut()) {
                users.retain(|u| u.as_str().map(canonical_link) != Some(canonical_link(&link)));
                if users.is_empty() {
                    value["status"] = json!("RESERVED");
                }
            }
        }
        Ok(self.new_operation(&mut state, scope, None))
    }

    async fn invoke(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        name: &str,
        method: &str,
        body: &Value,
    ) -> Result<Operation, ApiError> {
        let mut state = self.state.lock().await;
        let verb = Verb::Invoke(method.to_string());
        Self::record(&mut state, verb.clone(), Some(kind), name);

        match Self::find_fault(&state, &verb, kind, name) {
            Some(Fault::Api(err)) => return Err(err),
            Some(Fault::Operation(err)) => return Ok(self.new_operation(&mut state, scope, Some(err))),
            None => {}
        }

        let key = (kind, scope.clone(), name.to_string());
        if !state.resources.contains_key(&key) {
            return Err(ApiError::NotFound(format!(
                "The resource '{}' was not found",
                self.self_link(kind, scope, name)
            )));
        }

        match (kind, method) {
            (ResourceKind::InstanceGroup, "addInstances") => {
                let requested: Vec<String> = body
                    .get("instances")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|i| i.get("instance").and_then(|v| v.as_str()))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let members = state.group_members.entry(key).or_default();
                if let Some(dup) = requested
                    .iter()
                    .find(|r| members.iter().any(|m| canonical_link(m) == canonical_link(r)))
                {
                    return Err(ApiError::from_status(
                        400,
                        "memberAlreadyExists",
                        &format!("Instance '{}' is already a member of the group", dup),
                    ));
                }
                members.extend(requested);
            }
            (ResourceKind::InstanceGroup, "setNamedPorts") => {
                let mut resource = state.resources.get(&key).cloned().unwrap_or(Value::Null);
                if let Some(fp) = body.get("fingerprint") {
                    if resource.get("fingerprint") != Some(fp) {
                        return Err(ApiError::PreconditionFailed(
                            "Invalid fingerprint for setNamedPorts".to_string(),
                        ));
                    }
                }
                resource["namedPorts"] = body.get("namedPorts").cloned().unwrap_or(json!([]));
                Self::bump_fingerprint(&mut state, &mut resource);
                state.resources.insert(key, resource);
            }
            _ => {
                return Err(ApiError::from_status(
                    400,
                    "invalid",
                    &format!("Method '{}' is not supported on {}", method, kind),
                ))
            }
        }

        Ok(self.new_operation(&mut state, scope, None))
    }

    async fn list_group_instances(&self, scope: &Scope, group: &str) -> Result<Vec<String>, ApiError> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, Verb::ListInstances, Some(ResourceKind::InstanceGroup), group);

        let key = (ResourceKind::InstanceGroup, scope.clone(), group.to_string());
        if !state.resources.contains_key(&key) {
            return Err(ApiError::NotFound(format!("Instance group '{}' was not found", group)));
        }
        Ok(state.group_members.get(&key).cloned().unwrap_or_default())
    }

    async fn get_operation(&self, scope: &Scope, name: &str) -> Result<Operation, ApiError> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, Verb::GetOperation, None, name);

        let pending = state
            .operations
            .get_mut(name)
            .filter(|op| op.scope == *scope)
            .ok_or_else(|| ApiError::NotFound(format!("Operation '{}' was not found", name)))?;

        pending.remaining_polls = pending.remaining_polls.saturating_sub(1);
        if pending.remaining_polls > 0 {
            return Ok(Operation {
                name: name.to_string(),
                scope: scope.clone(),
                status: OperationStatus::Running,
                error: None,
            });
        }

        // Finished operations are reported once, then forgotten
        let error = state.operations.remove(name).and_then(|op| op.error);
        Ok(Operation {
            name: name.to_string(),
            scope: scope.clone(),
            status: OperationStatus::Done,
            error,
        })
    }
}
