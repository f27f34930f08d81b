//! Scripted provider and fixtures shared by the unit tests

use crate::context::CancellationToken;
use crate::error::ProviderError;
use crate::graph::DependencyGraph;
use crate::provider::{
    Completion, DeleteRequest, KindSchema, OperationHandle, OperationStatus, Provider,
    ProvisionRequest,
};
use crate::state::{ResourceRecord, StateSnapshot};
use crate::types::{Attributes, ResourceDeclaration, Value};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Provider double with injectable failures and latency
pub(crate) struct MockProvider {
    schemas: HashMap<String, KindSchema>,
    fatal: HashSet<String>,
    transient: Mutex<HashMap<String, u32>>,
    pending_polls: u32,
    delay: Duration,
    cancel_after: Option<(String, CancellationToken)>,
    calls: Mutex<Vec<(String, String)>>,
    operations: Mutex<HashMap<String, (u32, Completion)>>,
    next_token: AtomicU64,
    in_flight: Mutex<HashSet<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    overlapped: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        let schemas = [
            KindSchema::new("rg")
                .with_immutable(&["location"])
                .with_outputs(&["name"]),
            KindSchema::new("vnet")
                .with_immutable(&["location", "resourceGroupName"])
                .with_outputs(&["name"]),
            KindSchema::new("subnet")
                .with_immutable(&["resourceGroupName", "virtualNetworkName"])
                .with_outputs(&["name"]),
            KindSchema::new("cognitive")
                .with_immutable(&["location", "resourceGroupName"])
                .with_outputs(&["name", "endpoint", "primaryKey"]),
            KindSchema::new("endpoint")
                .with_immutable(&["resourceGroupName", "subnet"])
                .with_outputs(&["name"]),
            KindSchema::new("budget").with_outputs(&["name"]),
            KindSchema::new("x").with_outputs(&["name"]),
        ]
        .into_iter()
        .map(|s| (s.kind.clone(), s))
        .collect();

        Self {
            schemas,
            fatal: HashSet::new(),
            transient: Mutex::new(HashMap::new()),
            pending_polls: 0,
            delay: Duration::ZERO,
            cancel_after: None,
            calls: Mutex::new(Vec::new()),
            operations: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            in_flight: Mutex::new(HashSet::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
        }
    }

    /// Every call touching `name` fails fatally
    pub fn fail(mut self, name: &str) -> Self {
        self.fatal.insert(name.to_string());
        self
    }

    /// The next `times` calls touching `name` fail transiently
    pub fn transient(self, name: &str, times: u32) -> Self {
        self.transient
            .lock()
            .unwrap()
            .insert(name.to_string(), times);
        self
    }

    /// Operations report in-progress for `polls` polls before completing
    pub fn pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Each call takes at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Trigger `token` once `name` has been created
    pub fn cancel_after(mut self, name: &str, token: CancellationToken) -> Self {
        self.cancel_after = Some((name.to_string(), token));
        self
    }

    /// (operation, resource) pairs in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, name: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, n)| n == name)
            .map(|(op, _)| op)
            .collect()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Whether two calls for the same resource ever ran at once
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    /// Output attributes the mock reports for a provisioned resource
    pub fn completion_for(&self, name: &str, kind: &str, config: &Attributes) -> Completion {
        let mut outputs = Attributes::new();
        if let Some(schema) = self.schemas.get(kind) {
            for attr in &schema.outputs {
                let value = if attr == "name" {
                    config
                        .get("name")
                        .cloned()
                        .unwrap_or_else(|| Value::from(name))
                } else {
                    Value::String(format!("{name}-{attr}"))
                };
                outputs.insert(attr.clone(), value);
            }
        }
        Completion::Provisioned {
            id: format!("/mock/{kind}/{name}"),
            outputs,
        }
    }

    fn call<F>(&self, op: &str, name: &str, f: F) -> Result<OperationStatus, ProviderError>
    where
        F: FnOnce() -> Completion,
    {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), name.to_string()));

        if !self.in_flight.lock().unwrap().insert(name.to_string()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.in_flight.lock().unwrap().remove(name);

        if self.fatal.contains(name) {
            return Err(ProviderError::fatal(format!("{op} {name} rejected")));
        }
        if let Some(left) = self.transient.lock().unwrap().get_mut(name)
            && *left > 0
        {
            *left -= 1;
            return Err(ProviderError::transient("429 too many requests"));
        }

        let completion = f();
        if op == "create"
            && let Some((target, token)) = &self.cancel_after
            && target == name
        {
            token.cancel();
        }

        if self.pending_polls == 0 {
            return Ok(OperationStatus::Completed(completion));
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst).to_string();
        self.operations
            .lock()
            .unwrap()
            .insert(token.clone(), (self.pending_polls, completion));
        Ok(OperationStatus::InProgress(OperationHandle {
            resource: name.to_string(),
            token,
        }))
    }
}

impl Provider for MockProvider {
    fn schema(&self, kind: &str) -> Option<&KindSchema> {
        self.schemas.get(kind)
    }

    fn create(&self, request: &ProvisionRequest) -> Result<OperationStatus, ProviderError> {
        self.call("create", &request.name, || {
            self.completion_for(&request.name, &request.kind, &request.config)
        })
    }

    fn update(&self, request: &ProvisionRequest) -> Result<OperationStatus, ProviderError> {
        if request.id.is_none() {
            return Err(ProviderError::fatal("update without id"));
        }
        self.call("update", &request.name, || {
            self.completion_for(&request.name, &request.kind, &request.config)
        })
    }

    fn delete(&self, request: &DeleteRequest) -> Result<OperationStatus, ProviderError> {
        self.call("delete", &request.name, || Completion::Deleted)
    }

    fn poll(&self, handle: &OperationHandle) -> Result<OperationStatus, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(("poll".to_string(), handle.resource.clone()));
        let mut operations = self.operations.lock().unwrap();
        let Some((left, completion)) = operations.get_mut(&handle.token) else {
            return Err(ProviderError::fatal("unknown operation"));
        };
        *left -= 1;
        if *left == 0 {
            let completion = completion.clone();
            operations.remove(&handle.token);
            return Ok(OperationStatus::Completed(completion));
        }
        Ok(OperationStatus::InProgress(handle.clone()))
    }
}

/// A small topology: rg, vnet, subnet, cognitive account, private endpoint, budget
pub(crate) fn demo_declarations() -> Vec<ResourceDeclaration> {
    vec![
        ResourceDeclaration::new("rg", "rg").with("location", "eastus"),
        ResourceDeclaration::new("vnet", "vnet")
            .with("resourceGroupName", Value::reference("rg", "name"))
            .with("location", "eastus")
            .with("addressSpace", "10.0.0.0/16"),
        ResourceDeclaration::new("subnet", "subnet")
            .with("resourceGroupName", Value::reference("rg", "name"))
            .with("virtualNetworkName", Value::reference("vnet", "name"))
            .with("addressPrefix", "10.0.1.0/24"),
        ResourceDeclaration::new("account", "cognitive")
            .with("resourceGroupName", Value::reference("rg", "name"))
            .with("location", "eastus")
            .with("sku", "F0"),
        ResourceDeclaration::new("endpoint", "endpoint")
            .with("resourceGroupName", Value::reference("rg", "name"))
            .with(
                "subnet",
                Value::Map(BTreeMap::from([(
                    "id".to_string(),
                    Value::reference("subnet", "id"),
                )])),
            )
            .with("privateLinkServiceId", Value::reference("account", "id"))
            .depends_on("account"),
        ResourceDeclaration::new("budget", "budget").with("amount", 5_i64),
    ]
}

/// The snapshot a successful apply of `graph` against `provider` would leave
pub(crate) fn applied_snapshot(graph: &DependencyGraph, provider: &MockProvider) -> StateSnapshot {
    let mut snapshot = StateSnapshot::new();
    for decl in graph.ordered() {
        let config: Attributes = decl
            .config
            .iter()
            .map(|(k, v)| {
                let resolved = v
                    .try_map_refs(&mut |r| {
                        Ok::<_, ()>(
                            snapshot
                                .get(&r.resource)
                                .and_then(|rec| rec.attribute(&r.attribute)),
                        )
                    })
                    .unwrap()
                    .unwrap();
                (k.clone(), resolved)
            })
            .collect();
        let Completion::Provisioned { id, outputs } =
            provider.completion_for(&decl.name, &decl.kind, &config)
        else {
            unreachable!()
        };
        let record = ResourceRecord {
            kind: decl.kind.clone(),
            id,
            config,
            outputs,
            dependencies: graph
                .dependencies(&decl.name)
                .into_iter()
                .map(str::to_string)
                .collect(),
            updated_at: Utc::now(),
        };
        snapshot.insert(&decl.name, record);
    }
    snapshot.serial = 1;
    snapshot
}
