//! Simulated Azure Resource Manager
//!
//! Implements [`Provider`] for the kinds in [`catalog`] without touching the
//! network. Resource ids follow ARM's layout, physical names are stable
//! across runs, and every operation can be made long-running so the poll
//! path gets exercised the same way a real deployment would.

pub mod catalog;

use declarative::{
    Attributes, Completion, DeleteRequest, KindSchema, OperationHandle, OperationStatus, Provider,
    ProviderError, ProvisionRequest, Value,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use catalog::KindSpec;

/// Subscription used when the project does not name one
pub const DEFAULT_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

struct PendingOperation {
    polls_left: u32,
    completion: Completion,
}

/// In-process stand-in for the Azure control plane
pub struct SimulatedAzure {
    subscription_id: String,
    schemas: HashMap<String, KindSchema>,
    latency_polls: u32,
    operations: Mutex<HashMap<String, PendingOperation>>,
    next_token: AtomicU64,
}

impl SimulatedAzure {
    pub fn new(subscription_id: &str) -> Self {
        let schemas = catalog::CATALOG
            .iter()
            .map(|spec| (spec.kind.to_string(), spec.schema()))
            .collect();

        Self {
            subscription_id: subscription_id.to_string(),
            schemas,
            latency_polls: 0,
            operations: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Operations stay in progress for `polls` polls before completing
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Number of operations accepted but not yet completed
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.lock_operations().len()
    }

    fn lock_operations(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingOperation>> {
        self.operations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn spec(kind: &str) -> Result<&'static KindSpec, ProviderError> {
        catalog::lookup(kind)
            .ok_or_else(|| ProviderError::fatal(format!("unsupported resource type '{kind}'")))
    }

    /// Physical name: the explicit name property, else logical name plus a stable suffix
    fn physical_name(&self, spec: &KindSpec, name: &str, config: &Attributes) -> String {
        if let Some(explicit) = spec
            .name_field
            .and_then(|field| config.get(field))
            .and_then(Value::as_str)
        {
            return explicit.to_string();
        }
        let seed = format!("{}/{}/{name}", self.subscription_id, spec.kind);
        let hash = blake3::hash(seed.as_bytes()).to_hex();
        format!("{name}-{}", &hash[..8])
    }

    fn resource_id(&self, spec: &KindSpec, physical: &str, config: &Attributes) -> Result<String, ProviderError> {
        let field = |key| string_property(spec, config, key);

        let mut id = spec
            .id_template
            .replace("{sub}", &self.subscription_id)
            .replace("{name}", physical);
        if id.contains("{rg}") {
            id = id.replace("{rg}", field("resourceGroupName")?);
        }
        if let Some(parent) = spec.parent_field {
            id = id.replace("{parent}", field(parent)?);
        }
        if id.contains("{scope}") {
            id = id.replace("{scope}", field("scope")?.trim_end_matches('/'));
        }
        Ok(id)
    }

    fn provision(&self, request: &ProvisionRequest) -> Result<Completion, ProviderError> {
        let spec = Self::spec(&request.kind)?;

        for required in spec.required {
            if matches!(request.config.get(*required), None | Some(Value::Null)) {
                return Err(ProviderError::fatal(format!(
                    "{}: missing required property '{required}'",
                    spec.kind
                )));
            }
        }

        let physical = if spec.is_singleton_child() {
            spec.parent_field
                .and_then(|f| request.config.get(f))
                .and_then(Value::as_str)
                .map_or_else(|| request.name.clone(), str::to_string)
        } else {
            self.physical_name(spec, &request.name, &request.config)
        };
        let id = self.resource_id(spec, &physical, &request.config)?;

        if let Some(existing) = &request.id
            && existing != &id
        {
            return Err(ProviderError::fatal(format!(
                "cannot move {existing} to {id} in place"
            )));
        }

        let outputs = spec
            .outputs
            .iter()
            .filter_map(|attr| {
                let value = match *attr {
                    "name" => Value::String(physical.clone()),
                    "location" => request.config.get("location")?.clone(),
                    "endpoint" => Value::String(format!(
                        "https://{physical}.cognitiveservices.azure.com/"
                    )),
                    "primaryKey" => {
                        Value::String(blake3::hash(id.as_bytes()).to_hex()[..32].to_string())
                    }
                    "defaultHostName" => Value::String(format!("{physical}.azurewebsites.net")),
                    _ => return None,
                };
                Some(((*attr).to_string(), value))
            })
            .collect();

        Ok(Completion::Provisioned { id, outputs })
    }

    /// Hand back a completion immediately or park it behind an operation token
    fn respond(&self, resource: &str, completion: Completion) -> OperationStatus {
        if self.latency_polls == 0 {
            return OperationStatus::Completed(completion);
        }
        let token = format!(
            "op-{}",
            self.next_token.fetch_add(1, Ordering::SeqCst)
        );
        self.lock_operations().insert(
            token.clone(),
            PendingOperation {
                polls_left: self.latency_polls,
                completion,
            },
        );
        OperationStatus::InProgress(OperationHandle {
            resource: resource.to_string(),
            token,
        })
    }
}

fn string_property<'a>(
    spec: &KindSpec,
    config: &'a Attributes,
    key: &str,
) -> Result<&'a str, ProviderError> {
    config.get(key).and_then(Value::as_str).ok_or_else(|| {
        ProviderError::fatal(format!(
            "{}: property '{key}' must be a string",
            spec.kind
        ))
    })
}

impl Provider for SimulatedAzure {
    fn schema(&self, kind: &str) -> Option<&KindSchema> {
        self.schemas.get(kind)
    }

    fn create(&self, request: &ProvisionRequest) -> Result<OperationStatus, ProviderError> {
        let completion = self.provision(request)?;
        log::debug!("PUT {} ({})", request.name, request.kind);
        Ok(self.respond(&request.name, completion))
    }

    fn update(&self, request: &ProvisionRequest) -> Result<OperationStatus, ProviderError> {
        if request.id.is_none() {
            return Err(ProviderError::fatal(format!(
                "{}: update requires an existing resource id",
                request.name
            )));
        }
        let completion = self.provision(request)?;
        log::debug!("PATCH {} ({})", request.name, request.kind);
        Ok(self.respond(&request.name, completion))
    }

    fn delete(&self, request: &DeleteRequest) -> Result<OperationStatus, ProviderError> {
        Self::spec(&request.kind)?;
        log::debug!("DELETE {}", request.id);
        Ok(self.respond(&request.name, Completion::Deleted))
    }

    fn poll(&self, handle: &OperationHandle) -> Result<OperationStatus, ProviderError> {
        let mut operations = self.lock_operations();
        let Some(op) = operations.get_mut(&handle.token) else {
            return Err(ProviderError::fatal(format!(
                "operation {} not found",
                handle.token
            )));
        };
        op.polls_left = op.polls_left.saturating_sub(1);
        if op.polls_left > 0 {
            return Ok(OperationStatus::InProgress(handle.clone()));
        }
        let completion = op.completion.clone();
        operations.remove(&handle.token);
        Ok(OperationStatus::Completed(completion))
    }

    fn cancel(&self, handle: &OperationHandle) {
        if self.lock_operations().remove(&handle.token).is_some() {
            log::debug!("Abandoned operation {} for {}", handle.token, handle.resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const SUB: &str = "11111111-2222-3333-4444-555555555555";

    fn request(name: &str, kind: &str, config: &[(&str, Value)]) -> ProvisionRequest {
        ProvisionRequest {
            name: name.to_string(),
            kind: kind.to_string(),
            config: config
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            id: None,
        }
    }

    fn provisioned(status: OperationStatus) -> (String, Attributes) {
        match status {
            OperationStatus::Completed(Completion::Provisioned { id, outputs }) => (id, outputs),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_resource_group_id_and_outputs() {
        let azure = SimulatedAzure::new(SUB);
        let req = request(
            "rg",
            "azure-native:resources:ResourceGroup",
            &[
                ("location", Value::from("eastus")),
                ("resourceGroupName", Value::from("demo-rg")),
            ],
        );
        let (id, outputs) = provisioned(azure.create(&req).unwrap());
        assert_eq!(id, format!("/subscriptions/{SUB}/resourceGroups/demo-rg"));
        assert_eq!(outputs["name"], Value::from("demo-rg"));
        assert_eq!(outputs["location"], Value::from("eastus"));
    }

    #[test]
    fn test_autonaming_is_stable() {
        let azure = SimulatedAzure::new(SUB);
        let req = request(
            "rg",
            "azure-native:resources:ResourceGroup",
            &[("location", Value::from("eastus"))],
        );
        let (first, outputs) = provisioned(azure.create(&req).unwrap());
        let (second, _) = provisioned(azure.create(&req).unwrap());
        assert_eq!(first, second);

        let name = outputs["name"].as_str().unwrap();
        assert!(name.starts_with("rg-"));
        assert_eq!(name.len(), "rg-".len() + 8);
    }

    #[test]
    fn test_subnet_nests_under_vnet() {
        let azure = SimulatedAzure::new(SUB);
        let req = request(
            "subnet",
            "azure-native:network:Subnet",
            &[
                ("resourceGroupName", Value::from("demo-rg")),
                ("virtualNetworkName", Value::from("demo-vnet")),
                ("subnetName", Value::from("apps")),
                ("addressPrefix", Value::from("10.0.1.0/24")),
            ],
        );
        let (id, _) = provisioned(azure.create(&req).unwrap());
        assert_eq!(
            id,
            format!(
                "/subscriptions/{SUB}/resourceGroups/demo-rg/providers/Microsoft.Network/virtualNetworks/demo-vnet/subnets/apps"
            )
        );
    }

    #[test]
    fn test_cognitive_account_outputs() {
        let azure = SimulatedAzure::new(SUB);
        let req = request(
            "language",
            "azure-native:cognitiveservices:Account",
            &[
                ("resourceGroupName", Value::from("demo-rg")),
                ("location", Value::from("eastus")),
                ("kind", Value::from("TextAnalytics")),
                ("accountName", Value::from("demo-language")),
                (
                    "sku",
                    Value::Map(BTreeMap::from([("name".to_string(), Value::from("S"))])),
                ),
            ],
        );
        let (_, outputs) = provisioned(azure.create(&req).unwrap());
        assert_eq!(
            outputs["endpoint"],
            Value::from("https://demo-language.cognitiveservices.azure.com/")
        );
        assert_eq!(outputs["primaryKey"].as_str().unwrap().len(), 32);
    }

    #[test]
    fn test_budget_scoped_to_resource_group() {
        let azure = SimulatedAzure::new(SUB);
        let scope = format!("/subscriptions/{SUB}/resourceGroups/demo-rg");
        let req = request(
            "budget",
            "azure-native:costmanagement:Budget",
            &[
                ("scope", Value::String(scope.clone())),
                ("budgetName", Value::from("monthly")),
                ("amount", Value::Int(5)),
                ("timeGrain", Value::from("Monthly")),
                ("timePeriod", Value::Map(BTreeMap::new())),
            ],
        );
        let (id, _) = provisioned(azure.create(&req).unwrap());
        assert_eq!(
            id,
            format!("{scope}/providers/Microsoft.CostManagement/budgets/monthly")
        );
    }

    #[test]
    fn test_webapp_children_share_site_name() {
        let azure = SimulatedAzure::new(SUB);
        let req = request(
            "sourceControl",
            "azure-native:web:WebAppSourceControl",
            &[
                ("resourceGroupName", Value::from("demo-rg")),
                ("name", Value::from("demo-app")),
                ("repoUrl", Value::from("https://example.com/app.git")),
            ],
        );
        let (id, outputs) = provisioned(azure.create(&req).unwrap());
        assert!(id.ends_with("/Microsoft.Web/sites/demo-app/sourcecontrols/web"));
        assert_eq!(outputs["name"], Value::from("demo-app"));
    }

    #[test]
    fn test_missing_required_property_is_fatal() {
        let azure = SimulatedAzure::new(SUB);
        let req = request(
            "vnet",
            "azure-native:network:VirtualNetwork",
            &[("resourceGroupName", Value::from("demo-rg"))],
        );
        let err = azure.create(&req).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("missing required property"));
    }

    #[test]
    fn test_unsupported_kind() {
        let azure = SimulatedAzure::new(SUB);
        let err = azure
            .create(&request("x", "azure-native:sql:Server", &[]))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported resource type"));
        assert!(azure.schema("azure-native:sql:Server").is_none());
    }

    #[test]
    fn test_update_requires_id() {
        let azure = SimulatedAzure::new(SUB);
        let req = request(
            "rg",
            "azure-native:resources:ResourceGroup",
            &[("location", Value::from("eastus"))],
        );
        assert!(azure.update(&req).is_err());

        let (id, _) = provisioned(azure.create(&req).unwrap());
        let update = ProvisionRequest {
            id: Some(id),
            ..req
        };
        assert!(azure.update(&update).is_ok());
    }

    #[test]
    fn test_long_running_operation() {
        let azure = SimulatedAzure::new(SUB).with_latency(2);
        let req = request(
            "rg",
            "azure-native:resources:ResourceGroup",
            &[("location", Value::from("eastus"))],
        );
        let OperationStatus::InProgress(handle) = azure.create(&req).unwrap() else {
            panic!("expected in-progress operation");
        };
        assert_eq!(azure.pending(), 1);
        assert!(matches!(
            azure.poll(&handle).unwrap(),
            OperationStatus::InProgress(_)
        ));
        provisioned(azure.poll(&handle).unwrap());
        assert_eq!(azure.pending(), 0);
        assert!(azure.poll(&handle).is_err());
    }

    #[test]
    fn test_cancel_abandons_operation() {
        let azure = SimulatedAzure::new(SUB).with_latency(5);
        let delete = DeleteRequest {
            name: "rg".to_string(),
            kind: "azure-native:resources:ResourceGroup".to_string(),
            id: format!("/subscriptions/{SUB}/resourceGroups/demo-rg"),
        };
        let OperationStatus::InProgress(handle) = azure.delete(&delete).unwrap() else {
            panic!("expected in-progress operation");
        };
        azure.cancel(&handle);
        assert_eq!(azure.pending(), 0);
    }
}
