//! Azure resource kinds known to the simulated provider
//!
//! Each entry lists the properties ARM requires on create, the properties
//! that cannot change without recreating the resource, the outputs it
//! exposes, and how its resource id is formed.

use declarative::KindSchema;

/// Static description of one resource kind
#[derive(Debug, Clone, Copy)]
pub struct KindSpec {
    /// Pulumi-style type token
    pub kind: &'static str,
    /// Property holding an explicit physical name; autonamed when absent
    pub name_field: Option<&'static str>,
    /// Property naming the parent resource, for child resource ids
    pub parent_field: Option<&'static str>,
    pub required: &'static [&'static str],
    pub immutable: &'static [&'static str],
    pub outputs: &'static [&'static str],
    /// Id template with `{sub}`, `{rg}`, `{parent}`, `{scope}` and `{name}`
    pub id_template: &'static str,
}

impl KindSpec {
    pub fn schema(&self) -> KindSchema {
        KindSchema::new(self.kind)
            .with_immutable(self.immutable)
            .with_outputs(self.outputs)
    }

    /// Child resources of another resource share its lifetime and name
    pub fn is_singleton_child(&self) -> bool {
        !self.id_template.contains("{name}")
    }
}

pub const CATALOG: &[KindSpec] = &[
    KindSpec {
        kind: "azure-native:resources:ResourceGroup",
        name_field: Some("resourceGroupName"),
        parent_field: None,
        required: &["location"],
        immutable: &["location", "resourceGroupName"],
        outputs: &["name", "location"],
        id_template: "/subscriptions/{sub}/resourceGroups/{name}",
    },
    KindSpec {
        kind: "azure-native:network:VirtualNetwork",
        name_field: Some("virtualNetworkName"),
        parent_field: None,
        required: &["resourceGroupName", "location", "addressSpace"],
        immutable: &["resourceGroupName", "location", "virtualNetworkName"],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Network/virtualNetworks/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:network:Subnet",
        name_field: Some("subnetName"),
        parent_field: Some("virtualNetworkName"),
        required: &["resourceGroupName", "virtualNetworkName", "addressPrefix"],
        immutable: &["resourceGroupName", "virtualNetworkName", "subnetName"],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Network/virtualNetworks/{parent}/subnets/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:network:PrivateZone",
        name_field: Some("privateZoneName"),
        parent_field: None,
        required: &["resourceGroupName", "location"],
        immutable: &["resourceGroupName", "location", "privateZoneName"],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Network/privateDnsZones/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:network:VirtualNetworkLink",
        name_field: Some("virtualNetworkLinkName"),
        parent_field: Some("privateZoneName"),
        required: &["resourceGroupName", "privateZoneName", "virtualNetwork"],
        immutable: &[
            "resourceGroupName",
            "privateZoneName",
            "virtualNetwork",
            "virtualNetworkLinkName",
        ],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Network/privateDnsZones/{parent}/virtualNetworkLinks/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:cognitiveservices:Account",
        name_field: Some("accountName"),
        parent_field: None,
        required: &["resourceGroupName", "location", "kind", "sku"],
        immutable: &["resourceGroupName", "location", "kind", "accountName"],
        outputs: &["name", "endpoint", "primaryKey"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.CognitiveServices/accounts/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:network:PrivateEndpoint",
        name_field: Some("privateEndpointName"),
        parent_field: None,
        required: &[
            "resourceGroupName",
            "location",
            "subnet",
            "privateLinkServiceConnections",
        ],
        immutable: &[
            "resourceGroupName",
            "location",
            "subnet",
            "privateEndpointName",
        ],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Network/privateEndpoints/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:network:PrivateDnsZoneGroup",
        name_field: Some("privateDnsZoneGroupName"),
        parent_field: Some("privateEndpointName"),
        required: &[
            "resourceGroupName",
            "privateEndpointName",
            "privateDnsZoneConfigs",
        ],
        immutable: &[
            "resourceGroupName",
            "privateEndpointName",
            "privateDnsZoneGroupName",
        ],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Network/privateEndpoints/{parent}/privateDnsZoneGroups/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:web:AppServicePlan",
        name_field: Some("name"),
        parent_field: None,
        required: &["resourceGroupName", "location", "sku"],
        immutable: &["resourceGroupName", "location", "kind", "reserved", "name"],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Web/serverfarms/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:web:WebApp",
        name_field: Some("name"),
        parent_field: None,
        required: &["resourceGroupName", "location", "serverFarmId"],
        immutable: &["resourceGroupName", "location", "name"],
        outputs: &["name", "defaultHostName"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Web/sites/{name}"
        ),
    },
    KindSpec {
        kind: "azure-native:web:WebAppSwiftVirtualNetworkConnection",
        name_field: None,
        parent_field: Some("name"),
        required: &["resourceGroupName", "name", "subnetResourceId"],
        immutable: &["resourceGroupName", "name"],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Web/sites/{parent}/networkConfig/virtualNetwork"
        ),
    },
    KindSpec {
        kind: "azure-native:web:WebAppSourceControl",
        name_field: None,
        parent_field: Some("name"),
        required: &["resourceGroupName", "name", "repoUrl"],
        immutable: &["resourceGroupName", "name"],
        outputs: &["name"],
        id_template: concat!(
            "/subscriptions/{sub}/resourceGroups/{rg}/providers",
            "/Microsoft.Web/sites/{parent}/sourcecontrols/web"
        ),
    },
    KindSpec {
        kind: "azure-native:costmanagement:Budget",
        name_field: Some("budgetName"),
        parent_field: None,
        required: &["scope", "amount", "timeGrain", "timePeriod"],
        immutable: &["scope", "budgetName"],
        outputs: &["name"],
        id_template: "{scope}/providers/Microsoft.CostManagement/budgets/{name}",
    },
];

/// Look up a kind by its type token
pub fn lookup(kind: &str) -> Option<&'static KindSpec> {
    CATALOG.iter().find(|spec| spec.kind == kind)
}
