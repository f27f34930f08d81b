//! `cirrus init` - write a sample project
//!
//! The sample is a small web deployment: a Linux web app integrated into a
//! virtual network, reaching a language service account through a private
//! endpoint with private DNS, plus a monthly budget.

use anyhow::{Context as AnyhowContext, Result, bail};
use std::fs;
use std::path::Path;

use crate::Context;
use crate::ui;

pub const SAMPLE_PROJECT: &str = r#"# cirrus project file
#
# Values of the exact form "${resource.attribute}" are references; the
# referenced resource is provisioned first. "${config.key}" reads from the
# [deployment] section.

[deployment]
name = "demo"
location = "eastus"

[deployment.values]
repo_url = "https://github.com/dmelichar/clco-demo"
branch = "main"

[execution]
jobs = 4
max_attempts = 5

# ---------------------------------------------------------------------------
# Network
# ---------------------------------------------------------------------------

[[resource]]
name = "resourceGroup"
kind = "azure-native:resources:ResourceGroup"
config = { location = "${config.location}" }

[[resource]]
name = "virtualNetwork"
kind = "azure-native:network:VirtualNetwork"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
location = "${config.location}"
addressSpace = { addressPrefixes = ["10.0.0.0/16"] }

[[resource]]
name = "appSubnet"
kind = "azure-native:network:Subnet"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
virtualNetworkName = "${virtualNetwork.name}"
addressPrefix = "10.0.0.0/24"
privateEndpointNetworkPolicies = "Enabled"
delegations = [{ name = "delegation", serviceName = "Microsoft.Web/serverfarms" }]

[[resource]]
name = "endpointSubnet"
kind = "azure-native:network:Subnet"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
virtualNetworkName = "${virtualNetwork.name}"
addressPrefix = "10.0.1.0/24"
privateEndpointNetworkPolicies = "Disabled"

[[resource]]
name = "dnsZone"
kind = "azure-native:network:PrivateZone"
[resource.config]
privateZoneName = "privatelink.cognitiveservices.azure.com"
resourceGroupName = "${resourceGroup.name}"
location = "global"

[[resource]]
name = "dnsZoneLink"
kind = "azure-native:network:VirtualNetworkLink"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
privateZoneName = "${dnsZone.name}"
location = "global"
virtualNetwork = { id = "${virtualNetwork.id}" }
registrationEnabled = false

# ---------------------------------------------------------------------------
# Language service behind a private endpoint
# ---------------------------------------------------------------------------

[[resource]]
name = "languageAccount"
kind = "azure-native:cognitiveservices:Account"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
location = "${config.location}"
kind = "TextAnalytics"
sku = { name = "F0" }
identity = { type = "SystemAssigned" }
publicNetworkAccess = "Disabled"
customSubDomainName = "cirrus-demo-language"

[[resource]]
name = "privateEndpoint"
kind = "azure-native:network:PrivateEndpoint"
depends_on = ["languageAccount"]
[resource.config]
resourceGroupName = "${resourceGroup.name}"
location = "${config.location}"
subnet = { id = "${endpointSubnet.id}" }
privateLinkServiceConnections = [
    { name = "languageServiceConnection", privateLinkServiceId = "${languageAccount.id}", groupIds = ["account"] },
]

[[resource]]
name = "privateDnsZoneGroup"
kind = "azure-native:network:PrivateDnsZoneGroup"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
privateEndpointName = "${privateEndpoint.name}"
privateDnsZoneConfigs = [{ name = "config", privateDnsZoneId = "${dnsZone.id}" }]

# ---------------------------------------------------------------------------
# Web app
# ---------------------------------------------------------------------------

[[resource]]
name = "appServicePlan"
kind = "azure-native:web:AppServicePlan"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
location = "${config.location}"
sku = { capacity = 3, name = "B1", tier = "Basic" }
kind = "linux"
reserved = true

[[resource]]
name = "webApp"
kind = "azure-native:web:WebApp"
[resource.config]
resourceGroupName = "${resourceGroup.name}"
location = "${config.location}"
serverFarmId = "${appServicePlan.id}"
httpsOnly = true
kind = "app,linux"

[resource.config.siteConfig]
linuxFxVersion = "PYTHON|3.8"
alwaysOn = true
ftpsState = "Disabled"
appSettings = [
    { name = "AZ_ENDPOINT", value = "${languageAccount.endpoint}" },
    { name = "AZ_KEY", value = "${languageAccount.primaryKey}" },
    { name = "WEBSITE_RUN_FROM_PACKAGE", value = "0" },
]

[[resource]]
name = "vnetIntegration"
kind = "azure-native:web:WebAppSwiftVirtualNetworkConnection"
[resource.config]
name = "${webApp.name}"
resourceGroupName = "${resourceGroup.name}"
subnetResourceId = "${appSubnet.id}"

[[resource]]
name = "sourceControl"
kind = "azure-native:web:WebAppSourceControl"
[resource.config]
name = "${webApp.name}"
resourceGroupName = "${resourceGroup.name}"
repoUrl = "${config.repo_url}"
branch = "${config.branch}"
isManualIntegration = true
deploymentRollbackEnabled = false
isGitHubAction = false

# ---------------------------------------------------------------------------
# Cost control
# ---------------------------------------------------------------------------

[[resource]]
name = "budget"
kind = "azure-native:costmanagement:Budget"
[resource.config]
scope = "${resourceGroup.id}"
amount = 5
category = "Cost"
timeGrain = "Monthly"
timePeriod = { startDate = "2024-12-01T00:00:00Z", endDate = "2025-12-31T00:00:00Z" }

[resource.config.notifications.Actual_GreaterThan_80_Percent]
enabled = true
operator = "GreaterThan"
threshold = 80
contactEmails = ["ops@example.com"]
thresholdType = "Actual"

[resource.config.notifications.Forecasted_GreaterThan_100_Percent]
enabled = true
operator = "GreaterThan"
threshold = 100
contactEmails = ["ops@example.com"]
thresholdType = "Forecasted"
"#;

/// Write the sample project to `path`
pub fn run(ctx: &Context, path: &Path, force: bool) -> Result<()> {
    write_sample(path, force)?;
    if !ctx.quiet {
        ui::success(&format!("Wrote {}", path.display()));
        ui::dim("Next: cirrus plan");
    }
    Ok(())
}

fn write_sample(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, SAMPLE_PROJECT).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote sample project to {}", path.display());
    Ok(())
}
