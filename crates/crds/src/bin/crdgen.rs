//! CRD manifest generator
//!
//! Prints every MetalOps CRD as a multi-document YAML stream suitable for
//! `kubectl apply -f -`.

use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        serde_yaml::to_string(&crds::Endpoint::crd())?,
        serde_yaml::to_string(&crds::BMC::crd())?,
        serde_yaml::to_string(&crds::BMCSecret::crd())?,
        serde_yaml::to_string(&crds::Server::crd())?,
        serde_yaml::to_string(&crds::ServerClaim::crd())?,
        serde_yaml::to_string(&crds::ServerBootConfiguration::crd())?,
        serde_yaml::to_string(&crds::ServerMaintenance::crd())?,
        serde_yaml::to_string(&crds::BIOSSettings::crd())?,
        serde_yaml::to_string(&crds::BMCSettings::crd())?,
        serde_yaml::to_string(&crds::BIOSVersion::crd())?,
        serde_yaml::to_string(&crds::BMCVersion::crd())?,
        serde_yaml::to_string(&crds::BIOSSettingsSet::crd())?,
        serde_yaml::to_string(&crds::BIOSVersionSet::crd())?,
        serde_yaml::to_string(&crds::BMCSettingsSet::crd())?,
        serde_yaml::to_string(&crds::BMCVersionSet::crd())?,
        serde_yaml::to_string(&crds::ServerMaintenanceSet::crd())?,
    ];
    println!("{}", crds.join("---\n"));
    Ok(())
}
