//! KubeVirt `kubevirt.io/v1` resource types consumed by the transformer.
//!
//! Only the fields this crate reads or rewrites are typed. Everything else is
//! kept verbatim in the flattened `extra` maps, so the instance snapshot that
//! ends up in the Pod carries whatever the input descriptor carried.

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use serde::Deserialize;
use serde::Serialize;

pub const KUBEVIRT_GROUP: &str = "kubevirt.io";
pub const KUBEVIRT_VERSION: &str = "v1";

/// Name of the network every unmatched interface collapses onto.
pub const DEFAULT_NETWORK_NAME: &str = "default";

/// Uninterpreted fields, preserved across deserialize/serialize.
pub type Extra = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualMachineSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<VirtualMachineInstanceTemplateSpec>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceTemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    #[serde(default)]
    pub spec: VirtualMachineInstanceSpec,
}

/// A running (or about to run) virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualMachineInstanceSpec,
}

impl VirtualMachineInstance {
    pub fn new(metadata: ObjectMeta, spec: VirtualMachineInstanceSpec) -> Self {
        Self {
            api_version: Some(<Self as kube::Resource>::api_version(&()).into_owned()),
            kind: Some(<Self as kube::Resource>::kind(&()).into_owned()),
            metadata,
            spec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceSpec {
    #[serde(default)]
    pub domain: DomainSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Network>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<DomainResources>,
    #[serde(default)]
    pub devices: Devices,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gpus: Vec<Gpu>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_devices: Vec<HostDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoattach_pod_interface: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A guest network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,
    /// Serialized as one key on the interface, e.g. `masquerade: {}`.
    #[serde(flatten)]
    pub binding: Option<InterfaceBinding>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Interface {
    pub fn new(name: impl Into<String>, binding: InterfaceBinding) -> Self {
        Self {
            name: name.into(),
            binding: Some(binding),
            extra: Extra::new(),
        }
    }
}

/// How a guest interface is wired to the pod's network namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterfaceBinding {
    Bridge(BindingOptions),
    Masquerade(BindingOptions),
    Slirp(BindingOptions),
    Sriov(BindingOptions),
    Macvtap(BindingOptions),
    Passt(BindingOptions),
}

/// Keys of every binding method an interface may carry.
pub const BINDING_KEYS: [&str; 6] = ["bridge", "masquerade", "slirp", "sriov", "macvtap", "passt"];

impl InterfaceBinding {
    pub fn passt() -> Self {
        Self::Passt(BindingOptions::default())
    }

    pub fn masquerade() -> Self {
        Self::Masquerade(BindingOptions::default())
    }
}

/// Binding methods carry no options this crate cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingOptions {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    #[serde(flatten)]
    pub source: Option<NetworkSource>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Network {
    /// A network backed by the pod's primary interface.
    pub fn pod(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Some(NetworkSource::Pod(PodNetwork::default())),
            extra: Extra::new(),
        }
    }

    pub const fn is_pod(&self) -> bool {
        matches!(self.source, Some(NetworkSource::Pod(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkSource {
    Pod(PodNetwork),
    Multus(MultusNetwork),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodNetwork {
    #[serde(flatten)]
    pub extra: Extra,
}

/// A secondary attachment through a network-attachment definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultusNetwork {
    pub network_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gpu {
    pub name: String,
    pub device_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDevice {
    pub name: String,
    pub device_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

macro_rules! kubevirt_resource {
    ($ty:ty, $kind:literal, $plural:literal) => {
        impl kube::Resource for $ty {
            type DynamicType = ();
            type Scope = NamespaceResourceScope;

            fn group(_dt: &()) -> Cow<'_, str> {
                KUBEVIRT_GROUP.into()
            }

            fn version(_dt: &()) -> Cow<'_, str> {
                KUBEVIRT_VERSION.into()
            }

            fn kind(_dt: &()) -> Cow<'_, str> {
                $kind.into()
            }

            fn plural(_dt: &()) -> Cow<'_, str> {
                $plural.into()
            }

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

kubevirt_resource!(VirtualMachine, "VirtualMachine", "virtualmachines");
kubevirt_resource!(
    VirtualMachineInstance,
    "VirtualMachineInstance",
    "virtualmachineinstances"
);
