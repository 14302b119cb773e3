//! Building a `VirtualMachineInstance` out of a `VirtualMachine`.
//!
//! This is the small slice of KubeVirt's defaulting pipeline a standalone
//! Pod depends on; full defaulting, mutation webhooks and instancetype
//! resolution are not performed.

use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tracing::debug;

use crate::error::TransformError;
use crate::error::TransformResult;
use crate::vmi::Interface;
use crate::vmi::InterfaceBinding;
use crate::vmi::Network;
use crate::vmi::VirtualMachine;
use crate::vmi::VirtualMachineInstance;
use crate::vmi::VirtualMachineInstanceSpec;
use crate::vmi::DEFAULT_NETWORK_NAME;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Read a `VirtualMachine` from a YAML (or JSON) file.
///
/// # Errors
///
/// - [`TransformError::ReadVmFile`] if the file cannot be read
/// - [`TransformError::ParseVm`] if it is not a valid VirtualMachine
pub fn load_virtual_machine(path: &Path) -> TransformResult<VirtualMachine> {
    let content = std::fs::read_to_string(path).change_context(TransformError::ReadVmFile {
        path: path.display().to_string(),
    })?;
    parse_virtual_machine(&content)
}

/// Parse a `VirtualMachine`, defaulting its namespace.
///
/// # Errors
///
/// - [`TransformError::ParseVm`] if `content` is not a valid VirtualMachine
pub fn parse_virtual_machine(content: &str) -> TransformResult<VirtualMachine> {
    let mut vm: VirtualMachine =
        serde_yaml::from_str(content).change_context(TransformError::ParseVm)?;

    if let Some(kind) = vm.kind.as_deref() {
        if kind != "VirtualMachine" {
            return Err(Report::new(TransformError::ParseVm)
                .attach_printable(format!("expected kind VirtualMachine, got {kind}")));
        }
    }
    if vm.metadata.name.as_deref().unwrap_or_default().is_empty() {
        return Err(Report::new(TransformError::ParseVm).attach_printable("metadata.name is required"));
    }
    if vm.metadata.namespace.as_deref().unwrap_or_default().is_empty() {
        vm.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }
    Ok(vm)
}

/// Instantiate the template of `vm`.
///
/// # Errors
///
/// - [`TransformError::MissingTemplate`] if `vm` has no `spec.template`
pub fn instance_from_vm(vm: &VirtualMachine) -> TransformResult<VirtualMachineInstance> {
    let name = vm.name_any();
    let template = vm
        .spec
        .template
        .as_ref()
        .ok_or_else(|| Report::new(TransformError::MissingTemplate { name: name.clone() }))?;

    let template_meta = template.metadata.clone().unwrap_or_default();
    let metadata = ObjectMeta {
        name: Some(name),
        namespace: vm.namespace(),
        labels: template_meta.labels,
        annotations: template_meta.annotations,
        ..Default::default()
    };

    let mut vmi = VirtualMachineInstance::new(metadata, template.spec.clone());
    set_default_network_interface(&mut vmi.spec);
    Ok(vmi)
}

/// Attach the pod network when the instance declares no networking at all,
/// unless `autoattachPodInterface` is explicitly `false`.
pub fn set_default_network_interface(spec: &mut VirtualMachineInstanceSpec) {
    let devices = &mut spec.domain.devices;
    if devices.autoattach_pod_interface == Some(false) {
        return;
    }
    if !devices.interfaces.is_empty() || !spec.networks.is_empty() {
        return;
    }
    debug!("no networking declared, attaching {DEFAULT_NETWORK_NAME} pod network");
    devices.interfaces.push(Interface::new(
        DEFAULT_NETWORK_NAME,
        InterfaceBinding::masquerade(),
    ));
    spec.networks.push(Network::pod(DEFAULT_NETWORK_NAME));
}
