//! Rendering of the base launcher Pod for an instance.

use std::collections::BTreeMap;

use error_stack::Report;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSecurityContext;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::error::TransformError;
use crate::error::TransformResult;
use crate::manifest::COMPUTE_CONTAINER;
use crate::vmi::VirtualMachineInstance;

/// Uid of the unprivileged qemu user inside the launcher image.
pub const NON_ROOT_UID: i64 = 107;

/// Renders the launcher Pod that runs one instance.
pub trait LaunchManifestRenderer {
    /// # Errors
    ///
    /// - [`TransformError::Render`] if no Pod can be rendered for `vmi`
    fn render(&self, vmi: &VirtualMachineInstance) -> TransformResult<Pod>;
}

/// Minimal launcher template: one `compute` container and the runtime
/// directories virt-launcher expects.
#[derive(Debug, Clone)]
pub struct LauncherTemplate {
    image: String,
    qemu_timeout_secs: u32,
    grace_period_secs: i64,
}

const SHARE_DIR: &str = "/var/run/kubevirt";
const EPHEMERAL_DISK_DIR: &str = "/var/run/kubevirt-ephemeral-disks";
const CONTAINER_DISK_DIR: &str = "/var/run/kubevirt/container-disks";
const HOTPLUG_DISK_DIR: &str = "/var/run/kubevirt/hotplug-disks";
const LIBVIRT_RUNTIME_DIR: &str = "/var/run/libvirt";

impl LauncherTemplate {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            qemu_timeout_secs: 240,
            grace_period_secs: 30,
        }
    }

    fn volumes() -> (Vec<Volume>, Vec<VolumeMount>) {
        [
            ("public", SHARE_DIR),
            ("ephemeral-disks", EPHEMERAL_DISK_DIR),
            ("container-disks", CONTAINER_DISK_DIR),
            ("hotplug-disks", HOTPLUG_DISK_DIR),
            ("libvirt-runtime", LIBVIRT_RUNTIME_DIR),
        ]
        .into_iter()
        .map(|(name, path)| {
            (
                Volume {
                    name: name.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                VolumeMount {
                    name: name.to_string(),
                    mount_path: path.to_string(),
                    ..Default::default()
                },
            )
        })
        .unzip()
    }

    fn command(&self, vmi: &VirtualMachineInstance, name: &str, namespace: &str) -> Vec<String> {
        let uid = vmi.uid().unwrap_or_default();
        let qemu_timeout = format!("{}s", self.qemu_timeout_secs);
        let grace_period = (self.grace_period_secs + 15).to_string();
        let args = [
            "/usr/bin/virt-launcher-monitor",
            "--qemu-timeout",
            qemu_timeout.as_str(),
            "--name",
            name,
            "--uid",
            uid.as_str(),
            "--namespace",
            namespace,
            "--kubevirt-share-dir",
            SHARE_DIR,
            "--ephemeral-disk-dir",
            EPHEMERAL_DISK_DIR,
            "--container-disk-dir",
            CONTAINER_DISK_DIR,
            "--grace-period-seconds",
            grace_period.as_str(),
            "--hook-sidecars",
            "0",
        ];
        args.into_iter().map(str::to_string).collect()
    }
}

impl LaunchManifestRenderer for LauncherTemplate {
    fn render(&self, vmi: &VirtualMachineInstance) -> TransformResult<Pod> {
        let name = vmi.name_any();
        if name.is_empty() {
            return Err(Report::new(TransformError::Render {
                message: "instance has no name".to_string(),
            }));
        }
        let namespace = vmi.namespace().unwrap_or_default();

        let mut labels = BTreeMap::from([
            ("kubevirt.io".to_string(), "virt-launcher".to_string()),
            ("vm.kubevirt.io/name".to_string(), name.clone()),
        ]);
        labels.extend(vmi.labels().clone());

        let requests: BTreeMap<String, Quantity> = vmi
            .spec
            .domain
            .resources
            .as_ref()
            .map(|r| r.requests.clone())
            .unwrap_or_default();
        let limits = vmi
            .spec
            .domain
            .resources
            .as_ref()
            .map(|r| r.limits.clone())
            .unwrap_or_default();

        let (volumes, volume_mounts) = Self::volumes();
        let compute = Container {
            name: COMPUTE_CONTAINER.to_string(),
            image: Some(self.image.clone()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: Some(self.command(vmi, &name, &namespace)),
            resources: Some(ResourceRequirements {
                requests: (!requests.is_empty()).then_some(requests),
                limits: (!limits.is_empty()).then_some(limits),
                ..Default::default()
            }),
            volume_mounts: Some(volume_mounts),
            ..Default::default()
        };

        Ok(Pod {
            metadata: ObjectMeta {
                generate_name: Some(format!("virt-launcher-{name}-")),
                namespace: Some(namespace),
                labels: Some(labels),
                annotations: Some(BTreeMap::from([(
                    "kubevirt.io/domain".to_string(),
                    name,
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![compute],
                volumes: Some(volumes),
                restart_policy: Some("Never".to_string()),
                termination_grace_period_seconds: Some(self.grace_period_secs + 15),
                automount_service_account_token: Some(false),
                security_context: Some(PodSecurityContext {
                    run_as_user: Some(NON_ROOT_UID),
                    run_as_group: Some(NON_ROOT_UID),
                    run_as_non_root: Some(true),
                    fs_group: Some(NON_ROOT_UID),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            status: None,
        })
    }
}
