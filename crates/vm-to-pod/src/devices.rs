//! Host device nodes a standalone launcher Pod needs bind-mounted.
//!
//! Outside of a cluster there is no device plugin handing out `/dev/kvm`,
//! GPU nodes or VFIO containers, so they are mounted as `hostPath` volumes
//! into the compute container instead.

use k8s_openapi::api::core::v1::HostPathVolumeSource;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::Volume;
use tracing::debug;
use tracing::warn;

use crate::manifest;
use crate::vmi::Gpu;
use crate::vmi::HostDevice;

/// Minor number of the first DRM render node, `/dev/dri/renderD128`.
pub const RENDER_NODE_MINOR_BASE: usize = 128;

/// Mounted for every standalone VM regardless of requested devices.
const BASELINE_DEVICES: [(&str, &str); 3] = [
    ("kvm", "/dev/kvm"),
    ("tun", "/dev/net/tun"),
    ("vhost-net", "/dev/vhost-net"),
];

/// Control nodes shared by every NVIDIA GPU on the host.
const NVIDIA_CONTROL_DEVICES: [(&str, &str); 4] = [
    ("nvidiactl", "/dev/nvidiactl"),
    ("nvidia-uvm", "/dev/nvidia-uvm"),
    ("nvidia-uvm-tools", "/dev/nvidia-uvm-tools"),
    ("nvidia-modeset", "/dev/nvidia-modeset"),
];

const VFIO_CONTAINER: (&str, &str) = ("vfio", "/dev/vfio/vfio");

/// GPU vendor family, derived from a device name such as
/// `nvidia.com/GA102GL_A10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum GpuVendor {
    #[display("nvidia")]
    Nvidia,
    #[display("amd")]
    Amd,
    #[display("intel")]
    Intel,
    #[display("unknown")]
    Unknown,
}

impl GpuVendor {
    /// Classify by case-insensitive substring match on the device name.
    pub fn classify(device_name: &str) -> Self {
        let name = device_name.to_lowercase();
        if name.contains("nvidia") {
            Self::Nvidia
        } else if name.contains("amd") || name.contains("radeon") {
            Self::Amd
        } else if name.contains("intel") {
            Self::Intel
        } else {
            Self::Unknown
        }
    }
}

/// `hostPath` type of a mounted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPathType {
    CharDevice,
}

impl HostPathType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CharDevice => "CharDevice",
        }
    }
}

/// One host node and where it lands in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPair {
    pub volume_name: String,
    pub host_path: String,
    pub mount_path: String,
    pub path_type: HostPathType,
}

impl MountPair {
    /// A character device mounted at the same path it has on the host.
    pub fn char_device(volume_name: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            volume_name: volume_name.into(),
            mount_path: path.clone(),
            host_path: path,
            path_type: HostPathType::CharDevice,
        }
    }

    pub fn to_volume(&self) -> Volume {
        Volume {
            name: self.volume_name.clone(),
            host_path: Some(HostPathVolumeSource {
                path: self.host_path.clone(),
                type_: Some(self.path_type.as_str().to_string()),
            }),
            ..Default::default()
        }
    }
}

/// A degraded device-mount guess. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum Advisory {
    #[display("unknown GPU vendor for device {device_name}, mounting generic DRI card node")]
    UnknownGpuVendor { device_name: String },
    #[display(
        "PCI host device {name} ({device_name}) detected, mounting /dev/vfio/<group> requires manual configuration"
    )]
    HostDeviceNeedsVfioGroup { name: String, device_name: String },
    #[display(
        "NVIDIA GPUs of different models requested ({models}), control nodes are mounted once and assumed shared"
    )]
    MixedNvidiaModels { models: String },
}

/// Output of [`compute_mounts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMounts {
    pub mounts: Vec<MountPair>,
    pub advisories: Vec<Advisory>,
}

/// Derive the device nodes needed by `gpus` and `host_devices`.
///
/// A GPU's ordinal is its position in `gpus`, so `/dev/nvidia1` is the
/// second requested GPU whatever its vendor.
pub fn compute_mounts(gpus: &[Gpu], host_devices: &[HostDevice]) -> DeviceMounts {
    let mut out = DeviceMounts::default();

    out.mounts.extend(
        BASELINE_DEVICES
            .iter()
            .map(|(name, path)| MountPair::char_device(*name, *path)),
    );

    let mut nvidia_models: Vec<&str> = Vec::new();
    for (i, gpu) in gpus.iter().enumerate() {
        let vendor = GpuVendor::classify(&gpu.device_name);
        debug!(gpu = %gpu.name, device = %gpu.device_name, %vendor, "mounting GPU device nodes");

        match vendor {
            GpuVendor::Nvidia => {
                out.mounts.push(MountPair::char_device(
                    format!("nvidia{i}"),
                    format!("/dev/nvidia{i}"),
                ));
                if nvidia_models.is_empty() {
                    out.mounts.extend(
                        NVIDIA_CONTROL_DEVICES
                            .iter()
                            .map(|(name, path)| MountPair::char_device(*name, *path)),
                    );
                }
                if !nvidia_models.contains(&gpu.device_name.as_str()) {
                    nvidia_models.push(&gpu.device_name);
                }
            }
            GpuVendor::Amd | GpuVendor::Intel => {
                out.mounts.push(dri_card(i));
                out.mounts.push(MountPair::char_device(
                    format!("dri-render{i}"),
                    format!("/dev/dri/renderD{}", RENDER_NODE_MINOR_BASE + i),
                ));
            }
            GpuVendor::Unknown => {
                out.advisories.push(Advisory::UnknownGpuVendor {
                    device_name: gpu.device_name.clone(),
                });
                out.mounts.push(dri_card(i));
            }
        }
    }
    if nvidia_models.len() > 1 {
        out.advisories.push(Advisory::MixedNvidiaModels {
            models: nvidia_models.join(", "),
        });
    }

    for (i, hostdev) in host_devices.iter().enumerate() {
        out.advisories.push(Advisory::HostDeviceNeedsVfioGroup {
            name: hostdev.name.clone(),
            device_name: hostdev.device_name.clone(),
        });
        if i == 0 {
            out.mounts
                .push(MountPair::char_device(VFIO_CONTAINER.0, VFIO_CONTAINER.1));
        }
    }

    out
}

fn dri_card(index: usize) -> MountPair {
    MountPair::char_device(format!("dri-card{index}"), format!("/dev/dri/card{index}"))
}

/// Add one `hostPath` volume per mount, mounted into `container`.
///
/// Returns `false` when `container` is not part of the Pod; volumes are
/// still added in that case.
pub fn apply_mounts(pod: &mut Pod, container: &str, mounts: &[MountPair]) -> bool {
    let mut mounted = true;
    for mount in mounts {
        manifest::push_volume(pod, mount.to_volume());
        mounted &= manifest::push_mount(pod, container, &mount.volume_name, &mount.mount_path);
    }
    mounted
}

/// Mount the devices requested by `gpus` and `host_devices` into the
/// compute container of `pod`, reporting advisories on the log.
pub fn mount_host_devices(pod: &mut Pod, gpus: &[Gpu], host_devices: &[HostDevice]) -> Vec<Advisory> {
    let DeviceMounts { mounts, advisories } = compute_mounts(gpus, host_devices);
    for advisory in &advisories {
        warn!("{advisory}");
    }
    if !apply_mounts(pod, manifest::COMPUTE_CONTAINER, &mounts) {
        warn!(
            "no {} container in Pod, device volumes are left unmounted",
            manifest::COMPUTE_CONTAINER
        );
    }
    advisories
}
