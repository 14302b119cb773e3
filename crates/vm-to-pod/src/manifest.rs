//! Small mutation helpers over `k8s-openapi` Pod manifests.
//!
//! Every helper takes the Pod by exclusive reference; a transformation owns
//! its manifest for the whole call.

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;

/// Container that runs the guest (and, in the standard launcher layout,
/// the hypervisor process).
pub const COMPUTE_CONTAINER: &str = "compute";

/// Container that hosts the hypervisor process when it is split out of
/// `compute`.
pub const LAUNCHER_CONTAINER: &str = "virt-launcher";

/// Environment variable carrying the serialized instance snapshot.
pub const STANDALONE_VMI_ENV: &str = "STANDALONE_VMI";

pub fn spec_mut(pod: &mut Pod) -> &mut PodSpec {
    pod.spec.get_or_insert_with(PodSpec::default)
}

pub fn container<'a>(pod: &'a Pod, name: &str) -> Option<&'a Container> {
    pod.spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == name)
}

pub fn container_mut<'a>(pod: &'a mut Pod, name: &str) -> Option<&'a mut Container> {
    pod.spec
        .as_mut()?
        .containers
        .iter_mut()
        .find(|c| c.name == name)
}

pub fn volume<'a>(pod: &'a Pod, name: &str) -> Option<&'a Volume> {
    pod.spec
        .as_ref()?
        .volumes
        .as_ref()?
        .iter()
        .find(|v| v.name == name)
}

pub fn push_volume(pod: &mut Pod, volume: Volume) {
    spec_mut(pod)
        .volumes
        .get_or_insert_with(Vec::new)
        .push(volume);
}

pub fn push_container(pod: &mut Pod, container: Container) {
    spec_mut(pod).containers.push(container);
}

/// Mount `volume_name` at `mount_path` in the named container.
///
/// Returns `false` when the container does not exist.
pub fn push_mount(pod: &mut Pod, container_name: &str, volume_name: &str, mount_path: &str) -> bool {
    let Some(container) = container_mut(pod, container_name) else {
        return false;
    };
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(VolumeMount {
            name: volume_name.to_string(),
            mount_path: mount_path.to_string(),
            ..Default::default()
        });
    true
}

pub fn push_env(container: &mut Container, name: &str, value: String) {
    container.env.get_or_insert_with(Vec::new).push(EnvVar {
        name: name.to_string(),
        value: Some(value),
        value_from: None,
    });
}

/// Volume names mounted by some container but missing from the volume list.
pub fn dangling_mounts(pod: &Pod) -> Vec<String> {
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };
    let volumes = spec.volumes.as_deref().unwrap_or_default();
    spec.containers
        .iter()
        .flat_map(|c| c.volume_mounts.iter().flatten())
        .filter(|m| !volumes.iter().any(|v| v.name == m.name))
        .map(|m| m.name.clone())
        .collect()
}

/// Turn a `generateName` Pod into a named one.
///
/// Standalone runners such as `podman kube play` require `metadata.name`.
pub fn pin_generated_name(pod: &mut Pod) {
    let meta = &mut pod.metadata;
    if meta.name.is_some() {
        return;
    }
    if let Some(generate_name) = meta.generate_name.take() {
        let name = generate_name.strip_suffix('-').unwrap_or(&generate_name);
        meta.name = Some(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;

    use super::*;

    fn pod_with(containers: &[&str]) -> Pod {
        Pod {
            metadata: ObjectMeta::default(),
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|name| Container {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn push_mount_targets_named_container_only() {
        let mut pod = pod_with(&["compute", "sidecar"]);

        assert!(push_mount(&mut pod, "compute", "kvm", "/dev/kvm"));
        assert!(!push_mount(&mut pod, "missing", "kvm", "/dev/kvm"));

        let compute = container(&pod, "compute").unwrap();
        assert_eq!(compute.volume_mounts.as_ref().unwrap().len(), 1);
        assert!(container(&pod, "sidecar").unwrap().volume_mounts.is_none());
    }

    #[test]
    fn dangling_mounts_reports_missing_volumes() {
        let mut pod = pod_with(&["compute"]);
        push_mount(&mut pod, "compute", "kvm", "/dev/kvm");
        push_mount(&mut pod, "compute", "scratch", "/scratch");
        push_volume(
            &mut pod,
            Volume {
                name: "scratch".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
        );

        assert_eq!(dangling_mounts(&pod), vec!["kvm".to_string()]);
    }

    #[test]
    fn pin_generated_name_strips_trailing_dash() {
        let mut pod = pod_with(&[]);
        pod.metadata.generate_name = Some("virt-launcher-testvm-".to_string());

        pin_generated_name(&mut pod);

        assert_eq!(pod.metadata.name.as_deref(), Some("virt-launcher-testvm"));
        assert_eq!(pod.metadata.generate_name, None);
    }

    #[test]
    fn pin_generated_name_keeps_explicit_name() {
        let mut pod = pod_with(&[]);
        pod.metadata.name = Some("fixed".to_string());
        pod.metadata.generate_name = Some("virt-launcher-testvm-".to_string());

        pin_generated_name(&mut pod);

        assert_eq!(pod.metadata.name.as_deref(), Some("fixed"));
        assert_eq!(
            pod.metadata.generate_name.as_deref(),
            Some("virt-launcher-testvm-")
        );
    }
}
