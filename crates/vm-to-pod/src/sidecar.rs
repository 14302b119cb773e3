//! Console proxy sidecar.
//!
//! The sidecar relays the guest serial console to a WebSocket. It reaches
//! the console socket through a memory-backed volume shared with the
//! container that runs the hypervisor.

use k8s_openapi::api::core::v1::Capabilities;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::SecurityContext;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;
use tracing::debug;
use tracing::warn;

use crate::manifest;

pub const SIDECAR_CONTAINER: &str = "console-proxy";
pub const PRIVATE_VOLUME: &str = "kubevirt-private";
pub const PRIVATE_MOUNT_PATH: &str = "/var/run/kubevirt-private";
/// Where the proxy binary lives in the proxy image, including the default
/// [`DEFAULT_PROXY_IMAGE`](crate::config::DEFAULT_PROXY_IMAGE).
pub const PROXY_ENTRYPOINT: &str = "/proxy";

/// Add the console proxy sidecar to `pod`.
///
/// Steps are order-significant: shared volume, mount into the hypervisor
/// container, then the sidecar itself.
pub fn inject_console_proxy(pod: &mut Pod, image: &str, port: u16) {
    manifest::push_volume(
        pod,
        Volume {
            name: PRIVATE_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                size_limit: None,
            }),
            ..Default::default()
        },
    );

    let host = hypervisor_container(pod);
    if manifest::push_mount(pod, host, PRIVATE_VOLUME, PRIVATE_MOUNT_PATH) {
        debug!(container = host, "shared {PRIVATE_VOLUME} with hypervisor container");
    } else {
        warn!("no hypervisor container in Pod, console socket will not be shared");
    }

    manifest::push_container(pod, proxy_container(image, port));
}

/// `virt-launcher` when split out, otherwise `compute`.
fn hypervisor_container(pod: &Pod) -> &'static str {
    if manifest::container(pod, manifest::LAUNCHER_CONTAINER).is_some() {
        manifest::LAUNCHER_CONTAINER
    } else {
        manifest::COMPUTE_CONTAINER
    }
}

fn proxy_container(image: &str, port: u16) -> Container {
    let port = i32::from(port);
    Container {
        name: SIDECAR_CONTAINER.to_string(),
        image: Some(image.to_string()),
        command: Some(vec![
            PROXY_ENTRYPOINT.to_string(),
            format!("--port={port}"),
            format!("--socket-dir={PRIVATE_MOUNT_PATH}"),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("console".to_string()),
            container_port: port,
            host_port: Some(port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: PRIVATE_VOLUME.to_string(),
            mount_path: PRIVATE_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            capabilities: Some(Capabilities {
                add: None,
                drop: Some(vec!["ALL".to_string()]),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::PodSpec;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::config::ConsoleProxyOptions;
    use crate::config::DEFAULT_PROXY_IMAGE;

    fn pod_with(containers: &[&str]) -> Pod {
        Pod {
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
            ..Default::default()
        }
    }

    fn mount_names(pod: &Pod, container: &str) -> Vec<String> {
        manifest::container(pod, container)
            .and_then(|c| c.volume_mounts.as_ref())
            .map(|mounts| mounts.iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn sidecar_is_appended_with_port_and_dropped_capabilities() {
        let mut pod = pod_with(&["compute"]);

        inject_console_proxy(&mut pod, "example.com/proxy:v1", 9000);

        let sidecar = manifest::container(&pod, SIDECAR_CONTAINER).unwrap();
        assert_eq!(sidecar.image.as_deref(), Some("example.com/proxy:v1"));
        assert_eq!(
            sidecar.command.as_deref().unwrap()[..2].to_vec(),
            vec!["/proxy".to_string(), "--port=9000".to_string()]
        );
        let port = &sidecar.ports.as_ref().unwrap()[0];
        assert_eq!(port.container_port, 9000);
        assert_eq!(port.host_port, Some(9000));
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
        assert_eq!(
            sidecar
                .security_context
                .as_ref()
                .and_then(|s| s.capabilities.as_ref())
                .and_then(|c| c.drop.clone()),
            Some(vec!["ALL".to_string()])
        );
        assert_eq!(pod.spec.as_ref().unwrap().containers.last().unwrap().name, SIDECAR_CONTAINER);
    }

    #[test]
    fn shared_volume_is_memory_backed_and_mounted_in_both_containers() {
        let mut pod = pod_with(&["compute"]);

        inject_console_proxy(&mut pod, "proxy", 8080);

        let volume = manifest::volume(&pod, PRIVATE_VOLUME).unwrap();
        assert_eq!(
            volume.empty_dir.as_ref().and_then(|e| e.medium.as_deref()),
            Some("Memory")
        );
        assert_eq!(mount_names(&pod, "compute"), vec![PRIVATE_VOLUME.to_string()]);
        assert_eq!(mount_names(&pod, SIDECAR_CONTAINER), vec![PRIVATE_VOLUME.to_string()]);
        assert!(manifest::dangling_mounts(&pod).is_empty());
    }

    #[test]
    fn split_out_launcher_container_gets_the_mount() {
        let mut pod = pod_with(&["compute", "virt-launcher"]);

        inject_console_proxy(&mut pod, "proxy", 8080);

        assert!(mount_names(&pod, "compute").is_empty());
        assert_eq!(mount_names(&pod, "virt-launcher"), vec![PRIVATE_VOLUME.to_string()]);
    }

    #[test]
    fn default_options_run_the_default_image_entrypoint() {
        let options = ConsoleProxyOptions::default();
        let mut pod = pod_with(&["compute"]);

        inject_console_proxy(&mut pod, &options.image, options.port);

        let sidecar = manifest::container(&pod, SIDECAR_CONTAINER).unwrap();
        assert_eq!(sidecar.image.as_deref(), Some(DEFAULT_PROXY_IMAGE));
        assert_eq!(
            sidecar.command.clone().unwrap(),
            vec![
                PROXY_ENTRYPOINT.to_string(),
                "--port=8080".to_string(),
                "--socket-dir=/var/run/kubevirt-private".to_string(),
            ]
        );
        assert_eq!(PROXY_ENTRYPOINT, "/proxy");
    }
}
