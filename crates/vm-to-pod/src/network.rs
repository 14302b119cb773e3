//! Rewrites every guest interface onto a single binding mode.
//!
//! After [`rewrite_bindings`] runs, each interface carries exactly the target
//! binding, and each interface name resolves to a pod-backed network. Any
//! interface without a network of its own is renamed onto
//! [`DEFAULT_NETWORK_NAME`], which exists exactly once.

use tracing::debug;

use crate::vmi::InterfaceBinding;
use crate::vmi::Network;
use crate::vmi::NetworkSource;
use crate::vmi::PodNetwork;
use crate::vmi::VirtualMachineInstanceSpec;
use crate::vmi::BINDING_KEYS;
use crate::vmi::DEFAULT_NETWORK_NAME;

/// Force all interfaces of `spec` onto the `passt` binding.
pub fn force_passt_binding(spec: &mut VirtualMachineInstanceSpec) {
    rewrite_bindings(spec, InterfaceBinding::passt());
}

/// Rebind every interface of `spec` to `target` and repair references
/// between interfaces and networks.
///
/// Binding keys left in an interface's uninterpreted fields are dropped, so
/// `target` is the only binding set afterwards.
///
/// Always succeeds. The caller holds the only reference to `spec` for the
/// duration of the call.
pub fn rewrite_bindings(spec: &mut VirtualMachineInstanceSpec, target: InterfaceBinding) {
    let networks = &mut spec.networks;
    let interfaces = &mut spec.domain.devices.interfaces;

    // The primary pod network has to be discoverable at index 0.
    if !networks.iter().any(Network::is_pod) {
        debug!("no pod network declared, prepending {DEFAULT_NETWORK_NAME}");
        let primary = match networks.iter().position(|n| n.name == DEFAULT_NETWORK_NAME) {
            Some(index) => {
                let mut network = networks.remove(index);
                network.source = Some(NetworkSource::Pod(PodNetwork::default()));
                network
            }
            None => Network::pod(DEFAULT_NETWORK_NAME),
        };
        networks.insert(0, primary);
    }

    for iface in interfaces.iter_mut() {
        iface.binding = Some(target.clone());
        iface.extra.retain(|key, _| !BINDING_KEYS.contains(&key.as_str()));
    }

    for iface in interfaces.iter_mut() {
        if let Some(network) = networks.iter_mut().find(|n| n.name == iface.name) {
            if !network.is_pod() {
                debug!(
                    interface = %iface.name,
                    "moving network from secondary attachment to pod network"
                );
                network.source = Some(NetworkSource::Pod(PodNetwork::default()));
            }
            continue;
        }

        debug!(
            interface = %iface.name,
            "interface has no network, linking it to {DEFAULT_NETWORK_NAME}"
        );
        iface.name = DEFAULT_NETWORK_NAME.to_string();
        match networks.iter_mut().find(|n| n.name == DEFAULT_NETWORK_NAME) {
            Some(network) if !network.is_pod() => {
                network.source = Some(NetworkSource::Pod(PodNetwork::default()));
            }
            Some(_) => {}
            None => networks.push(Network::pod(DEFAULT_NETWORK_NAME)),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::vmi::BindingOptions;
    use crate::vmi::Interface;
    use crate::vmi::MultusNetwork;

    fn iface(name: &str, binding: Option<InterfaceBinding>) -> Interface {
        Interface {
            name: name.to_string(),
            binding,
            ..Default::default()
        }
    }

    fn multus(name: &str) -> Network {
        Network {
            name: name.to_string(),
            source: Some(NetworkSource::Multus(MultusNetwork {
                network_name: format!("ns/{name}"),
                default: None,
            })),
            ..Default::default()
        }
    }

    fn spec(interfaces: Vec<Interface>, networks: Vec<Network>) -> VirtualMachineInstanceSpec {
        let mut spec = VirtualMachineInstanceSpec {
            networks,
            ..Default::default()
        };
        spec.domain.devices.interfaces = interfaces;
        spec
    }

    /// Interface lists covering every binding variant and reference shape.
    fn cases() -> Vec<VirtualMachineInstanceSpec> {
        let options = BindingOptions::default;
        vec![
            spec(vec![], vec![]),
            spec(vec![iface("eth1", None)], vec![]),
            spec(
                vec![
                    iface("default", Some(InterfaceBinding::Masquerade(options()))),
                    iface("br", Some(InterfaceBinding::Bridge(options()))),
                ],
                vec![Network::pod("default"), multus("br")],
            ),
            spec(
                vec![
                    iface("a", Some(InterfaceBinding::Slirp(options()))),
                    iface("b", Some(InterfaceBinding::Sriov(options()))),
                    iface("c", Some(InterfaceBinding::passt())),
                    iface("d", Some(InterfaceBinding::Macvtap(options()))),
                ],
                vec![multus("x")],
            ),
            spec(
                vec![iface("a", None), iface("b", None)],
                vec![multus("default")],
            ),
        ]
    }

    #[test]
    fn unmatched_interface_collapses_onto_default() {
        let mut spec = spec(vec![iface("eth1", None)], vec![]);

        force_passt_binding(&mut spec);

        assert_eq!(
            spec.domain.devices.interfaces,
            vec![iface("default", Some(InterfaceBinding::passt()))]
        );
        assert_eq!(spec.networks, vec![Network::pod("default")]);
    }

    #[test]
    fn empty_interface_list_only_gains_pod_network() {
        let mut spec = spec(vec![], vec![Network::pod("primary")]);

        force_passt_binding(&mut spec);

        assert!(spec.domain.devices.interfaces.is_empty());
        assert_eq!(spec.networks, vec![Network::pod("primary")]);
    }

    #[test]
    fn pod_network_is_prepended_when_missing() {
        let mut spec = spec(vec![iface("br", None)], vec![multus("br")]);

        force_passt_binding(&mut spec);

        assert_eq!(spec.networks[0], Network::pod("default"));
        assert_eq!(spec.networks[1].name, "br");
        assert!(spec.networks[1].is_pod());
        assert_eq!(spec.domain.devices.interfaces[0].name, "br");
    }

    #[test]
    fn matched_secondary_network_becomes_pod_network() {
        let mut spec = spec(
            vec![iface("default", None), iface("br", None)],
            vec![Network::pod("default"), multus("br")],
        );

        force_passt_binding(&mut spec);

        assert_eq!(
            spec.networks,
            vec![Network::pod("default"), Network::pod("br")]
        );
    }

    #[test]
    fn secondary_network_named_default_is_reused() {
        let mut spec = spec(
            vec![iface("a", None)],
            vec![multus("other"), multus("default")],
        );

        force_passt_binding(&mut spec);

        assert_eq!(
            spec.networks,
            vec![Network::pod("default"), multus("other")]
        );
    }

    #[test]
    fn existing_pod_network_options_are_kept() {
        let mut primary = Network::pod("default");
        if let Some(NetworkSource::Pod(pod)) = primary.source.as_mut() {
            pod.extra.insert(
                "vmNetworkCIDR".to_string(),
                serde_json::json!("10.0.2.0/24"),
            );
        }
        let mut spec = spec(vec![iface("default", None)], vec![primary.clone()]);

        force_passt_binding(&mut spec);

        assert_eq!(spec.networks, vec![primary]);
    }

    #[test]
    fn every_parsed_binding_is_replaced() {
        let interfaces: Vec<Interface> = serde_json::from_str(
            r#"[
                {"name": "default", "model": "virtio", "macvtap": {}},
                {"name": "br", "bridge": {}, "sriov": {}},
                {"name": "pt", "passt": {}, "masquerade": {}, "slirp": {}}
            ]"#,
        )
        .unwrap();
        let mut spec = spec(
            interfaces,
            vec![Network::pod("default"), multus("br"), multus("pt")],
        );

        force_passt_binding(&mut spec);

        let json = serde_json::to_value(&spec.domain.devices.interfaces).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"name": "default", "model": "virtio", "passt": {}},
                {"name": "br", "passt": {}},
                {"name": "pt", "passt": {}}
            ])
        );
    }

    #[test]
    fn binding_totality() {
        for mut spec in cases() {
            force_passt_binding(&mut spec);

            for iface in &spec.domain.devices.interfaces {
                assert_eq!(iface.binding, Some(InterfaceBinding::passt()));
                assert!(BINDING_KEYS.iter().all(|key| !iface.extra.contains_key(*key)));
            }
        }
    }

    #[test]
    fn reference_closure() {
        for mut spec in cases() {
            force_passt_binding(&mut spec);

            for iface in &spec.domain.devices.interfaces {
                let network = spec
                    .networks
                    .iter()
                    .find(|n| n.name == iface.name)
                    .unwrap_or_else(|| panic!("no network for interface {}", iface.name));
                assert!(network.is_pod(), "network {} is not a pod network", network.name);
            }
        }
    }

    #[test]
    fn default_network_singleton() {
        let mut spec = spec(
            vec![iface("a", None), iface("b", None), iface("c", None)],
            vec![multus("x")],
        );

        force_passt_binding(&mut spec);

        let defaults = spec
            .networks
            .iter()
            .filter(|n| n.name == DEFAULT_NETWORK_NAME)
            .count();
        assert_eq!(defaults, 1);
        assert!(spec
            .domain
            .devices
            .interfaces
            .iter()
            .all(|i| i.name == DEFAULT_NETWORK_NAME));

        for mut spec in cases() {
            force_passt_binding(&mut spec);
            let defaults = spec
                .networks
                .iter()
                .filter(|n| n.name == DEFAULT_NETWORK_NAME)
                .count();
            assert!(defaults <= 1);
        }
    }

    #[test]
    fn rewrite_is_idempotent() {
        for mut spec in cases() {
            force_passt_binding(&mut spec);
            let once = spec.clone();
            force_passt_binding(&mut spec);
            assert_eq!(spec, once);
        }
    }
}
