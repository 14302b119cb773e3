//! VirtualMachine to standalone Pod transformation.
//!
//! A transformation runs in a fixed order:
//!
//! 1. instantiate the VM template and apply network defaults
//! 2. optionally rewrite every interface onto the passt binding
//! 3. render the launcher Pod
//! 4. pin the Pod name, then optionally add the console proxy sidecar and
//!    host device mounts
//! 5. store the instance snapshot in `STANDALONE_VMI` on `compute`

use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::info;
use tracing::instrument;

use crate::config::TransformOptions;
use crate::devices;
use crate::devices::Advisory;
use crate::error::TransformError;
use crate::error::TransformResult;
use crate::instance;
use crate::manifest;
use crate::network;
use crate::render::LaunchManifestRenderer;
use crate::render::LauncherTemplate;
use crate::sidecar;
use crate::vmi::VirtualMachine;
use crate::vmi::VirtualMachineInstance;

/// Result of a transformation.
#[derive(Debug, Clone)]
pub struct StandalonePod {
    pub pod: Pod,
    /// The instance as embedded in the Pod, after any rewriting.
    pub instance: VirtualMachineInstance,
    /// Degraded device-mount guesses; already logged.
    pub advisories: Vec<Advisory>,
}

pub struct Transformer<R = LauncherTemplate> {
    options: TransformOptions,
    renderer: R,
}

impl Transformer<LauncherTemplate> {
    pub fn new(options: TransformOptions) -> Self {
        let renderer = LauncherTemplate::new(options.launcher_image.clone());
        Self { options, renderer }
    }
}

impl<R: LaunchManifestRenderer> Transformer<R> {
    pub fn with_renderer(options: TransformOptions, renderer: R) -> Self {
        Self { options, renderer }
    }

    /// Transform the VirtualMachine stored at `path`.
    ///
    /// # Errors
    ///
    /// - [`TransformError::ReadVmFile`] / [`TransformError::ParseVm`] if the
    ///   file does not hold a VirtualMachine
    /// - any error of [`Transformer::transform`]
    pub fn transform_file(&self, path: &Path) -> TransformResult<StandalonePod> {
        let vm = instance::load_virtual_machine(path)?;
        self.transform(&vm)
    }

    /// Transform `vm` into a standalone launcher Pod.
    ///
    /// # Errors
    ///
    /// - [`TransformError::MissingTemplate`] if `vm` has no template
    /// - [`TransformError::Render`] if the launcher Pod cannot be rendered
    /// - any error of [`Transformer::assemble`]
    #[instrument(skip_all, fields(vm = %vm.name_any()))]
    pub fn transform(&self, vm: &VirtualMachine) -> TransformResult<StandalonePod> {
        let mut vmi = instance::instance_from_vm(vm)?;

        if self.options.force_passt {
            info!("forcing passt binding on all interfaces");
            network::force_passt_binding(&mut vmi.spec);
        }

        let mut pod = self
            .renderer
            .render(&vmi)
            .attach_printable_lazy(|| format!("rendering launcher Pod for {}", vmi.name_any()))?;

        let advisories = self.assemble(&mut pod, &vmi)?;
        info!(
            pod = pod.metadata.name.as_deref().unwrap_or_default(),
            advisories = advisories.len(),
            "standalone Pod assembled"
        );

        Ok(StandalonePod {
            pod,
            instance: vmi,
            advisories,
        })
    }

    /// Apply the standalone mutations to an already rendered `pod`.
    ///
    /// `pod` is exclusively owned by this call; it is mutated in place.
    ///
    /// # Errors
    ///
    /// - [`TransformError::MissingContainer`] if `pod` has no `compute`
    ///   container
    /// - [`TransformError::SerializeInstance`] if `vmi` cannot be serialized
    pub fn assemble(&self, pod: &mut Pod, vmi: &VirtualMachineInstance) -> TransformResult<Vec<Advisory>> {
        if manifest::container(pod, manifest::COMPUTE_CONTAINER).is_none() {
            return Err(Report::new(TransformError::MissingContainer {
                name: manifest::COMPUTE_CONTAINER.to_string(),
            }));
        }

        manifest::pin_generated_name(pod);

        if let Some(proxy) = &self.options.console_proxy {
            info!(image = %proxy.image, port = proxy.port, "adding console proxy sidecar");
            sidecar::inject_console_proxy(pod, &proxy.image, proxy.port);
        }

        let mut advisories = Vec::new();
        if self.options.mount_devices {
            let devices = &vmi.spec.domain.devices;
            info!(
                gpus = devices.gpus.len(),
                host_devices = devices.host_devices.len(),
                "mounting host devices"
            );
            advisories = devices::mount_host_devices(pod, &devices.gpus, &devices.host_devices);
        }

        let snapshot = serde_json::to_string(vmi).change_context(TransformError::SerializeInstance)?;
        let compute = manifest::container_mut(pod, manifest::COMPUTE_CONTAINER).ok_or_else(|| {
            Report::new(TransformError::MissingContainer {
                name: manifest::COMPUTE_CONTAINER.to_string(),
            })
        })?;
        manifest::push_env(compute, manifest::STANDALONE_VMI_ENV, snapshot);

        Ok(advisories)
    }
}
