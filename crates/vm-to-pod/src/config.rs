use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use utils::version;

use crate::error::TransformError;
use crate::error::TransformResult;

pub const DEFAULT_LAUNCHER_IMAGE: &str = "quay.io/kubevirt/virt-launcher:v1.7.0";
pub const DEFAULT_PROXY_IMAGE: &str = "quay.io/vladikr/kubevirt-console-proxy:latest";
pub const DEFAULT_PROXY_PORT: u16 = 8080;

/// Generate a standalone Pod manifest from a KubeVirt VirtualMachine
#[derive(Parser, Debug, Clone)]
#[command(name = "vm-to-pod", about, long_about = None, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "VM_TO_POD_VM_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to VirtualMachine YAML file"
    )]
    pub vm_file: PathBuf,

    #[arg(
        long,
        value_enum,
        env = "VM_TO_POD_OUTPUT",
        default_value_t = OutputFormat::Yaml,
        help = "Output format"
    )]
    pub output: OutputFormat,

    #[arg(
        long,
        env = "VM_TO_POD_LAUNCHER_IMAGE",
        default_value = DEFAULT_LAUNCHER_IMAGE,
        help = "Virt-launcher image"
    )]
    pub launcher_image: String,

    #[arg(
        long,
        env = "VM_TO_POD_ADD_CONSOLE_PROXY",
        help = "Add console proxy sidecar to the Pod"
    )]
    pub add_console_proxy: bool,

    #[arg(
        long,
        env = "VM_TO_POD_PROXY_IMAGE",
        default_value = DEFAULT_PROXY_IMAGE,
        help = "Console proxy image"
    )]
    pub proxy_image: String,

    #[arg(
        long,
        env = "VM_TO_POD_PROXY_PORT",
        default_value_t = DEFAULT_PROXY_PORT,
        help = "Port for the console proxy to listen on"
    )]
    pub proxy_port: u16,

    #[arg(
        long,
        env = "VM_TO_POD_FORCE_PASST",
        help = "Force all network interfaces to use the passt binding"
    )]
    pub force_passt: bool,

    #[arg(
        long,
        env = "VM_TO_POD_MOUNT_DEVICES",
        help = "Mount KVM and requested GPU/host devices for standalone execution"
    )]
    pub mount_devices: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, derive_more::Display)]
pub enum OutputFormat {
    #[default]
    #[display("yaml")]
    Yaml,
    #[display("json")]
    Json,
}

impl OutputFormat {
    /// Marshal `pod` in this format.
    ///
    /// # Errors
    ///
    /// - [`TransformError::MarshalPod`] if serialization fails
    pub fn marshal(self, pod: &Pod) -> TransformResult<String> {
        let context = || TransformError::MarshalPod {
            format: self.to_string(),
        };
        match self {
            Self::Yaml => serde_yaml::to_string(pod).change_context_lazy(context),
            Self::Json => serde_json::to_string_pretty(pod).change_context_lazy(context),
        }
    }
}

/// Console proxy sidecar settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleProxyOptions {
    pub image: String,
    pub port: u16,
}

impl Default for ConsoleProxyOptions {
    fn default() -> Self {
        Self {
            image: DEFAULT_PROXY_IMAGE.to_string(),
            port: DEFAULT_PROXY_PORT,
        }
    }
}

/// What a transformation does on top of rendering the launcher Pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    pub launcher_image: String,
    /// `Some` adds the console proxy sidecar.
    pub console_proxy: Option<ConsoleProxyOptions>,
    pub force_passt: bool,
    pub mount_devices: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            launcher_image: DEFAULT_LAUNCHER_IMAGE.to_string(),
            console_proxy: None,
            force_passt: false,
            mount_devices: false,
        }
    }
}

impl From<&Cli> for TransformOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            launcher_image: cli.launcher_image.clone(),
            console_proxy: cli.add_console_proxy.then(|| ConsoleProxyOptions {
                image: cli.proxy_image.clone(),
                port: cli.proxy_port,
            }),
            force_passt: cli.force_passt,
            mount_devices: cli.mount_devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["vm-to-pod", "--vm-file", "vm.yaml"]).unwrap();

        assert_eq!(cli.output, OutputFormat::Yaml);
        assert_eq!(TransformOptions::from(&cli), TransformOptions::default());
    }

    #[test]
    fn cli_enables_console_proxy() {
        let cli = Cli::try_parse_from([
            "vm-to-pod",
            "--vm-file",
            "vm.yaml",
            "--output",
            "json",
            "--add-console-proxy",
            "--proxy-port",
            "9000",
            "--force-passt",
            "--mount-devices",
        ])
        .unwrap();

        let options = TransformOptions::from(&cli);

        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(
            options.console_proxy,
            Some(ConsoleProxyOptions {
                image: DEFAULT_PROXY_IMAGE.to_string(),
                port: 9000,
            })
        );
        assert!(options.force_passt);
        assert!(options.mount_devices);
    }

    #[test]
    fn proxy_image_without_flag_is_ignored() {
        let cli = Cli::try_parse_from([
            "vm-to-pod",
            "--vm-file",
            "vm.yaml",
            "--proxy-image",
            "example.com/proxy",
        ])
        .unwrap();

        assert_eq!(TransformOptions::from(&cli).console_proxy, None);
    }

    #[test]
    fn vm_file_is_required() {
        assert!(Cli::try_parse_from(["vm-to-pod"]).is_err());
    }

    #[test]
    fn marshal_json_and_yaml() {
        let pod = Pod::default();

        let json = OutputFormat::Json.marshal(&pod).unwrap();
        let yaml = OutputFormat::Yaml.marshal(&pod).unwrap();

        assert!(json.contains("\"kind\": \"Pod\""));
        assert!(yaml.contains("kind: Pod"));
    }
}
