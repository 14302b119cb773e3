//! Render a standalone launcher Pod manifest from a KubeVirt VirtualMachine,
//! so the VM can run outside of a KubeVirt-managed cluster (for example with
//! `podman kube play`).

pub mod config;
pub mod devices;
pub mod error;
pub mod instance;
pub mod manifest;
pub mod network;
pub mod render;
pub mod sidecar;
pub mod transform;
pub mod vmi;

pub use config::ConsoleProxyOptions;
pub use config::OutputFormat;
pub use config::TransformOptions;
pub use error::TransformError;
pub use transform::StandalonePod;
pub use transform::Transformer;
