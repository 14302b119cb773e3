use core::error::Error;

use error_stack::Report;

/// Result type for transformation stages.
pub type TransformResult<T> = Result<T, Report<TransformError>>;

/// Stage of a VM-to-Pod transformation that failed.
#[derive(Debug, derive_more::Display)]
pub enum TransformError {
    #[display("Failed to read VM file {path}")]
    ReadVmFile { path: String },
    #[display("Failed to parse VM descriptor")]
    ParseVm,
    #[display("VirtualMachine {name} has no instance template")]
    MissingTemplate { name: String },
    #[display("Failed to render launcher Pod: {message}")]
    Render { message: String },
    #[display("Rendered Pod has no {name} container")]
    MissingContainer { name: String },
    #[display("Failed to serialize VirtualMachineInstance snapshot")]
    SerializeInstance,
    #[display("Failed to marshal Pod as {format}")]
    MarshalPod { format: String },
}

impl Error for TransformError {}
