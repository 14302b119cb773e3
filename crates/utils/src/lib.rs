//! Helpers shared by the `vm-to-pod` and `console-proxy` binaries.

mod build_info;
pub mod logging;
pub mod version;
