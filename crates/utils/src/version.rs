use std::sync::LazyLock;

use crate::build_info::BUILD_INFO;

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format_version(
        env!("IMAGE_VERSION"),
        BUILD_INFO.commit_sha1,
        BUILD_INFO.git_dirty,
    )
});

fn format_version(image_version: &str, commit: Option<&str>, dirty: bool) -> String {
    let commit = commit.map(|sha| &sha[..sha.len().min(12)]);
    format!(
        "{}-{}{}",
        image_version,
        commit.unwrap_or("unknown"),
        if dirty { "-dirty" } else { "" }
    )
}
