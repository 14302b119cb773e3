use std::env;

/// Tag of the container image the binaries ship in.
const IMAGE_VERSION_ENV: &str = "VERSION";

fn main() {
    if let Err(err) = emit_git_metadata() {
        println!("cargo:warning=git metadata unavailable, version falls back to `unknown`: {err}");
    }
    emit_image_version();
}

/// `VERGEN_GIT_SHA` and `VERGEN_GIT_DIRTY`, read by `build_info`.
fn emit_git_metadata() -> anyhow::Result<()> {
    let git = vergen_git2::Git2Builder::default()
        .sha(true)
        .dirty(true)
        .build()?;

    vergen_git2::Emitter::default()
        .fail_on_error()
        .add_instructions(&git)?
        .emit()
}

fn emit_image_version() {
    let tag = env::var(IMAGE_VERSION_ENV).unwrap_or_else(|_| "latest".to_string());
    println!("cargo:rustc-env=IMAGE_VERSION={tag}");
    println!("cargo:rerun-if-env-changed={IMAGE_VERSION_ENV}");
}
