use clap::Parser;
use error_stack::Report;
use utils::version;
use vm_to_pod::config::Cli;
use vm_to_pod::TransformError;
use vm_to_pod::TransformOptions;
use vm_to_pod::Transformer;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() -> Result<(), Report<TransformError>> {
    setup_global_hooks();

    let cli = Cli::parse();
    utils::logging::init();

    tracing::debug!("vm-to-pod {}", &**version::VERSION);

    let transformer = Transformer::new(TransformOptions::from(&cli));
    let standalone = transformer.transform_file(&cli.vm_file)?;
    let output = cli.output.marshal(&standalone.pod)?;

    println!("{output}");
    Ok(())
}
