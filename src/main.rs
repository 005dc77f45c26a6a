use clap::Parser;
use tsk::cli::Cli;
use tsk::config::Config;
use tsk::{SupervisorRegistry, interrupt, menu};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(&cli.config_path())?;
    let mut registry = SupervisorRegistry::from_config(&config)?;

    if registry.is_empty() {
        println!("No processes to manage.");
        return Ok(());
    }

    if cli.list {
        menu::print_list(&mut registry);
        return Ok(());
    }

    if let Err(e) = interrupt::install() {
        tracing::warn!("could not install interrupt handler: {}", e);
    }
    let result = menu::run(&mut registry, &config.log_dir());

    let failures = registry.cleanup_all();
    if failures > 0 {
        eprintln!("{} process(es) did not shut down cleanly", failures);
    }

    result.map_err(Into::into)
}
