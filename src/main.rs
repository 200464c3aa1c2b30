use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use grml2usb::cli::Cli;
use grml2usb::commands;
use grml2usb::config::Settings;
use grml2usb::exec::{Runner, SystemExecutor};
use grml2usb::logging::{self, Log, Logger, Verbosity};
use grml2usb::mount::MountManager;
use grml2usb::registry::ResourceRegistry;

/// Exit status after an interrupt (128 + SIGINT).
const INTERRUPTED: i32 = 130;

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.version {
        commands::version::run();
        return Ok(());
    }

    logging::init_subscriber(Verbosity::from_flags(args.quiet, args.verbose), "grml2usb");
    let log = Arc::new(Logger::new("grml2usb"));
    let registry = Arc::new(ResourceRegistry::new());

    let settings = Settings::load(&Settings::default_path())?;
    let cleanup = MountManager::new(
        Runner::new(
            Arc::new(SystemExecutor),
            Arc::clone(&log) as Arc<dyn Log>,
            args.dry_run,
        ),
        Arc::clone(&registry),
        settings.mount_table(),
    );
    let interrupt_log = Arc::clone(&log);
    ctrlc::set_handler(move || {
        interrupt_log.warn("Received interrupt, cleaning up before exiting...");
        cleanup.release_all();
        std::process::exit(INTERRUPTED);
    })?;

    commands::install::run(&args, &settings, &log, registry)
}
