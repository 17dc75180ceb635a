use clap::Parser;

use arena::cli::{self, Cli};
use arena::config::EngineManager;
use arena::supervisor::{ExitStatus, Supervisor};

fn init_logging(debug: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    match debug {
        Some(path) if !path.is_empty() => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(EnvFilter::new("trace"))
                        .with_writer(std::sync::Mutex::new(file))
                        .with_ansi(false)
                        .init();
                }
                Err(e) => {
                    eprintln!("cannot open debug file {}: {}", path, e);
                    tracing_subscriber::fmt()
                        .with_env_filter(EnvFilter::new("trace"))
                        .init();
                }
            }
        }
        Some(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("trace"))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug.as_deref());

    if cli.list_engines {
        match EngineManager::load(&cli.enginefile) {
            Ok(manager) => {
                for name in manager.names() {
                    println!("{}", name);
                }
                std::process::exit(ExitStatus::Clean.code());
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(ExitStatus::ConfigFailure.code());
            }
        }
    }

    let setup = match cli::build(cli) {
        Ok(setup) => setup,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(ExitStatus::ConfigFailure.code());
        }
    };

    let mut supervisor = Supervisor::new(setup);
    supervisor.install_interrupt_handler();
    std::process::exit(supervisor.run().code());
}
