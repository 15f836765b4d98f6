mod commands;

use commands::write::StartPoint;
use rust_mtape::cli::{Cli, Commands};
use rust_mtape::config::MtapeConfig;
use rust_mtape::error::{Result, RustMtapeError};
use rust_mtape::logger::{self, LogSettings};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse_args();

    let mut config = MtapeConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    // Initialize logging system
    logger::init(&LogSettings {
        verbose: args.verbose,
        log_file: config.log_file.clone(),
        error_log: config.error_log.clone(),
    })?;

    debug!("rustmtape starting with {:?}", config);

    // Every TapeOperations is dropped inside `run`, so the drive is
    // released before the process exits.
    match run(args.command, &config).await {
        Ok(_) => {
            info!("Operation completed successfully");
            Ok(())
        }
        Err(RustMtapeError::NoMedia) => {
            error!("There is no tape in the drive, aborting");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Operation failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn apply_overrides(config: &mut MtapeConfig, args: &Cli) {
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if let Some(script) = &args.newtape {
        config.script = Some(script.clone());
    }
    if let Some(log_file) = &args.log_file {
        config.log_file = Some(log_file.clone());
    }
    if let Some(error_log) = &args.error_log {
        config.error_log = Some(error_log.clone());
    }
}

async fn run(command: Commands, config: &MtapeConfig) -> Result<()> {
    match command {
        Commands::Write {
            source,
            position,
            progress,
        } => {
            commands::write::execute(config, &source, StartPoint::NewVolume { position }, progress)
                .await
        }

        Commands::Writelist { list, progress } => {
            commands::write::execute_list(config, &list, progress).await
        }

        Commands::Append { source, progress } => {
            commands::write::execute(config, &source, StartPoint::Append, progress).await
        }

        Commands::Resume { progress } => commands::resume::execute(config, progress).await,

        Commands::Read { output, force } => commands::read::execute(config, &output, force).await,

        Commands::Locate {
            file,
            output,
            force,
        } => commands::read::execute_locate(config, &file, &output, force).await,

        Commands::Delete { file } => commands::catalog::delete(config, &file),

        Commands::Init { force } => commands::catalog::init(config, force),

        Commands::List { all, volumes, csv } => {
            commands::catalog::list(config, all, volumes, csv.as_deref())
        }

        Commands::Tape { action } => commands::tape::execute(config, action).await,
    }
}
