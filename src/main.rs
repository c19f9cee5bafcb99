use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

use nodebox::backend::{self, Backend};
use nodebox::cli::{Cli, Command};
use nodebox::config;
use nodebox::error::NodeboxError;
use nodebox::logging;
use nodebox::paths::HostPaths;
use nodebox::progress::OutputMode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Bare invocation and --help are not failures; a bad verb is.
            let code = match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
                _ => 1,
            };
            e.print().ok();
            return ExitCode::from(code);
        }
    };

    let mode = if cli.verbose || !std::io::stdout().is_terminal() {
        OutputMode::Plain
    } else {
        OutputMode::Normal
    };
    let file_handle = logging::init(mode, cli.verbose);

    match run(&cli, mode, &file_handle).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::from(code)
        }
    }
}

async fn run(
    cli: &Cli,
    mode: OutputMode,
    file_handle: &logging::DeferredFileHandle,
) -> Result<(), NodeboxError> {
    let (config_path, required) = cli.config_path();
    let loaded = config::load_config(&config_path, required)?;
    let paths = HostPaths::system(&loaded.config.name);

    // Mutating verbs keep a debug log next to the generated XML
    if matches!(cli.command, Command::Create | Command::Delete)
        && let Err(e) = file_handle.set_file(&paths.log_file())
    {
        tracing::warn!("file logging disabled: {e}");
    }

    tracing::debug!(command = ?cli.command, config = %config_path.display(), "dispatching");
    let backend = backend::create_backend(paths, mode);

    match cli.command {
        Command::Create => backend.create(&loaded).await,
        Command::Start => backend.start(&loaded).await,
        Command::Stop => backend.stop(&loaded).await,
        Command::Delete => backend.delete(&loaded).await,
        Command::Status => backend.status(&loaded).await,
    }
}
