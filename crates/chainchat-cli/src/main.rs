//! chainchat CLI entry point

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chainchat_cli::{Cli, Config, ExitCode, OutputFormatter};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: config: {e}");
            return ExitCode::InvalidInput.to_exit_code();
        }
    };

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.logging.level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let formatter = OutputFormatter::new(cli.output);
    let command = cli.command.name();

    match cli.execute_with_config(config).await {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            let code = ExitCode::for_error(&e);
            let message = format!("{e:#}");
            match formatter.format() {
                chainchat_cli::OutputFormat::Json => println!("{}", formatter.format_error(&message, command)),
                chainchat_cli::OutputFormat::Text => eprintln!("{}", formatter.format_error(&message, command)),
            }
            code.to_exit_code()
        }
    }
}
