use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let _logger = match flexi_logger::Logger::try_with_env_or_str("info")
        .and_then(|logger| logger.format(flexi_logger::default_format).start())
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("cannot start logger: {}", e);
            None
        }
    };

    let cli = noitabackup_lib::Cli::parse();
    match noitabackup_lib::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
