use std::process::ExitCode;

use thumbgen_core::logging;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_stderr();

    match cli::run_from_args().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("thumbgen error: {:#}", err);
            ExitCode::from(1)
        }
    }
}
