use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use log::error;
use swapkit_executor::{Executor, ExecutorArgs, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match ExecutorArgs::try_parse() {
        Ok(args) => args,
        Err(parse_error) => {
            let _ = parse_error.print();
            return match parse_error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    logging::init_logging(&args.action_file);

    let mut executor = match Executor::new(args) {
        Ok(executor) => executor,
        Err(err) => {
            error!("{err}");
            eprintln!("swapkit-executor: {err}");
            return ExitCode::FAILURE;
        }
    };

    match executor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("swapkit-executor: {err}");
            ExitCode::FAILURE
        }
    }
}
