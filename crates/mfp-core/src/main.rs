use clap::Parser;
use mfp_core::cli::{self, Cli};
use mfp_core::{logging, ExitCode};
use serde_json::json;
use tracing::error;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.verbose);

    let code = match cli::run(&cli) {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            let code = ExitCode::for_error(&err);
            error!(code = err.code(), exit_code = code.as_i32(), "{err}");
            if cli.format.is_machine_readable() {
                let doc = json!({ "error": { "code": err.code(), "message": err.to_string() } });
                println!("{doc}");
            } else {
                eprintln!("error: {err}");
            }
            code
        }
    };
    std::process::exit(code.as_i32());
}
