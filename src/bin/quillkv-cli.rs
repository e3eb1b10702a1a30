//! quillkv-cli - command-line client for QuillKV

use quillkv::cli::{self, CliArgs, CliError};

fn print_usage() {
    eprintln!("usage: quillkv-cli [-h host] [-p port] [cmd arg ...]");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(CliError::Usage(msg)) => {
            eprintln!("Error: {}", msg);
            print_usage();
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = cli::run(args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
