use clap::Parser;
use merchcoin::cli::{self, Cli};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    cli::init_tracing(cli.verbose);

    if let Err(err) = cli.run().await {
        let code = cli::exit_code(&err);
        if code == 2 {
            error!(error = %err, "Ledger store is unusable; restart required");
        }
        eprintln!("Error: {:#}", err);
        std::process::exit(code);
    }
}
