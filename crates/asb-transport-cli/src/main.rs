use asb_transport_cli::{run_cli, CliError};

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        // Help has already been printed for a missing subcommand.
        if !matches!(e, CliError::MissingSubcommand) {
            eprintln!("{}", e);
        }

        std::process::exit(e.exit_code());
    }
}
