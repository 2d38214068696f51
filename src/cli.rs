use crate::demo::{run_demo, DemoArgs};
use crate::server;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use idv_proofing::error::AppError;
use idv_proofing::proofing::PayloadEncryptor;

#[derive(Parser, Debug)]
#[command(
    name = "IDV Proofing Orchestrator",
    about = "Run the asynchronous identity-proofing worker and its job API",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and proofing workers (default command)
    Serve(ServeArgs),
    /// Run sample proofing jobs in-process against the mock vendors
    Demo(DemoArgs),
    /// Print a fresh base64 AES-256 key for IDV_ENCRYPTION_KEY
    Keygen,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the number of proofing workers
    #[arg(long)]
    pub(crate) concurrency: Option<usize>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Keygen => {
            println!("{}", generate_encoded_key());
            Ok(())
        }
    }
}

fn generate_encoded_key() -> String {
    STANDARD.encode(PayloadEncryptor::generate_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["idv-orchestrator"]).expect("parses");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["idv-orchestrator", "serve", "--port", "4000"])
            .expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => assert_eq!(args.port, Some(4000)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn generated_keys_decode_to_aes256_length() {
        let key = generate_encoded_key();
        let bytes = STANDARD.decode(key).expect("valid base64");
        assert_eq!(bytes.len(), 32);
    }
}
