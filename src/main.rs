//! ACOS CLI: review text to Aspect-Category-Opinion-Sentiment quadruples.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "acos",
    version,
    about = "Extract Aspect-Category-Opinion-Sentiment quadruples from product reviews"
)]
struct Cli {
    #[command(subcommand)]
    command: acos_pipeline::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = acos_pipeline::run(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
