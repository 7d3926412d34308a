//! Riffle demo runner (feature-gated).

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "riffle", version, about = "Riffle demonstration pipelines")]
struct Cli {
    /// Lower benchmark bound.
    #[arg(default_value_t = 1)]
    first: i32,

    /// Upper benchmark bound.
    #[arg(default_value_t = 1000)]
    last: i32,
}

fn main() {
    let cli = Cli::parse();
    riffle::demo::run(cli.first, cli.last);
}
