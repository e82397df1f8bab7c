use clap::Parser;
use color_eyre::Result;

/// In-memory key/value server speaking a RESP-like wire protocol.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 9999)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let args = Args::parse();
    bluebox::server::start(args.port).await
}
