use clap::Parser;
use tubefetch_lib::cli::Cli;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Must run before the runtime spawns its worker threads
    tubefetch_lib::downloader::progress::capture_local_offset();

    let cli = Cli::parse();
    tokio::runtime::Runtime::new()?.block_on(tubefetch_lib::run(cli))
}
