use anyhow::Context;
use clap::Parser;
use gymbros_lib::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    gymbros_lib::run(cli).await.context("gymbros-bot stopped with an error")
}
