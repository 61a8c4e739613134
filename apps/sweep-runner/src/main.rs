use clap::Parser;

use sweep_runner::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	sweep_runner::run(args).await
}
