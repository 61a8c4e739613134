use std::{
	io::{self, Write},
	path::PathBuf,
	sync::Arc,
};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sweep_config::Config;
use sweep_domain::{
	compiler,
	geo::{self, LatLng},
	plan::{PlanKey, SearchPlan},
};
use sweep_service::{AdvanceRequest, Collaborators, CostEstimator, PlanExecutor, PopularityCache};
use sweep_storage::{db::Db, popularity::PgPopularitySource};

#[derive(Debug, Parser)]
#[command(
	version = sweep_cli::VERSION,
	rename_all = "kebab",
	styles = sweep_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Derive a plan and print its summary. Touches neither the database nor the places API.
	Plan(Target),
	/// Predict call count and cost for an expression in a city.
	Estimate(EstimateArgs),
	/// Execute a plan page by page, printing places as JSON lines.
	Run(RunArgs),
}

#[derive(Debug, clap::Args)]
pub struct Target {
	/// Category expression, e.g. `(cafe AND wifi) OR library`. Empty for keyword-only runs.
	#[arg(long, short = 'e', default_value = "")]
	pub expression: String,
	#[arg(long)]
	pub country: String,
	#[arg(long)]
	pub city: String,
	#[arg(
		long,
		value_name = "LAT,LNG",
		value_parser = sweep_cli::parse_coordinate,
		allow_hyphen_values = true
	)]
	pub center: (f64, f64),
	#[arg(long, value_name = "METERS")]
	pub radius_m: f64,
	/// Free-text search sent along with every step.
	#[arg(long)]
	pub text: Option<String>,
}
impl Target {
	fn key(&self) -> PlanKey {
		PlanKey::new(&self.expression, &self.country, &self.city, self.text.clone())
	}

	fn center(&self) -> LatLng {
		LatLng::new(self.center.0, self.center.1)
	}
}

#[derive(Debug, clap::Args)]
pub struct EstimateArgs {
	#[arg(long, short = 'e', default_value = "")]
	pub expression: String,
	#[arg(long)]
	pub country: String,
	#[arg(long)]
	pub city: String,
	/// Use the flat keyword-search estimate.
	#[arg(long)]
	pub keyword: bool,
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
	#[command(flatten)]
	pub target: Target,
	/// Prune branches under sparse circles.
	#[arg(long)]
	pub full_data: bool,
	/// Resume from a token printed by an earlier run.
	#[arg(long)]
	pub token: Option<String>,
	/// Stop after this many pages.
	#[arg(long)]
	pub max_pages: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PlanSummary {
	pub plan_name: String,
	pub dnf: String,
	pub queries: Vec<String>,
	pub circle_count: u64,
	pub step_count: usize,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = sweep_config::load(&args.config)?;

	init_tracing(&config.service.log_level);

	match args.command {
		Command::Plan(target) => print_json(&plan_summary(&config, &target)?),
		Command::Estimate(estimate) => run_estimate(&config, &estimate).await,
		Command::Run(run) => run_plan(config, run).await,
	}
}

pub fn plan_summary(config: &Config, target: &Target) -> color_eyre::Result<PlanSummary> {
	let key = target.key();
	let options = cover_options(config);
	let plan = SearchPlan::derive(&key, target.center(), target.radius_m, &options, None)?;
	let dnf = if key.expression.trim().is_empty() {
		String::new()
	} else {
		compiler::compile_dnf(&key.expression)?.render().to_string()
	};
	let mut queries = Vec::new();

	for step in plan.steps() {
		if queries.len() == step.query_index {
			queries.push(step.query.signature());
		}
	}

	Ok(PlanSummary {
		plan_name: plan.name.to_string(),
		dnf,
		queries,
		circle_count: geo::count_circles(target.radius_m, &options),
		step_count: plan.step_count(),
	})
}

async fn run_estimate(config: &Config, args: &EstimateArgs) -> color_eyre::Result<()> {
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let popularity = Arc::new(PopularityCache::new(Arc::new(PgPopularitySource::new(db.pool))));
	let estimator = CostEstimator::new(&config.estimator, popularity);
	let estimate =
		estimator.estimate(&args.expression, &args.country, &args.city, args.keyword).await?;

	print_json(&estimate)
}

async fn run_plan(config: Config, args: RunArgs) -> color_eyre::Result<()> {
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let collaborators = Collaborators::postgres(&config.providers.places, &db);
	let executor = PlanExecutor::new(config.planner.clone(), collaborators);
	let mut req = AdvanceRequest {
		key: args.target.key(),
		center: args.target.center(),
		radius_m: args.target.radius_m,
		token: args.token,
		full_data: args.full_data,
	};
	let mut pages = 0;
	let stdout = io::stdout();

	loop {
		let page = executor.advance(&req).await?;
		let mut out = stdout.lock();

		for place in &page.places {
			writeln!(out, "{}", serde_json::to_string(place)?)?;
		}

		pages += 1;

		let Some(token) = page.next_token else {
			tracing::info!(plan_name = %page.plan_name, pages, "Run complete.");

			return Ok(());
		};

		if args.max_pages.is_some_and(|max| pages >= max) {
			tracing::info!(
				plan_name = %page.plan_name,
				pages,
				token = %token,
				"Stopping early. Resume with the printed token."
			);

			return Ok(());
		}

		req.token = Some(token);
	}
}

fn cover_options(config: &Config) -> geo::CoverOptions {
	geo::CoverOptions {
		native_max_radius_m: config.planner.native_max_radius_m,
		center_min_radius_m: config.planner.center_min_radius_m,
		ring_min_radius_m: config.planner.ring_min_radius_m,
	}
}

fn init_tracing(log_level: &str) {
	let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: Serialize,
{
	println!("{}", serde_json::to_string_pretty(value)?);

	Ok(())
}
