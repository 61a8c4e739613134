use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub planner: Planner,
	pub estimator: Estimator,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub places: PlacesProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlacesProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_api_key_header")]
	pub api_key_header: String,
	pub nearby_path: String,
	/// Optional. Keyword searches are rejected by the provider when unset.
	pub text_path: Option<String>,
	/// Sent as `X-Goog-FieldMask`; empty means the header is omitted.
	#[serde(default)]
	pub field_mask: String,
	#[serde(default = "default_max_result_count")]
	pub max_result_count: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Planner {
	/// Largest radius the places API accepts for a single circle.
	pub native_max_radius_m: f64,
	#[serde(default = "default_center_min_radius_m")]
	pub center_min_radius_m: f64,
	#[serde(default = "default_ring_min_radius_m")]
	pub ring_min_radius_m: f64,
	#[serde(default = "default_low_yield_threshold")]
	pub low_yield_threshold: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Estimator {
	/// Circle count of a full decomposition for this deployment's radius settings.
	pub total_circles: u64,
	pub cost_per_thousand_calls: f64,
}

fn default_api_key_header() -> String {
	"X-Goog-Api-Key".to_string()
}

fn default_max_result_count() -> u32 {
	20
}

fn default_center_min_radius_m() -> f64 {
	500.0
}

fn default_ring_min_radius_m() -> f64 {
	1_000.0
}

fn default_low_yield_threshold() -> usize {
	20
}
