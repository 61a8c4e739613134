use std::sync::Arc;

use sweep_domain::{
	compiler,
	estimate::{self, CostEstimate, EstimatorParams},
};

use crate::{PopularityCache, Result};

/// Predicts call counts and cost without touching the places API.
pub struct CostEstimator {
	params: EstimatorParams,
	popularity: Arc<PopularityCache>,
}
impl CostEstimator {
	pub fn new(cfg: &sweep_config::Estimator, popularity: Arc<PopularityCache>) -> Self {
		Self {
			params: EstimatorParams {
				total_circles: cfg.total_circles,
				cost_per_thousand_calls: cfg.cost_per_thousand_calls,
			},
			popularity,
		}
	}

	pub async fn estimate(
		&self,
		expression: &str,
		country: &str,
		city: &str,
		keyword: bool,
	) -> Result<CostEstimate> {
		if keyword {
			return Ok(estimate::estimate_keyword(&self.params));
		}

		let popularity = self.popularity.get(country, city).await?;
		let queries = compiler::compile(expression, Some(popularity.as_ref()))?;
		let estimate = estimate::estimate(&queries, &popularity, &self.params);

		tracing::debug!(
			country,
			city,
			queries = queries.len(),
			predicted_call_count = estimate.predicted_call_count,
			"Cost estimated."
		);

		Ok(estimate)
	}
}
