//! Call-count estimation for a plan, without executing it.
//!
//! Level one of the decomposition is always queried in full. Deeper levels are only reached
//! where the parent circle saturated, which is modeled as an activation rate of
//! `density / level` per level, cut off once it drops below [`MIN_ACTIVATION_RATE`].

use serde::{Deserialize, Serialize};

use crate::{PopularityModel, compiler::PrimitiveQuery, geo::BRANCHING};

/// Density assumed for a category with no popularity data.
pub const DEFAULT_DENSITY: f64 = 0.1;
pub const MIN_ACTIVATION_RATE: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorParams {
	pub total_circles: u64,
	pub cost_per_thousand_calls: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
	pub predicted_call_count: u64,
	pub predicted_cost: f64,
}
impl CostEstimate {
	fn from_calls(calls: u64, params: &EstimatorParams) -> Self {
		Self {
			predicted_call_count: calls,
			predicted_cost: calls as f64 / 1_000.0 * params.cost_per_thousand_calls,
		}
	}
}

/// Mean popularity of the included terms, clamped to `[0, 1]`.
pub fn density_score(query: &PrimitiveQuery, popularity: &PopularityModel) -> f64 {
	if query.included.is_empty() {
		return DEFAULT_DENSITY;
	}

	let sum: f64 = query
		.included
		.iter()
		.map(|term| popularity.get(term).map(|score| f64::from(*score)).unwrap_or(DEFAULT_DENSITY))
		.sum();
	let mean = sum / query.included.len() as f64;

	if mean.is_finite() { mean.clamp(0.0, 1.0) } else { DEFAULT_DENSITY }
}

/// `floor(log_7(total_circles)) + 1`, computed on integers.
pub fn levels(total_circles: u64) -> u32 {
	let mut levels = 1;
	let mut span = BRANCHING;

	while span <= total_circles {
		levels += 1;

		match span.checked_mul(BRANCHING) {
			Some(next) => span = next,
			None => break,
		}
	}

	levels
}

/// Predicted number of circles queried for one primitive query of the given density.
pub fn activated_circles(density: f64, total_circles: u64) -> u64 {
	let mut active = BRANCHING.min(total_circles);
	let mut remaining = total_circles - active;

	for level in 2..=levels(total_circles) {
		if remaining == 0 {
			break;
		}

		let rate = density / f64::from(level);

		if rate < MIN_ACTIVATION_RATE {
			break;
		}

		let at_level = remaining.min(BRANCHING.saturating_pow(level));

		active += (at_level as f64 * rate).ceil() as u64;
		remaining -= at_level;
	}

	active.min(total_circles)
}

pub fn estimate(
	queries: &[PrimitiveQuery],
	popularity: &PopularityModel,
	params: &EstimatorParams,
) -> CostEstimate {
	let calls = queries
		.iter()
		.map(|query| activated_circles(density_score(query, popularity), params.total_circles))
		.fold(0_u64, u64::saturating_add);

	CostEstimate::from_calls(calls, params)
}

/// Flat-rate estimate for keyword searches: half of one full decomposition.
pub fn estimate_keyword(params: &EstimatorParams) -> CostEstimate {
	CostEstimate::from_calls(params.total_circles.div_ceil(2), params)
}
