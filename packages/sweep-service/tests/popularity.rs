use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use sweep_config::Estimator;
use sweep_domain::PopularityModel;
use sweep_service::{
	BoxFuture, CostEstimator, Error, PopularityCache, PopularitySource, Result, StaticPopularity,
};

/// Fails the first load, then serves an empty model.
struct FlakySource {
	attempts: AtomicUsize,
}
impl PopularitySource for FlakySource {
	fn get<'a>(
		&'a self,
		_country: &'a str,
		_city: &'a str,
	) -> BoxFuture<'a, Result<PopularityModel>> {
		let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if attempt == 0 {
				Err(Error::Storage { message: "connection reset".to_string() })
			} else {
				Ok(PopularityModel::new())
			}
		})
	}
}

fn berlin() -> PopularityModel {
	PopularityModel::from([("cafe".to_string(), 1.0), ("bar".to_string(), 0.5)])
}

#[tokio::test]
async fn loads_each_city_once() {
	let source = Arc::new(StaticPopularity::new().with_city("DE", "Berlin", berlin()));
	let cache = PopularityCache::new(source.clone());
	let first = cache.get("DE", "Berlin").await.expect("load failed");
	let second = cache.get(" de ", "BERLIN").await.expect("load failed");

	assert_eq!(source.load_count(), 1);
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(first.get("cafe"), Some(&1.0));

	let hamburg = cache.get("DE", "Hamburg").await.expect("load failed");

	assert!(hamburg.is_empty());
	assert_eq!(source.load_count(), 2);
}

#[tokio::test]
async fn concurrent_first_requests_share_one_load() {
	let source = Arc::new(StaticPopularity::new().with_city("DE", "Berlin", berlin()));
	let cache = PopularityCache::new(source.clone());
	let (left, right) = tokio::join!(cache.get("DE", "Berlin"), cache.get("de", "berlin"));

	assert!(left.is_ok() && right.is_ok());
	assert_eq!(source.load_count(), 1);
}

#[tokio::test]
async fn failed_loads_are_retried() {
	let source = Arc::new(FlakySource { attempts: AtomicUsize::new(0) });
	let cache = PopularityCache::new(source.clone());

	assert!(cache.get("DE", "Berlin").await.is_err());
	assert!(cache.get("DE", "Berlin").await.is_ok());
	assert!(cache.get("DE", "Berlin").await.is_ok());
	assert_eq!(source.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidation_forces_a_reload() {
	let source = Arc::new(StaticPopularity::new());
	let cache = PopularityCache::new(source.clone());

	cache.get("DE", "Berlin").await.expect("load failed");
	cache.invalidate("de", "berlin");
	cache.get("DE", "Berlin").await.expect("load failed");

	assert_eq!(source.load_count(), 2);
}

#[tokio::test]
async fn estimator_uses_city_popularity() {
	let source = Arc::new(StaticPopularity::new().with_city("DE", "Berlin", berlin()));
	let cache = Arc::new(PopularityCache::new(source.clone()));
	let estimator = CostEstimator::new(
		&Estimator { total_circles: 2_801, cost_per_thousand_calls: 32.0 },
		cache,
	);
	let estimate =
		estimator.estimate("cafe | unknown", "DE", "Berlin", false).await.expect("estimate failed");

	// `cafe` at full density activates 749 circles; the unknown term stays at level one.
	assert_eq!(estimate.predicted_call_count, 749 + 7);
	assert!((estimate.predicted_cost - 756.0 * 32.0 / 1_000.0).abs() < 1e-9);

	estimator.estimate("bar", "de", "berlin", false).await.expect("estimate failed");

	assert_eq!(source.load_count(), 1);
}

#[tokio::test]
async fn keyword_estimate_skips_popularity() {
	let source = Arc::new(StaticPopularity::new());
	let estimator = CostEstimator::new(
		&Estimator { total_circles: 2_801, cost_per_thousand_calls: 40.0 },
		Arc::new(PopularityCache::new(source.clone())),
	);
	let estimate = estimator.estimate("", "US", "Austin", true).await.expect("estimate failed");

	assert_eq!(estimate.predicted_call_count, 1_401);
	assert_eq!(source.load_count(), 0);
}

#[tokio::test]
async fn estimator_surfaces_syntax_errors() {
	let estimator = CostEstimator::new(
		&Estimator { total_circles: 57, cost_per_thousand_calls: 32.0 },
		Arc::new(PopularityCache::new(Arc::new(StaticPopularity::new()))),
	);

	assert!(matches!(
		estimator.estimate("cafe | (bar", "DE", "Berlin", false).await,
		Err(Error::Planner(sweep_domain::Error::ExpressionSyntax { .. }))
	));
}
