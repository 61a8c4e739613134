use std::sync::{Arc, Mutex};

use sweep_config::Planner;
use sweep_domain::{
	geo::{self, CoverOptions, LatLng},
	plan::{PageToken, PlanKey, PlanName, SearchPlan},
};
use sweep_providers::places::{Place, SearchArea, SearchResults};
use sweep_service::{
	AdvanceRequest, BoxFuture, Collaborators, Error, MemoryPlanStore, PlacesSearch, PlanExecutor,
	Result, StaticPopularity,
};

const CENTER: LatLng = LatLng { lat: 52.52, lng: 13.405 };

/// Returns 25 places per call, or 5 for `cafe` queries over one of the sparse circles.
///
/// Sparse circles are keyed by center and the radius actually sent, since a center child shares
/// its parent's center.
struct SpySearch {
	calls: Mutex<Vec<SearchArea>>,
	sparse: Vec<(LatLng, f64)>,
}
impl SpySearch {
	fn new(sparse: Vec<(LatLng, f64)>) -> Self {
		Self { calls: Mutex::new(Vec::new()), sparse }
	}

	fn calls(&self) -> Vec<SearchArea> {
		self.calls.lock().expect("Spy lock poisoned.").clone()
	}
}
impl PlacesSearch for SpySearch {
	fn search<'a>(&'a self, area: &'a SearchArea) -> BoxFuture<'a, Result<SearchResults>> {
		self.calls.lock().expect("Spy lock poisoned.").push(area.clone());

		let sparse = area.included.contains("cafe")
			&& self.sparse.contains(&(area.center, area.radius_m));
		let count = if sparse { 5 } else { 25 };
		let places = places_at(area, count);

		Box::pin(async move { Ok(SearchResults { places, returned: count }) })
	}
}

/// Backend that fills every page, of which only a few places carry all included categories.
struct SaturatedSearch {
	calls: Mutex<Vec<SearchArea>>,
}
impl PlacesSearch for SaturatedSearch {
	fn search<'a>(&'a self, area: &'a SearchArea) -> BoxFuture<'a, Result<SearchResults>> {
		self.calls.lock().expect("Spy lock poisoned.").push(area.clone());

		let places = places_at(area, 3);

		Box::pin(async move { Ok(SearchResults { places, returned: 20 }) })
	}
}

struct FailingSearch;
impl PlacesSearch for FailingSearch {
	fn search<'a>(&'a self, _area: &'a SearchArea) -> BoxFuture<'a, Result<SearchResults>> {
		Box::pin(async move { Err(Error::Provider { message: "quota exceeded".to_string() }) })
	}
}

struct Harness {
	executor: PlanExecutor,
	search: Arc<SpySearch>,
	store: Arc<MemoryPlanStore>,
}

fn places_at(area: &SearchArea, count: usize) -> Vec<Place> {
	(0..count)
		.map(|i| Place {
			id: format!("{:.6}:{:.6}:{}:{i}", area.center.lat, area.center.lng, area.radius_m),
			name: None,
			address: None,
			location: Some(area.center),
			types: area.included.iter().cloned().collect(),
		})
		.collect()
}

/// A 3 km root is searched clamped to 2 km; its 1.5 km children and 750 m grandchildren fit.
fn planner() -> Planner {
	Planner {
		native_max_radius_m: 2_000.0,
		center_min_radius_m: 500.0,
		ring_min_radius_m: 500.0,
		low_yield_threshold: 20,
	}
}

fn options() -> CoverOptions {
	CoverOptions { native_max_radius_m: 2_000.0, center_min_radius_m: 500.0, ring_min_radius_m: 500.0 }
}

/// The depth-one circle at `sequence_index` in a 3 km decomposition, as searched.
fn depth_one(sequence_index: usize) -> (LatLng, f64) {
	let circle = &geo::cover(CENTER, 3_000.0, &options()).expect("cover failed")[sequence_index];

	assert_eq!(circle.path.depth(), 1);

	(circle.center, circle.radius_m)
}

fn harness(search: SpySearch) -> Harness {
	harness_with_store(search, Arc::new(MemoryPlanStore::new()))
}

fn harness_with_store(search: SpySearch, store: Arc<MemoryPlanStore>) -> Harness {
	let search = Arc::new(search);
	let collaborators =
		Collaborators::new(search.clone(), store.clone(), Arc::new(StaticPopularity::new()));

	Harness { executor: PlanExecutor::new(planner(), collaborators), search, store }
}

fn request(expression: &str, full_data: bool) -> AdvanceRequest {
	AdvanceRequest {
		key: PlanKey::new(expression, "DE", "Berlin", None),
		center: CENTER,
		radius_m: 3_000.0,
		token: None,
		full_data,
	}
}

fn stored_plan(store: &MemoryPlanStore, name: &PlanName) -> SearchPlan {
	let lines = store.snapshot(name).expect("Plan must be stored.");

	SearchPlan::from_lines(name.clone(), &lines).expect("Stored plan must decode.")
}

fn token(name: &PlanName, index: usize) -> Option<String> {
	Some(PageToken::new(name.clone(), index).to_string())
}

#[tokio::test]
async fn tokens_walk_every_step_in_order() {
	let h = harness(SpySearch::new(Vec::new()));
	let mut req = request("cafe | bar", false);
	let name = req.key.name();
	let mut indices = Vec::new();

	loop {
		let page = h.executor.advance(&req).await.expect("advance failed");

		indices.push(page.index.expect("every page runs a step"));

		match page.next_token {
			Some(next) => req.token = Some(next),
			None => break,
		}
	}

	assert_eq!(indices, (0..114).collect::<Vec<_>>());
	assert_eq!(h.search.calls().len(), 114);
	assert_eq!(h.store.save_count(), 1);
	assert_eq!(stored_plan(&h.store, &name).skipped_count(), 0);
}

#[tokio::test]
async fn first_page_carries_wire_token() {
	let h = harness(SpySearch::new(Vec::new()));
	let req = request("cafe | bar", false);
	let name = req.key.name();
	let page = h.executor.advance(&req).await.expect("advance failed");

	assert_eq!(page.plan_name, name);
	assert_eq!(page.places.len(), 25);
	assert_eq!(page.next_token, Some(format!("page_token={name}@#$1")));
	assert_eq!(page.step.map(|step| step.circle.path.to_string()), Some("1".to_string()));
}

#[tokio::test]
async fn search_radius_never_exceeds_native_ceiling() {
	let h = harness(SpySearch::new(Vec::new()));

	h.executor.run_to_end(request("cafe", false)).await.expect("run failed");

	let calls = h.search.calls();

	assert_eq!(calls.len(), 57);
	assert_eq!(calls[0].radius_m, 2_000.0);
	assert_eq!(calls.iter().filter(|area| area.radius_m == 1_500.0).count(), 7);
	assert_eq!(calls.iter().filter(|area| area.radius_m == 750.0).count(), 49);
}

#[tokio::test]
async fn sparse_clamped_step_keeps_its_descendants() {
	// The root is only searched out to 2 km, so a thin result says nothing about the outer ring.
	let h = harness(SpySearch::new(vec![(CENTER, 2_000.0)]));
	let req = request("cafe", true);
	let name = req.key.name();
	let first = h.executor.advance(&req).await.expect("advance failed");

	assert_eq!(first.places.len(), 5);
	assert_eq!(first.next_token, token(&name, 1));

	h.executor.run_to_end(req).await.expect("run failed");

	assert_eq!(stored_plan(&h.store, &name).skipped_count(), 0);
	assert_eq!(h.search.calls().len(), 1 + 57);
	assert_eq!(h.store.save_count(), 1);
}

#[tokio::test]
async fn filtered_page_from_a_saturated_circle_is_not_pruned() {
	let search = Arc::new(SaturatedSearch { calls: Mutex::new(Vec::new()) });
	let store = Arc::new(MemoryPlanStore::new());
	let collaborators =
		Collaborators::new(search.clone(), store.clone(), Arc::new(StaticPopularity::new()));
	let executor = PlanExecutor::new(planner(), collaborators);
	let mut req = request("cafe and wifi", true);
	let name = req.key.name();

	// Step 2 is ring circle 1.2, searched at its full 1.5 km.
	req.token = token(&name, 2);

	let page = executor.advance(&req).await.expect("advance failed");
	let calls = search.calls.lock().expect("Spy lock poisoned.").clone();

	assert_eq!(page.places.len(), 3);
	assert_eq!(page.step.map(|step| step.circle.path.to_string()), Some("1.2".to_string()));
	assert_eq!(calls[0].radius_m, 1_500.0);
	assert_eq!(page.next_token, token(&name, 3));
	assert_eq!(stored_plan(&store, &name).skipped_count(), 0);
	assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn sparse_step_prunes_exactly_its_descendants() {
	let h = harness(SpySearch::new(vec![depth_one(3)]));
	let req = request("cafe | bar", true);
	let name = req.key.name();
	let first = h.executor.run_to_end(req).await;

	assert!(first.is_ok());

	let plan = stored_plan(&h.store, &name);
	let skipped = plan
		.steps()
		.filter(|step| step.skip)
		.map(|step| (step.query_index, step.circle.path.to_string()))
		.collect::<Vec<_>>();

	assert_eq!(skipped, (1..=7).map(|child| (0, format!("1.3.{child}"))).collect::<Vec<_>>());
	assert_eq!(h.search.calls().len(), 114 - 7);
	assert_eq!(h.store.save_count(), 2);
}

#[tokio::test]
async fn sparse_results_do_not_prune_outside_exhaustive_mode() {
	let h = harness(SpySearch::new(vec![depth_one(3)]));
	let req = request("cafe | bar", false);
	let name = req.key.name();

	h.executor.run_to_end(req).await.expect("run failed");

	assert_eq!(stored_plan(&h.store, &name).skipped_count(), 0);
	assert_eq!(h.search.calls().len(), 114);
}

#[tokio::test]
async fn re_requesting_a_token_is_idempotent() {
	let h = harness(SpySearch::new(vec![depth_one(3)]));
	let mut req = request("cafe | bar", true);
	let name = req.key.name();

	req.token = token(&name, 3);

	let first = h.executor.advance(&req).await.expect("advance failed");
	let saves = h.store.save_count();
	let snapshot = h.store.snapshot(&name);
	let second = h.executor.advance(&req).await.expect("advance failed");

	assert_eq!(first.places.len(), 5);
	assert_eq!(first.next_token, token(&name, 4));
	assert_eq!(second.next_token, first.next_token);
	assert_eq!(second.places, first.places);
	assert_eq!(h.store.save_count(), saves);
	assert_eq!(h.store.snapshot(&name), snapshot);
	assert_eq!(stored_plan(&h.store, &name).skipped_count(), 7);
}

#[tokio::test]
async fn token_on_a_skipped_step_moves_forward() {
	let h = harness(SpySearch::new(vec![depth_one(3)]));
	let mut req = request("cafe | bar", true);
	let name = req.key.name();

	req.token = token(&name, 3);

	h.executor.advance(&req).await.expect("advance failed");

	// Steps 22 through 28 are the children of 1.3 in the first query.
	req.token = token(&name, 22);

	let page = h.executor.advance(&req).await.expect("advance failed");

	assert_eq!(page.index, Some(29));
	assert_eq!(page.step.map(|step| step.circle.path.to_string()), Some("1.4.1".to_string()));
}

#[tokio::test]
async fn concurrent_pruning_is_additive() {
	let h = harness(SpySearch::new(vec![depth_one(3), depth_one(4)]));
	let name = request("cafe | bar", true).key.name();
	let mut left = request("cafe | bar", true);
	let mut right = request("cafe | bar", true);

	h.executor.plan(&left).await.expect("plan failed");

	left.token = token(&name, 3);
	right.token = token(&name, 4);

	let (left, right) = tokio::join!(h.executor.advance(&left), h.executor.advance(&right));

	assert!(left.is_ok() && right.is_ok());
	assert_eq!(stored_plan(&h.store, &name).skipped_count(), 14);
}

#[tokio::test]
async fn stored_plan_is_reused_without_rederiving() {
	let store = Arc::new(MemoryPlanStore::new());
	let first = harness_with_store(SpySearch::new(Vec::new()), store.clone());
	let mut req = request("cafe | bar", false);

	first.executor.advance(&req).await.expect("advance failed");

	let second = harness_with_store(SpySearch::new(Vec::new()), store.clone());

	// A different center must not matter once the plan exists.
	req.center = LatLng::new(0.0, 0.0);
	req.token = token(&req.key.name(), 1);

	let page = second.executor.advance(&req).await.expect("advance failed");

	assert_eq!(store.save_count(), 1);
	assert_eq!(page.step.map(|step| step.circle.center), Some(CENTER));
}

#[tokio::test]
async fn unsatisfiable_expression_is_exhausted_immediately() {
	let h = harness(SpySearch::new(Vec::new()));
	let page = h.executor.advance(&request("cafe and not cafe", true)).await.expect("advance failed");

	assert!(page.places.is_empty());
	assert_eq!(page.index, None);
	assert_eq!(page.next_token, None);
	assert!(h.search.calls().is_empty());
}

#[tokio::test]
async fn rejects_foreign_and_out_of_range_tokens() {
	let h = harness(SpySearch::new(Vec::new()));
	let mut req = request("cafe | bar", false);
	let other = PlanKey::new("cafe | bar", "FR", "Paris", None).name();

	req.token = token(&other, 0);

	assert!(matches!(h.executor.advance(&req).await, Err(Error::InvalidRequest { .. })));

	req.token = token(&req.key.name(), 115);

	assert!(matches!(h.executor.advance(&req).await, Err(Error::InvalidRequest { .. })));

	req.token = Some("page_token=broken".to_string());

	assert!(matches!(h.executor.advance(&req).await, Err(Error::InvalidRequest { .. })));
}

#[tokio::test]
async fn malformed_expression_is_surfaced() {
	let h = harness(SpySearch::new(Vec::new()));
	let result = h.executor.advance(&request("cafe &", false)).await;

	assert!(matches!(
		result,
		Err(Error::Planner(sweep_domain::Error::ExpressionSyntax { .. }))
	));
	assert_eq!(h.store.save_count(), 0);
}

#[tokio::test]
async fn search_failures_leave_the_plan_untouched() {
	let store = Arc::new(MemoryPlanStore::new());
	let collaborators = Collaborators::new(
		Arc::new(FailingSearch),
		store.clone(),
		Arc::new(StaticPopularity::new()),
	);
	let executor = PlanExecutor::new(planner(), collaborators);
	let req = request("cafe", true);
	let name = req.key.name();

	assert!(matches!(executor.advance(&req).await, Err(Error::Provider { .. })));
	assert_eq!(store.save_count(), 1);
	assert_eq!(stored_plan(&store, &name).skipped_count(), 0);
}

#[tokio::test]
async fn keyword_plan_sends_text_search() {
	let h = harness(SpySearch::new(Vec::new()));
	let req = AdvanceRequest {
		key: PlanKey::new("", "US", "Austin", Some("tacos".to_string())),
		center: LatLng::new(30.27, -97.74),
		radius_m: 900.0,
		token: None,
		full_data: true,
	};
	let places = h.executor.run_to_end(req).await.expect("run failed");
	let calls = h.search.calls();

	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].text_search.as_deref(), Some("tacos"));
	assert!(calls[0].included.is_empty() && calls[0].excluded.is_empty());
	assert_eq!(places.len(), 25);
}

#[tokio::test]
async fn run_to_end_returns_each_place_once() {
	let h = harness(SpySearch::new(Vec::new()));
	let mut req = request("cafe | bar", false);

	req.radius_m = 800.0;

	let places = h.executor.run_to_end(req).await.expect("run failed");

	assert_eq!(h.search.calls().len(), 2);
	assert_eq!(places.len(), 25);
}

#[tokio::test]
async fn pages_serialize_for_callers() {
	let h = harness(SpySearch::new(Vec::new()));
	let page = h.executor.advance(&request("cafe", false)).await.expect("advance failed");
	let json = serde_json::to_value(&page).expect("serialize failed");

	assert_eq!(json["index"], 0);
	assert_eq!(json["step"]["circle"]["path"], "1");
	assert!(json["next_token"].as_str().is_some_and(|token| token.starts_with("page_token=")));
}
