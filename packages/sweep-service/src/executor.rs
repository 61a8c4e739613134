//! Resumable, page-at-a-time execution of search plans.
//!
//! Each call to [`PlanExecutor::advance`] runs at most one plan step. The plan is resolved (and
//! derived on first use) under a per-plan lock; the lock is released for the places search and
//! taken again only when a low-yield step has to prune its descendants.
//!
//! A step only counts as low-yield when its whole circle was searched and the backend returned
//! fewer places than the threshold before any client-side filtering. Circles wider than the
//! native radius are searched clamped, so a thin result there says nothing about the rest of the
//! circle and never prunes.

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex},
};

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use sweep_config::Planner;
use sweep_domain::{
	geo::{CoverOptions, LatLng},
	plan::{PageToken, PlanKey, PlanName, PlanStep, SearchPlan},
};
use sweep_providers::places::{Place, SearchArea, SearchResults};

use crate::{Collaborators, Error, Result};

#[derive(Clone, Debug)]
pub struct AdvanceRequest {
	pub key: PlanKey,
	/// Center and radius only matter when the plan is derived for the first time.
	pub center: LatLng,
	pub radius_m: f64,
	pub token: Option<String>,
	/// Exhaustive mode. Enables pruning of low-yield branches.
	pub full_data: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Page {
	pub plan_name: PlanName,
	pub places: Vec<Place>,
	/// Index of the executed step, absent when the plan was already exhausted.
	pub index: Option<usize>,
	pub step: Option<PlanStep>,
	/// Absent once the sentinel is reached.
	pub next_token: Option<String>,
}
impl Page {
	fn exhausted(plan_name: PlanName) -> Self {
		Self { plan_name, places: Vec::new(), index: None, step: None, next_token: None }
	}
}

type LockRegistry = Mutex<HashMap<PlanName, Arc<AsyncMutex<()>>>>;

pub struct PlanExecutor {
	planner: Planner,
	collaborators: Collaborators,
	locks: LockRegistry,
}
impl PlanExecutor {
	pub fn new(planner: Planner, collaborators: Collaborators) -> Self {
		Self { planner, collaborators, locks: Mutex::new(HashMap::new()) }
	}

	pub fn cover_options(&self) -> CoverOptions {
		CoverOptions {
			native_max_radius_m: self.planner.native_max_radius_m,
			center_min_radius_m: self.planner.center_min_radius_m,
			ring_min_radius_m: self.planner.ring_min_radius_m,
		}
	}

	/// Loads the plan for `req`, deriving and saving it when the store has none.
	pub async fn plan(&self, req: &AdvanceRequest) -> Result<SearchPlan> {
		let name = req.key.name();
		let lock = self.lock_for(&name);
		let _guard = lock.mutex().lock().await;

		self.resolve_plan(&name, req).await
	}

	/// Runs the next runnable step at or after the token's index.
	pub async fn advance(&self, req: &AdvanceRequest) -> Result<Page> {
		let name = req.key.name();
		let start = match req.token.as_deref() {
			Some(raw) => parse_token(raw, &name)?,
			None => 0,
		};
		let lock = self.lock_for(&name);
		let (index, step, next_unpruned) = {
			let _guard = lock.mutex().lock().await;
			let plan = self.resolve_plan(&name, req).await?;

			if start >= plan.len() {
				return Err(Error::InvalidRequest {
					message: format!("token index {start} is beyond plan {name}."),
				});
			}

			let Some((index, step)) = plan
				.next_runnable(start)
				.and_then(|index| plan.step(index).map(|step| (index, step.clone())))
			else {
				tracing::info!(plan_name = %name, "Search plan exhausted.");

				return Ok(Page::exhausted(name));
			};

			(index, step, plan.next_runnable(index + 1))
		};
		let clamped = step.circle.radius_m > self.planner.native_max_radius_m;
		let area = SearchArea {
			center: step.circle.center,
			radius_m: step.circle.radius_m.min(self.planner.native_max_radius_m),
			included: step.query.included.clone(),
			excluded: step.query.excluded.clone(),
			text_search: step.text_search.clone(),
		};
		let SearchResults { places, returned } = self.collaborators.places.search(&area).await?;

		tracing::debug!(
			plan_name = %name,
			index,
			path = %step.circle.path,
			query = %step.query.signature(),
			returned,
			result_count = places.len(),
			clamped,
			"Search plan step executed."
		);

		let low_yield = returned < self.planner.low_yield_threshold;
		let next_index = if req.full_data && low_yield && !clamped {
			self.prune(lock.mutex(), &name, req, index).await?
		} else {
			next_unpruned
		};

		if next_index.is_none() {
			tracing::info!(plan_name = %name, "Search plan exhausted.");
		}

		Ok(Page {
			next_token: next_index.map(|next| PageToken::new(name.clone(), next).to_string()),
			plan_name: name,
			places,
			index: Some(index),
			step: Some(step),
		})
	}

	/// Drives [`advance`](Self::advance) until the plan is exhausted, starting from `req.token`.
	///
	/// Places found by overlapping circles are returned once, in first-seen order.
	pub async fn run_to_end(&self, req: AdvanceRequest) -> Result<Vec<Place>> {
		let mut req = req;
		let mut seen = HashSet::new();
		let mut places = Vec::new();

		loop {
			let page = self.advance(&req).await?;

			places.extend(page.places.into_iter().filter(|place| seen.insert(place.id.clone())));

			match page.next_token {
				Some(token) => req.token = Some(token),
				None => return Ok(places),
			}
		}
	}

	async fn prune(
		&self,
		lock: &AsyncMutex<()>,
		name: &PlanName,
		req: &AdvanceRequest,
		index: usize,
	) -> Result<Option<usize>> {
		let _guard = lock.lock().await;
		// Re-read under the lock so flags set by another advance since the search are kept.
		let mut plan = self.resolve_plan(name, req).await?;
		let outcome = plan.prune(index)?;

		if outcome.newly_skipped > 0 {
			self.collaborators.plans.save(name, plan.to_lines()?).await?;

			tracing::info!(
				plan_name = %name,
				index,
				newly_skipped = outcome.newly_skipped,
				"Pruned low-yield branch."
			);
		}

		Ok(outcome.next_index)
	}

	async fn resolve_plan(&self, name: &PlanName, req: &AdvanceRequest) -> Result<SearchPlan> {
		if let Some(lines) = self.collaborators.plans.get(name).await? {
			let plan = SearchPlan::from_lines(name.clone(), &lines)?;

			tracing::debug!(plan_name = %name, steps = plan.step_count(), "Search plan loaded.");

			return Ok(plan);
		}

		let popularity = self.collaborators.popularity.get(&req.key.country, &req.key.city).await?;
		// A city without popularity data keeps the normal-form order.
		let model = (!popularity.is_empty()).then_some(popularity.as_ref());
		let plan =
			SearchPlan::derive(&req.key, req.center, req.radius_m, &self.cover_options(), model)?;

		self.collaborators.plans.save(name, plan.to_lines()?).await?;

		tracing::info!(
			plan_name = %name,
			steps = plan.step_count(),
			"Search plan derived."
		);

		Ok(plan)
	}

	fn lock_for(&self, name: &PlanName) -> PlanLock<'_> {
		let mut locks = self.locks.lock().unwrap_or_else(|err| err.into_inner());
		let lock = locks.entry(name.clone()).or_default().clone();

		PlanLock { registry: &self.locks, name: name.clone(), lock }
	}
}

/// Handle on one plan's lock. The registry entry is dropped with the last handle.
struct PlanLock<'a> {
	registry: &'a LockRegistry,
	name: PlanName,
	lock: Arc<AsyncMutex<()>>,
}
impl PlanLock<'_> {
	fn mutex(&self) -> &AsyncMutex<()> {
		&self.lock
	}
}
impl Drop for PlanLock<'_> {
	fn drop(&mut self) {
		let mut locks = self.registry.lock().unwrap_or_else(|err| err.into_inner());

		// Handles are only cloned under the registry lock, so two owners means the registry and us.
		if Arc::strong_count(&self.lock) == 2 {
			locks.remove(&self.name);
		}
	}
}

fn parse_token(raw: &str, expected: &PlanName) -> Result<usize> {
	let token = raw
		.parse::<PageToken>()
		.map_err(|err| Error::InvalidRequest { message: err.to_string() })?;

	if &token.plan_name != expected {
		return Err(Error::InvalidRequest {
			message: format!("token belongs to plan {}, not {expected}.", token.plan_name),
		});
	}

	Ok(token.index)
}
