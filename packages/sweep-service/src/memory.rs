//! In-process collaborators for tests and dry runs.

use std::{
	collections::HashMap,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use sweep_domain::{PopularityModel, plan::PlanName};

use crate::{BoxFuture, PlanStore, PopularitySource, Result};

#[derive(Default)]
pub struct MemoryPlanStore {
	plans: Mutex<HashMap<PlanName, Vec<String>>>,
	saves: AtomicUsize,
}
impl MemoryPlanStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn save_count(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	pub fn snapshot(&self, name: &PlanName) -> Option<Vec<String>> {
		self.plans.lock().unwrap_or_else(|err| err.into_inner()).get(name).cloned()
	}
}
impl PlanStore for MemoryPlanStore {
	fn get<'a>(&'a self, name: &'a PlanName) -> BoxFuture<'a, Result<Option<Vec<String>>>> {
		let entries = self.snapshot(name);

		Box::pin(async move { Ok(entries) })
	}

	fn save<'a>(&'a self, name: &'a PlanName, entries: Vec<String>) -> BoxFuture<'a, Result<()>> {
		self.plans.lock().unwrap_or_else(|err| err.into_inner()).insert(name.clone(), entries);
		self.saves.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(()) })
	}
}

/// Fixed popularity models keyed by lowercase `(country, city)`. Unknown cities are empty.
#[derive(Default)]
pub struct StaticPopularity {
	models: HashMap<(String, String), PopularityModel>,
	loads: AtomicUsize,
}
impl StaticPopularity {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_city(mut self, country: &str, city: &str, model: PopularityModel) -> Self {
		self.models.insert((country.to_lowercase(), city.to_lowercase()), model);

		self
	}

	pub fn load_count(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}
}
impl PopularitySource for StaticPopularity {
	fn get<'a>(
		&'a self,
		country: &'a str,
		city: &'a str,
	) -> BoxFuture<'a, Result<PopularityModel>> {
		self.loads.fetch_add(1, Ordering::SeqCst);

		let model = self
			.models
			.get(&(country.to_lowercase(), city.to_lowercase()))
			.cloned()
			.unwrap_or_default();

		Box::pin(async move { Ok(model) })
	}
}
