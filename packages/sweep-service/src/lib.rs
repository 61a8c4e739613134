pub mod estimate;
pub mod executor;
pub mod memory;
pub mod popularity;

mod error;

pub use error::{Error, Result};
pub use estimate::CostEstimator;
pub use executor::{AdvanceRequest, Page, PlanExecutor};
pub use memory::{MemoryPlanStore, StaticPopularity};
pub use popularity::PopularityCache;

use std::{future::Future, pin::Pin, sync::Arc};

use sweep_config::PlacesProviderConfig;
use sweep_domain::{PopularityModel, plan::PlanName};
use sweep_providers::places::{self, SearchArea, SearchResults};
use sweep_storage::{db::Db, plans::PgPlanStore, popularity::PgPopularitySource};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait PlacesSearch
where
	Self: Send + Sync,
{
	/// May return fewer places than exist; ordering is unspecified.
	///
	/// `SearchResults::returned` must count what the backend produced before any client-side
	/// filtering, since the executor reads it as the density of the circle.
	fn search<'a>(&'a self, area: &'a SearchArea) -> BoxFuture<'a, Result<SearchResults>>;
}

/// Persists plans as their serialized entry lines. Reads must observe the owner's last write.
pub trait PlanStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, name: &'a PlanName) -> BoxFuture<'a, Result<Option<Vec<String>>>>;

	fn save<'a>(&'a self, name: &'a PlanName, entries: Vec<String>) -> BoxFuture<'a, Result<()>>;
}

pub trait PopularitySource
where
	Self: Send + Sync,
{
	fn get<'a>(
		&'a self,
		country: &'a str,
		city: &'a str,
	) -> BoxFuture<'a, Result<PopularityModel>>;
}

#[derive(Clone)]
pub struct Collaborators {
	pub places: Arc<dyn PlacesSearch>,
	pub plans: Arc<dyn PlanStore>,
	pub popularity: Arc<PopularityCache>,
}
impl Collaborators {
	pub fn new(
		places: Arc<dyn PlacesSearch>,
		plans: Arc<dyn PlanStore>,
		popularity: Arc<dyn PopularitySource>,
	) -> Self {
		Self { places, plans, popularity: Arc::new(PopularityCache::new(popularity)) }
	}

	/// HTTP places search backed by Postgres plans and popularity scores.
	pub fn postgres(cfg: &PlacesProviderConfig, db: &Db) -> Self {
		Self::new(
			Arc::new(HttpPlacesSearch::new(cfg.clone())),
			Arc::new(PgPlanStore::new(db.pool.clone())),
			Arc::new(PgPopularitySource::new(db.pool.clone())),
		)
	}
}

pub struct HttpPlacesSearch {
	cfg: PlacesProviderConfig,
}
impl HttpPlacesSearch {
	pub fn new(cfg: PlacesProviderConfig) -> Self {
		Self { cfg }
	}
}
impl PlacesSearch for HttpPlacesSearch {
	fn search<'a>(&'a self, area: &'a SearchArea) -> BoxFuture<'a, Result<SearchResults>> {
		Box::pin(async move { Ok(places::search_places(&self.cfg, area).await?) })
	}
}

impl PlanStore for PgPlanStore {
	fn get<'a>(&'a self, name: &'a PlanName) -> BoxFuture<'a, Result<Option<Vec<String>>>> {
		Box::pin(async move { Ok(PgPlanStore::get(self, name.as_str()).await?) })
	}

	fn save<'a>(&'a self, name: &'a PlanName, entries: Vec<String>) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(PgPlanStore::save(self, name.as_str(), &entries).await?) })
	}
}

impl PopularitySource for PgPopularitySource {
	fn get<'a>(
		&'a self,
		country: &'a str,
		city: &'a str,
	) -> BoxFuture<'a, Result<PopularityModel>> {
		Box::pin(async move { Ok(PgPopularitySource::get(self, country, city).await?) })
	}
}
