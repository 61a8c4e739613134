//! Load-once-per-city cache in front of a [`PopularitySource`].

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use tokio::sync::OnceCell;

use sweep_domain::PopularityModel;

use crate::{PopularitySource, Result};

type CityKey = (String, String);

pub struct PopularityCache {
	source: Arc<dyn PopularitySource>,
	cells: Mutex<HashMap<CityKey, Arc<OnceCell<Arc<PopularityModel>>>>>,
}
impl PopularityCache {
	pub fn new(source: Arc<dyn PopularitySource>) -> Self {
		Self { source, cells: Mutex::new(HashMap::new()) }
	}

	/// Returns the model for the city, loading it on first use.
	///
	/// Concurrent first requests share one load. A failed load is not cached.
	pub async fn get(&self, country: &str, city: &str) -> Result<Arc<PopularityModel>> {
		let key = city_key(country, city);
		let cell = {
			let mut cells = self.cells.lock().unwrap_or_else(|err| err.into_inner());

			cells.entry(key.clone()).or_default().clone()
		};
		let model = cell
			.get_or_try_init(|| async {
				let model = self.source.get(&key.0, &key.1).await?;

				tracing::debug!(
					country = %key.0,
					city = %key.1,
					categories = model.len(),
					"Popularity model loaded."
				);

				Ok::<_, crate::Error>(Arc::new(model))
			})
			.await?;

		Ok(model.clone())
	}

	/// Drops the cached model so the next request reloads it.
	pub fn invalidate(&self, country: &str, city: &str) {
		let mut cells = self.cells.lock().unwrap_or_else(|err| err.into_inner());

		cells.remove(&city_key(country, city));
	}
}

fn city_key(country: &str, city: &str) -> CityKey {
	(country.trim().to_lowercase(), city.trim().to_lowercase())
}
