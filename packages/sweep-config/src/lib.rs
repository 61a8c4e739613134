mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Estimator, PlacesProviderConfig, Planner, Postgres, Providers, Service, Storage,
};

use std::{fs, path::Path};

const MAX_PLACES_PAGE_SIZE: u32 = 20;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	let places = &cfg.providers.places;

	for (label, value) in [
		("providers.places.provider_id", &places.provider_id),
		("providers.places.api_base", &places.api_base),
		("providers.places.api_key", &places.api_key),
		("providers.places.api_key_header", &places.api_key_header),
		("providers.places.nearby_path", &places.nearby_path),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if !(1..=MAX_PLACES_PAGE_SIZE).contains(&places.max_result_count) {
		return Err(Error::Validation {
			message: format!(
				"providers.places.max_result_count must be in the range 1-{MAX_PLACES_PAGE_SIZE}."
			),
		});
	}
	if places.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.places.timeout_ms must be greater than zero.".to_string(),
		});
	}

	validate_planner(&cfg.planner)?;

	// A full page must be able to reach the threshold, or every step reads as sparse.
	if cfg.planner.low_yield_threshold > places.max_result_count as usize {
		return Err(Error::Validation {
			message: "planner.low_yield_threshold must not exceed providers.places.max_result_count."
				.to_string(),
		});
	}

	if cfg.estimator.total_circles == 0 {
		return Err(Error::Validation {
			message: "estimator.total_circles must be greater than zero.".to_string(),
		});
	}
	if !cfg.estimator.cost_per_thousand_calls.is_finite() {
		return Err(Error::Validation {
			message: "estimator.cost_per_thousand_calls must be a finite number.".to_string(),
		});
	}
	if cfg.estimator.cost_per_thousand_calls < 0.0 {
		return Err(Error::Validation {
			message: "estimator.cost_per_thousand_calls must be zero or greater.".to_string(),
		});
	}

	Ok(())
}

fn validate_planner(planner: &Planner) -> Result<()> {
	for (label, value) in [
		("planner.native_max_radius_m", planner.native_max_radius_m),
		("planner.center_min_radius_m", planner.center_min_radius_m),
		("planner.ring_min_radius_m", planner.ring_min_radius_m),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if value <= 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if planner.center_min_radius_m > planner.native_max_radius_m
		|| planner.ring_min_radius_m > planner.native_max_radius_m
	{
		return Err(Error::Validation {
			message: "planner minimum radii must not exceed planner.native_max_radius_m."
				.to_string(),
		});
	}
	if planner.low_yield_threshold == 0 {
		return Err(Error::Validation {
			message: "planner.low_yield_threshold must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let places = &mut cfg.providers.places;

	if places.text_path.as_deref().map(|path| path.trim().is_empty()).unwrap_or(false) {
		places.text_path = None;
	}

	places.api_base = places.api_base.trim_end_matches('/').to_string();
	places.field_mask = places.field_mask.trim().to_string();
	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
