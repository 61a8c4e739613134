//! Places search client for the nearby and text search endpoints.
//!
//! The API treats `includedTypes` as "any of", while a primitive query needs every included
//! category, so results are filtered against the full query after each call. The unfiltered
//! count is kept alongside: it is what tells a saturated circle from a sparse one.

use std::{collections::BTreeSet, time::Duration};

use reqwest::{
	Client,
	header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sweep_config::PlacesProviderConfig;
use sweep_domain::{compiler::PrimitiveQuery, geo::LatLng};

use crate::{Error, Result};

const FIELD_MASK_HEADER: &str = "x-goog-fieldmask";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
	pub id: String,
	pub name: Option<String>,
	pub address: Option<String>,
	pub location: Option<LatLng>,
	pub types: Vec<String>,
}
impl Place {
	pub fn has_type(&self, category: &str) -> bool {
		self.types.iter().any(|kind| kind == category)
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResults {
	/// Places matching every included and no excluded category.
	pub places: Vec<Place>,
	/// Number of places the API returned before local filtering.
	pub returned: usize,
}

/// One call's worth of search input: a circle plus the category filter of a plan step.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchArea {
	pub center: LatLng,
	pub radius_m: f64,
	pub included: BTreeSet<String>,
	pub excluded: BTreeSet<String>,
	pub text_search: Option<String>,
}
impl SearchArea {
	fn query(&self) -> PrimitiveQuery {
		PrimitiveQuery { included: self.included.clone(), excluded: self.excluded.clone() }
	}
}

pub async fn search_places(cfg: &PlacesProviderConfig, area: &SearchArea) -> Result<SearchResults> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let (path, body) = match area.text_search.as_deref() {
		Some(text) => {
			let path = cfg.text_path.as_deref().ok_or_else(|| Error::InvalidConfig {
				message: "providers.places.text_path must be set for keyword searches.".to_string(),
			})?;

			(path, text_search_body(cfg, area, text))
		},
		None => (cfg.nearby_path.as_str(), nearby_search_body(cfg, area)),
	};
	let url = format!("{}{}", cfg.api_base, path);
	let mut headers =
		crate::auth_headers(&cfg.api_key_header, &cfg.api_key, &cfg.default_headers)?;

	if !cfg.field_mask.is_empty() {
		headers.insert(
			HeaderName::from_static(FIELD_MASK_HEADER),
			HeaderValue::from_str(&cfg.field_mask)?,
		);
	}

	let res = client.post(url).headers(headers).json(&body).send().await?;
	let json: Value = res.error_for_status()?.json().await?;

	filter_results(json, &area.query())
}

fn nearby_search_body(cfg: &PlacesProviderConfig, area: &SearchArea) -> Value {
	let mut body = serde_json::json!({
		"maxResultCount": cfg.max_result_count,
		"locationRestriction": { "circle": circle(area) },
	});

	if !area.included.is_empty() {
		body["includedTypes"] = serde_json::json!(area.included);
	}
	if !area.excluded.is_empty() {
		body["excludedTypes"] = serde_json::json!(area.excluded);
	}

	body
}

fn text_search_body(cfg: &PlacesProviderConfig, area: &SearchArea, text: &str) -> Value {
	let mut body = serde_json::json!({
		"textQuery": text,
		"pageSize": cfg.max_result_count,
		"locationBias": { "circle": circle(area) },
	});

	// Text search narrows by a single type only; anything else is filtered locally.
	if let Some(kind) = area.included.first().filter(|_| area.included.len() == 1) {
		body["includedType"] = Value::String(kind.clone());
	}

	body
}

fn circle(area: &SearchArea) -> Value {
	serde_json::json!({
		"center": { "latitude": area.center.lat, "longitude": area.center.lng },
		"radius": area.radius_m,
	})
}

fn parse_places_response(json: Value) -> Result<Vec<Place>> {
	// An empty result set comes back as `{}`.
	let Some(items) = json.get("places") else {
		return Ok(Vec::new());
	};
	let items = items.as_array().ok_or_else(|| Error::InvalidResponse {
		message: "Places response field places must be an array.".to_string(),
	})?;
	let mut places = Vec::with_capacity(items.len());

	for item in items {
		let id = item.get("id").and_then(|v| v.as_str()).ok_or_else(|| Error::InvalidResponse {
			message: "Place is missing id.".to_string(),
		})?;
		let name = item
			.get("displayName")
			.and_then(|v| v.get("text"))
			.and_then(|v| v.as_str())
			.map(str::to_string);
		let address = item.get("formattedAddress").and_then(|v| v.as_str()).map(str::to_string);
		let location = item.get("location").and_then(|v| {
			Some(LatLng::new(v.get("latitude")?.as_f64()?, v.get("longitude")?.as_f64()?))
		});
		let types = item
			.get("types")
			.and_then(|v| v.as_array())
			.map(|kinds| kinds.iter().filter_map(|kind| kind.as_str()).map(str::to_string).collect())
			.unwrap_or_default();

		places.push(Place { id: id.to_string(), name, address, location, types });
	}

	Ok(places)
}

fn filter_results(json: Value, query: &PrimitiveQuery) -> Result<SearchResults> {
	let places = parse_places_response(json)?;
	let returned = places.len();

	Ok(SearchResults { places: retain_matching(places, query), returned })
}

fn retain_matching(mut places: Vec<Place>, query: &PrimitiveQuery) -> Vec<Place> {
	places.retain(|place| query.matches(|category| place.has_type(category)));

	places
}
