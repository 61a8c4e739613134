//! Search plans: the persisted, resumable cross product of primitive queries and circles.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
	Error, PopularityModel, Result,
	compiler::{self, PrimitiveQuery},
	geo::{self, CircleStep, CoverOptions, LatLng},
};

pub const TOKEN_PREFIX: &str = "page_token=";
pub const TOKEN_SEPARATOR: &str = "@#$";

const PLAN_KEY_SCHEMA_VERSION: i32 = 1;
const PLAN_NAME_HASH_CHARS: usize = 16;

/// The inputs a plan is derived from. Equal keys always yield the same [`PlanName`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanKey {
	pub expression: String,
	pub country: String,
	pub city: String,
	pub text_search: Option<String>,
}
impl PlanKey {
	pub fn new(
		expression: impl Into<String>,
		country: impl Into<String>,
		city: impl Into<String>,
		text_search: Option<String>,
	) -> Self {
		Self {
			expression: expression.into(),
			country: country.into(),
			city: city.into(),
			text_search: text_search.filter(|text| !text.trim().is_empty()),
		}
	}

	pub fn name(&self) -> PlanName {
		let payload = serde_json::json!({
			"schema_version": PLAN_KEY_SCHEMA_VERSION,
			"expression": self.expression.trim(),
			"country": self.country.trim().to_lowercase(),
			"city": self.city.trim().to_lowercase(),
			"text_search": self.text_search.as_deref().map(str::trim),
		});
		let hash = blake3::hash(payload.to_string().as_bytes()).to_hex();

		PlanName(format!(
			"{}-{}-{}",
			slug(&self.country),
			slug(&self.city),
			&hash.as_str()[..PLAN_NAME_HASH_CHARS]
		))
	}

	fn is_keyword_only(&self) -> bool {
		self.expression.trim().is_empty() && self.text_search.is_some()
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanName(String);
impl PlanName {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl fmt::Display for PlanName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}
impl From<&str> for PlanName {
	fn from(raw: &str) -> Self {
		Self(raw.to_string())
	}
}

/// Resumption point of a plan, carried by callers between pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageToken {
	pub plan_name: PlanName,
	pub index: usize,
}
impl PageToken {
	pub fn new(plan_name: PlanName, index: usize) -> Self {
		Self { plan_name, index }
	}
}
impl fmt::Display for PageToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{TOKEN_PREFIX}{}{TOKEN_SEPARATOR}{}", self.plan_name, self.index)
	}
}
impl FromStr for PageToken {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		let body = raw.strip_prefix(TOKEN_PREFIX).ok_or_else(|| Error::InvalidToken {
			message: format!("token must start with '{TOKEN_PREFIX}'."),
		})?;
		let (plan_name, index) = body.rsplit_once(TOKEN_SEPARATOR).ok_or_else(|| {
			Error::InvalidToken { message: format!("token is missing '{TOKEN_SEPARATOR}'.") }
		})?;

		if plan_name.is_empty() {
			return Err(Error::InvalidToken { message: "token has an empty plan name.".to_string() });
		}

		let index = index.parse().map_err(|_| Error::InvalidToken {
			message: format!("token index '{index}' is not a non-negative integer."),
		})?;

		Ok(Self { plan_name: PlanName(plan_name.to_string()), index })
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
	pub query_index: usize,
	pub query: PrimitiveQuery,
	pub circle: CircleStep,
	pub text_search: Option<String>,
	/// Monotonic: set by pruning, never cleared.
	#[serde(default)]
	pub skip: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanEntry {
	Step(PlanStep),
	End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PruneOutcome {
	pub newly_skipped: usize,
	/// First runnable step after the pruned one; `None` once only the sentinel remains.
	pub next_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchPlan {
	pub name: PlanName,
	entries: Vec<PlanEntry>,
}
impl SearchPlan {
	/// Lays out `queries × circles` query-major and appends the sentinel.
	pub fn build(key: &PlanKey, queries: &[PrimitiveQuery], circles: &[CircleStep]) -> Self {
		let mut entries = Vec::with_capacity(queries.len() * circles.len() + 1);

		for (query_index, query) in queries.iter().enumerate() {
			for circle in circles {
				entries.push(PlanEntry::Step(PlanStep {
					query_index,
					query: query.clone(),
					circle: circle.clone(),
					text_search: key.text_search.clone(),
					skip: false,
				}));
			}
		}

		entries.push(PlanEntry::End);

		Self { name: key.name(), entries }
	}

	/// Derives the plan for `key` from scratch: compile, decompose, lay out.
	pub fn derive(
		key: &PlanKey,
		center: LatLng,
		radius_m: f64,
		options: &CoverOptions,
		popularity: Option<&PopularityModel>,
	) -> Result<Self> {
		let queries = if key.is_keyword_only() {
			vec![PrimitiveQuery::default()]
		} else {
			compiler::compile(&key.expression, popularity)?
		};
		let circles = geo::cover(center, radius_m, options)?;

		Ok(Self::build(key, &queries, &circles))
	}

	pub fn from_lines(name: PlanName, lines: &[String]) -> Result<Self> {
		let entries = lines
			.iter()
			.enumerate()
			.map(|(index, line)| {
				serde_json::from_str(line).map_err(|err| Error::InvalidPlan {
					message: format!("entry {index} of plan {name} is malformed: {err}"),
				})
			})
			.collect::<Result<Vec<PlanEntry>>>()?;
		let end_count = entries.iter().filter(|entry| matches!(entry, PlanEntry::End)).count();

		if end_count != 1 || !matches!(entries.last(), Some(PlanEntry::End)) {
			return Err(Error::InvalidPlan {
				message: format!("plan {name} must end with exactly one sentinel entry."),
			});
		}

		Ok(Self { name, entries })
	}

	pub fn to_lines(&self) -> Result<Vec<String>> {
		self.entries
			.iter()
			.map(|entry| {
				serde_json::to_string(entry).map_err(|err| Error::InvalidPlan {
					message: format!("failed to encode plan {}: {err}", self.name),
				})
			})
			.collect()
	}

	pub fn entries(&self) -> &[PlanEntry] {
		&self.entries
	}

	/// Entry count including the sentinel.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.step_count() == 0
	}

	pub fn step(&self, index: usize) -> Option<&PlanStep> {
		match self.entries.get(index) {
			Some(PlanEntry::Step(step)) => Some(step),
			_ => None,
		}
	}

	pub fn steps(&self) -> impl Iterator<Item = &PlanStep> {
		self.entries.iter().filter_map(|entry| match entry {
			PlanEntry::Step(step) => Some(step),
			PlanEntry::End => None,
		})
	}

	pub fn step_count(&self) -> usize {
		self.entries.len().saturating_sub(1)
	}

	pub fn skipped_count(&self) -> usize {
		self.steps().filter(|step| step.skip).count()
	}

	/// First index at or after `from` holding a step that is not skipped.
	pub fn next_runnable(&self, from: usize) -> Option<usize> {
		self.entries
			.iter()
			.enumerate()
			.skip(from)
			.find_map(|(index, entry)| match entry {
				PlanEntry::Step(step) if !step.skip => Some(index),
				_ => None,
			})
	}

	/// Marks every strict descendant of the step at `index`, within the same query, as skipped.
	///
	/// The step itself is left as is. Flags are only ever set.
	pub fn prune(&mut self, index: usize) -> Result<PruneOutcome> {
		let (query_index, path) = match self.step(index) {
			Some(step) => (step.query_index, step.circle.path.clone()),
			None => {
				return Err(Error::InvalidArgument {
					message: format!("plan {} has no step at index {index}.", self.name),
				});
			},
		};
		let mut newly_skipped = 0;

		for entry in &mut self.entries {
			let PlanEntry::Step(step) = entry else {
				continue;
			};

			if step.skip || step.query_index != query_index {
				continue;
			}
			if step.circle.path.is_descendant_of(&path) {
				step.skip = true;
				newly_skipped += 1;
			}
		}

		Ok(PruneOutcome { newly_skipped, next_index: self.next_runnable(index + 1) })
	}
}

fn slug(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.trim().chars().flat_map(char::to_lowercase) {
		if ch.is_ascii_alphanumeric() {
			out.push(ch);
		} else if !out.ends_with('-') {
			out.push('-');
		}
	}

	let trimmed = out.trim_matches('-');

	if trimmed.is_empty() { "any".to_string() } else { trimmed.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn token_uses_wire_format() {
		let token = PageToken::new(PlanName::from("de-berlin-0123456789abcdef"), 42);

		assert_eq!(token.to_string(), "page_token=de-berlin-0123456789abcdef@#$42");
		assert_eq!(token.to_string().parse::<PageToken>().expect("parse failed"), token);
	}

	#[test]
	fn token_rejects_malformed_input() {
		for raw in ["", "de-berlin@#$1", "page_token=de-berlin", "page_token=@#$1", "page_token=x@#$-1", "page_token=x@#$a"] {
			assert!(raw.parse::<PageToken>().is_err(), "{raw}");
		}
	}

	#[test]
	fn plan_name_is_deterministic_and_location_sensitive() {
		let key = PlanKey::new("cafe | bar", "DE", "Berlin", None);
		let same = PlanKey::new(" cafe | bar ", "de", " berlin", Some("  ".to_string()));
		let other = PlanKey::new("cafe | bar", "DE", "Hamburg", None);

		assert_eq!(key.name(), same.name());
		assert_ne!(key.name(), other.name());
		assert!(key.name().as_str().starts_with("de-berlin-"));
	}

	#[test]
	fn slug_collapses_separators() {
		assert_eq!(slug("São Paulo"), "s-o-paulo");
		assert_eq!(slug("  New   York "), "new-york");
		assert_eq!(slug("--"), "any");
	}
}
