use std::collections::HashMap;

use sqlx::PgPool;

use crate::{Error, Result, models::CategoryPopularity};

/// Per-city category popularity scores. Country and city are matched case-insensitively.
#[derive(Clone, Debug)]
pub struct PgPopularitySource {
	pool: PgPool,
}
impl PgPopularitySource {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn get(&self, country: &str, city: &str) -> Result<HashMap<String, f32>> {
		let rows = sqlx::query_as::<_, CategoryPopularity>(
			"\
SELECT category, score
FROM category_popularity
WHERE country = $1 AND city = $2",
		)
		.bind(normalize_key(country))
		.bind(normalize_key(city))
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(|row| (row.category, row.score)).collect())
	}

	pub async fn upsert(&self, country: &str, city: &str, category: &str, score: f32) -> Result<()> {
		if !(0.0..=1.0).contains(&score) {
			return Err(Error::InvalidArgument(format!(
				"popularity score for {category} must be in the range 0-1."
			)));
		}
		if category.trim().is_empty() {
			return Err(Error::InvalidArgument("category must be non-empty.".to_string()));
		}

		sqlx::query(
			"\
INSERT INTO category_popularity (country, city, category, score)
VALUES ($1, $2, $3, $4)
ON CONFLICT (country, city, category) DO UPDATE
SET score = EXCLUDED.score,
	updated_at = now()",
		)
		.bind(normalize_key(country))
		.bind(normalize_key(city))
		.bind(category.trim())
		.bind(score)
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}

pub fn normalize_key(raw: &str) -> String {
	raw.trim().to_lowercase()
}
