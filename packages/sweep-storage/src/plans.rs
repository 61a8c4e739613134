use sqlx::PgPool;

use crate::{Error, Result, models::SearchPlanRow};

/// Search plans stored one row per plan, one JSON string per entry.
#[derive(Clone, Debug)]
pub struct PgPlanStore {
	pool: PgPool,
}
impl PgPlanStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn get(&self, plan_name: &str) -> Result<Option<Vec<String>>> {
		let entries: Option<Vec<String>> =
			sqlx::query_scalar("SELECT entries FROM search_plans WHERE plan_name = $1")
				.bind(plan_name)
				.fetch_optional(&self.pool)
				.await?;

		Ok(entries)
	}

	pub async fn row(&self, plan_name: &str) -> Result<SearchPlanRow> {
		sqlx::query_as::<_, SearchPlanRow>(
			"\
SELECT plan_name, entries, step_count, created_at, updated_at
FROM search_plans
WHERE plan_name = $1",
		)
		.bind(plan_name)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| Error::NotFound(format!("search plan {plan_name}")))
	}

	/// Inserts or replaces the plan. The last entry is expected to be the sentinel.
	pub async fn save(&self, plan_name: &str, entries: &[String]) -> Result<()> {
		if plan_name.trim().is_empty() {
			return Err(Error::InvalidArgument("plan_name must be non-empty.".to_string()));
		}
		if entries.is_empty() {
			return Err(Error::InvalidArgument(format!(
				"search plan {plan_name} must contain at least the sentinel entry."
			)));
		}

		let step_count = i32::try_from(entries.len() - 1).map_err(|_| {
			Error::InvalidArgument(format!("search plan {plan_name} has too many steps."))
		})?;

		sqlx::query(
			"\
INSERT INTO search_plans (plan_name, entries, step_count)
VALUES ($1, $2, $3)
ON CONFLICT (plan_name) DO UPDATE
SET entries = EXCLUDED.entries,
	step_count = EXCLUDED.step_count,
	updated_at = now()",
		)
		.bind(plan_name)
		.bind(entries)
		.bind(step_count)
		.execute(&self.pool)
		.await?;

		tracing::debug!(plan_name, step_count, "Search plan saved.");

		Ok(())
	}

	pub async fn delete(&self, plan_name: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM search_plans WHERE plan_name = $1")
			.bind(plan_name)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}
