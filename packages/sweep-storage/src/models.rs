use time::OffsetDateTime;

#[derive(Debug, sqlx::FromRow)]
pub struct SearchPlanRow {
	pub plan_name: String,
	pub entries: Vec<String>,
	pub step_count: i32,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CategoryPopularity {
	pub category: String,
	pub score: f32,
}
