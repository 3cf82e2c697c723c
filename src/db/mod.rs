use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub mod users;

pub async fn init() -> anyhow::Result<SqlitePool> {
	let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
	let pool = connect(&database_url).await?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}

/// Opens a pool with foreign keys enforced and a busy timeout, so concurrent
/// writers wait for the lock instead of failing straight away.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.with_context(|| format!("invalid DATABASE_URL: {database_url}"))?
		.create_if_missing(true)
		.foreign_keys(true)
		.busy_timeout(Duration::from_secs(5));

	SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect_with(options)
		.await
		.context("failed to connect to database")
}
