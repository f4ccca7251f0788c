//! Runs the background sync service against a mocked Trakt token endpoint.
//!
//! One user is seeded with a token that is about to expire and two enabled lists. The service
//! refreshes the token on its first pass and prewarms both catalog pages, after which a catalog
//! read is answered from the cache without touching the upstream.

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use tracing_subscriber::EnvFilter;
use url::Url;
// self
use trakt_sync::{
	auth::{ListId, TokenRecord, UserId},
	catalog::{CatalogFuture, CatalogKey, CatalogService, CatalogSource, ListRecord},
	config::{ClientCredentials, SyncConfig},
	prewarm::Prewarmer,
	provider::ProviderDescriptor,
	refresh::ReqwestRefreshEngine,
	schedule::SyncService,
	store::{ListStore, MemoryStore, TokenStore},
};

/// Stand-in for the code that assembles catalog items from the Trakt API.
struct DemoCatalog;
impl CatalogSource<Vec<String>> for DemoCatalog {
	fn build_page<'a>(&'a self, key: &'a CatalogKey) -> CatalogFuture<'a, Vec<String>> {
		Box::pin(async move {
			tokio::time::sleep(StdDuration::from_millis(200)).await;

			Ok((1..=3).map(|rank| format!("{}#{rank}", key.list)).collect())
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access-2\",\"refresh_token\":\"demo-refresh-2\",\"token_type\":\"bearer\",\"expires_in\":7776000}",
			);
		})
		.await;
	let mut config = SyncConfig::from_env()?;

	config.descriptor = ProviderDescriptor::trakt_at(&Url::parse(&server.base_url())?)?;

	if config.credentials.is_none() {
		config.credentials = Some(ClientCredentials::new("demo-client", "demo-secret"));
	}

	config.refresh_interval = StdDuration::from_secs(1);
	config.prewarm_interval = StdDuration::from_secs(1);
	config.validate()?;

	let store = Arc::new(MemoryStore::default());
	let user = UserId::new("demo-user")?;

	store
		.upsert(
			TokenRecord::builder(user.clone())
				.access_token("demo-access-1")
				.refresh_token("demo-refresh-1")
				.expires_at(OffsetDateTime::now_utc() + Duration::minutes(2))
				.build()?,
		)
		.await?;
	store.set_lists(
		user.clone(),
		[
			ListRecord::new(ListId::new("watchlist")?, true),
			ListRecord::new(ListId::new("trending")?, true),
			ListRecord::new(ListId::new("archived")?, false),
		],
	);

	let tokens: Arc<dyn TokenStore> = store.clone();
	let lists: Arc<dyn ListStore> = store.clone();
	let engine = Arc::new(ReqwestRefreshEngine::from_config(tokens.clone(), &config)?);
	let catalog: Arc<CatalogService<Vec<String>>> =
		Arc::new(CatalogService::from_config(Arc::new(DemoCatalog), &config));
	let prewarmer = Arc::new(Prewarmer::from_config(tokens, lists, catalog.clone(), &config));
	let service = SyncService::start(&config, engine.clone(), prewarmer.clone());

	tokio::time::sleep(StdDuration::from_secs(2)).await;
	service.shutdown().await;

	let page = catalog.page(CatalogKey::new(user.clone(), ListId::new("watchlist")?, 1)).await?;

	println!("Refreshes issued: {}.", engine.metrics.attempts());
	println!("Catalog served from {}: {:?}.", page.served_from, page.value);
	println!("Last prewarm: {:?}.", prewarmer.last_warmed());

	token_mock.assert_calls_async(1).await;

	Ok(())
}
