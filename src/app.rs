//! Wiring: builds every gateway and service from a [`Config`].

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use policy_check_core::analyzer::Analyzer;
use policy_check_core::classify::ContextClassifier;
use policy_check_core::embedding::Embedder;
use policy_check_core::generation::Generator;
use policy_check_core::index::VectorIndexGateway;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::ingest::Ingestor;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Shared services. Cheap to clone.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub index: Arc<VectorIndexGateway>,
    pub analyzer: Arc<Analyzer>,
    pub ingestor: Arc<Ingestor>,
}

impl App {
    /// Connect to the database, apply migrations, and build the configured
    /// embedding and generation gateways.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        Ok(Self::with_gateways(config, pool, embedder, generator))
    }

    /// Build from an open, migrated pool and explicit gateways.
    pub fn with_gateways(
        config: &Config,
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let store = Arc::new(SqliteStore::new(pool, config.logs.max_limit));

        let index = Arc::new(
            VectorIndexGateway::new(embedder, store.clone(), store.clone())
                .with_min_score(config.retrieval.min_score),
        );

        let mut analyzer = Analyzer::new(store.clone(), index.clone(), generator.clone(), store.clone())
            .with_max_top_k(config.retrieval.max_top_k);
        if config.classifier.enabled {
            analyzer = analyzer.with_classifier(ContextClassifier::new(generator));
        }

        let ingestor = Arc::new(Ingestor::new(
            store.clone(),
            index.clone(),
            config.storage.dir.clone(),
            config.chunking.chunk_size,
            config.chunking.overlap,
        ));

        Self {
            config: Arc::new(config.clone()),
            store,
            index,
            analyzer: Arc::new(analyzer),
            ingestor,
        }
    }
}
