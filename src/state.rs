use crate::config::AppConfig;
use crate::ocr::engine::{OcrEngine, TesseractEngine};
use crate::storage::{InputStore, MinioInputStore};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn InputStore>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = MinioInputStore::connect(&config.storage).await?;
        if let Err(e) = storage.ensure_bucket().await {
            warn!(error = %e, "bucket check failed; uploads will not be archived");
        }
        let storage = Arc::new(storage) as Arc<dyn InputStore>;

        let tesseract = TesseractEngine::from_config(&config.ocr);
        match tesseract.probe().await {
            Ok(version) => info!(%version, "ocr engine ready"),
            Err(e) => warn!(error = %e, "tesseract not available; extraction will fail"),
        }
        let ocr = Arc::new(tesseract) as Arc<dyn OcrEngine>;

        Ok(Self {
            db,
            config,
            storage,
            ocr,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_ocr(Arc::new(crate::ocr::engine::fake::FakeEngine::with_lines(&[
            "Hello", "World",
        ])))
    }

    /// Lazily connecting pool: only routes that never reach the database may be exercised.
    #[cfg(test)]
    pub fn fake_with_ocr(ocr: Arc<dyn OcrEngine>) -> Self {
        let config = AppConfig::for_tests();
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");
        Self::for_tests(db, config, ocr)
    }

    /// Real pool (from `#[sqlx::test]`), fake storage and the given engine.
    #[cfg(test)]
    pub fn for_tests(db: PgPool, config: AppConfig, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            storage: Arc::new(crate::storage::fake::FakeStore) as Arc<dyn InputStore>,
            ocr,
        }
    }
}
