//! Grammar dictionary lookup backed by Postgres trigram similarity.
//!
//! Given the grammatical-element tokens extracted by the first correction
//! call, each token is matched against the `grammar_items.headword` column
//! with the trigram operator and the best row is rendered into a short
//! human-readable explanation. Lookup failures are downgraded to "no
//! dictionary info available".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::error;

/// Stable explanation used when every descriptive column is null.
pub const MISSING_EXPLANATION: &str = "설명 정보가 없습니다.";

/// Pool bounds; the pool is shared across requests and created lazily on
/// first use.
const MIN_CONNECTIONS: u32 = 5;
/// Upper pool bound.
const MAX_CONNECTIONS: u32 = 20;

const GRAMMAR_LOOKUP_SQL: &str = "\
SELECT headword, pos, topic, meaning, form_info, constraints
FROM grammar_items
WHERE headword % $1
ORDER BY similarity(headword, $2) DESC
LIMIT 1";

/// A dictionary entry rendered for prompt injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarDbInfo {
    /// The matched headword.
    pub grammar_element: String,
    /// Labeled explanation assembled from the row's non-null fields.
    pub explanation: String,
}

/// Errors from the dictionary backend.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    /// The connection pool could not be established.
    #[error("dictionary pool initialization failed: {0}")]
    Pool(#[source] sqlx::Error),

    /// A query inside the lookup cycle failed.
    #[error("dictionary query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Grammar dictionary interface.
///
/// Failures are swallowed inside implementations: a lookup that cannot be
/// served returns the empty list.
#[async_trait]
pub trait GrammarDictionary: Send + Sync {
    /// Look up explanations for the given element tokens.
    async fn lookup(&self, elements: &[String]) -> Vec<GrammarDbInfo>;
}

/// Postgres-backed dictionary with a lazily created connection pool.
#[derive(Debug)]
pub struct PgDictionary {
    url: String,
    pool: OnceCell<PgPool>,
}

impl PgDictionary {
    /// Create a dictionary against the given Postgres URL.
    ///
    /// No connection is made until the first lookup.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: OnceCell::new(),
        }
    }

    /// Trim, drop empties, and deduplicate preserving first occurrence.
    fn dedupe_targets(elements: &[String]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        elements
            .iter()
            .map(|element| element.trim())
            .filter(|element| !element.is_empty())
            .filter(|element| seen.insert(element.to_owned()))
            .map(str::to_owned)
            .collect()
    }

    async fn pool(&self) -> Result<&PgPool, DictionaryError> {
        self.pool
            .get_or_try_init(|| async {
                PgPoolOptions::new()
                    .min_connections(MIN_CONNECTIONS)
                    .max_connections(MAX_CONNECTIONS)
                    .connect(&self.url)
                    .await
            })
            .await
            .map_err(DictionaryError::Pool)
    }

    /// One lookup cycle: a single connection, a single transaction, one
    /// best-match query per target token.
    async fn query_elements(
        &self,
        targets: &[String],
    ) -> Result<Vec<GrammarDbInfo>, DictionaryError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let mut infos = Vec::new();
        for element in targets {
            let row = sqlx::query(GRAMMAR_LOOKUP_SQL)
                .bind(element)
                .bind(element)
                .fetch_optional(&mut *tx)
                .await?;

            let Some(row) = row else { continue };

            let headword: String = row.try_get("headword")?;
            let meaning: Option<String> = row.try_get("meaning")?;
            let form_info: Option<String> = row.try_get("form_info")?;
            let constraints: Option<String> = row.try_get("constraints")?;
            let pos: Option<String> = row.try_get("pos")?;
            let topic: Option<String> = row.try_get("topic")?;

            infos.push(GrammarDbInfo {
                grammar_element: headword,
                explanation: render_explanation(meaning, form_info, constraints, pos, topic),
            });
        }

        tx.commit().await?;
        Ok(infos)
    }

    /// Close the pool if it was ever created. Called at shutdown.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}

/// Assemble the labeled explanation in fixed field order, skipping nulls.
fn render_explanation(
    meaning: Option<String>,
    form_info: Option<String>,
    constraints: Option<String>,
    pos: Option<String>,
    topic: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(meaning) = meaning {
        parts.push(format!("의미: {meaning}"));
    }
    if let Some(form_info) = form_info {
        parts.push(format!("형태 정보: {form_info}"));
    }
    if let Some(constraints) = constraints {
        parts.push(format!("제약: {constraints}"));
    }
    if let Some(pos) = pos {
        parts.push(format!("품사: {pos}"));
    }
    if let Some(topic) = topic {
        parts.push(format!("토픽 등급: {topic}"));
    }

    if parts.is_empty() {
        MISSING_EXPLANATION.to_owned()
    } else {
        parts.join(" / ")
    }
}

#[async_trait]
impl GrammarDictionary for PgDictionary {
    async fn lookup(&self, elements: &[String]) -> Vec<GrammarDbInfo> {
        let targets = Self::dedupe_targets(elements);
        if targets.is_empty() {
            return Vec::new();
        }

        match self.query_elements(&targets).await {
            Ok(infos) => infos,
            Err(e) => {
                error!(error = %e, "grammar dictionary lookup failed");
                Vec::new()
            }
        }
    }
}
