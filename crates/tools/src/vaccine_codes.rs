//! `GetVaccineCodes`: CVX code lookup backed by a SQLite reference table.
//!
//! The `cvx_codes` table mirrors the CDC CVX export. It is created if
//! missing, so a fresh database returns no matches until it is loaded with
//! [`VaccineCodeTool::import_export`] (`[vaccine_codes].import_file`).

use async_trait::async_trait;
use clinreact_core::clinical::VaccineCode;
use clinreact_core::error::ToolError;
use clinreact_core::tool::Tool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const NAME: &str = "GetVaccineCodes";

#[derive(Clone)]
pub struct VaccineCodeTool {
    pool: SqlitePool,
}

fn storage_error(e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: NAME.into(),
        reason: e.to_string(),
    }
}

impl VaccineCodeTool {
    /// Open (or create) the database at `url`, e.g. `sqlite://cvx.db`.
    pub async fn connect(url: &str) -> Result<Self, ToolError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| storage_error(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true);

        // Each connection to an in-memory database is a separate database,
        // and the data is gone once that connection closes.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| storage_error(format!("Failed to open SQLite: {e}")))?;

        let tool = Self::from_pool(pool).await?;
        info!("CVX code table ready at {url}");
        Ok(tool)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, ToolError> {
        let tool = Self { pool };
        tool.run_migrations().await?;
        Ok(tool)
    }

    async fn run_migrations(&self) -> Result<(), ToolError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cvx_codes (
                cvx_code          TEXT PRIMARY KEY,
                short_description TEXT NOT NULL,
                full_vaccine_name TEXT NOT NULL,
                note              TEXT,
                vaccine_status    TEXT,
                nonvaccine        INTEGER NOT NULL DEFAULT 0,
                update_date       TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error(format!("cvx_codes table: {e}")))?;
        Ok(())
    }

    /// Insert or replace one reference row.
    pub async fn upsert(&self, code: &VaccineCode) -> Result<(), ToolError> {
        sqlx::query(
            "INSERT OR REPLACE INTO cvx_codes (cvx_code, short_description, full_vaccine_name)
             VALUES (?1, ?2, ?3)",
        )
        .bind(&code.cvx_code)
        .bind(&code.short_description)
        .bind(&code.full_vaccine_name)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    /// Load a CDC CVX export (pipe-delimited `web_cvx` text) into the table.
    ///
    /// Returns the number of rows written. Existing codes are replaced.
    pub async fn import_export(&self, path: &Path) -> Result<usize, ToolError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            storage_error(format!("Failed to read CVX export {}: {e}", path.display()))
        })?;

        let codes = parse_cvx_export(&text);
        for code in &codes {
            self.upsert(code).await?;
        }
        info!(rows = codes.len(), path = %path.display(), "CVX export imported");
        Ok(codes.len())
    }

    /// Codes whose short or full name contains `term`, case-insensitively.
    pub async fn search(&self, term: &str) -> Result<Vec<VaccineCode>, ToolError> {
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        debug!(pattern = %pattern, "CVX search");

        let rows = sqlx::query(
            r#"
            SELECT cvx_code, short_description, full_vaccine_name
            FROM cvx_codes
            WHERE LOWER(short_description) LIKE ?1 ESCAPE '\'
               OR LOWER(full_vaccine_name) LIKE ?1 ESCAPE '\'
            ORDER BY CAST(cvx_code AS INTEGER), cvx_code
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows
            .iter()
            .map(|row| VaccineCode {
                cvx_code: row.get("cvx_code"),
                short_description: row.get("short_description"),
                full_vaccine_name: row.get("full_vaccine_name"),
            })
            .collect())
    }
}

/// Parse CDC `web_cvx` rows: `code|short|full|note|status|...`.
///
/// The header line and rows without a numeric code are skipped.
pub fn parse_cvx_export(text: &str) -> Vec<VaccineCode> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('|').map(str::trim);
            let (Some(code), Some(short), Some(full)) = (fields.next(), fields.next(), fields.next())
            else {
                warn!(line, "Skipping CVX row with fewer than three fields");
                return None;
            };
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
                debug!(line, "Skipping non-data CVX row");
                return None;
            }
            Some(VaccineCode {
                cvx_code: code.to_string(),
                short_description: short.to_string(),
                full_vaccine_name: full.to_string(),
            })
        })
        .collect()
}

/// Escape LIKE wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl Tool for VaccineCodeTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Look up CVX vaccine codes for a disease or vaccine name."
    }

    fn argument_hint(&self) -> &str {
        "a disease or vaccine name, e.g. COVID-19"
    }

    async fn execute(&self, argument: &str) -> Result<serde_json::Value, ToolError> {
        let term = crate::strip_quotes(argument);
        if term.is_empty() {
            return Err(ToolError::InvalidArguments(
                "GetVaccineCodes needs a disease or vaccine name".into(),
            ));
        }
        let codes = self.search(term).await?;
        serde_json::to_value(codes).map_err(storage_error)
    }
}
