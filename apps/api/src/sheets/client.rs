//! Access to the mirror spreadsheet.
//!
//! Reads and writes go through the `gog sheets` CLI; the bulk read used by
//! mirror→relational reconciliation goes through the public CSV export.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::SheetsConfig;
use crate::sheets::row::{encode_cell, SheetRow, LAST_COLUMN};
use crate::sheets::SheetsError;

#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Whether the CLI is installed and a sheet is configured.
    async fn is_available(&self) -> bool;

    /// All data rows (row 2 onwards) with their row numbers.
    async fn read_rows(&self) -> Result<Vec<SheetRow>, SheetsError>;

    /// Overwrites A..X of `row_number` in place.
    async fn update_row(&self, row_number: usize, cells: &[String]) -> Result<(), SheetsError>;

    async fn append_row(&self, cells: &[String]) -> Result<(), SheetsError>;

    /// Raw CSV export of the whole sheet, header included.
    async fn export_csv(&self) -> Result<String, SheetsError>;
}

#[derive(Debug, Deserialize)]
struct GogValues {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Clone)]
pub struct GogSheetsClient {
    config: SheetsConfig,
    http: Client,
}

impl GogSheetsClient {
    pub fn new(config: SheetsConfig) -> Result<Self, SheetsError> {
        let http = Client::builder().timeout(config.export_timeout).build()?;
        Ok(Self { config, http })
    }

    fn range(&self, cells: &str) -> String {
        format!("{}!{}", self.config.sheet_name, cells)
    }

    /// Runs `gog sheets <args…>` with the configured account and timeout,
    /// returning stdout.
    async fn run(&self, args: &[&str]) -> Result<String, SheetsError> {
        let mut cmd = Command::new(&self.config.gog_bin);
        cmd.arg("sheets").args(args);
        if !self.config.account.is_empty() {
            cmd.arg("--account").arg(&self.config.account);
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        debug!("gog sheets {}", args.first().copied().unwrap_or_default());
        let output = tokio::time::timeout(self.config.cli_timeout, cmd.output())
            .await
            .map_err(|_| SheetsError::Timeout(self.config.cli_timeout))??;

        if !output.status.success() {
            return Err(SheetsError::Command {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() && !stderr.contains("INFO") {
            warn!("gog sheets stderr: {}", stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// gog takes a row as one `|`-separated argument; see [`encode_cell`].
pub fn encode_row(cells: &[String]) -> String {
    cells
        .iter()
        .enumerate()
        .map(|(index, cell)| encode_cell(index, cell))
        .collect::<Vec<_>>()
        .join("|")
}

#[async_trait]
impl MirrorStore for GogSheetsClient {
    async fn is_available(&self) -> bool {
        if self.config.sheet_id.is_empty() {
            return false;
        }
        let version_check = Command::new(&self.config.gog_bin)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        matches!(
            tokio::time::timeout(Duration::from_secs(5), version_check).await,
            Ok(Ok(status)) if status.success()
        )
    }

    async fn read_rows(&self) -> Result<Vec<SheetRow>, SheetsError> {
        let range = self.range(&format!("A2:{LAST_COLUMN}"));
        let stdout = self
            .run(&["get", &self.config.sheet_id, &range, "--json"])
            .await?;
        let parsed: GogValues = serde_json::from_str(stdout.trim())?;
        Ok(parsed
            .values
            .into_iter()
            .enumerate()
            .map(|(i, cells)| SheetRow::new(i + 2, cells))
            .collect())
    }

    async fn update_row(&self, row_number: usize, cells: &[String]) -> Result<(), SheetsError> {
        let range = self.range(&format!("A{row_number}:{LAST_COLUMN}{row_number}"));
        let data = encode_row(cells);
        self.run(&["update", &self.config.sheet_id, &range, &data])
            .await?;
        Ok(())
    }

    async fn append_row(&self, cells: &[String]) -> Result<(), SheetsError> {
        let range = self.range(&format!("A:{LAST_COLUMN}"));
        let data = encode_row(cells);
        self.run(&["append", &self.config.sheet_id, &range, &data])
            .await?;
        Ok(())
    }

    async fn export_csv(&self) -> Result<String, SheetsError> {
        let url = self.config.export_url();
        debug!("Fetching sheet export {url}");
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SheetsError::Timeout(self.config.export_timeout)
            } else {
                SheetsError::Http(e)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::Export {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_row_escapes_separators_and_line_breaks() {
        let cells = vec![
            "Alice".to_string(),
            "a|b".to_string(),
            "line\nbreak".to_string(),
            String::new(),
        ];
        let encoded = encode_row(&cells);
        assert_eq!(encoded, r"Alice|a\pb|line\nbreak|");
        assert_eq!(encoded.split('|').count(), cells.len());
    }

    #[test]
    fn test_gog_values_parse() {
        let parsed: GogValues =
            serde_json::from_str(r#"{"range":"A2:X","values":[["Alice","a@x.com"],["Bob"]]}"#)
                .unwrap();
        assert_eq!(parsed.values.len(), 2);
        assert_eq!(parsed.values[1], vec!["Bob"]);
    }
}
