//! In-memory [`MirrorStore`] for reconciler and queue tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::sheets::client::{encode_row, MirrorStore};
use crate::sheets::row::SheetRow;
use crate::sheets::SheetsError;

pub struct MemoryMirror {
    available: bool,
    /// Data rows as the sheet stores them (escaped); index 0 is sheet row 2.
    rows: Mutex<Vec<Vec<String>>>,
    /// Fixed export; when empty the export is rendered from `rows`.
    csv: Mutex<String>,
    failures_left: AtomicU32,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self {
            available: true,
            rows: Mutex::new(Vec::new()),
            csv: Mutex::new(String::new()),
            failures_left: AtomicU32::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_csv(self, csv: &str) -> Self {
        *self.csv.lock().unwrap() = csv.to_string();
        self
    }

    pub fn with_rows(self, rows: Vec<Vec<String>>) -> Self {
        *self.rows.lock().unwrap() = rows;
        self
    }

    /// The next `n` writes fail.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }

    /// What gog leaves in the sheet for a written row.
    fn stored(cells: &[String]) -> Vec<String> {
        encode_row(cells).split('|').map(str::to_string).collect()
    }

    fn render_csv(rows: &[Vec<String>]) -> String {
        let quote = |cell: &str| format!("\"{}\"", cell.replace('"', "\"\""));
        let mut out = String::from("name\n");
        for row in rows {
            let line: Vec<String> = row.iter().map(|c| quote(c)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    fn take_failure(&self) -> Result<(), SheetsError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(SheetsError::Command {
                status: Some(1),
                stderr: "quota exceeded".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorStore for MemoryMirror {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn read_rows(&self) -> Result<Vec<SheetRow>, SheetsError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, cells)| SheetRow::new(i + 2, cells.clone()))
            .collect())
    }

    async fn update_row(&self, row_number: usize, cells: &[String]) -> Result<(), SheetsError> {
        self.take_failure()?;
        let mut rows = self.rows.lock().unwrap();
        let slot = rows
            .get_mut(row_number - 2)
            .ok_or(SheetsError::Export { status: 400 })?;
        *slot = Self::stored(cells);
        Ok(())
    }

    async fn append_row(&self, cells: &[String]) -> Result<(), SheetsError> {
        self.take_failure()?;
        self.rows.lock().unwrap().push(Self::stored(cells));
        Ok(())
    }

    async fn export_csv(&self) -> Result<String, SheetsError> {
        if !self.available {
            return Err(SheetsError::Unavailable);
        }
        let csv = self.csv.lock().unwrap().clone();
        if csv.is_empty() {
            return Ok(Self::render_csv(&self.rows.lock().unwrap()));
        }
        Ok(csv)
    }
}
