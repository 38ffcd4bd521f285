use calamine::{open_workbook_auto, Data, Reader};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Input file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Worksheet '{sheet}' not found; available sheets: {}", .available.join(", "))]
    SheetNotFound { sheet: String, available: Vec<String> },

    #[error("Failed to read workbook {}", .path.display())]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("Worksheet '{sheet}' has no header row")]
    EmptySheet { sheet: String },

    #[error("Worksheet '{sheet}' is missing required column '{column}'")]
    MissingColumn { sheet: String, column: &'static str },
}

/// A single spreadsheet cell, keeping the type the workbook gave it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Numeric view of the cell. Text that parses as a number counts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Non-empty text view of the cell.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::String(s) if s.trim().is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(_) | Data::Empty => CellValue::Empty,
        }
    }
}

/// Columns the viewer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Column {
    Site,
    Country,
    Latitude,
    Longitude,
    ClosedYear,
    TillNow,
    Status,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Site,
        Column::Country,
        Column::Latitude,
        Column::Longitude,
        Column::ClosedYear,
        Column::TillNow,
        Column::Status,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Column::Site => "Site",
            Column::Country => "Country",
            Column::Latitude => "Latitude",
            Column::Longitude => "Longitude",
            Column::ClosedYear => "Closed year (numeric)",
            Column::TillNow => "Till Now (Years)",
            Column::Status => "Status",
        }
    }

    /// Matches a header cell, ignoring case and whitespace.
    pub fn from_header(header: &str) -> Option<Column> {
        let key = normalize_header(header);
        Column::ALL
            .into_iter()
            .find(|column| normalize_header(column.label()) == key)
    }
}

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// One row of the mines sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MineRecord {
    /// 1-based row number in the worksheet
    pub row: usize,
    pub site: String,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub closed_year: CellValue,
    pub till_now: CellValue,
    pub status: CellValue,
}

impl MineRecord {
    pub fn value(&self, column: Column) -> CellValue {
        match column {
            Column::Site => CellValue::Text(self.site.clone()),
            Column::Country => self
                .country
                .clone()
                .map_or(CellValue::Empty, CellValue::Text),
            Column::Latitude => CellValue::Number(self.latitude),
            Column::Longitude => CellValue::Number(self.longitude),
            Column::ClosedYear => self.closed_year.clone(),
            Column::TillNow => self.till_now.clone(),
            Column::Status => self.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    site: usize,
    latitude: usize,
    longitude: usize,
    country: Option<usize>,
    closed_year: Option<usize>,
    till_now: Option<usize>,
    status: Option<usize>,
}

impl ColumnIndex {
    fn resolve(sheet: &str, header: &[CellValue]) -> Result<(Self, Vec<Column>), DatasetError> {
        let mut found: Vec<(Column, usize)> = Vec::new();
        for (idx, cell) in header.iter().enumerate() {
            let Some(column) = cell.as_text().as_deref().and_then(Column::from_header) else {
                continue;
            };
            // First occurrence wins on duplicate headers
            if !found.iter().any(|(c, _)| *c == column) {
                found.push((column, idx));
            }
        }

        let find = |column: Column| found.iter().find(|(c, _)| *c == column).map(|(_, i)| *i);
        let require = |column: Column| {
            find(column).ok_or_else(|| DatasetError::MissingColumn {
                sheet: sheet.to_string(),
                column: column.label(),
            })
        };

        let index = ColumnIndex {
            site: require(Column::Site)?,
            latitude: require(Column::Latitude)?,
            longitude: require(Column::Longitude)?,
            country: find(Column::Country),
            closed_year: find(Column::ClosedYear),
            till_now: find(Column::TillNow),
            status: find(Column::Status),
        };

        let columns = Column::ALL
            .into_iter()
            .filter(|column| find(*column).is_some())
            .collect();

        Ok((index, columns))
    }
}

/// The loaded mines sheet.
#[derive(Debug, Clone, Serialize)]
pub struct MineTable {
    pub sheet: String,
    /// Columns present in the header row, in canonical order
    pub columns: Vec<Column>,
    pub records: Vec<MineRecord>,
    /// Rows that could not be placed on the map
    pub warnings: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

impl MineTable {
    /// Builds a table from a header row followed by data rows.
    /// `header_row` is the 1-based worksheet row of the header.
    pub fn from_rows<I>(
        sheet: &str,
        header: &[CellValue],
        rows: I,
        header_row: usize,
    ) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = Vec<CellValue>>,
    {
        let (index, columns) = ColumnIndex::resolve(sheet, header)?;
        let mut records = Vec::new();
        let mut warnings = Vec::new();

        for (offset, cells) in rows.into_iter().enumerate() {
            let row = header_row + offset + 1;
            if cells.iter().all(CellValue::is_empty) {
                continue;
            }
            match parse_record(row, &cells, &index) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(sheet, row, "{}", reason);
                    warnings.push(reason);
                }
            }
        }

        Ok(MineTable {
            sheet: sheet.to_string(),
            columns,
            records,
            warnings,
            loaded_at: Utc::now(),
        })
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Same schema and provenance, different rows.
    pub fn with_records(&self, records: Vec<MineRecord>) -> Self {
        MineTable {
            sheet: self.sheet.clone(),
            columns: self.columns.clone(),
            records,
            warnings: self.warnings.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

fn cell_at(cells: &[CellValue], idx: usize) -> &CellValue {
    cells.get(idx).unwrap_or(&CellValue::Empty)
}

fn optional_cell(cells: &[CellValue], idx: Option<usize>) -> CellValue {
    idx.map_or(CellValue::Empty, |i| cell_at(cells, i).clone())
}

fn coordinate(
    cells: &[CellValue],
    idx: usize,
    column: Column,
    limit: f64,
    row: usize,
    site: &str,
) -> Result<f64, String> {
    let cell = cell_at(cells, idx);
    match cell.as_f64() {
        Some(value) if value.is_finite() && value.abs() <= limit => Ok(value),
        _ if cell.is_empty() => Err(format!(
            "Row {}: skipped '{}', {} is missing",
            row,
            site,
            column.label()
        )),
        _ => Err(format!(
            "Row {}: skipped '{}', invalid {} value '{}'",
            row,
            site,
            column.label(),
            cell
        )),
    }
}

fn parse_record(row: usize, cells: &[CellValue], index: &ColumnIndex) -> Result<MineRecord, String> {
    let site = cell_at(cells, index.site).as_text().unwrap_or_default();
    let latitude = coordinate(cells, index.latitude, Column::Latitude, 90.0, row, &site)?;
    let longitude = coordinate(cells, index.longitude, Column::Longitude, 180.0, row, &site)?;

    Ok(MineRecord {
        row,
        site,
        country: index.country.and_then(|i| cell_at(cells, i).as_text()),
        latitude,
        longitude,
        closed_year: optional_cell(cells, index.closed_year),
        till_now: optional_cell(cells, index.till_now),
        status: optional_cell(cells, index.status),
    })
}

/// Reads `sheet` from the workbook at `path` and validates its schema.
pub fn load_workbook(path: &Path, sheet: &str) -> Result<MineTable, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut workbook = open_workbook_auto(path).map_err(|source| DatasetError::Workbook {
        path: path.to_path_buf(),
        source,
    })?;

    let available = workbook.sheet_names();
    if !available.iter().any(|name| name == sheet) {
        return Err(DatasetError::SheetNotFound {
            sheet: sheet.to_string(),
            available,
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|source| DatasetError::Workbook {
            path: path.to_path_buf(),
            source,
        })?;

    let header_row = range.start().map_or(1, |(row, _)| row as usize + 1);
    let mut rows = range
        .rows()
        .map(|cells| cells.iter().map(CellValue::from).collect::<Vec<_>>());
    let header = rows.next().ok_or_else(|| DatasetError::EmptySheet {
        sheet: sheet.to_string(),
    })?;

    let table = MineTable::from_rows(sheet, &header, rows, header_row)?;
    info!(
        path = %path.display(),
        sheet,
        rows = table.len(),
        skipped = table.warnings.len(),
        "Loaded workbook"
    );
    Ok(table)
}

enum DataSource {
    Workbook { path: PathBuf, sheet: String },
    #[cfg(test)]
    Fixed(Arc<MineTable>),
}

struct CachedTable {
    modified: SystemTime,
    table: Arc<MineTable>,
}

/// Hands out the current table, reloading the workbook when its
/// modification time changes.
#[derive(Clone)]
pub struct DatasetStore {
    source: Arc<DataSource>,
    cache_enabled: bool,
    cached: Arc<RwLock<Option<CachedTable>>>,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>, sheet: impl Into<String>, cache_enabled: bool) -> Self {
        DatasetStore {
            source: Arc::new(DataSource::Workbook {
                path: path.into(),
                sheet: sheet.into(),
            }),
            cache_enabled,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    #[cfg(test)]
    pub fn fixed(table: MineTable) -> Self {
        DatasetStore {
            source: Arc::new(DataSource::Fixed(Arc::new(table))),
            cache_enabled: false,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Blocking: may read the whole workbook.
    pub fn load(&self) -> Result<Arc<MineTable>, DatasetError> {
        let (path, sheet) = match self.source.as_ref() {
            DataSource::Workbook { path, sheet } => (path, sheet),
            #[cfg(test)]
            DataSource::Fixed(table) => return Ok(Arc::clone(table)),
        };

        if !self.cache_enabled {
            return load_workbook(path, sheet).map(Arc::new);
        }

        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        if let Some(modified) = modified {
            let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = cached.as_ref().filter(|entry| entry.modified == modified) {
                debug!(path = %path.display(), "Dataset cache hit");
                return Ok(Arc::clone(&entry.table));
            }
        }

        let table = Arc::new(load_workbook(path, sheet)?);
        if let Some(modified) = modified {
            let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
            *cached = Some(CachedTable {
                modified,
                table: Arc::clone(&table),
            });
        }
        Ok(table)
    }

    pub fn describe(&self) -> String {
        match self.source.as_ref() {
            DataSource::Workbook { path, sheet } => format!("{} [{}]", path.display(), sheet),
            #[cfg(test)]
            DataSource::Fixed(table) => format!("<fixed> [{}]", table.sheet),
        }
    }
}
