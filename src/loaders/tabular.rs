//! Tabular formats: CSV and spreadsheets.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader};

use super::encoding::decode_text;
use super::{source_of, Loader, LoaderOptions};
use crate::error::{Error, Result};
use crate::types::RawDocument;

/// Header row and records of a CSV file.
struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    fn read(path: &Path, encoding: Option<&str>, delimiter: Option<char>) -> Result<Self> {
        let delimiter = match delimiter.unwrap_or(',') {
            c if c.is_ascii() => c as u8,
            c => {
                return Err(Error::InvalidOption(format!(
                    "delimiter must be a single ASCII character, got {:?}",
                    c
                )))
            }
        };

        let bytes = std::fs::read(path)?;
        let text = decode_text(&bytes, encoding, false, path)?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let rows = reader
            .records()
            .map(|record| Ok(record?.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>>>()?;

        Ok(Self { headers, rows })
    }

    fn column(&self, name: &str, path: &Path) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::InvalidOption(format!("Column '{}' not found in CSV file {}", name, path.display())))
    }

    fn cell<'a>(row: &'a [String], index: usize) -> &'a str {
        row.get(index).map(|v| v.trim()).unwrap_or_default()
    }
}

fn metadata_indices(table: &CsvTable, columns: &[String], path: &Path) -> Result<Vec<(String, usize)>> {
    columns
        .iter()
        .map(|name| Ok((name.clone(), table.column(name, path)?)))
        .collect()
}

/// Loads a CSV file as one document per row.
///
/// Row content is `column: value` lines for every column not listed in
/// `metadata_columns`. The `source` metadata is the file path, or the value
/// of `source_column` when set.
pub struct CSVLoader {
    path: PathBuf,
    encoding: Option<String>,
    delimiter: Option<char>,
    source_column: Option<String>,
    metadata_columns: Vec<String>,
}

impl CSVLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            encoding: options.encoding.clone(),
            delimiter: options.delimiter,
            source_column: options.source_column.clone(),
            metadata_columns: options.metadata_columns.clone().unwrap_or_default(),
        })
    }
}

impl Loader for CSVLoader {
    fn name(&self) -> &'static str {
        "CSVLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let table = CsvTable::read(&self.path, self.encoding.as_deref(), self.delimiter)?;
        let source_index = self
            .source_column
            .as_deref()
            .map(|name| table.column(name, &self.path))
            .transpose()?;
        let meta = metadata_indices(&table, &self.metadata_columns, &self.path)?;
        let file_source = source_of(&self.path);

        let docs = table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let content = table
                    .headers
                    .iter()
                    .enumerate()
                    .filter(|(_, h)| !self.metadata_columns.contains(*h))
                    .map(|(j, h)| format!("{}: {}", h, CsvTable::cell(row, j)))
                    .collect::<Vec<_>>()
                    .join("\n");

                let source = match source_index {
                    Some(j) => CsvTable::cell(row, j).to_string(),
                    None => file_source.clone(),
                };

                let mut doc = RawDocument::new(content, source).with_meta("row", i);
                for (name, j) in &meta {
                    doc = doc.with_meta(name, CsvTable::cell(row, *j));
                }
                doc
            })
            .collect();

        Ok(docs)
    }
}

/// Loads a CSV file as one document per row, keeping only the columns
/// listed in `columns_to_read`.
pub struct FilteredCSVLoader {
    path: PathBuf,
    encoding: Option<String>,
    delimiter: Option<char>,
    source_column: Option<String>,
    columns_to_read: Vec<String>,
    metadata_columns: Vec<String>,
}

impl FilteredCSVLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        let columns_to_read = options
            .columns_to_read
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::InvalidOption("FilteredCSVLoader requires columns_to_read".to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            encoding: options.encoding.clone(),
            delimiter: options.delimiter,
            source_column: options.source_column.clone(),
            columns_to_read,
            metadata_columns: options.metadata_columns.clone().unwrap_or_default(),
        })
    }
}

impl Loader for FilteredCSVLoader {
    fn name(&self) -> &'static str {
        "FilteredCSVLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let table = CsvTable::read(&self.path, self.encoding.as_deref(), self.delimiter)?;
        let read = metadata_indices(&table, &self.columns_to_read, &self.path)?;
        let meta = metadata_indices(&table, &self.metadata_columns, &self.path)?;
        let source_index = self
            .source_column
            .as_deref()
            .map(|name| table.column(name, &self.path))
            .transpose()?;
        let file_source = source_of(&self.path);

        let docs = table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let content = read
                    .iter()
                    .map(|(name, j)| format!("{}:{}", name, CsvTable::cell(row, *j)))
                    .collect::<Vec<_>>()
                    .join("\n");

                let source = match source_index {
                    Some(j) => CsvTable::cell(row, j).to_string(),
                    None => file_source.clone(),
                };

                let mut doc = RawDocument::new(content, source).with_meta("row", i);
                for (name, j) in &meta {
                    doc = doc.with_meta(name, CsvTable::cell(row, *j));
                }
                doc
            })
            .collect();

        Ok(docs)
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
    }
}

/// Loads a spreadsheet as one document per non-empty sheet.
///
/// Rows become lines with cells separated by ` | `; blank rows are skipped.
pub struct UnstructuredExcelLoader {
    path: PathBuf,
}

impl UnstructuredExcelLoader {
    pub fn new(path: &Path, _options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Loader for UnstructuredExcelLoader {
    fn name(&self) -> &'static str {
        "UnstructuredExcelLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| Error::parse(self.path.display(), e))?;
        let source = source_of(&self.path);

        let mut docs = Vec::new();
        for (index, sheet) in workbook.sheet_names().to_vec().into_iter().enumerate() {
            let range = match workbook.worksheet_range(&sheet) {
                Ok(range) => range,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), sheet = %sheet, error = %e, "Skipping unreadable sheet");
                    continue;
                }
            };

            let lines: Vec<String> = range
                .rows()
                .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
                .filter(|cells| cells.iter().any(|c| !c.is_empty()))
                .map(|cells| cells.join(" | "))
                .collect();

            if lines.is_empty() {
                continue;
            }

            docs.push(
                RawDocument::new(lines.join("\n"), source.clone())
                    .with_meta("page_name", &sheet)
                    .with_meta("page_number", index + 1),
            );
        }

        Ok(docs)
    }
}
