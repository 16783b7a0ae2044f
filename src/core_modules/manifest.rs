// THEORY:
// The manifest is the tabular record of every labeled image. It is read as-is:
// the header row is captured as the manifest's schema so the validator can
// report missing columns, and every row is kept cell for cell so the report
// can reproduce it. Alongside the raw rows, each row is projected onto the
// known columns as a `LabelRecord` whose absent cells read as empty strings.
// Nothing here judges the data; duplicate `image_id`s, blank cells, ragged
// rows and stray bytes that are not UTF-8 are all legitimate input.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::error::QcError;

pub const IMAGE_ID: &str = "image_id";
pub const LABEL: &str = "label";
pub const SOURCE: &str = "source";
pub const COLLECTED_AT: &str = "collected_at";
pub const CONSENT: &str = "consent";
pub const NOTES: &str = "notes";

/// Columns every manifest is expected to carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 6] = [IMAGE_ID, LABEL, SOURCE, COLLECTED_AT, CONSENT, NOTES];

/// One manifest row projected onto the known columns. Values are stored exactly as read.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LabelRecord {
    pub image_id: String,
    pub label: String,
    pub source: String,
    pub collected_at: String,
    pub consent: String,
    pub notes: String,
}

/// A raw manifest row keyed by the manifest's own header.
///
/// Serializes as a map with exactly the header's columns, in header order.
/// Cells missing from a short row read as empty strings; cells beyond the
/// header have no column and are left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestRow<'a> {
    columns: &'a [String],
    cells: &'a [String],
}

impl<'a> ManifestRow<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let index = self.columns.iter().position(|name| name == column)?;
        Some(self.cells.get(index).map(String::as_str).unwrap_or_default())
    }
}

impl Serialize for ManifestRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (index, column) in self.columns.iter().enumerate() {
            let cell = self.cells.get(index).map(String::as_str).unwrap_or_default();
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    records: Vec<LabelRecord>,
}

impl Manifest {
    /// Builds a manifest from a header and its rows, as they would be read from disk.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let indices =
            REQUIRED_COLUMNS.map(|name| columns.iter().position(|column| column == name));
        let records = rows
            .iter()
            .map(|row| {
                let cell = |slot: usize| {
                    indices[slot]
                        .and_then(|index| row.get(index))
                        .cloned()
                        .unwrap_or_default()
                };
                LabelRecord {
                    image_id: cell(0),
                    label: cell(1),
                    source: cell(2),
                    collected_at: cell(3),
                    consent: cell(4),
                    notes: cell(5),
                }
            })
            .collect();

        Self {
            columns,
            rows,
            records,
        }
    }

    /// Reads the manifest at `path`. A missing file is the run's one fatal input error.
    pub fn load(path: &Path) -> Result<Self, QcError> {
        if !path.is_file() {
            return Err(QcError::ManifestMissing {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|source| QcError::io(path, source))?;
        let manifest = Self::from_reader(file).map_err(|source| QcError::csv(path, source))?;
        debug!(
            path = %path.display(),
            rows = manifest.len(),
            columns = manifest.columns.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    /// Parses CSV text. Bytes that are not valid UTF-8 become U+FFFD.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = reader.byte_headers()?.iter().map(lossy).collect();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in reader.byte_records() {
            rows.push(row?.iter().map(lossy).collect());
        }

        Ok(Self::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    /// Required columns absent from the header, in canonical order.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS
            .into_iter()
            .filter(|column| !self.has_column(column))
            .collect()
    }

    pub fn records(&self) -> &[LabelRecord] {
        &self.records
    }

    /// Every row as read, keyed by the header.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = ManifestRow<'_>> {
        self.rows.iter().map(|cells| ManifestRow {
            columns: &self.columns,
            cells,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
