use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::ingestion::{InputUnit, UnitOrigin};
use crate::pipeline::{PlaceRecord, Resolution};

pub const NAME_COLUMN: &str = "name";
pub const STATE_COLUMN: &str = "state";

/// Sheet rows are numbered like a spreadsheet: the header is row 1.
const FIRST_DATA_ROW: usize = 2;

/// A header row plus data rows, loaded from and saved to CSV. Results are
/// written back by row number; unknown result columns are appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    original_width: usize,
}

impl Sheet {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let width = headers.len();

        let mut rows = Vec::new();
        for record in reader.records() {
            let mut row: Vec<String> = record?.iter().map(str::to_string).collect();
            if row.len() < width {
                row.resize(width, String::new());
            }
            rows.push(row);
        }

        let sheet = Self {
            headers,
            rows,
            original_width: width,
        };
        if sheet.column(NAME_COLUMN).is_none() {
            return Err(AppError::Config(format!(
                "sheet is missing a `{NAME_COLUMN}` column"
            )));
        }
        Ok(sheet)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn widened(&self) -> bool {
        self.headers.len() > self.original_width
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row_number: usize, column: &str) -> Option<&str> {
        let idx = self.column(column)?;
        self.row(row_number)?.get(idx).map(String::as_str)
    }

    /// Input units for every named row from `start_row` on.
    pub fn units(&self, start_row: usize) -> Vec<InputUnit> {
        let name_idx = self.column(NAME_COLUMN);
        let state_idx = self.column(STATE_COLUMN);
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx + FIRST_DATA_ROW, row))
            .filter(|(row_number, _)| *row_number >= start_row)
            .filter_map(|(row_number, row)| {
                let name = name_idx.and_then(|i| row.get(i))?;
                let hint = state_idx.and_then(|i| row.get(i)).map(String::as_str);
                InputUnit::from_row(row_number, name, hint)
            })
            .collect()
    }

    /// Writes every resolved field into the unit's row. The name cell and
    /// fields the resolution left empty are not touched.
    pub fn apply(&mut self, origin: UnitOrigin, resolution: &Resolution) -> AppResult<()> {
        let UnitOrigin::Row(row_number) = origin else {
            return Err(AppError::Config(format!(
                "{origin} cannot be written to a sheet"
            )));
        };
        if self.row(row_number).is_none() {
            return Err(AppError::Config(format!("{origin} is outside the sheet")));
        }

        for (column, value) in resolved_cells(&resolution.record) {
            let Some(value) = value else {
                continue;
            };
            let idx = self.ensure_column(column);
            let row = &mut self.rows[row_number - FIRST_DATA_ROW];
            row[idx] = value;
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> AppResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let path = path.as_ref();
        self.write_to(File::create(path)?)?;
        if self.widened() {
            info!(
                target: "sheet",
                path = %path.display(),
                from = self.original_width,
                to = self.width(),
                "widened sheet data range"
            );
        }
        Ok(())
    }

    fn row(&self, row_number: usize) -> Option<&Vec<String>> {
        row_number
            .checked_sub(FIRST_DATA_ROW)
            .and_then(|idx| self.rows.get(idx))
    }

    fn column(&self, name: &str) -> Option<usize> {
        let wanted = normalize_header(name);
        self.headers
            .iter()
            .position(|header| normalize_header(header) == wanted)
    }

    /// Appended columns start past the widest row so cells without a header
    /// are kept.
    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        let idx = self
            .rows
            .iter()
            .map(Vec::len)
            .fold(self.headers.len(), usize::max);
        self.headers.resize(idx, String::new());
        self.headers.push(name.to_string());
        let width = self.headers.len();
        for row in self.rows.iter_mut().filter(|row| row.len() < width) {
            row.resize(width, String::new());
        }
        idx
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_ascii_lowercase().replace(' ', "_")
}

fn resolved_cells(record: &PlaceRecord) -> [(&'static str, Option<String>); 9] {
    [
        ("street", record.street.clone()),
        ("city", record.city.clone()),
        (STATE_COLUMN, record.state.clone()),
        ("postal_code", record.postal_code.clone()),
        ("phone", record.phone.clone()),
        ("website", record.website.clone()),
        ("latitude", record.location.map(|loc| loc.lat.to_string())),
        ("longitude", record.location.map(|loc| loc.lng.to_string())),
        ("status", record.status.map(|s| s.as_str().to_string())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OperatingStatus, ResolutionKind};
    use crate::places::LatLng;

    const SAMPLE: &str = "Name,State,Phone\n\
                          Already Done,CA,(415) 555-0000\n\
                          Joe's,OH,\n\
                          Hidden Gem,CA,(415) 555-1111\n\
                          ,,\n";

    #[test]
    fn builds_units_from_start_row() {
        let sheet = Sheet::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(sheet.row_count(), 4);

        let units = sheet.units(3);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].origin, UnitOrigin::Row(3));
        assert_eq!(units[0].name, "Joe's");
        assert_eq!(units[0].locale_hint.as_deref(), Some("OH"));
        assert_eq!(units[1].origin, UnitOrigin::Row(4));
    }

    #[test]
    fn rejects_sheet_without_name_column() {
        let err = Sheet::from_reader("Title,State\nx,CA\n".as_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn applies_results_and_widens_columns() {
        let mut sheet = Sheet::from_reader(SAMPLE.as_bytes()).unwrap();
        sheet
            .apply(
                UnitOrigin::Row(3),
                &Resolution {
                    kind: ResolutionKind::Matched,
                    record: PlaceRecord {
                        name: Some("Joe's Diner".into()),
                        street: Some("2 Oak Road".into()),
                        city: Some("Springfield".into()),
                        state: Some("OH".into()),
                        phone: Some("(937) 555-0100".into()),
                        location: Some(LatLng {
                            lat: 39.5,
                            lng: -83.25,
                        }),
                        status: Some(OperatingStatus::Operational),
                        ..PlaceRecord::default()
                    },
                },
            )
            .unwrap();
        sheet
            .apply(
                UnitOrigin::Row(4),
                &Resolution {
                    kind: ResolutionKind::Fallback,
                    record: PlaceRecord {
                        name: Some("Hidden Gem".into()),
                        website: Some("https://lucky.example/Hidden-Gem".into()),
                        ..PlaceRecord::default()
                    },
                },
            )
            .unwrap();

        assert!(sheet.widened());
        assert_eq!(sheet.cell(3, "name"), Some("Joe's"));
        assert_eq!(sheet.cell(3, "street"), Some("2 Oak Road"));
        assert_eq!(sheet.cell(3, "Phone"), Some("(937) 555-0100"));
        assert_eq!(sheet.cell(3, "latitude"), Some("39.5"));
        assert_eq!(sheet.cell(3, "status"), Some("operational"));
        assert_eq!(sheet.cell(4, "phone"), Some("(415) 555-1111"));
        assert_eq!(
            sheet.cell(4, "website"),
            Some("https://lucky.example/Hidden-Gem")
        );
        assert_eq!(sheet.cell(4, "street"), Some(""));
        assert_eq!(sheet.cell(2, "website"), Some(""));

        let mut out = Vec::new();
        sheet.write_to(&mut out).unwrap();
        let reread = Sheet::from_reader(out.as_slice()).unwrap();
        assert_eq!(reread.headers(), sheet.headers());
        assert_eq!(reread.cell(3, "city"), Some("Springfield"));
    }

    #[test]
    fn refuses_rows_outside_the_sheet() {
        let mut sheet = Sheet::from_reader(SAMPLE.as_bytes()).unwrap();
        let resolution = Resolution {
            kind: ResolutionKind::Closed,
            record: PlaceRecord::default(),
        };
        assert!(sheet.apply(UnitOrigin::Row(1), &resolution).is_err());
        assert!(sheet.apply(UnitOrigin::Row(99), &resolution).is_err());
        assert!(sheet.apply(UnitOrigin::Line(2), &resolution).is_err());
    }

    #[test]
    fn widening_keeps_cells_past_the_header() {
        let mut sheet =
            Sheet::from_reader("Name,State\nJoe's,OH,my private note\nAda,CA\n".as_bytes())
                .unwrap();
        sheet
            .apply(
                UnitOrigin::Row(2),
                &Resolution {
                    kind: ResolutionKind::Fallback,
                    record: PlaceRecord {
                        website: Some("https://x.example/".into()),
                        ..PlaceRecord::default()
                    },
                },
            )
            .unwrap();

        assert_eq!(sheet.headers(), ["Name", "State", "", "website"]);
        assert_eq!(sheet.cell(2, "website"), Some("https://x.example/"));
        assert_eq!(sheet.cell(3, "website"), Some(""));

        let mut out = Vec::new();
        sheet.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Name,State,,website\nJoe's,OH,my private note,https://x.example/\nAda,CA,,\n"
        );
    }
}
