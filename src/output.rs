use std::io::Write;

use crate::batch::UnitOutcome;
use crate::errors::{AppError, AppResult};

pub const LINE_HEADERS: [&str; 4] = ["name", "address", "phone", "website"];

/// Streams one CSV row per resolved line, in completion order.
pub struct CsvLineWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvLineWriter<W> {
    pub fn new(inner: W) -> AppResult<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(LINE_HEADERS)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Failed or closed units still get a row carrying the input name.
    pub fn write_outcome(&mut self, outcome: &UnitOutcome) -> AppResult<()> {
        let fallback_name = outcome.unit.name.as_str();
        let row = match &outcome.result {
            Ok(resolution) => {
                let record = &resolution.record;
                [
                    record.name.as_deref().unwrap_or(fallback_name),
                    record.address.as_deref().unwrap_or_default(),
                    record.phone.as_deref().unwrap_or_default(),
                    record.website.as_deref().unwrap_or_default(),
                ]
            }
            Err(_) => [fallback_name, "", "", ""],
        };
        self.writer.write_record(row)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> AppResult<W> {
        self.writer
            .into_inner()
            .map_err(|err| AppError::Io(err.into_error()))
    }
}
