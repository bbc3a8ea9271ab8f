use crate::error::{LedgerError, Result};
use serde::de::DeserializeOwned;
use std::io::Read;

/// Reads typed records from a CSV source with a header row.
///
/// Works for any record the ledger accepts as input: countries
/// (`code, name, continent_name`), new accounts
/// (`owner, balance, currency, country_code`) and transfer requests
/// (`from, to, amount`). Whitespace around fields is trimmed and short rows
/// are tolerated, so optional trailing columns may be left out.
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes records. A malformed row yields an error and
    /// reading continues with the next one.
    pub fn records<T: DeserializeOwned>(self) -> impl Iterator<Item = Result<T>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
