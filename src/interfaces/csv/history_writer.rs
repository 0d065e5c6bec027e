use crate::domain::transaction::{Direction, HistoryEntry};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct HistoryRow<'a> {
    direction: Direction,
    id: &'a str,
    amount: Option<Decimal>,
    token: Option<&'a str>,
    fiat_amount: Option<Decimal>,
    fiat_currency: Option<&'a str>,
    status: Option<&'a str>,
    tx_hash: Option<&'a str>,
    created_at: Option<&'a str>,
}

const HEADER: [&str; 9] = [
    "direction",
    "id",
    "amount",
    "token",
    "fiat_amount",
    "fiat_currency",
    "status",
    "tx_hash",
    "created_at",
];

/// Writes wallet history rows as CSV, one header line first. The header is
/// written even when the history is empty.
pub struct HistoryWriter<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> HistoryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(sink),
            header_written: false,
        }
    }

    fn write_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.writer.write_record(HEADER)?;
            self.header_written = true;
        }
        Ok(())
    }

    pub fn write_entries<'a>(
        &mut self,
        direction: Direction,
        entries: impl IntoIterator<Item = &'a HistoryEntry>,
    ) -> Result<()> {
        self.write_header()?;
        for entry in entries {
            self.writer.serialize(HistoryRow {
                direction,
                id: entry.id.as_str(),
                amount: entry.amount,
                token: entry.token.as_deref(),
                fiat_amount: entry.fiat_amount,
                fiat_currency: entry.fiat_currency.as_deref(),
                status: entry.status.as_deref(),
                tx_hash: entry.tx_hash.as_deref(),
                created_at: entry.created_at.as_deref(),
            })?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.write_header()?;
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|err| std::io::Error::other(err.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::TransactionId;
    use rust_decimal_macros::dec;

    fn entry(id: &str, status: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            id: TransactionId::new(id),
            amount: Some(dec!(5)),
            token: Some("USDC".into()),
            fiat_amount: Some(dec!(18487.70)),
            fiat_currency: Some("UGX".into()),
            status: status.map(str::to_string),
            tx_hash: None,
            created_at: None,
        }
    }

    #[test]
    fn test_writes_header_and_rows() {
        let mut writer = HistoryWriter::new(Vec::new());
        let entries = [entry("1", Some("confirmed")), entry("2", None)];
        writer.write_entries(Direction::OffRamp, &entries).unwrap();
        let output = String::from_utf8(writer.finish().unwrap()).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "direction,id,amount,token,fiat_amount,fiat_currency,status,tx_hash,created_at"
        );
        assert_eq!(lines[1], "offramp,1,5,USDC,18487.70,UGX,confirmed,,");
        assert_eq!(lines[2], "offramp,2,5,USDC,18487.70,UGX,,,");
    }

    #[test]
    fn test_empty_history_still_has_header() {
        let mut writer = HistoryWriter::new(Vec::new());
        writer.write_entries(Direction::OnRamp, std::iter::empty()).unwrap();
        let output = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(
            output,
            "direction,id,amount,token,fiat_amount,fiat_currency,status,tx_hash,created_at\n"
        );

        let untouched = HistoryWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(untouched, output.as_bytes());
    }

    #[test]
    fn test_header_is_written_once() {
        let mut writer = HistoryWriter::new(Vec::new());
        writer.write_entries(Direction::OffRamp, &[entry("1", None)]).unwrap();
        writer.write_entries(Direction::OffRamp, &[entry("2", None)]).unwrap();
        let output = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(output.lines().count(), 3);
    }
}
