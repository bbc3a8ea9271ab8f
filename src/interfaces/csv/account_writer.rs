use crate::domain::account::Account;
use crate::error::Result;
use std::io::Write;

/// Writes account snapshots as `id,owner,balance,currency,country_code`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts<'a>(
        &mut self,
        accounts: impl IntoIterator<Item = &'a Account>,
    ) -> Result<()> {
        self.writer
            .write_record(["id", "owner", "balance", "currency", "country_code"])?;
        for account in accounts {
            self.writer.write_record([
                account.id.to_string(),
                account.owner.clone(),
                account.balance.to_string(),
                account.currency.to_string(),
                account.country_code.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Currency;
    use chrono::Utc;

    #[test]
    fn test_writes_header_and_rows() {
        let accounts = vec![
            Account {
                id: 1,
                owner: "alice".into(),
                balance: 700,
                currency: Currency::Usd,
                country_code: 1,
                created_at: Utc::now(),
            },
            Account {
                id: 2,
                owner: "bob, jr".into(),
                balance: 800,
                currency: Currency::Eur,
                country_code: 2,
                created_at: Utc::now(),
            },
        ];

        let mut buffer = Vec::new();
        AccountWriter::new(&mut buffer)
            .write_accounts(&accounts)
            .unwrap();

        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(
            output,
            "id,owner,balance,currency,country_code\n1,alice,700,USD,1\n2,\"bob, jr\",800,EUR,2\n"
        );
    }
}
