use crate::domain::order::Order;
use crate::domain::status::RemitecStatus;
use crate::domain::transaction::BankTransaction;
use crate::error::{ReconError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One clean bank credit as handed over by the import pipeline.
#[derive(Debug, Deserialize)]
struct TransactionRow {
    transaction_hash: String,
    payer_sender: String,
    transaction_date: Option<NaiveDate>,
    credit_amount: Decimal,
    description: Option<String>,
    extracted_reference: Option<String>,
}

impl From<TransactionRow> for BankTransaction {
    fn from(row: TransactionRow) -> Self {
        let mut tx = BankTransaction::new(
            row.transaction_hash,
            row.payer_sender,
            row.transaction_date,
            row.credit_amount,
        );
        tx.description = row.description.unwrap_or_default();
        tx.extracted_reference = row.extracted_reference.filter(|r| !r.trim().is_empty());
        tx
    }
}

/// One order as delivered by the order feed.
#[derive(Debug, Deserialize)]
struct OrderRow {
    order_id: String,
    order_bank_reference: Option<String>,
    customer_name: String,
    amount_total_fee: Decimal,
    order_date: Option<NaiveDate>,
    remitec_status: Option<String>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order::new(
            row.order_id,
            row.customer_name,
            row.order_date,
            row.amount_total_fee,
        )
        .with_reference(row.order_bank_reference.unwrap_or_default())
        .with_remitec_status(
            row.remitec_status
                .as_deref()
                .map(RemitecStatus::from_code)
                .unwrap_or_default(),
        )
    }
}

/// Reads normalized transaction or order records from a CSV source.
///
/// This reader wraps `csv::Reader` and yields one `Result` per row, so a
/// malformed row can be reported without aborting the rest of the file.
/// Whitespace is trimmed and record lengths may vary.
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RecordReader<R> {
    /// Creates a new `RecordReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn transactions(self) -> impl Iterator<Item = Result<BankTransaction>> {
        self.reader
            .into_deserialize::<TransactionRow>()
            .map(|row| row.map(BankTransaction::from).map_err(ReconError::from))
    }

    pub fn orders(self) -> impl Iterator<Item = Result<Order>> {
        self.reader
            .into_deserialize::<OrderRow>()
            .map(|row| row.map(Order::from).map_err(ReconError::from))
    }
}
