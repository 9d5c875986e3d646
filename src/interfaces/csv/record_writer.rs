use crate::domain::order::Order;
use crate::domain::status::ReconciliationStatus;
use crate::domain::transaction::BankTransaction;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct TransactionLine<'a> {
    transaction_hash: &'a str,
    payer_sender: &'a str,
    credit_amount: Decimal,
    reconciliation_status: ReconciliationStatus,
    order_id: &'a str,
    candidate_order_id: &'a str,
    batch_id: Option<u64>,
}

#[derive(Serialize)]
struct OrderLine<'a> {
    order_id: &'a str,
    customer_name: &'a str,
    amount_total_fee: Decimal,
    reconciliation_status: ReconciliationStatus,
    transaction_ids: String,
    batch_id: Option<u64>,
}

/// Writes status listings as CSV, one header row plus one line per record.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_transactions(&mut self, transactions: &[BankTransaction]) -> Result<()> {
        for tx in transactions {
            self.writer.serialize(TransactionLine {
                transaction_hash: &tx.transaction_hash,
                payer_sender: &tx.payer_sender,
                credit_amount: tx.credit_amount,
                reconciliation_status: tx.reconciliation_status,
                order_id: tx.order_id.as_deref().unwrap_or_default(),
                candidate_order_id: tx.candidate_order_id.as_deref().unwrap_or_default(),
                batch_id: tx.batch_id,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Linked hashes are joined with `;` inside one column.
    pub fn write_orders(&mut self, orders: &[Order]) -> Result<()> {
        for order in orders {
            self.writer.serialize(OrderLine {
                order_id: &order.order_id,
                customer_name: &order.customer_name,
                amount_total_fee: order.amount_total_fee,
                reconciliation_status: order.reconciliation_status,
                transaction_ids: order.transaction_ids.join(";"),
                batch_id: order.batch_id,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
