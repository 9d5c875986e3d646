#![allow(dead_code)]

use chrono::NaiveDate;
use remitrec::application::engine::ReconciliationEngine;
use remitrec::application::policy::MatchPolicy;
use remitrec::domain::order::Order;
use remitrec::domain::transaction::BankTransaction;
use remitrec::infrastructure::in_memory::InMemoryStore;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub fn day(d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 5, d)
}

pub fn hashes(list: &[&str]) -> Vec<String> {
    list.iter().map(|h| h.to_string()).collect()
}

pub async fn engine_with(txs: Vec<BankTransaction>, orders: Vec<Order>) -> ReconciliationEngine {
    let engine = ReconciliationEngine::new(Arc::new(InMemoryStore::new()), MatchPolicy::default());
    engine.register_transactions(txs).await.unwrap();
    engine.upsert_orders(orders).await.unwrap();
    engine
}

pub fn write_transactions_csv(path: &Path, rows: &[[&str; 6]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record([
        "transaction_hash",
        "payer_sender",
        "transaction_date",
        "credit_amount",
        "description",
        "extracted_reference",
    ])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_orders_csv(path: &Path, rows: &[[&str; 6]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record([
        "order_id",
        "order_bank_reference",
        "customer_name",
        "amount_total_fee",
        "order_date",
        "remitec_status",
    ])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// One exact reference pair plus one pair that only matches on name.
pub fn write_sample_feeds(dir: &Path) -> Result<(), Error> {
    write_transactions_csv(
        &dir.join("transactions.csv"),
        &[
            ["h1", "ACME CORP", "2024-05-02", "500.00", "wire AB123456", "AB123456"],
            ["h2", "Globex", "2024-05-05", "80.00", "", ""],
        ],
    )?;
    write_orders_csv(
        &dir.join("orders.csv"),
        &[
            ["o1", "AB123456", "ACME CORP", "500.00", "2024-05-01", "HOLD"],
            ["o2", "ZZ000000", "Globex", "80.00", "2024-05-05", "PAID"],
        ],
    )
}
