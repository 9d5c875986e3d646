//! CSV intake of already-normalized records and CSV listings for the CLI.

pub mod record_reader;
pub mod record_writer;
