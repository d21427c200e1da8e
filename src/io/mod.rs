//! Artifact I/O: store construction and CSV sink.

mod sink;
mod store;

pub use sink::CsvSink;
pub use store::create_output_store;
