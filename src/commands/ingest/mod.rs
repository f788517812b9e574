mod classify;
mod db_setup;
mod loader;
mod normalize;
mod nutrients;
mod pipeline;
mod reader;
mod run;
mod sources;
#[cfg(test)]
mod tests;

pub use run::run;

pub use db_setup::{DB_SCHEMA_VERSION, count_rows, open_store, schema_version};
