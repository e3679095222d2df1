pub mod clob;
pub mod core;
pub mod persistence;
pub mod sink;
