pub mod clean;
pub mod dedup;
pub mod enrich;
pub mod validate;
