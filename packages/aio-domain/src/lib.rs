//! Pure rules shared by the AllInOne handlers: file classification, storage key layout,
//! document status transitions, deterministic identifiers and transcript assembly.

pub mod files;
pub mod ids;
pub mod keys;
pub mod status;
pub mod transcript;
