pub mod batch;
pub mod fields;
pub mod simplify;
