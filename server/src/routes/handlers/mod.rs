pub mod analysis;
pub mod keys;
