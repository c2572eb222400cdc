// file: src/utils/mod.rs
// description: shared utility exports

pub mod logging;
pub mod validation;

pub use validation::Validator;
