// file: src/rules/mod.rs
// description: system rules and search template exports

pub mod loader;

pub use loader::RulesLoader;
