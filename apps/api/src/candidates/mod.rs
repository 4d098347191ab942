pub mod evaluation;
pub mod extract;
pub mod handlers;
pub mod import;
#[cfg(test)]
pub mod memory;
pub mod merge;
pub mod store;
