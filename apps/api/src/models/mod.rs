pub mod audit;
pub mod candidate;
