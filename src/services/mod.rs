pub mod collector;
pub mod report;
