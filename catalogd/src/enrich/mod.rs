pub mod geo;
pub mod worker;

pub use worker::EnrichQueue;
