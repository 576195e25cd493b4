pub mod analyzers;
pub mod config;
pub mod cycle;
pub mod ledger;
pub mod model;
pub mod output;
pub mod parser;
pub mod processor;
pub mod routing;
pub mod stats;
pub mod store;
pub mod travel_time;
