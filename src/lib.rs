pub mod config;
pub mod data;
pub mod detect;
pub mod logging;
pub mod mock;
pub mod observation;
pub mod report;
