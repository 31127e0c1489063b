pub mod capture;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod job;
pub mod materialize;
pub mod notify;
pub mod preload;
pub mod probe;
pub mod progress;
pub mod raster;
pub mod report;
pub mod util;
pub mod validate;
pub mod viewer;
