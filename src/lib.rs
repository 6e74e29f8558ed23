pub mod catalog;
pub mod challenge;
pub mod config;
pub mod credentials;
pub mod download;
pub mod driver;
pub mod duration;
pub mod error;
pub mod extraction;
pub mod models;
pub mod normalize;
pub mod runner;
pub mod session;

pub use error::ReportError;
pub use normalize::ReportStream;
#[cfg(feature = "chromium")]
pub use runner::run;
pub use runner::{RunSummary, Runner};
