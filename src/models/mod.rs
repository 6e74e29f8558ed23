mod account;
mod context;
mod id;
mod record;
mod report;

pub use account::{Account, Market};
pub use context::ActiveContext;
pub use id::{Id, IdError};
pub use record::{NormalizedRecord, Period, Row};
pub use report::{ReportDateRange, ReportJob, ReportType};
