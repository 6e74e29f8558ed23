use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Id;

/// The business reports the dashboard offers, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    SalesTrafficTimeSeries,
    DetailSalesTrafficByTime,
    SellerPerformanceForMerchants,
    DetailSalesTrafficBySku,
    DetailSalesTrafficByParentItem,
    DetailSalesTrafficByChildItem,
    BrandPerformance,
}

impl ReportType {
    pub const ALL: [ReportType; 7] = [
        ReportType::SalesTrafficTimeSeries,
        ReportType::DetailSalesTrafficByTime,
        ReportType::SellerPerformanceForMerchants,
        ReportType::DetailSalesTrafficBySku,
        ReportType::DetailSalesTrafficByParentItem,
        ReportType::DetailSalesTrafficByChildItem,
        ReportType::BrandPerformance,
    ];

    /// The dashboard's report identifier, also used as the storage folder name.
    pub fn id(self) -> &'static str {
        match self {
            ReportType::SalesTrafficTimeSeries => "SalesTrafficTimeSeries",
            ReportType::DetailSalesTrafficByTime => "DetailSalesTrafficByTime",
            ReportType::SellerPerformanceForMerchants => "SellerPerformanceForMerchants",
            ReportType::DetailSalesTrafficBySku => "DetailSalesTrafficBySKU",
            ReportType::DetailSalesTrafficByParentItem => "DetailSalesTrafficByParentItem",
            ReportType::DetailSalesTrafficByChildItem => "DetailSalesTrafficByChildItem",
            // Misspelled on the dashboard itself.
            ReportType::BrandPerformance => "BrandPerformannce",
        }
    }

    /// Caller-facing short name, also the key of the report toggle option.
    pub fn short_name(self) -> &'static str {
        match self {
            ReportType::SalesTrafficTimeSeries => "SalesTraffic",
            ReportType::DetailSalesTrafficByTime => "DetailSalesTraffic",
            ReportType::SellerPerformanceForMerchants => "SellerPerformance",
            ReportType::DetailSalesTrafficBySku => "DetailSalesTrafficBySKU",
            ReportType::DetailSalesTrafficByParentItem => "DetailSalesTrafficByParent",
            ReportType::DetailSalesTrafficByChildItem => "DetailSalesTrafficByChild",
            ReportType::BrandPerformance => "BrandPerformance",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.id() == id)
    }

    /// Reports that only exist for some accounts; extraction checks that the
    /// report link is present before opening it.
    pub fn is_optional(self) -> bool {
        matches!(self, ReportType::BrandPerformance)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// An inclusive reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportDateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parse `START:END` with ISO dates, as accepted on the command line.
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let (start, end) = value
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Date range {value:?} must look like START:END"))?;
        let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d")?;
        if end < start {
            anyhow::bail!("Date range {value:?} ends before it starts");
        }
        Ok(Self { start, end })
    }

    /// Storage folder name, `YYYY-MM-DD_YYYY-MM-DD`.
    pub fn folder_name(&self) -> String {
        format!(
            "{}_{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }

    /// Parse a storage folder name back into a range.
    pub fn from_folder_name(name: &str) -> Option<Self> {
        let (start, end) = name.split_once('_')?;
        Some(Self {
            start: NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?,
            end: NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?,
        })
    }
}

/// One unit of extraction work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportJob {
    pub report_type: ReportType,
    pub account_id: Id,
    pub market_id: Id,
    pub date_range: ReportDateRange,
}

impl fmt::Display for ReportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.account_id,
            self.market_id,
            self.report_type.id(),
            self.date_range.folder_name()
        )
    }
}
