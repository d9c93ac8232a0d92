pub mod analytics;
pub mod config;
pub mod domain;
pub mod errors;

pub use analytics::deals::{DealQuery, DealSortField, Page, SortDirection};
pub use analytics::filter::FilterSpec;
pub use analytics::{AnalyticsEngine, AnalyticsSettings};
pub use domain::opportunity::{
    LogoType, Opportunity, OpportunityId, OpportunityStatus, RevenueType, Stage,
};
pub use domain::salesperson::{PerformanceMode, SalespersonId, SalespersonPerformance};
pub use domain::source::SourceDataset;
pub use errors::{ApplicationError, DomainError, InterfaceError};
