use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::opportunity::OpportunityId;
use crate::domain::salesperson::SalespersonId;

/// Failures raised by the analytics layer itself.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("deal `{0}` was not found in the current dataset")]
    DealNotFound(OpportunityId),
    #[error("salesperson `{0}` was not found in the roster for the requested year")]
    SalespersonNotFound(SalespersonId),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("sales data could not be loaded: {0}")]
    Persistence(String),
    #[error("salescope is misconfigured: {0}")]
    Configuration(String),
}

impl From<ConfigError> for ApplicationError {
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Caller-facing error carrying the correlation id of the request that failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("rejected: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The filter selection is not valid. Adjust it and retry.",
            Self::NotFound { .. } => "The requested record does not exist in the current data.",
            Self::ServiceUnavailable { .. } => "Sales data is unavailable right now. Retry shortly.",
            Self::Internal { .. } => "Salescope is not configured correctly. Check its settings.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(DomainError::InvalidFilter(message)) => {
                InterfaceError::BadRequest { message, correlation_id }
            }
            Self::Domain(missing) => {
                InterfaceError::NotFound { message: missing.to_string(), correlation_id }
            }
            Self::Persistence(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigError;
    use crate::domain::opportunity::OpportunityId;
    use crate::domain::salesperson::SalespersonId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn missing_records_surface_as_not_found() {
        let deal = ApplicationError::from(DomainError::DealNotFound(OpportunityId(
            "P-404".to_owned(),
        )))
        .into_interface("cli-deal");
        let rep = ApplicationError::from(DomainError::SalespersonNotFound(SalespersonId(
            "rep-404".to_owned(),
        )))
        .into_interface("cli-rollup");

        assert!(matches!(
            deal,
            InterfaceError::NotFound { ref message, .. } if message.contains("P-404")
        ));
        assert_eq!(deal.correlation_id(), "cli-deal");
        assert!(matches!(rep, InterfaceError::NotFound { .. }));
        assert_eq!(rep.user_message(), deal.user_message());
    }

    #[test]
    fn each_failure_kind_lands_in_its_interface_class() {
        let cases = [
            (ApplicationError::from(DomainError::InvalidFilter("quarter 5".to_owned())), "rejected"),
            (ApplicationError::Persistence("database is locked".to_owned()), "unavailable"),
            (
                ApplicationError::from(ConfigError::Validation("bad lookback".to_owned())),
                "internal",
            ),
        ];

        for (error, prefix) in cases {
            let interface = error.into_interface("req-7");
            assert!(interface.to_string().starts_with(prefix), "{interface}");
            assert_eq!(interface.correlation_id(), "req-7");
        }
    }

    #[test]
    fn configuration_message_is_kept_for_diagnostics() {
        let interface =
            ApplicationError::from(ConfigError::Validation("logging.level `loud`".to_owned()))
                .into_interface("req-8");

        assert!(matches!(
            interface,
            InterfaceError::Internal { ref message, .. } if message.contains("logging.level")
        ));
        assert_eq!(
            interface.user_message(),
            "Salescope is not configured correctly. Check its settings."
        );
    }
}
