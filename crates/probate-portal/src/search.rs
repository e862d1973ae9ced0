use probate_core::config::{parse_portal_date, PortalConfig};
use probate_core::error::{ProbateError, Result};
use probate_core::types::Metadata;

use crate::courts;

/// Metadata keys for per-run search overrides.
pub const PROCEEDING_KEY: &str = "proceeding";
pub const FILED_FROM_KEY: &str = "filedFrom";
pub const FILED_TO_KEY: &str = "filedTo";

/// Values entered into the file search form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub court_id: String,
    pub proceeding: String,
    pub filed_from: String,
    pub filed_to: String,
}

impl SearchCriteria {
    /// Criteria for a run: metadata first, `[portal]` config as fallback.
    ///
    /// The court must exist in the catalog and the dates must be MM/DD/YYYY
    /// with `from` not after `to`.
    pub fn resolve(metadata: &Metadata, config: &PortalConfig) -> Result<Self> {
        let court_id = metadata
            .county_id
            .clone()
            .unwrap_or_else(|| config.county_id.clone());
        let pick = |key: &str, fallback: &str| {
            metadata.get_str(key).unwrap_or(fallback).to_string()
        };
        let criteria = Self {
            court_id,
            proceeding: pick(PROCEEDING_KEY, &config.proceeding),
            filed_from: pick(FILED_FROM_KEY, &config.filed_from),
            filed_to: pick(FILED_TO_KEY, &config.filed_to),
        };
        criteria.validate()?;
        Ok(criteria)
    }

    fn validate(&self) -> Result<()> {
        if courts::by_id(&self.court_id).is_none() {
            return Err(ProbateError::Precondition(format!(
                "Unknown court id: {}",
                self.court_id
            )));
        }
        let from = parse_portal_date(&self.filed_from)
            .map_err(|e| ProbateError::Precondition(e.to_string()))?;
        let to = parse_portal_date(&self.filed_to)
            .map_err(|e| ProbateError::Precondition(e.to_string()))?;
        if from > to {
            return Err(ProbateError::Precondition(format!(
                "Filing date range is reversed: {} > {}",
                self.filed_from, self.filed_to
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probate_core::types::FailureKind;

    #[test]
    fn falls_back_to_config() {
        let criteria = SearchCriteria::resolve(&Metadata::default(), &PortalConfig::default()).unwrap();
        assert_eq!(
            criteria,
            SearchCriteria {
                court_id: "24".into(),
                proceeding: "PROBATE PETITION".into(),
                filed_from: "05/01/2025".into(),
                filed_to: "05/29/2025".into(),
            }
        );
    }

    #[test]
    fn metadata_overrides_config() {
        let meta = Metadata::with_county("31")
            .set(FILED_FROM_KEY, "01/02/2025")
            .set(FILED_TO_KEY, "01/31/2025");
        let criteria = SearchCriteria::resolve(&meta, &PortalConfig::default()).unwrap();
        assert_eq!(criteria.court_id, "31");
        assert_eq!(criteria.filed_from, "01/02/2025");
        assert_eq!(criteria.filed_to, "01/31/2025");
        assert_eq!(criteria.proceeding, "PROBATE PETITION");
    }

    #[test]
    fn rejects_bad_criteria() {
        let config = PortalConfig::default();

        let err = SearchCriteria::resolve(&Metadata::with_county("8"), &config).unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Precondition);
        assert!(err.to_string().contains("Unknown court id: 8"));

        let meta = Metadata::default().set(FILED_FROM_KEY, "2025-05-01");
        assert!(SearchCriteria::resolve(&meta, &config).is_err());

        let meta = Metadata::default()
            .set(FILED_FROM_KEY, "06/01/2025")
            .set(FILED_TO_KEY, "05/01/2025");
        let err = SearchCriteria::resolve(&meta, &config).unwrap_err();
        assert!(err.to_string().contains("reversed"));
    }
}
