use partner_match_store::StoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{message}")]
    NotFound {
        entity: &'static str,
        message: String,
    },
    #[error("{message}")]
    Conflict { message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn not_found_entity(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { entity, .. } => Some(*entity),
            _ => None,
        }
    }
}

/// Parses a canonical identifier, reporting `field` on failure.
pub fn parse_uuid(field: &'static str, raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::Validation {
        field,
        message: format!("{field} should be a uuid string"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uuid_reports_offending_field() {
        let error = parse_uuid("partner_id", "nope").expect_err("malformed id");
        assert!(matches!(
            error,
            ServiceError::Validation { field: "partner_id", .. }
        ));
        assert_eq!(error.to_string(), "partner_id: partner_id should be a uuid string");

        let parsed =
            parse_uuid("partner_id", " 11111111-1111-1111-1111-111111111111 ").expect("valid id");
        assert_eq!(parsed.to_string(), "11111111-1111-1111-1111-111111111111");
    }
}
