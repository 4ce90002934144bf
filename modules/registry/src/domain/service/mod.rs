//! Domain services.
//!
//! Services translate validated inputs into repository writes plus job
//! submissions, enforcing the state-machine preconditions. Every
//! state-altering operation runs its entity write and its job insert in a
//! single repository transaction.

mod auth;
mod mapping;
mod projector;
mod system;
mod tenant;

pub use auth::AuthService;
pub use mapping::MappingService;
pub use projector::{AuthProjector, StatusProjector, TenantTransition};
pub use system::SystemService;
pub use tenant::TenantService;

use std::collections::HashMap;

use registry_db::PageCursor;

use crate::domain::error::{DomainError, Params, Result};
use crate::domain::model::PageRequest;

/// Decode an optional page token.
pub(crate) fn decode_cursor(page: &PageRequest) -> Result<Option<PageCursor>> {
    match page.page_token.as_deref() {
        None | Some("") => Ok(None),
        Some(token) => Ok(Some(PageCursor::decode(token).map_err(DomainError::from)?)),
    }
}

/// Reject blank keys or values in a label/property map on partial updates.
pub(crate) fn check_label_map(id: &str, map: &HashMap<String, String>) -> Result<()> {
    for (k, v) in map {
        if k.trim().is_empty() || v.trim().is_empty() {
            let mut params = Params::new();
            params.insert("key".to_owned(), k.clone());
            return Err(DomainError::invalid_argument(id.to_owned(), params));
        }
    }
    Ok(())
}

/// Merge `patch` into an existing JSON label object.
pub(crate) fn merge_labels(
    existing: Option<&sea_orm::JsonValue>,
    patch: &HashMap<String, String>,
) -> Option<sea_orm::JsonValue> {
    let mut merged = crate::domain::model::labels_from_json(existing);
    for (k, v) in patch {
        merged.insert(k.clone(), v.clone());
    }
    crate::domain::model::labels_to_json(&merged)
}

/// Drop `keys` from an existing JSON label object; unknown keys are a no-op.
pub(crate) fn remove_labels(
    existing: Option<&sea_orm::JsonValue>,
    keys: &[String],
) -> Option<sea_orm::JsonValue> {
    let mut merged = crate::domain::model::labels_from_json(existing);
    for key in keys {
        merged.remove(key);
    }
    crate::domain::model::labels_to_json(&merged)
}
