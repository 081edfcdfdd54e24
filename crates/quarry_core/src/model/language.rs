//! Language domain model.
//!
//! # Responsibility
//! - Define the language record with its ISO code and default flag.
//! - Validate ISO codes before persistence.
//!
//! # Invariants
//! - Exactly one non-deleted language holds `is_default` at any time;
//!   enforced by the language repository, assumed by readers.
//! - ISO codes are compared case-insensitively.

use crate::model::entity::{Entity, EntityMeta, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ISO_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("hard-coded pattern must compile")
});

/// Language record backed by the `languages` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    id: Option<i64>,
    iso_code: String,
    culture_name: String,
    is_default: bool,
    meta: EntityMeta,
}

impl Language {
    /// Creates a new, not-yet-persisted language.
    ///
    /// The default flag starts as `false`; callers opt in via
    /// [`Language::set_default`].
    pub fn new(iso_code: impl Into<String>, culture_name: impl Into<String>) -> Self {
        Self {
            id: None,
            iso_code: iso_code.into(),
            culture_name: culture_name.into(),
            is_default: false,
            meta: EntityMeta::new(),
        }
    }

    pub(crate) fn hydrate(
        id: i64,
        iso_code: String,
        culture_name: String,
        is_default: bool,
        deleted_at: Option<i64>,
    ) -> Self {
        Self {
            id: Some(id),
            iso_code,
            culture_name,
            is_default,
            meta: EntityMeta::persisted(deleted_at),
        }
    }

    pub fn iso_code(&self) -> &str {
        &self.iso_code
    }

    pub fn culture_name(&self) -> &str {
        &self.culture_name
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn set_iso_code(&mut self, iso_code: impl Into<String>) {
        self.iso_code = iso_code.into();
        self.meta.mark_dirty("iso_code");
    }

    pub fn set_culture_name(&mut self, culture_name: impl Into<String>) {
        self.culture_name = culture_name.into();
        self.meta.mark_dirty("culture_name");
    }

    pub fn set_default(&mut self, is_default: bool) {
        self.is_default = is_default;
        self.meta.mark_dirty("is_default");
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Checks structural rules before any write is issued.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.culture_name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }
        if !ISO_CODE_PATTERN.is_match(&self.iso_code) {
            return Err(ValidationError::InvalidIsoCode {
                value: self.iso_code.clone(),
            });
        }
        Ok(())
    }
}

impl Entity for Language {
    type Id = i64;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}
