use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopswift_core::{CategoryId, DomainError, DomainResult, Entity, Patch};

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Product grouping. Names are unique (case-insensitively).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> CategoryId {
        self.id
    }
}

/// Category with its derived product count (active products only). Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Patch<String>,
    pub is_active: Option<bool>,
}

impl Category {
    pub fn create(request: NewCategory, now: DateTime<Utc>) -> DomainResult<Self> {
        let category = Self {
            id: CategoryId::new(),
            name: request.name.trim().to_string(),
            description: request.description,
            is_active: request.is_active,
            created_at: now,
            updated_at: None,
        };
        category.validate()?;
        Ok(category)
    }

    /// Merge a partial update. On validation failure the category is left untouched.
    pub fn apply_update(&mut self, update: CategoryUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        if let Some(name) = update.name {
            next.name = name.trim().to_string();
        }
        update.description.apply_to(&mut next.description);
        if let Some(active) = update.is_active {
            next.is_active = active;
        }
        next.validate()?;
        next.updated_at = Some(now);
        *self = next;
        Ok(())
    }

    /// Key used for the case-insensitive uniqueness rule.
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn has_name(&self, name: &str) -> bool {
        Self::name_key(&self.name) == Self::name_key(name)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.is_empty() {
            return Err(DomainError::validation("category name cannot be empty"));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "category name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return Err(DomainError::validation(format!(
                    "category description cannot exceed {MAX_DESCRIPTION_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_category(name: &str) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            description: None,
            is_active: true,
        }
    }

    #[test]
    fn names_compare_case_insensitively() {
        let category = Category::create(new_category("Lighting"), Utc::now()).unwrap();
        assert!(category.has_name(" lighting "));
        assert!(!category.has_name("Lights"));
    }

    #[test]
    fn rejects_overlong_description() {
        let mut request = new_category("Lighting");
        request.description = Some("x".repeat(501));
        assert!(matches!(
            Category::create(request, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn new_category_defaults_to_active_when_flag_is_absent() {
        let request: NewCategory = serde_json::from_str(r#"{"name": "Garden"}"#).unwrap();
        assert!(request.is_active);
    }

    #[test]
    fn update_can_clear_description() {
        let mut request = new_category("Lighting");
        request.description = Some("Lamps".to_string());
        let mut category = Category::create(request, Utc::now()).unwrap();

        category
            .apply_update(
                CategoryUpdate {
                    description: Patch::Clear,
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(category.description, None);
        assert_eq!(category.name, "Lighting");
    }
}
