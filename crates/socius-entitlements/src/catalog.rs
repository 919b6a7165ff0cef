//! Purchasable Resource Catalog
//!
//! Prices are always recomputed here at initiation time; a client-supplied
//! amount is never trusted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{EntitlementError, Result};
use crate::resource::{DuePeriod, PrincipalId, Resource};

/// A course offered for sale
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Course {
    pub id: u64,
    pub title: String,
    /// List price in CLP
    pub price: i64,
    /// Active discount, 0-100
    pub discount_percent: u8,
    /// Whether the course is currently purchasable at all
    pub for_sale: bool,
}

impl Course {
    /// Price net of the active discount, integer CLP
    pub fn net_price(&self) -> i64 {
        self.price * i64::from(100 - u16::from(self.discount_percent).min(100)) / 100
    }
}

/// One user's monthly due ("cuota"), created by an admin or by enrollment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DueRecord {
    /// The REST-layer `cuotaUsuarioId`
    pub id: uuid::Uuid,
    pub principal: PrincipalId,
    pub period: DuePeriod,
    /// Fixed monthly amount in CLP
    pub amount: i64,
}

/// Read access to purchasable resources
pub trait Catalog: Send + Sync {
    fn course(&self, id: u64) -> Result<Option<Course>>;

    fn due(&self, id: uuid::Uuid) -> Result<Option<DueRecord>>;

    /// Resolve a due by its owning principal and period
    fn due_for(&self, principal: &PrincipalId, period: DuePeriod) -> Result<Option<DueRecord>>;
}

/// In-memory catalog (for development and tests)
pub struct MemoryCatalog {
    courses: RwLock<HashMap<u64, Course>>,
    dues: RwLock<HashMap<uuid::Uuid, DueRecord>>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(HashMap::new()),
            dues: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert_course(&self, course: Course) {
        self.courses.write().unwrap().insert(course.id, course);
    }

    pub fn insert_due(&self, due: DueRecord) {
        self.dues.write().unwrap().insert(due.id, due);
    }
}

impl Catalog for MemoryCatalog {
    fn course(&self, id: u64) -> Result<Option<Course>> {
        let courses = self
            .courses
            .read()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;
        Ok(courses.get(&id).cloned())
    }

    fn due(&self, id: uuid::Uuid) -> Result<Option<DueRecord>> {
        let dues = self
            .dues
            .read()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;
        Ok(dues.get(&id).cloned())
    }

    fn due_for(&self, principal: &PrincipalId, period: DuePeriod) -> Result<Option<DueRecord>> {
        let dues = self
            .dues
            .read()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;
        Ok(dues
            .values()
            .find(|d| &d.principal == principal && d.period == period)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_price_applies_discount() {
        let course = Course {
            id: 2,
            title: "Nutrición deportiva".into(),
            price: 20_000,
            discount_percent: 25,
            for_sale: true,
        };
        assert_eq!(course.net_price(), 15_000);
    }

    #[test]
    fn test_net_price_without_discount() {
        let course = Course {
            id: 1,
            title: "Antropometría".into(),
            price: 10_000,
            discount_percent: 0,
            for_sale: true,
        };
        assert_eq!(course.net_price(), 10_000);
    }
}
