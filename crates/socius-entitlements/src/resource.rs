//! Principals and Purchasable Resources
//!
//! A `Resource` is the thing an entitlement grants access to: a course, or
//! one monthly due period. Adding a new entitlement kind here forces every
//! `match` in the engine to be revisited by the compiler.

use serde::{Deserialize, Serialize};

/// Opaque user identifier, as issued by the upstream auth layer
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One monthly due period (the "cuota" month)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DuePeriod {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl DuePeriod {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl std::fmt::Display for DuePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// What an entitlement is for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Resource {
    /// Paid access to a course
    Course(u64),

    /// Settlement of one monthly due
    MonthlyDue(DuePeriod),
}

impl Resource {
    /// Short tag for logs and payment references
    pub fn kind_str(&self) -> &'static str {
        match self {
            Resource::Course(_) => "curso",
            Resource::MonthlyDue(_) => "cuota",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Course(id) => write!(f, "curso:{id}"),
            Resource::MonthlyDue(period) => write!(f, "cuota:{period}"),
        }
    }
}
