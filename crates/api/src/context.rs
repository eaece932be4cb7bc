//! Request context headers.

/// Header carrying the company every read and write is scoped to.
pub const COMPANY_HEADER: &str = "x-company-id";

/// Header carrying the financial year documents are numbered in.
pub const FINANCIAL_YEAR_HEADER: &str = "x-financial-year";

/// Header carrying the acting user, recorded on transfers and audit records.
pub const ACTOR_HEADER: &str = "x-actor-id";
