//! Entity trait: identity + continuity across state changes.

use crate::id::CompanyId;

/// Company-owned entity with a stable identity.
///
/// Every persisted engine record belongs to exactly one company; stores key
/// all lookups by `(company_id, id)` so a record can never leak across tenants.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Owning company (tenant boundary).
    fn company_id(&self) -> CompanyId;

    /// True when the entity belongs to `company_id`.
    fn is_owned_by(&self, company_id: CompanyId) -> bool {
        self.company_id() == company_id
    }
}
