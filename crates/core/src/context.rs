//! Request context handed to the engine by the (external) request layer.

use serde::{Deserialize, Serialize};

use crate::id::{CompanyId, UserId};
use crate::value_object::FinancialYear;

/// Already-authenticated scope of one engine call.
///
/// Immutable; the engine never derives company or actor from payload data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineContext {
    company_id: CompanyId,
    financial_year: FinancialYear,
    actor_id: UserId,
}

impl EngineContext {
    pub fn new(company_id: CompanyId, financial_year: FinancialYear, actor_id: UserId) -> Self {
        Self {
            company_id,
            financial_year,
            actor_id,
        }
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn financial_year(&self) -> &FinancialYear {
        &self.financial_year
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }
}
