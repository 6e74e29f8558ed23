use serde::{Deserialize, Serialize};

use super::Id;

/// The (account, market) pair the live session is operating as.
///
/// Always read back from the page, never cached across a switch, since a
/// switch can silently fail or redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveContext {
    /// The merchant id the dashboard reports for the selection. Only known
    /// once the pair is live, and used for the storage layout.
    pub account_id: Id,
    pub market_id: Id,
    /// The catalog account (partner) the selection belongs to.
    pub parent_account_id: Id,
}

impl ActiveContext {
    /// True when this context is the given catalog pair.
    pub fn is_pair(&self, account: &Id, market: &Id) -> bool {
        &self.parent_account_id == account && &self.market_id == market
    }
}
