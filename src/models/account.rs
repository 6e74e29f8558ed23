use serde::{Deserialize, Serialize};

use super::Id;

/// A seller account as listed in the dashboard's account switcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Id,
    pub display_name: String,
    pub markets: Vec<Market>,
    pub excluded: bool,
}

/// A regional marketplace under one [`Account`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: Id,
    pub excluded: bool,
    /// Whether the live session context currently points at this pair.
    /// Recomputed on every catalog refresh.
    pub is_currently_selected: bool,
    /// Set once every enabled report type has been extracted for this pair.
    pub processed: bool,
}

impl Account {
    /// Build an account, propagating account-level exclusion to every market.
    pub fn new(
        id: Id,
        display_name: impl Into<String>,
        market_ids: impl IntoIterator<Item = Id>,
        excluded: bool,
        market_excluded: impl Fn(&Id) -> bool,
    ) -> Self {
        let markets = market_ids
            .into_iter()
            .map(|market_id| Market {
                excluded: excluded || market_excluded(&market_id),
                id: market_id,
                is_currently_selected: false,
                processed: false,
            })
            .collect();

        Self {
            id,
            display_name: display_name.into(),
            markets,
            excluded,
        }
    }

    pub fn market(&self, market_id: &Id) -> Option<&Market> {
        self.markets.iter().find(|m| &m.id == market_id)
    }

    /// Markets that will be traversed, in catalog order.
    pub fn included_markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.iter().filter(|m| !m.excluded)
    }
}
