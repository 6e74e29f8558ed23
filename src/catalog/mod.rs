//! Account catalog and context switcher.
//!
//! The switcher menu is read once per session; afterwards only the live
//! (account, market) selection is re-read from the page.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::config::Exclusions;
use crate::driver::selectors::*;
use crate::driver::{pause, BrowserDriver};
use crate::error::SwitchError;
use crate::models::{Account, ActiveContext, Id};

/// One switcher group as returned by [`CATALOG_SCRIPT`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Anchor ids; anchors without one come back as `null`.
    #[serde(default)]
    pub markets: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountCatalog {
    exclusions: Exclusions,
    accounts: Vec<Account>,
    active: Option<ActiveContext>,
    processed: HashSet<(Id, Id)>,
    discovered: bool,
}

impl AccountCatalog {
    pub fn new(exclusions: Exclusions) -> Self {
        Self {
            exclusions,
            ..Self::default()
        }
    }

    /// Build the account list from switcher entries, applying exclusions.
    ///
    /// Entries whose ids cannot be used as directory names are dropped.
    pub fn from_entries(entries: Vec<CatalogEntry>, exclusions: Exclusions) -> Self {
        let mut catalog = Self::new(exclusions);
        catalog.load_entries(entries);
        catalog
    }

    fn load_entries(&mut self, entries: Vec<CatalogEntry>) {
        let exclusions = &self.exclusions;
        self.accounts = entries
            .into_iter()
            .filter_map(|entry| {
                let id = match Id::from_string_checked(entry.id) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping switcher entry");
                        return None;
                    }
                };
                let markets: Vec<Id> = entry
                    .markets
                    .into_iter()
                    .flatten()
                    .filter_map(|m| match Id::from_string_checked(m) {
                        Ok(id) => Some(id),
                        Err(e) => {
                            tracing::warn!(account = %id, error = %e, "Skipping market anchor");
                            None
                        }
                    })
                    .collect();
                let excluded = exclusions.excludes_merchant(id.as_str());
                Some(Account::new(
                    id,
                    entry.name.trim(),
                    markets,
                    excluded,
                    |market| exclusions.excludes_marketplace(market.as_str()),
                ))
            })
            .collect();
        self.discovered = true;
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn active(&self) -> Option<&ActiveContext> {
        self.active.as_ref()
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    /// Force the next [`discover`](Self::discover) to re-read the switcher.
    pub fn invalidate(&mut self) {
        self.discovered = false;
    }

    /// Open the switcher, read it if not yet cached, and refresh the live
    /// selection.
    pub async fn discover(&mut self, driver: &dyn BrowserDriver) -> anyhow::Result<()> {
        reveal_switcher(driver).await?;

        if !self.discovered {
            let value = driver.evaluate(CATALOG_SCRIPT).await?;
            let entries: Vec<CatalogEntry> = serde_json::from_value(value)?;
            self.load_entries(entries);
            tracing::info!(
                accounts = self.accounts.len(),
                markets = self.accounts.iter().map(|a| a.markets.len()).sum::<usize>(),
                "Account catalog discovered"
            );
        }

        self.refresh_active_context(driver).await?;
        Ok(())
    }

    /// Re-read which pair is live and update selection flags.
    pub async fn refresh_active_context(
        &mut self,
        driver: &dyn BrowserDriver,
    ) -> anyhow::Result<Option<&ActiveContext>> {
        let merchant = driver
            .attribute(PARTNER_SWITCHER, ATTR_MERCHANT_SELECTION)
            .await?;
        let marketplace = driver
            .attribute(PARTNER_SWITCHER, ATTR_MARKETPLACE_SELECTION)
            .await?;
        let partner = driver
            .attribute(PARTNER_SWITCHER, ATTR_PARTNER_SELECTION)
            .await?;

        let active = match (merchant, marketplace, partner) {
            (Some(merchant), Some(marketplace), Some(partner)) => {
                let merchant = merchant.trim_start_matches(MERCHANT_ID_PREFIX);
                let partner = partner.trim_start_matches(PARTNER_ID_PREFIX);
                match (
                    Id::from_string_checked(merchant),
                    Id::from_string_checked(marketplace),
                    Id::from_string_checked(partner),
                ) {
                    (Ok(account_id), Ok(market_id), Ok(parent_account_id)) => Some(ActiveContext {
                        account_id,
                        market_id,
                        parent_account_id,
                    }),
                    _ => {
                        tracing::warn!("Live selection carries unusable ids");
                        None
                    }
                }
            }
            _ => None,
        };

        self.apply_active_context(active);
        Ok(self.active.as_ref())
    }

    /// Record the live selection and recompute every market's flags.
    pub fn apply_active_context(&mut self, active: Option<ActiveContext>) {
        for account in &mut self.accounts {
            for market in &mut account.markets {
                market.is_currently_selected = active
                    .as_ref()
                    .is_some_and(|ctx| ctx.is_pair(&account.id, &market.id));
                market.processed = self
                    .processed
                    .contains(&(account.id.clone(), market.id.clone()));
            }
        }
        self.active = active;
    }

    pub fn mark_processed(&mut self, account_id: &Id, market_id: &Id) {
        self.processed
            .insert((account_id.clone(), market_id.clone()));
        if let Some(market) = self
            .accounts
            .iter_mut()
            .find(|a| &a.id == account_id)
            .and_then(|a| a.markets.iter_mut().find(|m| &m.id == market_id))
        {
            market.processed = true;
        }
    }

    /// Pairs to traverse, in catalog order, exclusions removed.
    pub fn targets(&self) -> Vec<(Id, Id)> {
        self.accounts
            .iter()
            .filter(|a| !a.excluded)
            .flat_map(|a| a.included_markets().map(|m| (a.id.clone(), m.id.clone())))
            .collect()
    }

    pub fn is_selected(&self, account_id: &Id, market_id: &Id) -> bool {
        self.market(account_id, market_id)
            .is_some_and(|m| m.is_currently_selected)
    }

    /// Pairs marked processed, in catalog order.
    pub fn processed_pairs(&self) -> Vec<(Id, Id)> {
        self.accounts
            .iter()
            .flat_map(|a| {
                a.markets
                    .iter()
                    .filter(|m| m.processed)
                    .map(move |m| (a.id.clone(), m.id.clone()))
            })
            .collect()
    }

    pub fn is_processed(&self, account_id: &Id, market_id: &Id) -> bool {
        self.processed
            .contains(&(account_id.clone(), market_id.clone()))
    }

    fn market(&self, account_id: &Id, market_id: &Id) -> Option<&crate::models::Market> {
        self.accounts
            .iter()
            .find(|a| &a.id == account_id)
            .and_then(|a| a.market(market_id))
    }

    /// Switch the live session to `(account_id, market_id)`.
    ///
    /// The anchor is clicked directly first; if that fails or lands on the
    /// wrong pair, the dropdown is reopened and the anchor clicked again.
    /// Either way the reports page is reloaded and the selection re-read.
    pub async fn switch_to(
        &mut self,
        driver: &dyn BrowserDriver,
        account_id: &Id,
        market_id: &Id,
        reports_url: &str,
        settle: Duration,
    ) -> Result<ActiveContext, SwitchError> {
        if self.market(account_id, market_id).is_none() {
            return Err(SwitchError::NotInCatalog {
                account: account_id.clone(),
                market: market_id.clone(),
            });
        }
        let anchor = market_anchor(account_id.as_str(), market_id.as_str());

        let first = match driver.click(&anchor).await {
            Ok(()) => {
                self.land(driver, account_id, market_id, reports_url, settle)
                    .await
            }
            Err(e) => Err(SwitchError::Driver(e)),
        };
        match first {
            Ok(active) => return Ok(active),
            Err(e) => {
                tracing::warn!(
                    account = %account_id,
                    market = %market_id,
                    error = %e,
                    "Switch failed, retrying through the dropdown"
                );
            }
        }

        async {
            driver.click(SWITCHER_BUTTON).await?;
            driver.evaluate(REVEAL_SWITCHER_SCRIPT).await?;
            driver.click(&anchor).await
        }
        .await
        .map_err(SwitchError::Driver)?;

        self.land(driver, account_id, market_id, reports_url, settle)
            .await
    }

    async fn land(
        &mut self,
        driver: &dyn BrowserDriver,
        account_id: &Id,
        market_id: &Id,
        reports_url: &str,
        settle: Duration,
    ) -> Result<ActiveContext, SwitchError> {
        pause(settle).await;
        driver
            .goto(reports_url)
            .await
            .map_err(SwitchError::Driver)?;
        self.discover(driver).await.map_err(SwitchError::Driver)?;

        match self.active.as_ref() {
            Some(active) if active.is_pair(account_id, market_id) => {
                tracing::info!(
                    account = %account_id,
                    market = %market_id,
                    merchant = %active.account_id,
                    "Switched account context"
                );
                Ok(active.clone())
            }
            actual => Err(SwitchError::Mismatch {
                expected_account: account_id.clone(),
                expected_market: market_id.clone(),
                actual: actual.cloned(),
            }),
        }
    }
}

async fn reveal_switcher(driver: &dyn BrowserDriver) -> anyhow::Result<()> {
    driver.wait_for(SWITCHER, false).await?;
    driver.click(SWITCHER_BUTTON).await?;
    driver.wait_for(SWITCHER_CHECKBOX, false).await?;
    driver.evaluate(REVEAL_SWITCHER_SCRIPT).await?;
    Ok(())
}
