use crate::core::types::{AccountId, Amount, Hash256};
use std::collections::HashMap;

/// A brand campaign funded by a payer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    /// 18-decimal fixed point, see `reward::PAY_RATE_SCALE`
    pub pay_rate: Amount,
    pub remaining_fund: Amount,
    /// Account the reward is drawn from
    pub funding_account: AccountId,
    pub active: bool,
}

pub trait CampaignEscrow {
    fn campaign(&self, memo_hash: &Hash256, payer: &AccountId) -> Option<Campaign>;
}

/// In-memory campaign table keyed by (memo hash, payer)
#[derive(Debug, Clone, Default)]
pub struct CampaignBook {
    campaigns: HashMap<(Hash256, AccountId), Campaign>,
}

impl CampaignBook {
    pub fn new() -> CampaignBook {
        CampaignBook::default()
    }

    pub fn insert(&mut self, memo_hash: Hash256, payer: AccountId, campaign: Campaign) {
        self.campaigns.insert((memo_hash, payer), campaign);
    }

    pub fn deactivate(&mut self, memo_hash: &Hash256, payer: &AccountId) {
        if let Some(campaign) = self.campaigns.get_mut(&(*memo_hash, *payer)) {
            campaign.active = false;
        }
    }

    /// Record an amount paid out of a campaign
    pub fn spend(&mut self, memo_hash: &Hash256, payer: &AccountId, amount: Amount) {
        if let Some(campaign) = self.campaigns.get_mut(&(*memo_hash, *payer)) {
            campaign.remaining_fund = campaign.remaining_fund.saturating_sub(amount);
        }
    }
}

impl CampaignEscrow for CampaignBook {
    fn campaign(&self, memo_hash: &Hash256, payer: &AccountId) -> Option<Campaign> {
        self.campaigns.get(&(*memo_hash, *payer)).cloned()
    }
}
