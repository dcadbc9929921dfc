// Referral network: sponsors rent commission eligibility per second
//
// Nodes live in an arena and point at their parent by index. Each node holds
// a rent rate and an expiration; its prepaid balance is implied as
// `rent * (expiration - now)`. After expiration the rent halves every week
// (linearly between halvings) instead of dropping to zero, so a lapsed
// sponsor fades out of the commission walk gradually.
//
// Every mutation is split into a `plan_*` step that computes the next
// records without touching the arena and `apply`, so the engine can persist
// a change before it becomes visible.

use crate::core::types::{AccountId, Amount, TokenId};
use crate::error::{PorError, Result};
use crate::utils::sha256_digest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const WEEK: u64 = 604_800;
/// Decay half-life of an expired node's rent
pub const HALF_LIFE: u64 = WEEK;
/// Seconds of rent difference charged for an organic increase
pub const UPGRADE_WINDOW: u64 = WEEK / 2;
/// Seconds of rent difference charged to skip the organic cap
pub const ESCALATE_WINDOW: u64 = UPGRADE_WINDOW * 3;
/// A live node may not lower its rent this soon after an organic change
pub const RENT_COOLDOWN: u64 = UPGRADE_WINDOW;
/// Parts-per-billion scale of native cutback and commission rates
pub const RATE_SCALE: Amount = 1_000_000_000;

pub type NodeIndex = usize;

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Cutback {
    /// `None` pays back in the native reward unit
    pub token: Option<TokenId>,
    pub rate: u64,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralNode {
    pub account: AccountId,
    pub parent: Option<NodeIndex>,
    pub rent: Amount,
    pub expiration: u64,
    pub rent_changed_at: u64,
    pub cutback: Cutback,
}

/// A node as persisted and as carried in change plans: the parent is
/// referenced by account rather than by arena index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct NodeRecord {
    pub account: AccountId,
    pub parent: Option<AccountId>,
    pub rent: Amount,
    pub expiration: u64,
    pub rent_changed_at: u64,
    pub cutback: Cutback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub rent: Amount,
    pub balance: Amount,
    pub expiration: u64,
    pub decaying_rent: Amount,
    pub parent: Option<AccountId>,
    pub cutback: Cutback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentUpdate {
    pub rent: Amount,
    pub expiration: u64,
    pub fee: Amount,
    pub deposited: Amount,
    pub withdrawn: Amount,
}

/// How the commission payee is picked along the parent chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommissionPolicy {
    /// The first node with non-zero effective rent
    FirstLive,
    /// Each node is hit with probability about `1 - 2^(-rent / rent_unit)`
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutbackPayment {
    pub token: Option<TokenId>,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommissionRoute {
    Paid {
        payee: AccountId,
        value: Amount,
        cutback: Option<CutbackPayment>,
    },
    Lost {
        value: Amount,
    },
}

/// `value` halved once per `half_life` of `elapsed`, linear in between
pub fn decay(value: Amount, elapsed: u128, half_life: u128) -> Amount {
    if half_life == 0 {
        return 0;
    }
    let halvings = elapsed / half_life;
    if halvings >= 128 {
        return 0;
    }
    let halved = value >> halvings;
    let remainder = elapsed % half_life;
    // (halved / 2) * remainder fits: remainder < half_life <= u64::MAX
    match (halved >> 1).checked_mul(remainder) {
        Some(product) => halved - product / half_life,
        None => halved - (halved >> 1) / half_life * remainder,
    }
}

impl ReferralNode {
    fn empty(account: AccountId) -> ReferralNode {
        ReferralNode {
            account,
            parent: None,
            rent: 0,
            expiration: 0,
            rent_changed_at: 0,
            cutback: Cutback::default(),
        }
    }

    pub fn is_live(&self, now: u64) -> bool {
        now < self.expiration
    }

    pub fn balance(&self, now: u64) -> Amount {
        if !self.is_live(now) {
            return 0;
        }
        self.rent
            .saturating_mul((self.expiration - now) as Amount)
    }

    /// Rent while funded, decayed rent after expiration
    pub fn effective_rent(&self, now: u64) -> Amount {
        if self.is_live(now) {
            self.rent
        } else {
            decay(
                self.rent,
                (now - self.expiration) as u128,
                HALF_LIFE as u128,
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefNetwork {
    nodes: Vec<ReferralNode>,
    index: HashMap<AccountId, NodeIndex>,
    max_depth: usize,
}

impl RefNetwork {
    pub fn new(max_depth: usize) -> RefNetwork {
        RefNetwork {
            nodes: Vec::new(),
            index: HashMap::new(),
            max_depth,
        }
    }

    pub fn from_records(records: &[NodeRecord], max_depth: usize) -> RefNetwork {
        let mut network = RefNetwork::new(max_depth);
        network.apply(records);
        network
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, account: &AccountId) -> Option<&ReferralNode> {
        self.index.get(account).map(|i| &self.nodes[*i])
    }

    pub fn parent_of(&self, account: &AccountId) -> Option<AccountId> {
        self.node(account)
            .and_then(|node| node.parent)
            .map(|i| self.nodes[i].account)
    }

    fn record(&self, account: &AccountId) -> NodeRecord {
        let node = self
            .node(account)
            .cloned()
            .unwrap_or_else(|| ReferralNode::empty(*account));
        NodeRecord {
            account: node.account,
            parent: node.parent.map(|i| self.nodes[i].account),
            rent: node.rent,
            expiration: node.expiration,
            rent_changed_at: node.rent_changed_at,
            cutback: node.cutback,
        }
    }

    fn slot(&mut self, account: AccountId) -> NodeIndex {
        if let Some(i) = self.index.get(&account) {
            return *i;
        }
        self.nodes.push(ReferralNode::empty(account));
        let i = self.nodes.len() - 1;
        self.index.insert(account, i);
        i
    }

    /// Upsert records; parents missing from the arena are created empty
    pub fn apply(&mut self, records: &[NodeRecord]) {
        for record in records {
            let parent = record.parent.map(|p| self.slot(p));
            let i = self.slot(record.account);
            let node = &mut self.nodes[i];
            node.parent = parent;
            node.rent = record.rent;
            node.expiration = record.expiration;
            node.rent_changed_at = record.rent_changed_at;
            node.cutback = record.cutback.clone();
        }
    }

    pub fn query(&self, account: &AccountId, now: u64) -> Option<NodeInfo> {
        let node = self.node(account)?;
        Some(NodeInfo {
            rent: node.rent,
            balance: node.balance(now),
            expiration: node.expiration,
            decaying_rent: node.effective_rent(now),
            parent: self.parent_of(account),
            cutback: node.cutback.clone(),
        })
    }

    /// Point `caller` at `parent`, refusing any link that closes a cycle
    pub fn plan_attach(&self, caller: &AccountId, parent: &AccountId) -> Result<Vec<NodeRecord>> {
        let mut ancestor = Some(*parent);
        let mut depth = 0;
        while let Some(account) = ancestor {
            if account == *caller {
                return Err(PorError::CircularReference);
            }
            depth += 1;
            if depth > self.max_depth {
                return Err(PorError::ChainTooDeep);
            }
            ancestor = self.parent_of(&account);
        }

        let mut records = Vec::with_capacity(2);
        if self.node(parent).is_none() {
            records.push(self.record(parent));
        }
        let mut record = self.record(caller);
        record.parent = Some(*parent);
        records.push(record);
        Ok(records)
    }

    pub fn attach(&mut self, caller: &AccountId, parent: &AccountId) -> Result<()> {
        let records = self.plan_attach(caller, parent)?;
        self.apply(&records);
        Ok(())
    }

    /// Combined deposit/withdraw and rent change.
    ///
    /// `fund > 0` deposits, `fund < 0` withdraws (capped at the balance).
    /// `new_rent == 0` keeps the current rent. Raising rent costs
    /// `UPGRADE_WINDOW` seconds of the difference while staying under the
    /// organic cap (the rent may grow by up to 100% per week since the last
    /// organic change), or `ESCALATE_WINDOW` seconds of it with `escalate`.
    /// A node with no rent can only escalate.
    pub fn plan_update(
        &self,
        caller: &AccountId,
        fund: i128,
        new_rent: Amount,
        escalate: bool,
        now: u64,
    ) -> Result<(NodeRecord, RentUpdate)> {
        let mut record = self.record(caller);
        let live = now < record.expiration;
        let (current_rent, mut balance) = match self.node(caller) {
            Some(node) if live => (node.rent, node.balance(now)),
            Some(node) => (node.effective_rent(now), 0),
            None => (0, 0),
        };

        if fund == 0 && new_rent == 0 {
            return Err(PorError::Noop);
        }
        let target_rent = if new_rent == 0 { current_rent } else { new_rent };

        let mut deposited = 0;
        let mut withdrawn = 0;
        if fund > 0 {
            if target_rent == 0 {
                return Err(PorError::NoRent);
            }
            deposited = fund as Amount;
            balance = balance
                .checked_add(deposited)
                .ok_or_else(|| PorError::Overflow("node balance".to_string()))?;
        } else if fund < 0 {
            if balance == 0 {
                return Err(PorError::NoBalance);
            }
            withdrawn = fund.unsigned_abs().min(balance);
            balance -= withdrawn;
        }

        let mut fee: Amount = 0;
        if target_rent > current_rent {
            let raise = target_rent - current_rent;
            if escalate {
                fee = raise.saturating_mul(ESCALATE_WINDOW as Amount);
            } else {
                // nothing grows organically from zero rent
                if current_rent == 0 {
                    return Err(PorError::NoEscalate);
                }
                if !live {
                    return Err(PorError::Expired);
                }
                let since = now.saturating_sub(record.rent_changed_at).min(WEEK);
                let cap =
                    current_rent + current_rent.saturating_mul(since as Amount) / WEEK as Amount;
                if target_rent > cap {
                    return Err(PorError::NoEscalate);
                }
                fee = raise.saturating_mul(UPGRADE_WINDOW as Amount);
            }
            if balance < fee {
                return Err(PorError::UpgradeFeeExceedsBalance);
            }
            balance -= fee;
            // an escalation is paid for in full and starts no cooldown
            if !escalate {
                record.rent_changed_at = now;
            }
        } else if target_rent < current_rent {
            if live && now < record.rent_changed_at.saturating_add(RENT_COOLDOWN) {
                return Err(PorError::Cooldown);
            }
            record.rent_changed_at = now;
        }

        if target_rent == 0 {
            return Err(PorError::NoRent);
        }
        let duration = balance / target_rent;
        if deposited > 0 && duration == 0 {
            return Err(PorError::NoDuration);
        }
        let duration = u64::try_from(duration)
            .map_err(|_| PorError::Overflow("rent duration".to_string()))?;

        record.rent = target_rent;
        record.expiration = now
            .checked_add(duration)
            .ok_or_else(|| PorError::Overflow("expiration".to_string()))?;

        Ok((
            record.clone(),
            RentUpdate {
                rent: record.rent,
                expiration: record.expiration,
                fee,
                deposited,
                withdrawn,
            },
        ))
    }

    pub fn update(
        &mut self,
        caller: &AccountId,
        fund: i128,
        new_rent: Amount,
        escalate: bool,
        now: u64,
    ) -> Result<RentUpdate> {
        let (record, update) = self.plan_update(caller, fund, new_rent, escalate, now)?;
        self.apply(&[record]);
        Ok(update)
    }

    pub fn deposit(&mut self, caller: &AccountId, amount: Amount, now: u64) -> Result<RentUpdate> {
        let fund = i128::try_from(amount).map_err(|_| PorError::Overflow("deposit".to_string()))?;
        if fund == 0 {
            return Err(PorError::ZeroAmount);
        }
        self.update(caller, fund, 0, false, now)
    }

    pub fn withdraw(&mut self, caller: &AccountId, amount: Amount, now: u64) -> Result<RentUpdate> {
        let fund = i128::try_from(amount).map_err(|_| PorError::Overflow("withdraw".to_string()))?;
        if fund == 0 {
            return Err(PorError::ZeroAmount);
        }
        self.update(caller, -fund, 0, false, now)
    }

    pub fn plan_set_cutback(
        &self,
        caller: &AccountId,
        token: Option<TokenId>,
        rate: u64,
        decimals: u8,
    ) -> Result<NodeRecord> {
        match token {
            None if rate as Amount > RATE_SCALE => {
                return Err(PorError::Overflow("native cutback rate".to_string()))
            }
            Some(_) if 10u128.checked_pow(decimals as u32).is_none() => {
                return Err(PorError::Overflow("cutback decimals".to_string()))
            }
            _ => {}
        }
        let mut record = self.record(caller);
        record.cutback = Cutback {
            token,
            rate,
            decimals,
        };
        Ok(record)
    }

    pub fn set_cutback(
        &mut self,
        caller: &AccountId,
        token: Option<TokenId>,
        rate: u64,
        decimals: u8,
    ) -> Result<()> {
        let record = self.plan_set_cutback(caller, token, rate, decimals)?;
        self.apply(&[record]);
        Ok(())
    }

    /// Walk up from the miner's node to pick the commission payee.
    ///
    /// A miner whose own node is picked gets nothing extra: the commission
    /// is lost, like it is when no node on the chain qualifies.
    pub fn route_commission(
        &self,
        miner: &AccountId,
        value: Amount,
        now: u64,
        policy: CommissionPolicy,
        rent_unit: Amount,
        seed: &[u8],
    ) -> CommissionRoute {
        let mut current = self.index.get(miner).copied();
        let mut depth: u32 = 0;
        while let Some(i) = current {
            if depth as usize > self.max_depth {
                break;
            }
            let node = &self.nodes[i];
            let rent = node.effective_rent(now);
            let hit = match policy {
                CommissionPolicy::FirstLive => rent > 0,
                CommissionPolicy::Weighted => {
                    rent > 0 && weighted_hit(rent, rent_unit, seed, depth)
                }
            };
            if hit {
                if node.account == *miner {
                    break;
                }
                return CommissionRoute::Paid {
                    payee: node.account,
                    value,
                    cutback: cutback_payment(&node.cutback, value),
                };
            }
            current = node.parent;
            depth += 1;
        }
        CommissionRoute::Lost { value }
    }
}

fn cutback_payment(cutback: &Cutback, value: Amount) -> Option<CutbackPayment> {
    if cutback.rate == 0 {
        return None;
    }
    let scale = match cutback.token {
        None => RATE_SCALE,
        Some(_) => 10u128.checked_pow(cutback.decimals as u32)?,
    };
    let amount = value.checked_mul(cutback.rate as Amount)? / scale;
    (amount > 0).then_some(CutbackPayment {
        token: cutback.token,
        amount,
    })
}

/// Deterministic draw against a miss probability of `2^(-rent / rent_unit)`
fn weighted_hit(rent: Amount, rent_unit: Amount, seed: &[u8], depth: u32) -> bool {
    let mut input = seed.to_vec();
    input.extend_from_slice(&depth.to_le_bytes());
    let digest = sha256_digest(&input);
    let draw = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as Amount;
    let miss = decay(1 << 32, rent, rent_unit.max(1));
    draw >= miss
}
