// The commit/claim engine: two-phase settlement of proof-of-payment rewards
//
// A miner first commits a header-backed, merkle-proven transaction whose
// memo names a brand. Competing commits for the same (block, memo) key are
// settled by transaction id: the numerically smallest txid wins. Once the
// commit window closes the winner can claim, which pays the beneficiary
// registered for the miner's key and routes a commission up the referral
// tree.
//
// Every public operation follows the same shape: read state, compute the
// complete next state and ledger batch, apply the ledger batch, persist the
// changeset in one sled transaction, and only then update the in-memory
// tables. An error at any step before the sled commit leaves nothing behind.

use crate::config::EngineConfig;
use crate::core::bounty::{verify_bounty, BountyLimits, BountyProof};
use crate::core::events::Event;
use crate::core::header::{display_hash, BlockHeader};
use crate::core::identity::{derive_identity, MinerIdentity, MinerRegistry};
use crate::core::merkle::MerkleProof;
use crate::core::referral::{
    CommissionRoute, CutbackPayment, NodeInfo, RefNetwork, RentUpdate, RATE_SCALE,
};
use crate::core::reward::{check_work, compute_reward, parse_memo, Reward, RewardParams};
use crate::core::target::hash_value;
use crate::core::transaction::{key_in_input, pkh_in_output, TxFields};
use crate::core::types::{
    AccountId, Amount, BlockCommitment, ClaimKey, Hash256, MinerKey, PendingClaim, PubKeyHash,
    TokenId,
};
use crate::error::{PorError, Result};
use crate::ledger::{BalanceLedger, CampaignEscrow, LedgerOp};
use crate::storage::{Changeset, Store};
use crate::utils::{sha256_digest, Clock};
use log::{debug, error, info};
use std::collections::HashMap;

/// The source block a commit refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    /// Raw 80-byte header, recorded on first use
    Header(Vec<u8>),
    /// Hash of a block recorded earlier by `commit_block` or a commit
    Committed(Hash256),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitProof {
    pub block: BlockRef,
    pub merkle_proof: Vec<u8>,
    pub merkle_index: u32,
    pub tx: TxFields,
    /// Brand length within the memo, 0 for the whole memo
    pub memo_length: usize,
    pub input_index: u32,
    pub pubkey_pos: usize,
    /// Campaign payer, `None` for the native brand
    pub payer: Option<AccountId>,
}

/// The transaction whose output the mining transaction's input spends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTx {
    pub tx: TxFields,
    pub pkh_pos: usize,
}

/// The claimant's copy of the committed parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub block_hash: Hash256,
    pub memo_hash: Hash256,
    pub payer: Option<AccountId>,
    pub amount: Amount,
    pub timestamp: u32,
    pub miner_key: MinerKey,
    pub skip_commission: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub key: ClaimKey,
    pub claim: PendingClaim,
    pub reward: Reward,
    pub events: Vec<Event>,
}

impl ClaimRequest {
    /// Request that repeats a pending claim's parameters verbatim
    pub fn for_pending(key: &ClaimKey, claim: &PendingClaim) -> ClaimRequest {
        ClaimRequest {
            block_hash: key.block_hash,
            memo_hash: key.memo_hash,
            payer: claim.payer,
            amount: claim.amount,
            timestamp: claim.timestamp,
            miner_key: claim.miner_key.clone(),
            skip_commission: false,
        }
    }
}

pub struct PorEngine<L: BalanceLedger, E: CampaignEscrow> {
    config: EngineConfig,
    ledger: L,
    escrow: E,
    clock: Box<dyn Clock>,
    store: Store,
    blocks: HashMap<Hash256, BlockCommitment>,
    claims: HashMap<ClaimKey, PendingClaim>,
    miners: MinerRegistry,
    network: RefNetwork,
}

impl<L: BalanceLedger, E: CampaignEscrow> PorEngine<L, E> {
    /// Open the store at `config.db_path` and load its tables
    pub fn open(config: EngineConfig, ledger: L, escrow: E, clock: Box<dyn Clock>) -> Result<Self> {
        let store = Store::open(&config.db_path)?;
        PorEngine::with_store(config, store, ledger, escrow, clock)
    }

    pub fn with_store(
        config: EngineConfig,
        store: Store,
        ledger: L,
        escrow: E,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let blocks = store
            .load_blocks()?
            .into_iter()
            .map(|block| (block.block_hash, block))
            .collect();
        let claims = store.load_claims()?.into_iter().collect();
        let miners = MinerRegistry::from_entries(store.load_miners()?);
        let network = RefNetwork::from_records(&store.load_nodes()?, config.max_referral_depth);
        info!(
            "Engine loaded: {} miners, {} referral nodes",
            miners.len(),
            network.len()
        );
        Ok(PorEngine {
            config,
            ledger,
            escrow,
            clock,
            store,
            blocks,
            claims,
            miners,
            network,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn escrow_mut(&mut self) -> &mut E {
        &mut self.escrow
    }

    pub fn pending(&self, key: &ClaimKey) -> Option<&PendingClaim> {
        self.claims.get(key)
    }

    pub fn block(&self, block_hash: &Hash256) -> Option<&BlockCommitment> {
        self.blocks.get(block_hash)
    }

    pub fn identity(&self, pkh: &PubKeyHash) -> Option<&MinerIdentity> {
        self.miners.get(pkh)
    }

    pub fn node(&self, account: &AccountId) -> Option<NodeInfo> {
        self.network.query(account, self.clock.now())
    }

    /// Force committed state to disk
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    fn check_commit_window(&self, timestamp: u32, now: u64) -> Result<()> {
        if now >= u64::from(timestamp) + self.config.commit_window_secs {
            return Err(PorError::BlockTooOld);
        }
        Ok(())
    }

    fn verify_header(&self, raw: &[u8], now: u64) -> Result<BlockCommitment> {
        let header = BlockHeader::parse(raw)?;
        let block_hash = header.verify_work()?;
        self.check_commit_window(header.timestamp, now)?;
        Ok(BlockCommitment {
            block_hash,
            merkle_root: header.merkle_root,
            bits: header.bits,
            timestamp: header.timestamp,
        })
    }

    /// Record a header ahead of the commits that will reference it
    pub fn commit_block(&mut self, header: &[u8]) -> Result<Vec<Event>> {
        let now = self.clock.now();
        let block = self.verify_header(header, now)?;
        if self.blocks.contains_key(&block.block_hash) {
            return Err(PorError::BlockCommitted);
        }

        let mut changes = Changeset::new();
        changes.put_block(&block)?;
        self.store.commit(&changes)?;

        info!("Block {} committed", display_hash(&block.block_hash));
        let event = Event::BlockCommitted {
            block_hash: block.block_hash,
            timestamp: block.timestamp,
        };
        self.blocks.insert(block.block_hash, block);
        Ok(vec![event])
    }

    /// Pay rate and fund ceiling for a brand
    fn campaign_terms(
        &self,
        memo_hash: &Hash256,
        brand: &[u8],
        payer: Option<AccountId>,
    ) -> Result<(Amount, Amount)> {
        match payer {
            None if brand == self.config.native_brand.as_bytes() => {
                Ok((self.config.native_pay_rate, Amount::MAX))
            }
            None => Err(PorError::BrandNotActive),
            Some(payer) => self
                .escrow
                .campaign(memo_hash, &payer)
                .filter(|campaign| campaign.active)
                .map(|campaign| (campaign.pay_rate, campaign.remaining_fund))
                .ok_or(PorError::BrandNotActive),
        }
    }

    fn miner_key(
        tx: &TxFields,
        input_index: u32,
        pubkey_pos: usize,
        dependency: Option<&DependencyTx>,
    ) -> Result<MinerKey> {
        let input = tx.input(input_index)?;
        if let Some(key) = key_in_input(&input.script, pubkey_pos)? {
            return Ok(key);
        }
        match dependency {
            Some(dependency) => {
                let pkh = pkh_from_dependency(dependency, &input.prev_txid, input.prev_index)?;
                Ok(MinerKey::PubKeyHash(pkh))
            }
            None => Ok(MinerKey::Outpoint {
                txid: input.prev_txid,
                index: input.prev_index,
            }),
        }
    }

    /// Verify a mining proof and record it as the pending claim for its key
    pub fn commit(
        &mut self,
        proof: &CommitProof,
        dependency: Option<&DependencyTx>,
        bounty: Option<&BountyProof>,
    ) -> Result<CommitReceipt> {
        let now = self.clock.now();
        let (block, new_block) = match &proof.block {
            BlockRef::Header(raw) => {
                let block = self.verify_header(raw, now)?;
                let new_block = !self.blocks.contains_key(&block.block_hash);
                (block, new_block)
            }
            BlockRef::Committed(hash) => {
                let block = self.blocks.get(hash).cloned().ok_or(PorError::NoSuchBlock)?;
                self.check_commit_window(block.timestamp, now)?;
                (block, false)
            }
        };

        let txid = proof.tx.txid();
        MerkleProof::new(proof.merkle_index, proof.merkle_proof.clone())
            .verify(&txid, &block.merkle_root)?;

        let memo = proof.tx.memo()?;
        let memo_claim = parse_memo(&memo.payload, proof.memo_length, self.config.max_memo_length)?;
        let memo_hash = memo_hash(&memo_claim.brand);
        let (pay_rate, fund) = self.campaign_terms(&memo_hash, &memo_claim.brand, proof.payer)?;
        check_work(&txid, &memo_claim.required_work)?;

        let miner_key =
            Self::miner_key(&proof.tx, proof.input_index, proof.pubkey_pos, dependency)?;

        let mut params = RewardParams::new(block.bits, pay_rate);
        params.multiplier = memo_claim.multiplier;
        if let Some(bounty) = bounty {
            let limits = BountyLimits {
                window_secs: self.config.bounty_window_secs,
                max_recipients: self.config.max_bounty_recipients,
                dust_threshold: self.config.dust_threshold,
            };
            let outputs = proof.tx.outputs()?;
            let checked =
                verify_bounty(bounty, &outputs, memo.output_index, block.timestamp, &limits)?;
            params.n_bounty = checked.n_bounty;
            params.bounty_bits = Some(checked.bits);
        }
        let reward = compute_reward(&params)?;
        let amount = reward.amount.min(fund);

        let key = ClaimKey::new(block.block_hash, memo_hash);
        let replaced = match self.claims.get(&key) {
            Some(existing) if existing.consumed => return Err(PorError::Claimed),
            Some(existing) if hash_value(&txid) < hash_value(&existing.txid) => Some(existing.txid),
            Some(_) => return Err(PorError::Taken),
            None => None,
        };

        let claim = PendingClaim {
            payer: proof.payer,
            miner_key,
            amount,
            timestamp: block.timestamp,
            txid,
            consumed: false,
        };

        let mut changes = Changeset::new();
        if new_block {
            changes.put_block(&block)?;
        }
        changes.put_claim(&key, &claim)?;
        self.store.commit(&changes)?;

        let mut events = Vec::new();
        if new_block {
            info!("Block {} committed", display_hash(&block.block_hash));
            events.push(Event::BlockCommitted {
                block_hash: block.block_hash,
                timestamp: block.timestamp,
            });
            self.blocks.insert(block.block_hash, block);
        }
        if let Some(previous) = replaced {
            info!(
                "better tx committed: {} replaces {}",
                display_hash(&txid),
                display_hash(&previous)
            );
        } else {
            info!("Claim committed: {} for {amount}", display_hash(&txid));
        }
        events.push(Event::Committed {
            key,
            txid,
            payer: proof.payer,
            amount,
            replaced,
        });
        self.claims.insert(key, claim.clone());

        Ok(CommitReceipt {
            key,
            claim,
            reward,
            events,
        })
    }

    /// Settle a pending claim whose miner key was found in the mining tx
    pub fn claim(&mut self, request: &ClaimRequest) -> Result<Vec<Event>> {
        self.settle(request, None)
    }

    /// Settle a pending claim whose miner key sits in the spent output
    pub fn claim_with_prev_tx(
        &mut self,
        request: &ClaimRequest,
        dependency: &DependencyTx,
    ) -> Result<Vec<Event>> {
        self.settle(request, Some(dependency))
    }

    fn settle(
        &mut self,
        request: &ClaimRequest,
        dependency: Option<&DependencyTx>,
    ) -> Result<Vec<Event>> {
        let now = self.clock.now();
        let key = ClaimKey::new(request.block_hash, request.memo_hash);
        let claim = self
            .claims
            .get(&key)
            .cloned()
            .ok_or(PorError::CommitmentMismatch)?;
        if claim.consumed {
            return Err(PorError::Claimed);
        }
        if claim.payer != request.payer
            || claim.amount != request.amount
            || claim.timestamp != request.timestamp
            || claim.miner_key != request.miner_key
        {
            return Err(PorError::CommitmentMismatch);
        }

        let opens = u64::from(claim.timestamp) + self.config.commit_window_secs;
        if now < opens {
            return Err(PorError::TooSoon);
        }
        if now >= opens + self.config.claim_window_secs {
            return Err(PorError::TooLate);
        }

        let pkh = match (&claim.miner_key, dependency) {
            (MinerKey::PublicKey(key), _) => derive_identity(key)?.0,
            (MinerKey::PubKeyHash(pkh), _) => *pkh,
            (MinerKey::Outpoint { .. }, None) => return Err(PorError::PrevTxRequired),
            (MinerKey::Outpoint { txid, index }, Some(dependency)) => {
                pkh_from_dependency(dependency, txid, *index)?
            }
        };
        let beneficiary = self.miners.beneficiary_of(&pkh)?;

        // the campaign may have run low since the commit
        let (amount, source) = match claim.payer {
            None => (claim.amount, None),
            Some(payer) => {
                let campaign = self
                    .escrow
                    .campaign(&key.memo_hash, &payer)
                    .filter(|campaign| campaign.active)
                    .ok_or(PorError::BrandNotActive)?;
                (
                    claim.amount.min(campaign.remaining_fund),
                    Some(campaign.funding_account),
                )
            }
        };
        let payment = match source {
            None => LedgerOp::Mint {
                token: None,
                to: beneficiary,
                amount,
            },
            Some(from) => LedgerOp::Transfer {
                token: None,
                from,
                to: beneficiary,
                amount,
            },
        };
        let mut ops = vec![payment];
        let mut events = vec![Event::Transfer {
            token: None,
            from: source,
            to: beneficiary,
            amount,
        }];
        events.push(Event::Claimed {
            memo_hash: key.memo_hash,
            payer: claim.payer,
            beneficiary,
            amount,
        });

        if request.skip_commission {
            events.push(Event::CommissionSkipped { miner: beneficiary });
        } else {
            let value = amount.saturating_mul(self.config.commission_rate) / RATE_SCALE;
            if value > 0 {
                let route = self.network.route_commission(
                    &beneficiary,
                    value,
                    now,
                    self.config.commission_policy,
                    self.config.rent_unit,
                    &key.to_bytes(),
                );
                self.commission_ops(beneficiary, route, &mut ops, &mut events);
            }
        }

        // consumed on disk before anything is paid
        let settled = PendingClaim {
            consumed: true,
            ..claim.clone()
        };
        let mut changes = Changeset::new();
        changes.put_claim(&key, &settled)?;
        self.store.commit(&changes)?;

        if let Err(e) = self.ledger.apply(&ops) {
            let mut restore = Changeset::new();
            restore.put_claim(&key, &claim)?;
            if let Err(restore_err) = self.store.commit(&restore) {
                error!(
                    "Claim for {} left consumed after a failed payment: {restore_err}",
                    display_hash(&claim.txid)
                );
            }
            return Err(e);
        }
        self.claims.insert(key, settled);

        info!("Claim paid: {amount} to {beneficiary}");
        Ok(events)
    }

    fn commission_ops(
        &self,
        miner: AccountId,
        route: CommissionRoute,
        ops: &mut Vec<LedgerOp>,
        events: &mut Vec<Event>,
    ) {
        match route {
            CommissionRoute::Lost { value } => {
                info!("Commission lost: {value} from {miner}");
                events.push(Event::CommissionLost { miner, value });
            }
            CommissionRoute::Paid {
                payee,
                value,
                cutback,
            } => {
                info!("Commission paid: {value} to {payee}");
                let native_cutback = match &cutback {
                    Some(CutbackPayment {
                        token: None,
                        amount,
                    }) => *amount,
                    _ => 0,
                };
                ops.push(LedgerOp::Mint {
                    token: None,
                    to: payee,
                    amount: value - native_cutback,
                });
                events.push(Event::CommissionPaid {
                    miner,
                    payee,
                    value,
                });

                if let Some(CutbackPayment { token, amount }) = cutback {
                    debug!("Cutback of {amount} from {payee} to {miner}");
                    ops.push(cutback_op(token, payee, self.config.engine_account, miner, amount));
                    events.push(Event::Cutback {
                        payee,
                        miner,
                        token,
                        amount,
                    });
                }
            }
        }
    }

    pub fn register_identity(
        &mut self,
        caller: &AccountId,
        public_key: &[u8],
        beneficiary: Option<AccountId>,
    ) -> Result<(PubKeyHash, Vec<Event>)> {
        let (pkh, identity) = self.miners.plan_registration(caller, public_key, beneficiary)?;
        let mut changes = Changeset::new();
        changes.put_miner(&pkh, &identity)?;
        self.store.commit(&changes)?;

        info!("Identity registered: {pkh} -> {}", identity.beneficiary);
        let event = Event::IdentityRegistered {
            pkh,
            owner: identity.owner,
            beneficiary: identity.beneficiary,
        };
        self.miners.insert(pkh, identity);
        Ok((pkh, vec![event]))
    }

    pub fn change_beneficiary(
        &mut self,
        caller: &AccountId,
        pkh: &PubKeyHash,
        beneficiary: AccountId,
    ) -> Result<Vec<Event>> {
        let identity = self.miners.plan_beneficiary_change(caller, pkh, beneficiary)?;
        let mut changes = Changeset::new();
        changes.put_miner(pkh, &identity)?;
        self.store.commit(&changes)?;

        info!("Beneficiary of {pkh} changed to {beneficiary}");
        self.miners.insert(*pkh, identity);
        Ok(vec![Event::BeneficiaryChanged {
            pkh: *pkh,
            beneficiary,
        }])
    }

    pub fn attach(&mut self, caller: &AccountId, parent: &AccountId) -> Result<Vec<Event>> {
        let records = self.network.plan_attach(caller, parent)?;
        let mut changes = Changeset::new();
        for record in &records {
            changes.put_node(record)?;
        }
        self.store.commit(&changes)?;

        info!("Node {caller} attached to {parent}");
        self.network.apply(&records);
        Ok(vec![Event::Attached {
            node: *caller,
            parent: *parent,
        }])
    }

    /// Combined deposit/withdraw and rent change, see `RefNetwork::plan_update`
    pub fn update(
        &mut self,
        caller: &AccountId,
        fund: i128,
        rent: Amount,
        escalate: bool,
    ) -> Result<(RentUpdate, Vec<Event>)> {
        let now = self.clock.now();
        let (record, update) = self.network.plan_update(caller, fund, rent, escalate, now)?;

        let escrow_account = self.config.engine_account;
        let mut ops = Vec::new();
        if update.deposited > 0 {
            ops.push(LedgerOp::Transfer {
                token: None,
                from: *caller,
                to: escrow_account,
                amount: update.deposited,
            });
        }
        if update.withdrawn > 0 {
            ops.push(LedgerOp::Transfer {
                token: None,
                from: escrow_account,
                to: *caller,
                amount: update.withdrawn,
            });
        }
        if update.fee > 0 {
            ops.push(LedgerOp::Transfer {
                token: None,
                from: escrow_account,
                to: self.config.treasury,
                amount: update.fee,
            });
        }
        let previous = self.store.node(caller)?;
        let mut changes = Changeset::new();
        changes.put_node(&record)?;
        self.store.commit(&changes)?;

        if let Err(e) = self.ledger.apply(&ops) {
            let mut restore = Changeset::new();
            match &previous {
                Some(previous) => restore.put_node(previous)?,
                None => restore.remove_node(caller),
            }
            if let Err(restore_err) = self.store.commit(&restore) {
                error!(
                    "Rent record of {caller} not restored after a failed transfer: {restore_err}"
                );
            }
            return Err(e);
        }

        info!(
            "Rent of {caller} set to {} until {}",
            update.rent, update.expiration
        );
        self.network.apply(&[record]);
        let event = Event::RentUpdated {
            node: *caller,
            rent: update.rent,
            expiration: update.expiration,
        };
        Ok((update, vec![event]))
    }

    pub fn deposit(
        &mut self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<(RentUpdate, Vec<Event>)> {
        let fund = i128::try_from(amount).map_err(|_| PorError::Overflow("deposit".to_string()))?;
        if fund == 0 {
            return Err(PorError::ZeroAmount);
        }
        self.update(caller, fund, 0, false)
    }

    pub fn withdraw(
        &mut self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<(RentUpdate, Vec<Event>)> {
        let fund = i128::try_from(amount).map_err(|_| PorError::Overflow("withdraw".to_string()))?;
        if fund == 0 {
            return Err(PorError::ZeroAmount);
        }
        self.update(caller, -fund, 0, false)
    }

    pub fn set_cutback(
        &mut self,
        caller: &AccountId,
        token: Option<TokenId>,
        rate: u64,
        decimals: u8,
    ) -> Result<()> {
        let record = self.network.plan_set_cutback(caller, token, rate, decimals)?;
        let mut changes = Changeset::new();
        changes.put_node(&record)?;
        self.store.commit(&changes)?;
        self.network.apply(&[record]);
        Ok(())
    }
}

/// Memo hash of a brand as used in claim keys
pub fn memo_hash(brand: &[u8]) -> Hash256 {
    sha256_digest(brand)
}

/// Key hash locked in output `index` of the dependency transaction,
/// which must be the transaction with id `txid`
fn pkh_from_dependency(
    dependency: &DependencyTx,
    txid: &Hash256,
    index: u32,
) -> Result<PubKeyHash> {
    if dependency.tx.txid() != *txid {
        return Err(PorError::OutpointMismatch);
    }
    let outputs = dependency.tx.outputs()?;
    let output = outputs
        .get(index as usize)
        .ok_or(PorError::VoutReadOverrun)?;
    pkh_in_output(output, dependency.pkh_pos)
}

/// Cutback from the commission payee back to the miner. Native cutbacks are
/// carved out of the minted commission; token cutbacks spend the payee's
/// allowance to the engine.
fn cutback_op(
    token: Option<TokenId>,
    payee: AccountId,
    engine: AccountId,
    miner: AccountId,
    amount: Amount,
) -> LedgerOp {
    match token {
        None => LedgerOp::Mint {
            token: None,
            to: miner,
            amount,
        },
        Some(token) => LedgerOp::TransferFrom {
            token: Some(token),
            owner: payee,
            spender: engine,
            to: miner,
            amount,
        },
    }
}
