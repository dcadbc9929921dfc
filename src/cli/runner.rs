// Command handlers behind the por-bridge binary
//
// Each handler builds a report that renders either as plain text or, with
// `--json`, through serde_json. Stateful commands open the engine on the
// configured sled directory with an in-memory ledger, which is enough for
// the registry and referral operations exposed here.

use crate::cli::commands::{BitsArg, Command, HexArg, Opt};
use crate::config::EngineConfig;
use crate::core::engine::PorEngine;
use crate::core::events::Event;
use crate::core::header::{display_hash, BlockHeader};
use crate::core::identity::MinerIdentity;
use crate::core::referral::NodeInfo;
use crate::core::reward::{compute_reward, Reward, RewardParams};
use crate::core::target::{bits_to_target, bits_to_target_bytes, max_target};
use crate::core::transaction::{key_in_input, TxFields};
use crate::core::types::{AccountId, Amount, MinerKey, PubKeyHash};
use crate::error::{PorError, Result};
use crate::ledger::{CampaignBook, MemoryLedger};
use crate::utils::{pkh_to_address, SystemClock};
use data_encoding::HEXLOWER;
use log::info;
use serde::Serialize;
use std::fmt;

type CliEngine = PorEngine<MemoryLedger, CampaignBook>;

#[derive(Debug, Serialize)]
pub struct TargetReport {
    pub bits: String,
    pub target: String,
    /// Reward units one block at this target is worth
    pub units: String,
}

impl fmt::Display for TargetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bits:   {}", self.bits)?;
        writeln!(f, "target: {}", self.target)?;
        write!(f, "units:  {}", self.units)
    }
}

#[derive(Debug, Serialize)]
pub struct HeaderReport {
    pub hash: String,
    pub version: u32,
    pub prev_hash: String,
    pub merkle_root: String,
    pub timestamp: u32,
    pub bits: String,
    pub nonce: u32,
    pub meets_target: bool,
}

impl fmt::Display for HeaderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "hash:        {}", self.hash)?;
        writeln!(f, "version:     {:#x}", self.version)?;
        writeln!(f, "prev:        {}", self.prev_hash)?;
        writeln!(f, "merkle root: {}", self.merkle_root)?;
        writeln!(f, "timestamp:   {}", self.timestamp)?;
        writeln!(f, "bits:        {}", self.bits)?;
        writeln!(f, "nonce:       {}", self.nonce)?;
        write!(f, "work:        {}", if self.meets_target { "ok" } else { "insufficient" })
    }
}

#[derive(Debug, Serialize)]
pub struct RewardReport {
    pub pay_rate: Amount,
    #[serde(flatten)]
    pub reward: Reward,
}

impl fmt::Display for RewardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "base:       {}", self.reward.base)?;
        writeln!(f, "bounty:     {}", self.reward.bounty)?;
        writeln!(f, "retarget:   {}", self.reward.retarget)?;
        writeln!(f, "multiplier: {}", self.reward.multiplier)?;
        write!(f, "amount:     {}", self.reward.amount)
    }
}

#[derive(Debug, Serialize)]
pub struct OutputReport {
    pub value: u64,
    pub script: String,
}

#[derive(Debug, Serialize)]
pub struct MemoReport {
    pub output_index: usize,
    pub payload: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TxReport {
    pub txid: String,
    pub inputs: u64,
    pub outputs: Vec<OutputReport>,
    pub memo: Option<MemoReport>,
    /// Miner key found in the first input, if it carries one inline
    pub miner_key: Option<String>,
}

impl fmt::Display for TxReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "txid:    {}", self.txid)?;
        writeln!(f, "inputs:  {}", self.inputs)?;
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(f, "output {i}: {} {}", output.value, output.script)?;
        }
        match &self.memo {
            Some(memo) => writeln!(f, "memo:    {:?} (output {})", memo.text, memo.output_index)?,
            None => writeln!(f, "memo:    none")?,
        }
        write!(
            f,
            "miner:   {}",
            self.miner_key.as_deref().unwrap_or("in spent output")
        )
    }
}

#[derive(Debug, Serialize)]
pub struct EventsReport {
    pub summary: String,
    pub events: Vec<Event>,
}

impl fmt::Display for EventsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        for event in &self.events {
            write!(f, "\n  {event:?}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub account: AccountId,
    pub node: Option<NodeInfo>,
}

impl fmt::Display for NodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(node) = &self.node else {
            return write!(f, "{} is not in the referral network", self.account);
        };
        writeln!(f, "node:          {}", self.account)?;
        match node.parent {
            Some(parent) => writeln!(f, "parent:        {parent}")?,
            None => writeln!(f, "parent:        none")?,
        }
        writeln!(f, "rent:          {}", node.rent)?;
        writeln!(f, "decaying rent: {}", node.decaying_rent)?;
        writeln!(f, "balance:       {}", node.balance)?;
        write!(f, "expiration:    {}", node.expiration)
    }
}

#[derive(Debug, Serialize)]
pub struct MinerReport {
    pub pkh: String,
    /// Source-chain P2PKH address for the key hash
    pub address: String,
    pub identity: Option<MinerIdentity>,
}

impl fmt::Display for MinerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            Some(identity) => write!(
                f,
                "{} ({}): owner {} beneficiary {}",
                self.pkh, self.address, identity.owner, identity.beneficiary
            ),
            None => write!(f, "{} ({}) is not registered", self.pkh, self.address),
        }
    }
}

fn render<T: Serialize + fmt::Display>(report: &T, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(report).map_err(|e| PorError::Serialization(e.to_string()))
    } else {
        Ok(report.to_string())
    }
}

fn open_engine(config: &EngineConfig) -> Result<CliEngine> {
    PorEngine::open(
        config.clone(),
        MemoryLedger::new(),
        CampaignBook::new(),
        Box::new(SystemClock),
    )
}

fn describe_key(key: &MinerKey) -> String {
    match key {
        MinerKey::PublicKey(bytes) => format!("pubkey {}", HEXLOWER.encode(bytes)),
        MinerKey::PubKeyHash(pkh) => format!("pkh {pkh}"),
        MinerKey::Outpoint { txid, index } => format!("outpoint {}:{index}", display_hash(txid)),
    }
}

pub fn target_report(bits: BitsArg) -> Result<TargetReport> {
    let target = bits_to_target(bits.0)?;
    Ok(TargetReport {
        bits: bits.to_string(),
        target: HEXLOWER.encode(&bits_to_target_bytes(bits.0)?),
        units: (max_target() / target).to_string(),
    })
}

pub fn header_report(raw: &HexArg) -> Result<HeaderReport> {
    let header = BlockHeader::parse(&raw.0)?;
    Ok(HeaderReport {
        hash: display_hash(&header.hash()),
        version: header.version,
        prev_hash: display_hash(&header.prev_hash),
        merkle_root: display_hash(&header.merkle_root),
        timestamp: header.timestamp,
        bits: BitsArg(header.bits).to_string(),
        nonce: header.nonce,
        meets_target: header.verify_work().is_ok(),
    })
}

pub fn tx_report(version: u32, locktime: u32, vin: &HexArg, vout: &HexArg) -> Result<TxReport> {
    let tx = TxFields::new(version, vin.0.clone(), vout.0.clone(), locktime);
    let inputs = tx.input_count()?;
    let outputs = tx
        .outputs()?
        .into_iter()
        .map(|output| OutputReport {
            value: output.value,
            script: HEXLOWER.encode(&output.script),
        })
        .collect();
    let memo = tx.memo().ok().map(|memo| MemoReport {
        output_index: memo.output_index,
        text: String::from_utf8_lossy(&memo.payload).into_owned(),
        payload: HEXLOWER.encode(&memo.payload),
    });
    let miner_key = if inputs > 0 {
        key_in_input(&tx.input(0)?.script, 0)?
            .as_ref()
            .map(describe_key)
    } else {
        None
    };
    Ok(TxReport {
        txid: display_hash(&tx.txid()),
        inputs,
        outputs,
        memo,
        miner_key,
    })
}

/// Run one parsed command against `config` and return its rendered output
pub fn execute(opt: &Opt, config: &EngineConfig) -> Result<String> {
    match &opt.command {
        Command::Target { bits } => render(&target_report(*bits)?, opt.json),
        Command::Header { header } => render(&header_report(header)?, opt.json),
        Command::Reward {
            bits,
            bounty_bits,
            n_bounty,
            multiplier,
            pay_rate,
        } => {
            let pay_rate = pay_rate.unwrap_or(config.native_pay_rate);
            let reward = compute_reward(&RewardParams {
                bits: bits.0,
                bounty_bits: bounty_bits.map(|b| b.0),
                n_bounty: *n_bounty,
                multiplier: *multiplier,
                pay_rate,
            })?;
            render(&RewardReport { pay_rate, reward }, opt.json)
        }
        Command::InspectTx {
            version,
            locktime,
            vin,
            vout,
        } => render(&tx_report(*version, *locktime, vin, vout)?, opt.json),
        Command::RegisterIdentity {
            caller,
            pubkey,
            beneficiary,
        } => {
            let mut engine = open_engine(config)?;
            let (pkh, events) = engine.register_identity(caller, &pubkey.0, *beneficiary)?;
            engine.flush()?;
            info!("Registered {pkh} from {caller}");
            render(
                &EventsReport {
                    summary: format!("Registered miner {pkh}"),
                    events,
                },
                opt.json,
            )
        }
        Command::Attach { caller, parent } => {
            let mut engine = open_engine(config)?;
            let events = engine.attach(caller, parent)?;
            engine.flush()?;
            render(
                &EventsReport {
                    summary: format!("Attached {caller} under {parent}"),
                    events,
                },
                opt.json,
            )
        }
        Command::QueryNode { account } => {
            let engine = open_engine(config)?;
            let report = NodeReport {
                account: *account,
                node: engine.node(account),
            };
            render(&report, opt.json)
        }
        Command::QueryMiner { pkh } => {
            let engine = open_engine(config)?;
            render(&miner_report(&engine, pkh), opt.json)
        }
    }
}

fn miner_report(engine: &CliEngine, pkh: &PubKeyHash) -> MinerReport {
    MinerReport {
        pkh: pkh.to_string(),
        address: pkh_to_address(&pkh.0),
        identity: engine.identity(pkh).cloned(),
    }
}
