use crate::core::types::{AccountId, Amount, PubKeyHash};
use clap::{Parser, Subcommand};
use std::str::FromStr;

/// Compact target, given in hex (`0x1d00ffff`) or decimal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitsArg(pub u32);

impl FromStr for BitsArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => u32::from_str_radix(digits, 16),
            None => s.parse::<u32>(),
        };
        parsed
            .map(BitsArg)
            .map_err(|_| format!("Invalid bits: {s}. Use hex like 0x1d00ffff or a decimal number"))
    }
}

impl std::fmt::Display for BitsArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Raw bytes given as hex, with or without a `0x` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexArg(pub Vec<u8>);

impl FromStr for HexArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(digits)
            .map(HexArg)
            .map_err(|e| format!("Invalid hex {s}: {e}"))
    }
}

#[derive(Debug, Parser)]
#[command(name = "por-bridge", about = "Proof-of-payment reward engine")]
pub struct Opt {
    #[arg(long, global = true, help = "Print results as JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "target", about = "Expand compact bits into a target")]
    Target {
        #[arg(help = "Compact target, hex or decimal")]
        bits: BitsArg,
    },
    #[command(name = "header", about = "Parse an 80-byte header and check its work")]
    Header {
        #[arg(help = "Serialized header in hex")]
        header: HexArg,
    },
    #[command(name = "reward", about = "Compute the reward for a mined transaction")]
    Reward {
        #[arg(long, help = "Compact target of the mining block")]
        bits: BitsArg,
        #[arg(long, help = "Compact target of the sampled bounty block")]
        bounty_bits: Option<BitsArg>,
        #[arg(long, default_value_t = 0, help = "Number of bounty recipients")]
        n_bounty: u32,
        #[arg(long, default_value_t = 1, help = "Work multiplier from the memo")]
        multiplier: u32,
        #[arg(long, help = "Pay rate scaled by 1e18, defaults to the native rate")]
        pay_rate: Option<Amount>,
    },
    #[command(name = "inspect-tx", about = "Decode transaction fields and find the memo")]
    InspectTx {
        #[arg(long, default_value_t = 2, help = "Transaction version")]
        version: u32,
        #[arg(long, default_value_t = 0, help = "Transaction locktime")]
        locktime: u32,
        #[arg(long, help = "Serialized input vector in hex")]
        vin: HexArg,
        #[arg(long, help = "Serialized output vector in hex")]
        vout: HexArg,
    },
    #[command(name = "register-identity", about = "Bind a miner key to a beneficiary")]
    RegisterIdentity {
        #[arg(long, help = "Account signing the registration")]
        caller: AccountId,
        #[arg(long, help = "Serialized secp256k1 public key in hex")]
        pubkey: HexArg,
        #[arg(long, help = "Account paid for the key's rewards, defaults to the caller")]
        beneficiary: Option<AccountId>,
    },
    #[command(name = "attach", about = "Attach a referral node under a parent")]
    Attach {
        #[arg(long, help = "Node being attached")]
        caller: AccountId,
        #[arg(long, help = "Parent node")]
        parent: AccountId,
    },
    #[command(name = "query-node", about = "Show a referral node's rent and balance")]
    QueryNode {
        #[arg(help = "Node account")]
        account: AccountId,
    },
    #[command(name = "query-miner", about = "Show the identity registered for a key hash")]
    QueryMiner {
        #[arg(help = "Public key hash in hex")]
        pkh: PubKeyHash,
    },
}
