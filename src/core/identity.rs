// Miner identity registry: source-chain key hash -> reward beneficiary
//
// The owner of a registration is the reward-ledger account controlled by the
// same secp256k1 key, so only the holder of the mining key can redirect its
// rewards. The owner is fixed at first registration.

use crate::core::types::{AccountId, PubKeyHash};
use crate::error::{PorError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct MinerIdentity {
    pub owner: AccountId,
    pub beneficiary: AccountId,
}

#[derive(Debug, Clone, Default)]
pub struct MinerRegistry {
    miners: HashMap<PubKeyHash, MinerIdentity>,
}

/// Validate a serialized key and derive both of its identities
pub fn derive_identity(public_key: &[u8]) -> Result<(PubKeyHash, AccountId)> {
    let key = secp256k1::PublicKey::from_slice(public_key)?;
    // the key hash follows the serialization the miner actually used
    Ok((
        PubKeyHash::from_public_key(public_key),
        AccountId::from_public_key(&key),
    ))
}

impl MinerRegistry {
    pub fn new() -> MinerRegistry {
        MinerRegistry::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (PubKeyHash, MinerIdentity)>) -> Self {
        MinerRegistry {
            miners: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, pkh: &PubKeyHash) -> Option<&MinerIdentity> {
        self.miners.get(pkh)
    }

    pub fn len(&self) -> usize {
        self.miners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.is_empty()
    }

    pub fn beneficiary_of(&self, pkh: &PubKeyHash) -> Result<AccountId> {
        self.miners
            .get(pkh)
            .map(|identity| identity.beneficiary)
            .ok_or(PorError::UnregisteredPkh)
    }

    /// Work out the record `register_identity` would store, without storing it.
    ///
    /// A fresh key is self-owned and, unless the owner names someone else,
    /// pays itself. Anyone may register a fresh key with the default
    /// beneficiary; naming a different one needs the owner. Once registered,
    /// only the owner may call again, and only to set a new beneficiary.
    pub fn plan_registration(
        &self,
        caller: &AccountId,
        public_key: &[u8],
        beneficiary: Option<AccountId>,
    ) -> Result<(PubKeyHash, MinerIdentity)> {
        let (pkh, owner) = derive_identity(public_key)?;
        let beneficiary = beneficiary.filter(|b| !b.is_zero());

        match self.miners.get(&pkh) {
            None => {
                if beneficiary.is_some() && *caller != owner {
                    return Err(PorError::NotPkhOwner);
                }
                Ok((
                    pkh,
                    MinerIdentity {
                        owner,
                        beneficiary: beneficiary.unwrap_or(owner),
                    },
                ))
            }
            Some(existing) => match beneficiary {
                Some(beneficiary) if *caller == existing.owner => Ok((
                    pkh,
                    MinerIdentity {
                        owner: existing.owner,
                        beneficiary,
                    },
                )),
                _ => Err(PorError::AlreadyRegistered),
            },
        }
    }

    pub fn register_identity(
        &mut self,
        caller: &AccountId,
        public_key: &[u8],
        beneficiary: Option<AccountId>,
    ) -> Result<(PubKeyHash, MinerIdentity)> {
        let (pkh, identity) = self.plan_registration(caller, public_key, beneficiary)?;
        info!("Registered miner {pkh} -> {}", identity.beneficiary);
        self.miners.insert(pkh, identity.clone());
        Ok((pkh, identity))
    }

    pub fn plan_beneficiary_change(
        &self,
        caller: &AccountId,
        pkh: &PubKeyHash,
        beneficiary: AccountId,
    ) -> Result<MinerIdentity> {
        let existing = self.miners.get(pkh).ok_or(PorError::UnregisteredPkh)?;
        if *caller != existing.owner {
            return Err(PorError::NotOldOwner);
        }
        Ok(MinerIdentity {
            owner: existing.owner,
            beneficiary,
        })
    }

    pub fn change_beneficiary(
        &mut self,
        caller: &AccountId,
        pkh: &PubKeyHash,
        beneficiary: AccountId,
    ) -> Result<MinerIdentity> {
        let identity = self.plan_beneficiary_change(caller, pkh, beneficiary)?;
        info!("Miner {pkh} now pays {beneficiary}");
        self.miners.insert(*pkh, identity.clone());
        Ok(identity)
    }

    pub fn insert(&mut self, pkh: PubKeyHash, identity: MinerIdentity) {
        self.miners.insert(pkh, identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{key_pair, test_account};

    #[test]
    fn test_fresh_key_is_self_owned() {
        let (_, public) = key_pair(1);
        let anyone = test_account(9);
        let mut registry = MinerRegistry::new();

        let (pkh, identity) = registry
            .register_identity(&anyone, &public.serialize(), None)
            .unwrap();
        let owner = AccountId::from_public_key(&public);
        assert_eq!(identity.owner, owner);
        assert_eq!(identity.beneficiary, owner);
        assert_eq!(registry.beneficiary_of(&pkh).unwrap(), owner);
    }

    #[test]
    fn test_only_owner_names_beneficiary() {
        let (_, public) = key_pair(2);
        let owner = AccountId::from_public_key(&public);
        let mut registry = MinerRegistry::new();

        assert_eq!(
            registry.register_identity(
                &test_account(9),
                &public.serialize(),
                Some(test_account(3))
            ),
            Err(PorError::NotPkhOwner)
        );

        let (pkh, identity) = registry
            .register_identity(&owner, &public.serialize(), Some(test_account(3)))
            .unwrap();
        assert_eq!(identity.beneficiary, test_account(3));
        assert_eq!(registry.beneficiary_of(&pkh).unwrap(), test_account(3));
    }

    #[test]
    fn test_reregistration_rules() {
        let (_, public) = key_pair(3);
        let owner = AccountId::from_public_key(&public);
        let mut registry = MinerRegistry::new();
        registry
            .register_identity(&test_account(9), &public.serialize(), None)
            .unwrap();

        assert_eq!(
            registry.register_identity(&test_account(9), &public.serialize(), None),
            Err(PorError::AlreadyRegistered)
        );
        assert_eq!(
            registry.register_identity(
                &test_account(9),
                &public.serialize(),
                Some(test_account(4))
            ),
            Err(PorError::AlreadyRegistered)
        );
        assert_eq!(
            registry.register_identity(&owner, &public.serialize(), None),
            Err(PorError::AlreadyRegistered)
        );

        let (_, updated) = registry
            .register_identity(&owner, &public.serialize(), Some(test_account(4)))
            .unwrap();
        assert_eq!(updated.owner, owner);
        assert_eq!(updated.beneficiary, test_account(4));
    }

    #[test]
    fn test_change_beneficiary_owner_only() {
        let (_, public) = key_pair(4);
        let owner = AccountId::from_public_key(&public);
        let mut registry = MinerRegistry::new();
        let (pkh, _) = registry
            .register_identity(&owner, &public.serialize(), None)
            .unwrap();

        assert_eq!(
            registry.change_beneficiary(&test_account(5), &pkh, test_account(5)),
            Err(PorError::NotOldOwner)
        );
        let identity = registry
            .change_beneficiary(&owner, &pkh, test_account(6))
            .unwrap();
        assert_eq!(identity.owner, owner);
        assert_eq!(registry.beneficiary_of(&pkh).unwrap(), test_account(6));
    }

    #[test]
    fn test_compressed_and_uncompressed_are_distinct_hashes() {
        let (_, public) = key_pair(5);
        let mut registry = MinerRegistry::new();
        let (compressed, a) = registry
            .register_identity(&test_account(1), &public.serialize(), None)
            .unwrap();
        let (uncompressed, b) = registry
            .register_identity(&test_account(1), &public.serialize_uncompressed(), None)
            .unwrap();
        assert_ne!(compressed, uncompressed);
        assert_eq!(a.owner, b.owner);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let mut registry = MinerRegistry::new();
        let mut bogus = [0u8; 33];
        bogus[0] = 0x05;
        assert!(matches!(
            registry.register_identity(&test_account(1), &bogus, None),
            Err(PorError::InvalidPublicKey(_))
        ));
        assert_eq!(
            registry.beneficiary_of(&PubKeyHash([0u8; 20])),
            Err(PorError::UnregisteredPkh)
        );
    }
}
