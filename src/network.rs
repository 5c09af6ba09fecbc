//! Elements network parameter sets.
//!
//! The covenant only needs three things from a network: the address
//! parameters for unconfidential segwit addresses, the policy (fee) asset and
//! the genesis block hash handed to the sighash computation.

use crate::error::{CovenantError, CovenantResult};
use crate::utils::id;
use elements::{AddressParams, AssetId, BlockHash};
use std::str::FromStr;

/// Static description of an Elements chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub name: &'static str,
    pub address_params: &'static AddressParams,
    pub policy_asset: &'static str,
    pub genesis_hash: &'static str,
}

/// Elements regtest (`elementsregtest`)
pub const REGTEST: NetworkParams = NetworkParams {
    name: "regtest",
    address_params: &AddressParams::ELEMENTS,
    policy_asset: "5ac9f65c0efcc4775e0baec4ec03abdde22473cd3cf33c0419ca290e0751b225",
    genesis_hash: "00902a6b70c2ca83b5d9c815d96a0e2f4202179316970d14ea1847dae5b1ca21",
};

/// Liquid testnet
pub const LIQUID_TESTNET: NetworkParams = NetworkParams {
    name: "liquidtestnet",
    address_params: &AddressParams::LIQUID_TESTNET,
    policy_asset: "144c654344aa716d6f3abcc1ca90e5641e4e2a7f633bc09fe3baf64585819a49",
    genesis_hash: "a771da8e52ee6ad581ed1e9a99825e5b3b7992225534eaa2ae23244fe26ab1c1",
};

/// Liquid mainnet
pub const LIQUID: NetworkParams = NetworkParams {
    name: "liquid",
    address_params: &AddressParams::LIQUID,
    policy_asset: "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d",
    genesis_hash: "1466275836220db2944ca059a3a10ef6fd2ea684b0688d2c379296888a206003",
};

impl NetworkParams {
    /// Look up a parameter set by name
    pub fn from_name(name: &str) -> CovenantResult<Self> {
        match name {
            "regtest" | "elementsregtest" => Ok(REGTEST),
            "liquidtestnet" | "testnet" => Ok(LIQUID_TESTNET),
            "liquid" | "liquidv1" => Ok(LIQUID),
            other => Err(CovenantError::config(format!("unknown network: {other}"))),
        }
    }

    /// Policy asset in internal byte order
    pub fn policy_asset_id(&self) -> CovenantResult<AssetId> {
        id::parse_asset(self.policy_asset)
    }

    /// HRP of unconfidential segwit addresses
    pub fn bech32_hrp(&self) -> &'static str {
        self.address_params.bech_hrp.as_str()
    }

    pub fn genesis_block_hash(&self) -> CovenantResult<BlockHash> {
        BlockHash::from_str(self.genesis_hash)
            .map_err(|e| CovenantError::encoding(format!("genesis hash: {e}")))
    }
}
