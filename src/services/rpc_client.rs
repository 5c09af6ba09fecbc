use crate::config::{env as config_env, network};
use crate::error::{CovenantError, CovenantResult};
use crate::pset::WitnessUtxo;
use crate::utils::{amount, id};
use bitcoincore_rpc::jsonrpc;
use elements::{AssetId, Script, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::{env, str::FromStr};

/// Reply of `issueasset`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IssuedAsset {
    pub txid: String,
    pub vin: u32,
    pub entropy: String,
    pub asset: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScriptPubKeyInfo {
    #[serde(default)]
    pub asm: String,
    pub hex: String,
    #[serde(rename = "type", default)]
    pub script_type: Option<String>,
}

/// One `vout` entry of a verbose transaction; blinded outputs carry no value or asset
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VerboseOutput {
    pub n: u32,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: ScriptPubKeyInfo,
}

impl VerboseOutput {
    /// Explicit output as the spent UTXO of a partial transaction input
    pub fn witness_utxo(&self) -> CovenantResult<WitnessUtxo> {
        let asset = self.asset.as_deref().ok_or_else(|| CovenantError::UnexpectedResponse {
            message: format!("output {} has no explicit asset", self.n),
        })?;
        let value = self.value.ok_or_else(|| CovenantError::UnexpectedResponse {
            message: format!("output {} has no explicit value", self.n),
        })?;
        let script = hex::decode(&self.script_pubkey.hex)
            .map_err(|e| CovenantError::encoding(format!("scriptPubKey hex: {e}")))?;

        Ok(WitnessUtxo {
            asset: id::parse_asset(asset)?,
            value: amount::btc_to_sats(value),
            script_pubkey: Script::from(script),
        })
    }
}

/// Reply of `getrawtransaction <txid> true`, reduced to what spending needs
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VerboseTransaction {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<Value>,
    pub vout: Vec<VerboseOutput>,
    #[serde(default)]
    pub fee: Option<BTreeMap<String, f64>>,
}

impl VerboseTransaction {
    pub fn output(&self, index: u32) -> CovenantResult<&VerboseOutput> {
        self.vout
            .iter()
            .find(|output| output.n == index)
            .ok_or_else(|| CovenantError::UnexpectedResponse {
                message: format!("transaction {} has no output {}", self.txid, index),
            })
    }
}

/// First output carrying `asset` that has a non-empty script (fee outputs have none)
pub fn output_index_for_asset(tx: &VerboseTransaction, asset: &AssetId) -> CovenantResult<u32> {
    let wanted = asset.to_string();
    tx.vout
        .iter()
        .find(|output| {
            output.asset.as_deref() == Some(wanted.as_str()) && !output.script_pubkey.asm.is_empty()
        })
        .map(|output| output.n)
        .ok_or_else(|| CovenantError::UnexpectedResponse {
            message: format!("transaction {} has no output for asset {}", tx.txid, wanted),
        })
}

/// First output paying exactly `script_pubkey`
pub fn output_index_for_script(
    tx: &VerboseTransaction,
    script_pubkey: &Script,
) -> CovenantResult<u32> {
    let wanted = hex::encode(script_pubkey.as_bytes());
    tx.vout
        .iter()
        .find(|output| output.script_pubkey.hex == wanted)
        .map(|output| output.n)
        .ok_or_else(|| CovenantError::UnexpectedResponse {
            message: format!("transaction {} does not pay {}", tx.txid, wanted),
        })
}

/// Request/response capability of an Elements node
pub trait LedgerNode {
    fn issue_asset(&self, amount_btc: f64, token_amount: f64) -> CovenantResult<IssuedAsset>;

    /// Pay `amount_btc` of `asset` (the policy asset when `None`)
    fn send_to_address(
        &self,
        address: &str,
        amount_btc: f64,
        asset: Option<&AssetId>,
    ) -> CovenantResult<Txid>;

    fn get_raw_transaction(&self, txid: &Txid) -> CovenantResult<VerboseTransaction>;

    fn get_raw_transaction_hex(&self, txid: &Txid) -> CovenantResult<String>;

    fn broadcast_raw_transaction(&self, tx_hex: &str) -> CovenantResult<Txid>;

    fn get_new_address(&self) -> CovenantResult<String>;

    fn generate_to_address(&self, blocks: u64, address: &str) -> CovenantResult<Vec<String>>;

    /// Wallet balance per asset label
    fn get_balance(&self) -> CovenantResult<BTreeMap<String, f64>>;
}

#[derive(Debug)]
pub struct ElementsRpcClient {
    client: Client,
    url: String,
}

impl ElementsRpcClient {
    pub fn new(url: &str, user: &str, password: &str) -> CovenantResult<Self> {
        let auth = Auth::UserPass(user.to_string(), password.to_string());
        let client = Client::new(url, auth).map_err(|e| CovenantError::Rpc { source: e })?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Create a client with configuration from environment or defaults
    pub fn from_env() -> CovenantResult<Self> {
        // Load environment variables
        dotenv::dotenv().ok();

        let rpc_url =
            env::var(config_env::RPC_URL).unwrap_or_else(|_| network::DEFAULT_RPC_HOST.to_string());
        let rpc_port =
            env::var(config_env::RPC_PORT).unwrap_or_else(|_| network::DEFAULT_RPC_PORT.to_string());
        let rpc_user =
            env::var(config_env::RPC_USER).unwrap_or_else(|_| network::DEFAULT_RPC_USER.to_string());
        let rpc_password = env::var(config_env::RPC_PASSWORD)
            .unwrap_or_else(|_| network::DEFAULT_RPC_PASSWORD.to_string());

        let url = match env::var(config_env::RPC_WALLET) {
            Ok(wallet) if !wallet.is_empty() => {
                format!("http://{}:{}/wallet/{}", rpc_url, rpc_port, wallet)
            }
            _ => format!("http://{}:{}", rpc_url, rpc_port),
        };

        Self::new(&url, &rpc_user, &rpc_password)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn call<T: DeserializeOwned>(&self, method: &str, args: &[Value]) -> CovenantResult<T> {
        debug!("rpc {} {:?}", method, args);
        self.client
            .call::<T>(method, args)
            .map_err(|e| CovenantError::Rpc { source: e })
    }

    /// Call with a JSON object of named parameters
    fn call_named<T: DeserializeOwned>(&self, method: &str, params: Value) -> CovenantResult<T> {
        debug!("rpc {} {}", method, params);
        let raw = serde_json::value::to_raw_value(&params)?;
        self.client
            .get_jsonrpc_client()
            .call::<T>(method, Some(&*raw))
            .map_err(|e| CovenantError::Rpc { source: e.into() })
    }
}

fn parse_txid(txid: &str) -> CovenantResult<Txid> {
    Txid::from_str(txid).map_err(|e| CovenantError::UnexpectedResponse {
        message: format!("invalid txid {txid}: {e}"),
    })
}

/// Node-side rejection of a raw transaction, as opposed to a transport failure
fn broadcast_error(source: bitcoincore_rpc::Error) -> CovenantError {
    match source {
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::Error::Rpc(err)) => {
            CovenantError::BroadcastRejected {
                code: err.code,
                message: err.message,
            }
        }
        source => CovenantError::Rpc { source },
    }
}

impl LedgerNode for ElementsRpcClient {
    fn issue_asset(&self, amount_btc: f64, token_amount: f64) -> CovenantResult<IssuedAsset> {
        // explicit issuance so outputs can be spent without unblinding
        self.call("issueasset", &[amount_btc.into(), token_amount.into(), false.into()])
    }

    fn send_to_address(
        &self,
        address: &str,
        amount_btc: f64,
        asset: Option<&AssetId>,
    ) -> CovenantResult<Txid> {
        let mut params = json!({ "address": address, "amount": amount_btc });
        if let Some(asset) = asset {
            params["assetlabel"] = asset.to_string().into();
        }
        let txid: String = self.call_named("sendtoaddress", params)?;
        parse_txid(&txid)
    }

    fn get_raw_transaction(&self, txid: &Txid) -> CovenantResult<VerboseTransaction> {
        self.call("getrawtransaction", &[txid.to_string().into(), true.into()])
    }

    fn get_raw_transaction_hex(&self, txid: &Txid) -> CovenantResult<String> {
        self.call("getrawtransaction", &[txid.to_string().into(), false.into()])
    }

    fn broadcast_raw_transaction(&self, tx_hex: &str) -> CovenantResult<Txid> {
        let txid: String = self
            .client
            .call("sendrawtransaction", &[tx_hex.into()])
            .map_err(broadcast_error)?;
        parse_txid(&txid)
    }

    fn get_new_address(&self) -> CovenantResult<String> {
        self.call("getnewaddress", &[])
    }

    fn generate_to_address(&self, blocks: u64, address: &str) -> CovenantResult<Vec<String>> {
        self.call("generatetoaddress", &[blocks.into(), address.into()])
    }

    fn get_balance(&self) -> CovenantResult<BTreeMap<String, f64>> {
        self.call("getbalance", &[])
    }
}
