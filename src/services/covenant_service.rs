//! # Covenant Flow Service
//!
//! Drives one complete covenant round trip against a ledger node: issue an
//! asset, lock it in the covenant output, fund the fee key, then spend the
//! covenant output to the committed destination and broadcast.
//!
//! Nothing reaches the chain before the final broadcast succeeds, so an
//! aborted run leaves only wallet-side payments behind and can be restarted
//! from scratch. Every node call is preceded by a [`Deadline`] check; a run
//! past its deadline stops without broadcasting.

use crate::config::{covenant, network as net_config};
use crate::covenant::DestinationScript;
use crate::error::{CovenantError, CovenantResult};
use crate::identity::SigningIdentity;
use crate::network::NetworkParams;
use crate::pset::{explicit_output, PartialTransaction, PsetGlobal, PsetInput};
use crate::script::ScriptExt;
use crate::services::rpc_client::{output_index_for_asset, output_index_for_script, LedgerNode};
use crate::taproot::TaprootCommitment;
use crate::utils::{amount, id};
use crate::witness::{covenant_witness_stack, verify_covenant_witness};
use elements::encode::serialize_hex;
use elements::{AssetId, OutPoint, Transaction, TxOut, Txid};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

/// Point in time after which no further node call is made
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Fail with [`CovenantError::DeadlineExceeded`] once the deadline has passed
    pub fn check(&self, stage: &str) -> CovenantResult<()> {
        if self.is_expired() {
            warn!("Deadline passed before {}", stage);
            return Err(CovenantError::DeadlineExceeded {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of a completed covenant spend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendReport {
    pub asset: AssetId,
    pub covenant_address: String,
    pub destination_address: String,
    pub lock_txid: Txid,
    pub funding_txid: Txid,
    pub spend_txid: Txid,
    pub raw_hex: String,
}

pub struct CovenantFlow<N: LedgerNode> {
    node: N,
    identity: SigningIdentity,
    network: NetworkParams,
    destination: DestinationScript,
}

impl<N: LedgerNode> CovenantFlow<N> {
    /// Flow paying the identity's default destination
    pub fn new(node: N, identity: SigningIdentity, network: NetworkParams) -> Self {
        let destination = DestinationScript::default_for(&identity);
        Self {
            node,
            identity,
            network,
            destination,
        }
    }

    pub fn with_destination(mut self, destination: DestinationScript) -> Self {
        self.destination = destination;
        self
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn destination(&self) -> &DestinationScript {
        &self.destination
    }

    pub fn covenant_commitment(&self) -> CovenantResult<TaprootCommitment> {
        TaprootCommitment::for_script(self.identity.internal_x_only(), &self.destination.covenant())
    }

    pub fn destination_commitment(&self) -> CovenantResult<TaprootCommitment> {
        TaprootCommitment::for_script(self.identity.internal_x_only(), &self.destination.full())
    }

    pub fn issue_asset(&self, deadline: Deadline) -> CovenantResult<AssetId> {
        deadline.check("issueasset")?;
        let issued = self.node.issue_asset(
            amount::sats_to_btc(covenant::ISSUANCE_AMOUNT_SATS),
            covenant::REISSUANCE_TOKEN_AMOUNT,
        )?;
        info!("Issued asset {} in {}", issued.asset, issued.txid);
        id::parse_asset(&issued.asset)
    }

    /// Send the issued asset to the covenant address and locate the locked output
    pub fn lock_asset(
        &self,
        asset: &AssetId,
        deadline: Deadline,
    ) -> CovenantResult<(Txid, PsetInput)> {
        let commitment = self.covenant_commitment()?;
        let address = commitment.address(&self.network)?;

        deadline.check("covenant lock payment")?;
        let txid = self.node.send_to_address(
            &address,
            amount::sats_to_btc(covenant::ISSUANCE_AMOUNT_SATS),
            Some(asset),
        )?;
        info!("Locked asset in covenant address {}: {}", address, txid);

        deadline.check("covenant lock lookup")?;
        let tx = self.node.get_raw_transaction(&txid)?;
        let vout = output_index_for_asset(&tx, asset)?;
        let utxo = tx.output(vout)?.witness_utxo()?;
        if utxo.script_pubkey != commitment.output_script() {
            return Err(CovenantError::UnexpectedResponse {
                message: format!("output {txid}:{vout} does not pay the covenant"),
            });
        }

        Ok((txid, PsetInput::covenant(OutPoint::new(txid, vout), utxo)))
    }

    /// Send the fee amount of the policy asset to the identity's P2WPKH address
    pub fn fund(&self, deadline: Deadline) -> CovenantResult<(Txid, PsetInput)> {
        let address = self.identity.funding_address(&self.network)?;
        let policy = self.network.policy_asset_id()?;

        deadline.check("funding payment")?;
        let txid = self.node.send_to_address(
            &address,
            amount::sats_to_btc(covenant::FUNDING_AMOUNT_SATS),
            Some(&policy),
        )?;
        info!("Funded fee address {}: {}", address, txid);

        deadline.check("funding lookup")?;
        let tx = self.node.get_raw_transaction(&txid)?;
        let vout = output_index_for_script(&tx, &self.identity.funding_script_pubkey())?;
        let utxo = tx.output(vout)?.witness_utxo()?;

        Ok((txid, PsetInput::funding(OutPoint::new(txid, vout), utxo)))
    }

    /// Build, witness, sign, finalize and extract the covenant spend.
    ///
    /// The result is checked against the covenant off-chain before it is returned.
    pub fn build_spend(
        &self,
        asset: &AssetId,
        covenant_input: PsetInput,
        funding_input: PsetInput,
    ) -> CovenantResult<Transaction> {
        if funding_input.witness_utxo.value != covenant::TRANSACTION_FEE_SATS {
            return Err(CovenantError::UnexpectedResponse {
                message: format!(
                    "funding output holds {}, fee is {}",
                    amount::format_sats(funding_input.witness_utxo.value),
                    amount::format_sats(covenant::TRANSACTION_FEE_SATS)
                ),
            });
        }

        let covenant_spk = covenant_input.witness_utxo.script_pubkey.clone();
        let outputs = vec![
            explicit_output(
                *asset,
                covenant::ISSUANCE_AMOUNT_SATS,
                self.destination_commitment()?.output_script(),
            ),
            TxOut::new_fee(covenant::TRANSACTION_FEE_SATS, self.network.policy_asset_id()?),
        ];

        let mut pset = PartialTransaction::build(
            PsetGlobal::new(covenant::TRANSACTION_VERSION, 2, outputs.len()),
            vec![covenant_input, funding_input],
            outputs,
        )?;

        let covenant_script = self.destination.covenant();
        debug!("covenant script: {}", covenant_script.to_asm());
        let witness = covenant_witness_stack(
            &covenant_script,
            &self.destination,
            &self.identity.internal_x_only(),
            covenant::DESTINATION_OUTPUT_INDEX,
        )?;
        pset.attach_covenant_witness(0, witness)?;

        let genesis = self.network.genesis_block_hash()?;
        pset.sign_input(1, &self.identity, &genesis)?;
        pset.finalize_input(1)?;
        let tx = pset.extract()?;

        verify_covenant_witness(
            &tx.input[0].witness.script_witness,
            self.destination.end(),
            covenant_spk.as_bytes(),
            &tx.output,
        )?;
        Ok(tx)
    }

    pub fn broadcast(&self, tx: &Transaction, deadline: Deadline) -> CovenantResult<Txid> {
        deadline.check("broadcast")?;
        let txid = self.node.broadcast_raw_transaction(&serialize_hex(tx))?;
        if txid != tx.txid() {
            warn!("Node reported txid {} for local transaction {}", txid, tx.txid());
        }
        info!("Broadcast covenant spend {}", txid);
        Ok(txid)
    }

    /// Mine blocks after a broadcast; failures are logged and swallowed
    pub fn generate_blocks(&self, deadline: Deadline) {
        let result = deadline
            .check("block generation")
            .and_then(|()| self.node.get_new_address())
            .and_then(|address| {
                deadline.check("block generation")?;
                self.node
                    .generate_to_address(net_config::BLOCKS_AFTER_BROADCAST, &address)
            });
        match result {
            Ok(blocks) => info!("Generated {} blocks", blocks.len()),
            Err(e) => warn!("Block generation failed: {}", e),
        }
    }

    /// Full sequence from issuance to a broadcast covenant spend
    pub fn run(&self, deadline: Deadline) -> CovenantResult<SpendReport> {
        self.spend_sequence(deadline).inspect_err(|e| {
            if e.is_node_error() {
                error!("Node refused the covenant flow: {}", e);
            } else {
                error!("Covenant flow failed locally: {}", e);
            }
        })
    }

    fn spend_sequence(&self, deadline: Deadline) -> CovenantResult<SpendReport> {
        let asset = self.issue_asset(deadline)?;
        let covenant_address = self.covenant_commitment()?.address(&self.network)?;
        let destination_address = self.destination_commitment()?.address(&self.network)?;

        let (lock_txid, covenant_input) = self.lock_asset(&asset, deadline)?;
        let (funding_txid, funding_input) = self.fund(deadline)?;

        let tx = self.build_spend(&asset, covenant_input, funding_input)?;
        let raw_hex = serialize_hex(&tx);
        let spend_txid = self.broadcast(&tx, deadline)?;
        self.generate_blocks(deadline);

        Ok(SpendReport {
            asset,
            covenant_address,
            destination_address,
            lock_txid,
            funding_txid,
            spend_txid,
            raw_hex,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::REGTEST;
    use crate::services::rpc_client::{
        IssuedAsset, ScriptPubKeyInfo, VerboseOutput, VerboseTransaction,
    };
    use crate::taproot::script_from_address;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::str::FromStr;

    const COVENANT_TXID: &str =
        "f1a5c2b8d4e6071829304a5b6c7d8e9f0a1b2c3d4e5f60718293a4b5c6d7e8f9";
    const FUNDING_TXID: &str =
        "0c1d2e3f405162738495a6b7c8d9eafb0c1d2e3f405162738495a6b7c8d9eafb";
    const SPEND_TXID: &str = "eebebd60257478366e92d221976af85437fea7d2e8b693722027faa02f4fc4fb";
    const ISSUED_ASSET: &str =
        "c3f0b0d8e2a1b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d";

    /// In-process node that answers with fixed txids
    #[derive(Default)]
    struct MockNode {
        transactions: RefCell<BTreeMap<String, VerboseTransaction>>,
        broadcasts: RefCell<Vec<String>>,
        generated: Cell<u64>,
        reject_broadcast: bool,
        fail_generate: bool,
    }

    fn output(n: u32, value_btc: f64, asset: &str, script_hex: &str) -> VerboseOutput {
        VerboseOutput {
            n,
            value: Some(value_btc),
            asset: Some(asset.to_string()),
            script_pubkey: ScriptPubKeyInfo {
                asm: if script_hex.is_empty() { String::new() } else { format!("script {script_hex}") },
                hex: script_hex.to_string(),
                script_type: None,
            },
        }
    }

    impl LedgerNode for MockNode {
        fn issue_asset(&self, amount_btc: f64, token_amount: f64) -> CovenantResult<IssuedAsset> {
            assert_eq!(amount::btc_to_sats(amount_btc), 1);
            assert_eq!(token_amount, 0.0);
            Ok(IssuedAsset {
                txid: "11".repeat(32),
                vin: 0,
                entropy: "22".repeat(32),
                asset: ISSUED_ASSET.to_string(),
                token: "33".repeat(32),
            })
        }

        fn send_to_address(
            &self,
            address: &str,
            amount_btc: f64,
            asset: Option<&AssetId>,
        ) -> CovenantResult<Txid> {
            let script = hex::encode(script_from_address(address, &REGTEST)?.as_bytes());
            let asset = asset.map(AssetId::to_string).unwrap_or_else(|| REGTEST.policy_asset.to_string());
            let policy = REGTEST.policy_asset;

            // the covenant lock puts the payment first, the funding payment second
            let (txid, vout) = if asset == ISSUED_ASSET {
                (
                    COVENANT_TXID,
                    vec![
                        output(0, amount_btc, &asset, &script),
                        output(1, 0.0000026, policy, ""),
                    ],
                )
            } else {
                (
                    FUNDING_TXID,
                    vec![
                        output(0, 49.99, policy, "0014000000000000000000000000000000000000dead"),
                        output(1, amount_btc, &asset, &script),
                        output(2, 0.0000026, policy, ""),
                    ],
                )
            };

            self.transactions.borrow_mut().insert(
                txid.to_string(),
                VerboseTransaction {
                    txid: txid.to_string(),
                    vin: Vec::new(),
                    vout,
                    fee: None,
                },
            );
            Ok(Txid::from_str(txid).unwrap())
        }

        fn get_raw_transaction(&self, txid: &Txid) -> CovenantResult<VerboseTransaction> {
            self.transactions
                .borrow()
                .get(&txid.to_string())
                .cloned()
                .ok_or_else(|| CovenantError::UnexpectedResponse {
                    message: format!("unknown transaction {txid}"),
                })
        }

        fn get_raw_transaction_hex(&self, txid: &Txid) -> CovenantResult<String> {
            Err(CovenantError::UnexpectedResponse {
                message: format!("no raw hex for {txid}"),
            })
        }

        fn broadcast_raw_transaction(&self, tx_hex: &str) -> CovenantResult<Txid> {
            if self.reject_broadcast {
                return Err(CovenantError::BroadcastRejected {
                    code: -26,
                    message: "non-mandatory-script-verify-flag".to_string(),
                });
            }
            self.broadcasts.borrow_mut().push(tx_hex.to_string());
            Ok(Txid::from_str(SPEND_TXID).unwrap())
        }

        fn get_new_address(&self) -> CovenantResult<String> {
            Ok("ert1qrpxstycc2desapdg3xzcd6vmgmzym749s577v7".to_string())
        }

        fn generate_to_address(&self, blocks: u64, _address: &str) -> CovenantResult<Vec<String>> {
            if self.fail_generate {
                return Err(CovenantError::UnexpectedResponse {
                    message: "mining disabled".to_string(),
                });
            }
            self.generated.set(self.generated.get() + blocks);
            Ok(vec!["00".repeat(32); blocks as usize])
        }

        fn get_balance(&self) -> CovenantResult<BTreeMap<String, f64>> {
            Ok(BTreeMap::from([("bitcoin".to_string(), 21.0)]))
        }
    }

    fn flow(node: MockNode) -> CovenantFlow<MockNode> {
        CovenantFlow::new(node, SigningIdentity::test_identity().unwrap(), REGTEST)
    }

    fn live() -> Deadline {
        Deadline::after(Duration::from_secs(60))
    }

    fn expired() -> Deadline {
        Deadline::at(Instant::now())
    }

    #[test]
    fn test_run_against_mock_node() {
        let flow = flow(MockNode::default());
        let report = flow.run(live()).unwrap();

        assert_eq!(report.asset.to_string(), ISSUED_ASSET);
        assert_eq!(
            report.covenant_address,
            "ert1pc9k9e3smx7p5nhdyp5udxeh87am4ea76p8aewf6y3096qe7629csc7ae06"
        );
        assert_eq!(
            report.destination_address,
            "ert1pq6epul6tphajudety5qejel0z6dxscqssskspmnetwrq9qn4tmzq8wgkak"
        );
        assert_eq!(report.lock_txid.to_string(), COVENANT_TXID);
        assert_eq!(report.funding_txid.to_string(), FUNDING_TXID);
        assert_eq!(report.spend_txid.to_string(), SPEND_TXID);
        assert_eq!(report.raw_hex.len(), 595 * 2);

        let node = flow.node();
        assert_eq!(node.broadcasts.borrow().as_slice(), &[report.raw_hex.clone()]);
        assert_eq!(node.generated.get(), net_config::BLOCKS_AFTER_BROADCAST);
    }

    #[test]
    fn test_funding_output_is_found_by_script() {
        let flow = flow(MockNode::default());
        let (txid, input) = flow.fund(live()).unwrap();
        assert_eq!(txid.to_string(), FUNDING_TXID);
        assert_eq!(input.previous_output.vout, 1);
        assert_eq!(input.witness_utxo.value, 500);
    }

    #[test]
    fn test_block_generation_is_best_effort() {
        let flow = flow(MockNode {
            fail_generate: true,
            ..MockNode::default()
        });
        let report = flow.run(live()).unwrap();
        assert_eq!(report.spend_txid.to_string(), SPEND_TXID);
        assert_eq!(flow.node().generated.get(), 0);
    }

    #[test]
    fn test_broadcast_rejection_propagates() {
        let flow = flow(MockNode {
            reject_broadcast: true,
            ..MockNode::default()
        });
        let err = flow.run(live()).unwrap_err();
        assert!(matches!(err, CovenantError::BroadcastRejected { code: -26, .. }));
        assert!(err.is_retryable());
        assert_eq!(flow.node().generated.get(), 0);
    }

    #[test]
    fn test_unbalanced_funding_is_rejected() {
        let flow = flow(MockNode::default());
        let asset = flow.issue_asset(live()).unwrap();
        let (_, covenant_input) = flow.lock_asset(&asset, live()).unwrap();
        let (_, mut funding_input) = flow.fund(live()).unwrap();
        funding_input.witness_utxo.value = 1_000;

        let err = flow.build_spend(&asset, covenant_input, funding_input).unwrap_err();
        assert!(matches!(err, CovenantError::UnexpectedResponse { .. }));
    }

    #[test]
    fn test_expired_deadline_never_broadcasts() {
        let flow = flow(MockNode::default());
        let err = flow.run(expired()).unwrap_err();

        assert!(matches!(
            &err,
            CovenantError::DeadlineExceeded { stage } if stage == "issueasset"
        ));
        assert!(err.is_retryable());
        let node = flow.node();
        assert!(node.transactions.borrow().is_empty());
        assert!(node.broadcasts.borrow().is_empty());
        assert_eq!(node.generated.get(), 0);
    }

    #[test]
    fn test_deadline_is_checked_again_before_broadcast() {
        let flow = flow(MockNode::default());
        let asset = flow.issue_asset(live()).unwrap();
        let (_, covenant_input) = flow.lock_asset(&asset, live()).unwrap();
        let (_, funding_input) = flow.fund(live()).unwrap();
        let tx = flow.build_spend(&asset, covenant_input, funding_input).unwrap();

        let err = flow.broadcast(&tx, expired()).unwrap_err();
        assert!(matches!(
            &err,
            CovenantError::DeadlineExceeded { stage } if stage == "broadcast"
        ));
        assert!(flow.node().broadcasts.borrow().is_empty());

        flow.generate_blocks(expired());
        assert_eq!(flow.node().generated.get(), 0);

        assert_eq!(flow.broadcast(&tx, live()).unwrap().to_string(), SPEND_TXID);
        assert_eq!(flow.node().broadcasts.borrow().len(), 1);
    }

    #[test]
    fn test_deadline_remaining() {
        assert_eq!(expired().remaining(), Duration::ZERO);
        assert!(expired().is_expired());
        assert!(live().remaining() > Duration::from_secs(30));
        assert!(expired() < live());
    }
}
