//! # Partial Transaction Signer
//!
//! A two-role partial transaction: one covenant-locked input at index 0,
//! spent through its script path with a prebuilt witness, followed by
//! fee-funding P2WPKH inputs signed with ECDSA.
//!
//! ## State Machine
//!
//! ```text
//! Built -> Witnessed -> Signed -> Finalized -> Extracted
//! ```
//!
//! The covenant witness must be attached before any funding input is
//! signed; nothing can be added once an input is finalized.

use crate::error::{CovenantError, CovenantResult};
use crate::identity::SigningIdentity;
use crate::script::{Builder, Script, ScriptExt};
use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1, SecretKey};
use elements::confidential::{Asset, Nonce, Value};
use elements::hashes::Hash;
use elements::opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use elements::sighash::SighashCache;
use elements::{
    AssetId, BlockHash, EcdsaSighashType, LockTime, OutPoint, Sequence, Transaction, TxIn,
    TxOut, TxOutWitness,
};
use log::{debug, info};
use std::fmt;

/// Which spending path an input takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    /// Covenant-locked output, spent via the script path
    Covenant,
    /// Fee-funding P2WPKH output, spent with a signature
    Funding,
}

/// The output being spent by an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessUtxo {
    pub asset: AssetId,
    pub value: u64,
    pub script_pubkey: Script,
}

/// Output with explicit asset and value and no nonce
pub fn explicit_output(asset: AssetId, value: u64, script_pubkey: Script) -> TxOut {
    TxOut {
        asset: Asset::Explicit(asset),
        value: Value::Explicit(value),
        nonce: Nonce::Null,
        script_pubkey,
        witness: TxOutWitness::default(),
    }
}

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG` for a v0 key-hash program
fn p2wpkh_script_code(script_pubkey: &Script) -> Option<Script> {
    if !script_pubkey.is_v0_p2wpkh() {
        return None;
    }
    Some(
        Builder::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(&script_pubkey.as_bytes()[2..22])
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script(),
    )
}

fn witness_element_count(tx: &Transaction) -> usize {
    tx.input.iter().map(|txin| txin.witness.script_witness.len()).sum()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsetInput {
    pub role: InputRole,
    pub previous_output: OutPoint,
    pub sequence: Sequence,
    pub witness_utxo: WitnessUtxo,
    pub sighash_type: EcdsaSighashType,
    pub partial_sigs: Vec<(PublicKey, Vec<u8>)>,
    pub final_script_witness: Option<Vec<Vec<u8>>>,
}

impl PsetInput {
    fn new(role: InputRole, previous_output: OutPoint, witness_utxo: WitnessUtxo) -> Self {
        Self {
            role,
            previous_output,
            sequence: Sequence::MAX,
            witness_utxo,
            sighash_type: EcdsaSighashType::All,
            partial_sigs: Vec::new(),
            final_script_witness: None,
        }
    }

    pub fn covenant(previous_output: OutPoint, witness_utxo: WitnessUtxo) -> Self {
        Self::new(InputRole::Covenant, previous_output, witness_utxo)
    }

    pub fn funding(previous_output: OutPoint, witness_utxo: WitnessUtxo) -> Self {
        Self::new(InputRole::Funding, previous_output, witness_utxo)
    }

    pub fn is_finalized(&self) -> bool {
        self.final_script_witness.is_some()
    }
}

/// Declared shape of the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsetGlobal {
    pub version: u32,
    pub input_count: usize,
    pub output_count: usize,
}

impl PsetGlobal {
    pub fn new(version: u32, input_count: usize, output_count: usize) -> Self {
        Self {
            version,
            input_count,
            output_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PsetState {
    Built,
    Witnessed,
    Signed,
    Finalized,
    Extracted,
}

impl fmt::Display for PsetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PsetState::Built => "Built",
            PsetState::Witnessed => "Witnessed",
            PsetState::Signed => "Signed",
            PsetState::Finalized => "Finalized",
            PsetState::Extracted => "Extracted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PartialTransaction {
    global: PsetGlobal,
    inputs: Vec<PsetInput>,
    outputs: Vec<TxOut>,
    state: PsetState,
}

impl PartialTransaction {
    /// Build from declared counts and the actual inputs and outputs.
    ///
    /// Input 0 must be the covenant input and every later input a funding input.
    pub fn build(
        global: PsetGlobal,
        inputs: Vec<PsetInput>,
        outputs: Vec<TxOut>,
    ) -> CovenantResult<Self> {
        if global.input_count != inputs.len() || global.output_count != outputs.len() {
            return Err(CovenantError::ArityMismatch {
                declared_inputs: global.input_count,
                declared_outputs: global.output_count,
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }

        match inputs.first() {
            Some(first) if first.role == InputRole::Covenant => {}
            Some(_) => {
                return Err(CovenantError::InputRole {
                    message: "input 0 must be the covenant input".to_string(),
                })
            }
            None => {
                return Err(CovenantError::InputRole {
                    message: "no covenant input".to_string(),
                })
            }
        }
        if let Some(index) = inputs
            .iter()
            .skip(1)
            .position(|input| input.role != InputRole::Funding)
        {
            return Err(CovenantError::InputRole {
                message: format!("input {} must be a funding input", index + 1),
            });
        }

        Ok(Self {
            global,
            inputs,
            outputs,
            state: PsetState::Built,
        })
    }

    pub fn state(&self) -> PsetState {
        self.state
    }

    pub fn global(&self) -> &PsetGlobal {
        &self.global
    }

    pub fn inputs(&self) -> &[PsetInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    fn input(&self, index: usize) -> CovenantResult<&PsetInput> {
        self.inputs.get(index).ok_or(CovenantError::InputIndex {
            index,
            inputs: self.inputs.len(),
        })
    }

    fn input_mut(&mut self, index: usize) -> CovenantResult<&mut PsetInput> {
        let inputs = self.inputs.len();
        self.inputs
            .get_mut(index)
            .ok_or(CovenantError::InputIndex { index, inputs })
    }

    fn require_state(&self, allowed: &[PsetState], requested: PsetState) -> CovenantResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CovenantError::transition(self.state, requested))
        }
    }

    /// Set the script path witness of the covenant input
    pub fn attach_covenant_witness(
        &mut self,
        index: usize,
        witness: Vec<Vec<u8>>,
    ) -> CovenantResult<()> {
        self.require_state(&[PsetState::Built], PsetState::Witnessed)?;
        let input = self.input_mut(index)?;
        if input.role != InputRole::Covenant {
            return Err(CovenantError::InputRole {
                message: format!("input {index} is not the covenant input"),
            });
        }

        debug!("attached {}-element covenant witness to input {}", witness.len(), index);
        input.final_script_witness = Some(witness);
        self.state = PsetState::Witnessed;
        Ok(())
    }

    /// Transaction skeleton without witnesses
    pub fn unsigned_tx(&self) -> Transaction {
        Transaction {
            version: self.global.version,
            lock_time: LockTime::ZERO,
            input: self
                .inputs
                .iter()
                .map(|input| TxIn {
                    previous_output: input.previous_output,
                    sequence: input.sequence,
                    ..Default::default()
                })
                .collect(),
            output: self.outputs.clone(),
        }
    }

    /// Signature hash for a funding input.
    ///
    /// The genesis hash identifies the target chain; segwit v0 digests do not
    /// commit to it.
    pub fn sighash_preimage(
        &self,
        index: usize,
        sighash_type: EcdsaSighashType,
        genesis_hash: &BlockHash,
    ) -> CovenantResult<[u8; 32]> {
        let input = self.input(index)?;
        let spent = &input.witness_utxo.script_pubkey;

        let script_code = if spent.is_v0_p2wpkh() {
            p2wpkh_script_code(spent).ok_or_else(|| CovenantError::UnsupportedSighash {
                message: format!("input {index}: no script code for {}", spent.to_hex()),
            })?
        } else if spent.is_v1_p2tr() {
            return Err(CovenantError::UnsupportedSighash {
                message: format!("input {index} spends a taproot output"),
            });
        } else {
            return Err(CovenantError::UnsupportedSighash {
                message: format!("input {index} is not a P2WPKH spend"),
            });
        };

        debug!("sighash for input {} on chain {}", index, genesis_hash);
        let tx = self.unsigned_tx();
        let digest = SighashCache::new(&tx).segwitv0_sighash(
            index,
            &script_code,
            Value::Explicit(input.witness_utxo.value),
            sighash_type,
        );
        Ok(digest.to_byte_array())
    }

    pub fn add_partial_signature(
        &mut self,
        index: usize,
        public_key: PublicKey,
        signature: Vec<u8>,
    ) -> CovenantResult<()> {
        self.require_state(&[PsetState::Witnessed, PsetState::Signed], PsetState::Signed)?;
        let input = self.input_mut(index)?;
        if input.role != InputRole::Funding {
            return Err(CovenantError::InputRole {
                message: format!("input {index} is not a funding input"),
            });
        }

        input.partial_sigs.push((public_key, signature));
        self.state = PsetState::Signed;
        Ok(())
    }

    /// Compute the preimage, sign with the funding key and record the signature
    pub fn sign_input(
        &mut self,
        index: usize,
        identity: &SigningIdentity,
        genesis_hash: &BlockHash,
    ) -> CovenantResult<()> {
        self.require_state(&[PsetState::Witnessed, PsetState::Signed], PsetState::Signed)?;
        let sighash_type = self.input(index)?.sighash_type;
        let preimage = self.sighash_preimage(index, sighash_type, genesis_hash)?;
        let signature = sign(&preimage, identity.funding_secret_key(), sighash_type);
        self.add_partial_signature(index, identity.funding_public_key(), signature)
    }

    /// Move the first partial signature into a `[signature, pubkey]` witness
    pub fn finalize_input(&mut self, index: usize) -> CovenantResult<()> {
        self.require_state(
            &[PsetState::Witnessed, PsetState::Signed, PsetState::Finalized],
            PsetState::Finalized,
        )?;
        let input = self.input_mut(index)?;
        let (public_key, signature) = input
            .partial_sigs
            .first()
            .cloned()
            .ok_or(CovenantError::MissingSignature { index })?;

        input.final_script_witness = Some(vec![signature, public_key.serialize().to_vec()]);
        input.partial_sigs.clear();
        self.state = PsetState::Finalized;
        Ok(())
    }

    /// Final transaction with every input's witness in place
    pub fn extract(&mut self) -> CovenantResult<Transaction> {
        let mut tx = self.unsigned_tx();
        for (index, (txin, input)) in tx.input.iter_mut().zip(&self.inputs).enumerate() {
            txin.witness.script_witness = input
                .final_script_witness
                .clone()
                .ok_or(CovenantError::NotFinalized { index })?;
        }

        self.state = PsetState::Extracted;
        info!(
            "extracted transaction {} ({} bytes, {} witness elements)",
            tx.txid(),
            tx.size(),
            witness_element_count(&tx)
        );
        Ok(tx)
    }
}

/// DER ECDSA signature over `preimage` with the sighash byte appended
pub fn sign(preimage: &[u8; 32], secret_key: &SecretKey, sighash_type: EcdsaSighashType) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let signature = secp.sign_ecdsa(&Message::from_digest(*preimage), secret_key);
    let mut encoded = signature.serialize_der().to_vec();
    encoded.push(sighash_type.as_u32() as u8);
    encoded
}

/// Check a signature produced by [`sign`] against `preimage`
pub fn verify_signature(
    preimage: &[u8; 32],
    signature: &[u8],
    public_key: &PublicKey,
) -> CovenantResult<()> {
    let (_sighash_byte, der) = signature
        .split_last()
        .ok_or_else(|| CovenantError::crypto("empty signature"))?;
    let signature = ecdsa::Signature::from_der(der)
        .map_err(|e| CovenantError::crypto(format!("malformed signature: {e}")))?;
    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&Message::from_digest(*preimage), &signature, public_key)
        .map_err(|e| CovenantError::crypto(format!("signature does not verify: {e}")))
}
