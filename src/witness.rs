//! # Witness Assembler
//!
//! Control blocks and witness stacks for spending a covenant output through
//! its script path, plus an off-chain replay of the covenant check.
//!
//! ## Covenant Witness
//!
//! ```text
//! [0] 0x02 | 0x03                        parity of the destination output key
//! [1] <output index>                     script number, empty for output 0
//! [2] compact_size(len(full)) || start   destination script start
//! [3] <internal key>                     32-byte x-only
//! [4] <covenant leaf script>
//! [5] <control block>                    (0xc4 | parity) || internal key || path
//! ```

use crate::config::covenant::MAX_STANDARD_WITNESS_ELEMENT_SIZE;
use crate::covenant::{covenant_script, DestinationScript};
use crate::error::{CovenantError, CovenantResult};
use crate::script::{decode_scriptnum, encode_scriptnum, Script, ScriptExt};
use crate::tagged_hash::TAP_LEAF;
use crate::taproot::{tweak_with_root, Leaf, TaprootCommitment, LEAF_VERSION_TAPSCRIPT};
use bitcoin::secp256k1::{Secp256k1, XOnlyPublicKey};
use elements::encode::{serialize, VarInt};
use elements::schnorr::TweakedPublicKey;
use elements::taproot::{ControlBlock, LeafVersion};
use elements::TxOut;
use log::{debug, warn};

/// Compact size encoding of a length
pub fn compact_size(len: usize) -> Vec<u8> {
    serialize(&VarInt(len as u64))
}

/// `[leaf script, control block]`, the tail of every script path witness
pub fn script_path_stack(
    commitment: &TaprootCommitment,
    leaf: &Leaf,
) -> CovenantResult<[Vec<u8>; 2]> {
    let control = commitment.control_block(leaf)?;
    Ok([leaf.script_bytes().to_vec(), control.serialize()])
}

/// Parity and length prefix of a destination script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlockData {
    pub parity: u8,
    pub encoded_script_len: Vec<u8>,
}

/// Parity of the output key committing to `script` alone, and its compact size length.
///
/// The parity is read back from the control block's first byte modulo the
/// tapscript leaf version; for a tapscript leaf that byte is `0xc4 | parity`.
pub fn control_block_data(
    script: &Script,
    internal_key: &XOnlyPublicKey,
) -> CovenantResult<ControlBlockData> {
    let leaf = Leaf::new(script);
    let commitment = TaprootCommitment::new(*internal_key, std::slice::from_ref(&leaf))?;
    let control = commitment.control_block(&leaf)?.serialize();

    Ok(ControlBlockData {
        parity: control[0] % LEAF_VERSION_TAPSCRIPT,
        encoded_script_len: compact_size(leaf.script_bytes().len()),
    })
}

/// Witness stack spending the covenant leaf towards `destination` at `output_index`
pub fn covenant_witness_stack(
    covenant: &Script,
    destination: &DestinationScript,
    internal_key: &XOnlyPublicKey,
    output_index: u32,
) -> CovenantResult<Vec<Vec<u8>>> {
    let full = destination.full();
    let data = control_block_data(&full, internal_key)?;

    let mut commitment = data.encoded_script_len.clone();
    commitment.extend_from_slice(destination.start().as_bytes());
    if commitment.len() > MAX_STANDARD_WITNESS_ELEMENT_SIZE {
        warn!(
            "destination start element is {} bytes, above the {}-byte standardness limit",
            commitment.len(),
            MAX_STANDARD_WITNESS_ELEMENT_SIZE
        );
    }

    let leaf = Leaf::new(covenant);
    let covenant_commitment = TaprootCommitment::new(*internal_key, std::slice::from_ref(&leaf))?;
    let [script, control] = script_path_stack(&covenant_commitment, &leaf)?;

    debug!(
        "covenant witness for output {}: parity {}, destination {}",
        output_index,
        data.parity,
        full.to_asm()
    );

    Ok(vec![
        vec![if data.parity != 0 { 0x03 } else { 0x02 }],
        encode_scriptnum(output_index as i64),
        commitment,
        internal_key.serialize().to_vec(),
        script,
        control,
    ])
}

/// Consensus serialization of a witness stack (count, then length-prefixed items)
pub fn serialize_witness(stack: &[Vec<u8>]) -> Vec<u8> {
    serialize(&stack.to_vec())
}

/// Check that `script` and `control` open the Taproot output `spent_script_pubkey`
pub fn verify_script_path(
    script: &[u8],
    control: &[u8],
    spent_script_pubkey: &[u8],
) -> CovenantResult<()> {
    let control = ControlBlock::from_slice(control)
        .map_err(|e| CovenantError::violation(format!("malformed control block: {e}")))?;
    if control.leaf_version != LeafVersion::default() {
        return Err(CovenantError::violation(format!(
            "leaf version 0x{:02x} is not tapscript",
            control.leaf_version.as_u8()
        )));
    }

    let program = witness_v1_program(spent_script_pubkey)?;
    let output_key = XOnlyPublicKey::from_slice(program)
        .map_err(|e| CovenantError::violation(format!("spent output key: {e}")))?;

    let secp = Secp256k1::verification_only();
    let script = Script::from(script.to_vec());
    if !control.verify_taproot_commitment(&secp, &TweakedPublicKey::new(output_key), &script) {
        return Err(CovenantError::violation(
            "script path does not open the spent output",
        ));
    }
    Ok(())
}

/// Replay the covenant against candidate outputs.
///
/// Mirrors the interpreter: rebuilds the destination from witness element 2
/// and `suffix`, recomputes the tweak under the witness internal key and
/// compares `parity || program` of the selected output with the tweaked key.
pub fn verify_covenant_witness(
    stack: &[Vec<u8>],
    suffix: &Script,
    spent_script_pubkey: &[u8],
    outputs: &[TxOut],
) -> CovenantResult<()> {
    let [parity, index, start, internal, script, control] = stack else {
        return Err(CovenantError::violation(format!(
            "covenant witness needs 6 elements, got {}",
            stack.len()
        )));
    };

    if script.as_slice() != covenant_script(Some(suffix)).as_bytes() {
        return Err(CovenantError::violation(
            "witness script is not the covenant leaf for this suffix",
        ));
    }
    verify_script_path(script, control, spent_script_pubkey)?;

    let internal_key = XOnlyPublicKey::from_slice(internal)
        .map_err(|e| CovenantError::violation(format!("internal key: {e}")))?;

    let index = decode_scriptnum(index)?;
    let output = usize::try_from(index)
        .ok()
        .and_then(|i| outputs.get(i))
        .ok_or_else(|| CovenantError::violation(format!("output {index} does not exist")))?;
    if output.is_fee() {
        return Err(CovenantError::violation(format!(
            "output {index} is the fee output"
        )));
    }
    let program = witness_v1_program(output.script_pubkey.as_bytes())?;

    let leaf = TAP_LEAF.hash(&[&[LEAF_VERSION_TAPSCRIPT][..], &start[..], suffix.as_bytes()]);
    let expected = tweak_with_root(&internal_key, &leaf)?.compressed();

    let mut actual = parity.clone();
    actual.extend_from_slice(program);
    if actual != expected {
        return Err(CovenantError::violation(format!(
            "output {index} does not pay the committed destination"
        )));
    }
    Ok(())
}

fn witness_v1_program(script_pubkey: &[u8]) -> CovenantResult<&[u8]> {
    match script_pubkey {
        [0x51, 0x20, program @ ..] if program.len() == 32 => Ok(program),
        _ => Err(CovenantError::violation(format!(
            "{} is not a v1 witness program",
            hex::encode(script_pubkey)
        ))),
    }
}
