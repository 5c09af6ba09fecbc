//! # Taproot Commitment Engine
//!
//! Elements flavoured BIP-341 commitments: leaf hashes under
//! `TapLeaf/elements`, Merkle branches under `TapBranch/elements` and the
//! output key tweak under `TapTweak/elements`.
//!
//! ## Commitment
//!
//! ```text
//! leaf   = H_leaf(0xc4 || compact_size(len) || script)
//! root   = leaf                            (single leaf)
//!        = H_branch(min(l, r) || max(l, r)) (branches)
//! t      = H_tweak(P.x || root)
//! Q      = P + t·G
//! output = OP_1 <Q.x>
//! ```
//!
//! The parity of `Q` is kept next to the output key: the control block and
//! the covenant witness both need it.

use crate::error::{CovenantError, CovenantResult};
use crate::network::NetworkParams;
use crate::script::Script;
use crate::tagged_hash::TAP_BRANCH;
use bitcoin::secp256k1::{Parity, Scalar, Secp256k1, XOnlyPublicKey};
use elements::address::Payload;
use elements::hashes::Hash;
use elements::schnorr::TweakedPublicKey;
use elements::taproot::{
    ControlBlock, LeafVersion, TapLeafHash, TapNodeHash, TapTweakHash, TaprootBuilder,
    TaprootSpendInfo, TAPROOT_LEAF_TAPSCRIPT,
};
use elements::Address;
use log::debug;

/// Leaf version for tapscript leaves
pub const LEAF_VERSION_TAPSCRIPT: u8 = TAPROOT_LEAF_TAPSCRIPT;

/// A tapscript leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    script: Script,
}

impl Leaf {
    pub fn new(script: &Script) -> Self {
        Self {
            script: script.clone(),
        }
    }

    pub fn from_bytes(script: Vec<u8>) -> Self {
        Self {
            script: Script::from(script),
        }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn script_bytes(&self) -> &[u8] {
        self.script.as_bytes()
    }

    pub fn hash(&self) -> [u8; 32] {
        leaf_hash(self)
    }
}

/// Tagged hash of leaf version, compact size length and script bytes
pub fn leaf_hash(leaf: &Leaf) -> [u8; 32] {
    TapLeafHash::from_script(&leaf.script, LeafVersion::default()).to_byte_array()
}

/// Hash of two child nodes, ordered lexicographically
pub fn branch_hash(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    if a <= b {
        TAP_BRANCH.hash(&[&a[..], &b[..]])
    } else {
        TAP_BRANCH.hash(&[&b[..], &a[..]])
    }
}

/// Depth of every leaf, in order, when `count` leaves are split in half
/// recursively with the left half taking `count / 2` leaves.
pub fn leaf_depths(count: usize) -> Vec<usize> {
    fn walk(count: usize, depth: usize, out: &mut Vec<usize>) {
        if count == 1 {
            out.push(depth);
            return;
        }
        let left = count / 2;
        walk(left, depth + 1, out);
        walk(count - left, depth + 1, out);
    }

    let mut depths = Vec::with_capacity(count);
    if count > 0 {
        walk(count, 0, &mut depths);
    }
    depths
}

/// Result of tweaking an internal key with a tree root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TweakedKey {
    pub output_key: XOnlyPublicKey,
    pub parity: Parity,
    pub tweak: [u8; 32],
}

impl TweakedKey {
    /// 33-byte compressed form `0x02|parity || Q.x`, as consumed by `OP_TWEAKVERIFY`
    pub fn compressed(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = 0x02 | self.parity.to_u8();
        out[1..].copy_from_slice(&self.output_key.serialize());
        out
    }
}

/// Tweak `internal_key` by a raw 32-byte tree root
pub fn tweak_with_root(
    internal_key: &XOnlyPublicKey,
    merkle_root: &[u8; 32],
) -> CovenantResult<TweakedKey> {
    let secp = Secp256k1::verification_only();
    let root = TapNodeHash::from_byte_array(*merkle_root);
    let tweak = TapTweakHash::from_key_and_tweak(*internal_key, Some(root)).to_byte_array();
    let scalar = Scalar::from_be_bytes(tweak)
        .map_err(|_| CovenantError::crypto("tap tweak exceeds the curve order"))?;
    let (output_key, parity) = internal_key
        .add_tweak(&secp, &scalar)
        .map_err(|e| CovenantError::crypto(format!("failed to tweak internal key: {e}")))?;

    debug!(
        "tweaked {} by {} into {} (parity {})",
        internal_key,
        hex::encode(tweak),
        output_key,
        parity.to_u8()
    );

    Ok(TweakedKey {
        output_key,
        parity,
        tweak,
    })
}

/// `OP_1 <32-byte output key>`
pub fn p2tr_script(output_key: &XOnlyPublicKey) -> Script {
    Script::new_v1_p2tr_tweaked(TweakedPublicKey::new(*output_key))
}

/// Everything derived from an internal key and a set of leaves
#[derive(Debug, Clone)]
pub struct TaprootCommitment {
    leaves: Vec<Leaf>,
    spend_info: TaprootSpendInfo,
}

impl TaprootCommitment {
    pub fn new(internal_key: XOnlyPublicKey, leaves: &[Leaf]) -> CovenantResult<Self> {
        if leaves.is_empty() {
            return Err(CovenantError::script("hash tree needs at least one leaf"));
        }

        let mut builder = TaprootBuilder::new();
        for (leaf, depth) in leaves.iter().zip(leaf_depths(leaves.len())) {
            builder = builder
                .add_leaf(depth, leaf.script.clone())
                .map_err(|e| CovenantError::script(format!("cannot add leaf at depth {depth}: {e}")))?;
        }
        let secp = Secp256k1::verification_only();
        let spend_info = builder
            .finalize(&secp, internal_key)
            .map_err(|e| CovenantError::crypto(format!("cannot finalize taproot tree: {e}")))?;

        debug!(
            "committed {} leaves under {} into {}",
            leaves.len(),
            internal_key,
            spend_info.output_key().as_inner()
        );

        Ok(Self {
            leaves: leaves.to_vec(),
            spend_info,
        })
    }

    /// Commitment to a single tapscript leaf
    pub fn for_script(internal_key: XOnlyPublicKey, script: &Script) -> CovenantResult<Self> {
        Self::new(internal_key, &[Leaf::new(script)])
    }

    pub fn internal_key(&self) -> XOnlyPublicKey {
        self.spend_info.internal_key()
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// Root of the hash tree
    pub fn merkle_root(&self) -> [u8; 32] {
        self.spend_info
            .merkle_root()
            .map(|root| root.to_byte_array())
            .unwrap_or_default()
    }

    pub fn tweaked_key(&self) -> TweakedKey {
        TweakedKey {
            output_key: self.spend_info.output_key().into_inner(),
            parity: self.spend_info.output_key_parity(),
            tweak: self.spend_info.tap_tweak().to_byte_array(),
        }
    }

    pub fn parity(&self) -> Parity {
        self.spend_info.output_key_parity()
    }

    /// Control block opening `leaf`
    pub fn control_block(&self, leaf: &Leaf) -> CovenantResult<ControlBlock> {
        self.spend_info
            .control_block(&(leaf.script.clone(), LeafVersion::default()))
            .ok_or_else(|| CovenantError::PathNotFound {
                leaf_hash: hex::encode(leaf.hash()),
            })
    }

    /// Sibling hashes from `leaf` up to the root; empty for a single-leaf tree
    pub fn find_path(&self, leaf: &Leaf) -> CovenantResult<Vec<[u8; 32]>> {
        let control = self.control_block(leaf)?;
        Ok(control
            .merkle_branch
            .as_inner()
            .iter()
            .map(|node| node.to_byte_array())
            .collect())
    }

    pub fn output_script(&self) -> Script {
        Script::new_v1_p2tr_tweaked(self.spend_info.output_key())
    }

    pub fn address(&self, network: &NetworkParams) -> CovenantResult<String> {
        address(&self.output_script(), network)
    }
}

/// Encode a segwit output script as an unconfidential address (bech32/bech32m)
pub fn address(output_script: &Script, network: &NetworkParams) -> CovenantResult<String> {
    if !output_script.is_witness_program() {
        return Err(CovenantError::address(format!(
            "{} is not a witness program",
            hex::encode(output_script.as_bytes())
        )));
    }

    Address::from_script(output_script, None, network.address_params)
        .map(|address| address.to_string())
        .ok_or_else(|| {
            CovenantError::address(format!(
                "cannot encode witness program {}",
                hex::encode(output_script.as_bytes())
            ))
        })
}

/// Decode an unconfidential segwit address back into its output script
pub fn script_from_address(address: &str, network: &NetworkParams) -> CovenantResult<Script> {
    let parsed = Address::parse_with_params(address, network.address_params)
        .map_err(|e| CovenantError::address(format!("cannot decode {address} on {}: {e}", network.name)))?;

    if !matches!(parsed.payload, Payload::WitnessProgram { .. }) {
        return Err(CovenantError::address(format!(
            "address {address} is not a segwit address"
        )));
    }
    Ok(parsed.script_pubkey())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covenant::{covenant_script, DestinationScript};
    use crate::identity::SigningIdentity;
    use crate::network::REGTEST;
    use crate::script::{Builder, ScriptExt};
    use crate::tagged_hash::TAP_LEAF;
    use crate::witness::compact_size;

    const COVENANT_LEAF_HASH: &str =
        "93933f12c2aa4de406e52cf9e387e8cfe2a79b5596c8a93f79624b16c30a6489";
    const COVENANT_SPK: &str =
        "5120c16c5cc61b378349dda40d38d366e7f7775cf7da09fb9727448bcba067da5171";
    const COVENANT_ADDRESS: &str =
        "ert1pc9k9e3smx7p5nhdyp5udxeh87am4ea76p8aewf6y3096qe7629csc7ae06";
    const DESTINATION_SPK: &str =
        "512006b21e7f4b0dfb2e372b25019967ef169a686010842d00ee795b860282755ec4";
    const DESTINATION_ADDRESS: &str =
        "ert1pq6epul6tphajudety5qejel0z6dxscqssskspmnetwrq9qn4tmzq8wgkak";

    fn covenant_leaf() -> Leaf {
        let suffix = Script::from_asm("OP_CHECKSIG").unwrap();
        Leaf::new(&covenant_script(Some(&suffix)))
    }

    fn internal_key() -> XOnlyPublicKey {
        SigningIdentity::test_identity().unwrap().internal_x_only()
    }

    fn int_leaf(n: i64) -> Leaf {
        Leaf::new(&Builder::new().push_int(n).into_script())
    }

    #[test]
    fn test_covenant_leaf_hash() {
        let leaf = covenant_leaf();
        assert_eq!(hex::encode(leaf.hash()), COVENANT_LEAF_HASH);

        // Same hash from the prefix the covenant script embeds
        let length = compact_size(leaf.script_bytes().len());
        let manual = TAP_LEAF.hash(&[&[LEAF_VERSION_TAPSCRIPT][..], &length[..], leaf.script_bytes()]);
        assert_eq!(manual, leaf.hash());

        let commitment = TaprootCommitment::new(internal_key(), &[leaf]).unwrap();
        assert_eq!(hex::encode(commitment.merkle_root()), COVENANT_LEAF_HASH);
    }

    #[test]
    fn test_covenant_output_script_and_address() {
        let commitment = TaprootCommitment::new(internal_key(), &[covenant_leaf()]).unwrap();
        let spk = commitment.output_script();
        assert_eq!(hex::encode(spk.as_bytes()), COVENANT_SPK);

        let first = address(&spk, &REGTEST).unwrap();
        let second = address(&spk, &REGTEST).unwrap();
        assert_eq!(first, COVENANT_ADDRESS);
        assert_eq!(first, second);

        assert_eq!(commitment.address(&REGTEST).unwrap(), COVENANT_ADDRESS);
        assert_eq!(commitment.parity(), Parity::Odd);
        assert_eq!(commitment.internal_key(), internal_key());
    }

    #[test]
    fn test_destination_output_script() {
        let identity = SigningIdentity::test_identity().unwrap();
        let destination = DestinationScript::for_internal_key(&identity.internal_public_key());
        let commitment =
            TaprootCommitment::for_script(identity.internal_x_only(), &destination.full()).unwrap();

        assert_eq!(hex::encode(commitment.output_script().as_bytes()), DESTINATION_SPK);
        assert_eq!(commitment.address(&REGTEST).unwrap(), DESTINATION_ADDRESS);
        assert_eq!(commitment.parity(), Parity::Even);
    }

    #[test]
    fn test_address_round_trip() {
        let spk = script_from_address(COVENANT_ADDRESS, &REGTEST).unwrap();
        assert_eq!(hex::encode(spk.as_bytes()), COVENANT_SPK);

        let p2wpkh = script_from_address("ert1qrpxstycc2desapdg3xzcd6vmgmzym749s577v7", &REGTEST)
            .unwrap();
        assert_eq!(
            hex::encode(p2wpkh.as_bytes()),
            "0014184d05931853730e85a8898586e99b46c44dfaa5"
        );
    }

    #[test]
    fn test_address_rejects_non_witness_programs() {
        let script = |h: &str| Script::from(hex::decode(h).unwrap());

        let p2pkh = script("76a914184d05931853730e85a8898586e99b46c44dfaa588ac");
        assert!(matches!(
            address(&p2pkh, &REGTEST),
            Err(CovenantError::AddressEncoding { .. })
        ));

        // Push length disagrees with the program length
        assert!(address(&script("5120c16c5cc61b"), &REGTEST).is_err());

        // v0 programs must be 20 or 32 bytes
        let mut bad_v0 = vec![0x00, 0x19];
        bad_v0.extend_from_slice(&[0x11; 25]);
        assert!(address(&Script::from(bad_v0), &REGTEST).is_err());

        assert!(matches!(
            script_from_address(COVENANT_ADDRESS, &crate::network::LIQUID),
            Err(CovenantError::AddressEncoding { .. })
        ));
    }

    #[test]
    fn test_leaf_depths() {
        assert!(leaf_depths(0).is_empty());
        assert_eq!(leaf_depths(1), vec![0]);
        assert_eq!(leaf_depths(2), vec![1, 1]);
        assert_eq!(leaf_depths(3), vec![1, 2, 2]);
        assert_eq!(leaf_depths(5), vec![2, 2, 2, 3, 3]);
    }

    #[test]
    fn test_multi_leaf_tree_and_paths() {
        let leaves: Vec<Leaf> = (1..=3).map(int_leaf).collect();
        let hashes: Vec<[u8; 32]> = leaves.iter().map(leaf_hash).collect();
        let commitment = TaprootCommitment::new(internal_key(), &leaves).unwrap();

        // [a] | [b, c]
        let bc = branch_hash(&hashes[1], &hashes[2]);
        assert_eq!(commitment.merkle_root(), branch_hash(&hashes[0], &bc));
        assert_eq!(branch_hash(&hashes[1], &hashes[2]), branch_hash(&hashes[2], &hashes[1]));

        assert_eq!(commitment.find_path(&leaves[0]).unwrap(), vec![bc]);
        assert_eq!(commitment.find_path(&leaves[1]).unwrap(), vec![hashes[2], hashes[0]]);
        assert_eq!(commitment.find_path(&leaves[2]).unwrap(), vec![hashes[1], hashes[0]]);

        let missing = commitment.find_path(&int_leaf(9)).unwrap_err();
        assert!(matches!(missing, CovenantError::PathNotFound { .. }));

        let single = TaprootCommitment::new(internal_key(), &leaves[..1]).unwrap();
        assert!(single.find_path(&leaves[0]).unwrap().is_empty());
        assert!(TaprootCommitment::new(internal_key(), &[]).is_err());
    }

    #[test]
    fn test_tweak_matches_commitment() {
        let commitment = TaprootCommitment::new(internal_key(), &[covenant_leaf()]).unwrap();
        let tweaked = tweak_with_root(&internal_key(), &commitment.merkle_root()).unwrap();
        assert_eq!(tweaked, commitment.tweaked_key());
        assert_eq!(p2tr_script(&tweaked.output_key), commitment.output_script());
    }

    #[test]
    fn test_compressed_tweaked_key_prefix() {
        let commitment = TaprootCommitment::new(internal_key(), &[covenant_leaf()]).unwrap();
        let compressed = commitment.tweaked_key().compressed();
        assert_eq!(compressed[0], 0x03);
        assert_eq!(&compressed[1..], &commitment.output_script().as_bytes()[2..]);
    }
}
