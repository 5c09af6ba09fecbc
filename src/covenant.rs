//! # Covenant Script Builder
//!
//! Builds the tapscript leaf that forces a spend to pay an output whose
//! scriptPubKey is a Taproot commitment to a destination script ending with
//! a fixed suffix.
//!
//! ## Witness Layout
//!
//! The leaf expects four witness elements under the script and control block:
//!
//! ```text
//! <parity byte 0x02|0x03> <output index> <len || destination start> <internal key>
//! ```
//!
//! ## Script Structure
//!
//! ```text
//! OP_1 OP_ROLL <suffix> OP_CAT OP_SWAP              # destination = start || suffix
//! OP_DUP OP_TOALTSTACK                              # keep P on the alt stack
//! <tweak prefix> OP_SWAP OP_CAT                     # tweak message prefix || P
//! <leaf prefix || 0xc4> OP_2 OP_ROLL OP_CAT OP_SHA256  # leaf hash of destination
//! OP_CAT OP_SHA256 OP_TOALTSTACK                    # t = H_tweak(P || leaf)
//! OP_INSPECTOUTPUTSCRIPTPUBKEY OP_VERIFY OP_CAT     # parity || program of output
//! OP_FROMALTSTACK OP_FROMALTSTACK OP_TWEAKVERIFY    # program == P + t·G
//! OP_1
//! ```
//!
//! Any destination script that literally ends with the suffix satisfies the
//! covenant, so the suffix is the only part of the destination the covenant
//! fixes.

use crate::error::CovenantResult;
use crate::identity::SigningIdentity;
use crate::script::all::*;
use crate::script::{push_minimal, Builder, Script, ScriptExt};
use crate::tagged_hash::{TAP_LEAF, TAP_TWEAK};
use crate::taproot::LEAF_VERSION_TAPSCRIPT;
use bitcoin::secp256k1::PublicKey;

/// Leaf tag prefix followed by the tapscript leaf version, pushed as one element
fn leaf_message_prefix() -> Vec<u8> {
    let mut prefix = TAP_LEAF.as_bytes().to_vec();
    prefix.push(LEAF_VERSION_TAPSCRIPT);
    prefix
}

/// The output-key equality check (`OP_FORCE_OUTPUT_SCRIPT_VERIFY`).
///
/// Consumes `<parity> <index> <destination> <internal key>` and leaves
/// nothing behind; callers append a truthy value.
pub fn force_output_script_verify() -> Builder {
    Builder::new()
        // keep the internal key for OP_TWEAKVERIFY
        .push_opcode(OP_DUP)
        .push_opcode(OP_TOALTSTACK)
        // tweak message prefix
        .push_slice(TAP_TWEAK.as_bytes())
        .push_opcode(OP_SWAP)
        .push_opcode(OP_CAT)
        // leaf hash message
        .push_slice(&leaf_message_prefix())
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_ROLL)
        .push_opcode(OP_CAT)
        // tweak
        .push_opcode(OP_SHA256)
        .push_opcode(OP_CAT)
        .push_opcode(OP_SHA256)
        .push_opcode(OP_TOALTSTACK)
        // compare against the inspected output
        .push_opcode(OP_INSPECTOUTPUTSCRIPTPUBKEY)
        .push_opcode(OP_VERIFY)
        .push_opcode(OP_CAT)
        .push_opcode(OP_FROMALTSTACK)
        .push_opcode(OP_FROMALTSTACK)
        .push_opcode(OP_TWEAKVERIFY)
}

/// Builder for the covenant leaf with an optional destination suffix
#[derive(Debug, Clone, Default)]
pub struct CovenantScriptBuilder {
    suffix: Option<Script>,
}

impl CovenantScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require destinations to end with `suffix`
    pub fn with_destination_suffix(mut self, suffix: Script) -> Self {
        self.suffix = Some(suffix);
        self
    }

    pub fn build(&self) -> Script {
        let mut builder = Builder::new();

        if let Some(suffix) = self.suffix.as_ref().filter(|s| !s.is_empty()) {
            builder = builder.push_opcode(OP_PUSHNUM_1).push_opcode(OP_ROLL);
            builder = push_minimal(builder, suffix.as_bytes())
                .push_opcode(OP_CAT)
                .push_opcode(OP_SWAP);
        }

        let mut bytes = builder.into_script().into_bytes();
        bytes.extend_from_slice(force_output_script_verify().into_script().as_bytes());
        Builder::from(bytes).push_opcode(OP_PUSHNUM_1).into_script()
    }
}

/// Covenant leaf for an optional destination suffix
pub fn covenant_script(suffix: Option<&Script>) -> Script {
    let mut builder = CovenantScriptBuilder::new();
    if let Some(suffix) = suffix {
        builder = builder.with_destination_suffix(suffix.clone());
    }
    builder.build()
}

/// Covenant leaf for a suffix given as ASM; an empty string means no suffix.
///
/// Fails with `ScriptConstruction` when the suffix does not parse.
pub fn covenant_script_from_asm(suffix_asm: &str) -> CovenantResult<Script> {
    let suffix = Script::from_asm(suffix_asm)?;
    Ok(covenant_script(Some(&suffix)))
}

/// A destination script split into the spender-chosen start and the
/// covenant-enforced end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationScript {
    start: Script,
    end: Script,
}

impl DestinationScript {
    pub fn new(start: Script, end: Script) -> Self {
        Self { start, end }
    }

    pub fn from_asm(start_asm: &str, end_asm: &str) -> CovenantResult<Self> {
        Ok(Self::new(Script::from_asm(start_asm)?, Script::from_asm(end_asm)?))
    }

    /// `<33-byte key> OP_CHECKSIG`
    pub fn for_internal_key(key: &PublicKey) -> Self {
        let start = Builder::new().push_slice(&key.serialize()).into_script();
        let end = Builder::new().push_opcode(OP_CHECKSIG).into_script();
        Self::new(start, end)
    }

    /// Default destination: the identity's internal key followed by `OP_CHECKSIG`
    pub fn default_for(identity: &SigningIdentity) -> Self {
        Self::for_internal_key(&identity.internal_public_key())
    }

    pub fn start(&self) -> &Script {
        &self.start
    }

    pub fn end(&self) -> &Script {
        &self.end
    }

    pub fn full(&self) -> Script {
        Script::from([self.start.as_bytes(), self.end.as_bytes()].concat())
    }

    /// Covenant leaf enforcing this destination's end
    pub fn covenant(&self) -> Script {
        covenant_script(Some(&self.end))
    }

    pub fn covenant_asm(&self) -> String {
        self.covenant().to_asm()
    }

    pub fn destination_asm(&self) -> String {
        self.full().to_asm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CovenantError;
    use crate::identity::SigningIdentity;

    const COVENANT_HEX: &str = concat!(
        "517a01ac7e7c766b40",
        "f081fa7c4fd96a8101d59ecedef324c4027b9cbc39735d254b48d88dd065d6e3",
        "f081fa7c4fd96a8101d59ecedef324c4027b9cbc39735d254b48d88dd065d6e3",
        "7c7e41",
        "69ffb55ab8c81c21f58b2adcb0835a08608af59d042f033764339cd8e6ba33e7",
        "69ffb55ab8c81c21f58b2adcb0835a08608af59d042f033764339cd8e6ba33e7",
        "c4527a7ea87ea86bd1697e6c6ce451"
    );

    #[test]
    fn test_covenant_script_with_checksig_suffix() {
        let script = covenant_script_from_asm("OP_CHECKSIG").unwrap();
        assert_eq!(script.to_hex(), COVENANT_HEX);
        assert_eq!(script.len(), 155);

        let asm = script.to_asm();
        assert!(asm.starts_with("OP_1 OP_ROLL ac OP_CAT OP_SWAP OP_DUP OP_TOALTSTACK "));
        assert!(asm.ends_with(
            "OP_INSPECTOUTPUTSCRIPTPUBKEY OP_VERIFY OP_CAT OP_FROMALTSTACK OP_FROMALTSTACK OP_TWEAKVERIFY OP_1"
        ));
        assert_eq!(Script::from_asm(&asm).unwrap(), script);
    }

    #[test]
    fn test_covenant_script_without_suffix() {
        let bare = covenant_script(None);
        let empty_suffix = covenant_script_from_asm("").unwrap();
        assert_eq!(bare, empty_suffix);
        assert!(bare.to_asm().starts_with("OP_DUP OP_TOALTSTACK"));
        assert_eq!(&COVENANT_HEX[12..], bare.to_hex());
    }

    #[test]
    fn test_bad_suffix_is_rejected() {
        let err = covenant_script_from_asm("OP_CHECKSIG OP_NOT_AN_OPCODE").unwrap_err();
        assert!(matches!(err, CovenantError::ScriptConstruction { .. }));
    }

    #[test]
    fn test_destination_script() {
        let identity = SigningIdentity::test_identity().unwrap();
        let destination = DestinationScript::default_for(&identity);

        assert_eq!(
            destination.full().to_hex(),
            "2102dd1786dee4b60e5f00815cc305460b3dd9f1d6d4c49f29118f77e2858f069f3cac"
        );
        assert_eq!(destination.start().len(), 34);
        assert!(destination.full().ends_with(destination.end()));
        assert_eq!(destination.covenant().to_hex(), COVENANT_HEX);

        let parsed = DestinationScript::from_asm(
            "02dd1786dee4b60e5f00815cc305460b3dd9f1d6d4c49f29118f77e2858f069f3c",
            "OP_CHECKSIG",
        )
        .unwrap();
        assert_eq!(parsed, destination);
        assert_eq!(
            destination.destination_asm(),
            "02dd1786dee4b60e5f00815cc305460b3dd9f1d6d4c49f29118f77e2858f069f3c OP_CHECKSIG"
        );
        assert!(destination.covenant_asm().ends_with("OP_TWEAKVERIFY OP_1"));
    }
}
