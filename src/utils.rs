//! # Utility Functions
//!
//! Identifier byte-order helpers and amount conversions shared by the
//! partial transaction signer and the node client.

use crate::error::{CovenantError, CovenantResult};

/// 32-byte identifier utilities (txids, asset ids)
///
/// Nodes print txids and asset ids in big-endian display order while the
/// transaction serialization stores them little-endian. Every identifier
/// read from the node goes through [`id::display_to_internal`].
pub mod id {
    use super::*;

    /// Validate identifier format (64 hex characters)
    pub fn validate(id: &str) -> CovenantResult<()> {
        if id.len() != 64 {
            return Err(CovenantError::encoding(format!(
                "identifier must be 64 characters, got {}",
                id.len()
            )));
        }

        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CovenantError::encoding(
                "identifier must contain only hexadecimal characters",
            ));
        }

        Ok(())
    }

    /// Decode display hex and reverse it into internal byte order
    pub fn display_to_internal(id: &str) -> CovenantResult<[u8; 32]> {
        validate(id)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(id, &mut bytes)
            .map_err(|e| CovenantError::encoding(format!("invalid identifier {id}: {e}")))?;
        bytes.reverse();
        Ok(bytes)
    }

    /// Reverse internal bytes back into display hex
    pub fn internal_to_display(bytes: &[u8; 32]) -> String {
        let mut reversed = *bytes;
        reversed.reverse();
        hex::encode(reversed)
    }

    /// Asset id from the display hex printed by the node
    pub fn parse_asset(id: &str) -> CovenantResult<elements::AssetId> {
        let bytes = display_to_internal(id)?;
        Ok(elements::AssetId::from_byte_array(bytes))
    }

    /// Txid from the display hex printed by the node
    pub fn parse_txid(id: &str) -> CovenantResult<elements::Txid> {
        use elements::hashes::Hash;
        let bytes = display_to_internal(id)?;
        Ok(elements::Txid::from_byte_array(bytes))
    }
}

/// Amount conversion utilities
pub mod amount {
    /// Satoshis per whole coin
    pub const SATS_PER_COIN: f64 = 100_000_000.0;

    /// Convert satoshis to a coin-denominated amount for RPC arguments
    pub fn sats_to_btc(sats: u64) -> f64 {
        sats as f64 / SATS_PER_COIN
    }

    /// Convert a coin-denominated RPC amount to satoshis.
    ///
    /// Rounds to the nearest satoshi; `0.00000001 * 1e8` is not exactly 1.0
    /// in binary floating point.
    pub fn btc_to_sats(btc: f64) -> u64 {
        (btc * SATS_PER_COIN).round() as u64
    }

    /// Format amount as a string with units
    pub fn format_sats(sats: u64) -> String {
        if sats == 1 {
            "1 sat".to_string()
        } else {
            format!("{} sats", sats)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COVENANT_TXID: &str =
        "f1a5c2b8d4e6071829304a5b6c7d8e9f0a1b2c3d4e5f60718293a4b5c6d7e8f9";

    #[test]
    fn test_id_reversal_round_trip() {
        let internal = id::display_to_internal(COVENANT_TXID).unwrap();
        assert_eq!(internal[0], 0xf9);
        assert_eq!(internal[31], 0xf1);
        assert_eq!(id::internal_to_display(&internal), COVENANT_TXID);

        let forward = hex::decode(COVENANT_TXID).unwrap();
        let mut twice = internal;
        twice.reverse();
        assert_eq!(twice.to_vec(), forward);
    }

    #[test]
    fn test_parsed_ids_display_in_node_order() {
        let txid = id::parse_txid(COVENANT_TXID).unwrap();
        assert_eq!(txid.to_string(), COVENANT_TXID);
        assert_eq!(elements::hashes::Hash::to_byte_array(txid)[0], 0xf9);

        let policy = "5ac9f65c0efcc4775e0baec4ec03abdde22473cd3cf33c0419ca290e0751b225";
        let asset = id::parse_asset(policy).unwrap();
        assert_eq!(asset.to_string(), policy);
        assert_eq!(asset, policy.parse::<elements::AssetId>().unwrap());

        assert!(id::parse_asset("abcd").is_err());
    }

    #[test]
    fn test_id_validation() {
        assert!(id::validate(COVENANT_TXID).is_ok());
        assert!(id::validate("abcd").is_err());
        assert!(id::display_to_internal(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_amount_rounding() {
        assert_eq!(amount::btc_to_sats(0.00000001), 1);
        assert_eq!(amount::btc_to_sats(0.000005), 500);
        assert_eq!(amount::btc_to_sats(0.29), 29_000_000);
        assert_eq!(amount::sats_to_btc(500), 0.000005);
        assert_eq!(amount::format_sats(1), "1 sat");
        assert_eq!(amount::format_sats(500), "500 sats");
    }
}
