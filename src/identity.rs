//! # Signing Identity
//!
//! Key material for one covenant operator: the secret key controlling the
//! fee-funding P2WPKH output and the Taproot internal public key. An identity
//! is passed explicitly to everything that derives addresses or signs, so
//! several identities (and networks) can coexist in one process.

use crate::config::{env as config_env, keys};
use crate::error::{CovenantError, CovenantResult};
use crate::network::NetworkParams;
use crate::taproot;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};
use elements::hashes::Hash;
use elements::{PubkeyHash, Script, WPubkeyHash};
use log::warn;
use rand::Rng;
use std::{env, fmt};

/// Funding key pair plus internal key
#[derive(Clone)]
pub struct SigningIdentity {
    funding_secret: SecretKey,
    funding_public: PublicKey,
    internal_public: PublicKey,
}

impl SigningIdentity {
    pub fn new(funding_secret: SecretKey, internal_public: PublicKey) -> Self {
        let secp = Secp256k1::signing_only();
        Self {
            funding_public: PublicKey::from_secret_key(&secp, &funding_secret),
            funding_secret,
            internal_public,
        }
    }

    /// Derive the internal public key from its secret
    pub fn from_secret_keys(funding_secret: SecretKey, internal_secret: &SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        Self::new(funding_secret, PublicKey::from_secret_key(&secp, internal_secret))
    }

    pub fn from_secret_hex(funding_hex: &str, internal_hex: &str) -> CovenantResult<Self> {
        let funding = parse_secret_key(funding_hex)?;
        let internal = parse_secret_key(internal_hex)?;
        Ok(Self::from_secret_keys(funding, &internal))
    }

    /// Identity built from the fixed test keys in [`crate::config::keys`]
    pub fn test_identity() -> CovenantResult<Self> {
        Self::from_secret_hex(keys::TEST_FUNDING_SECRET_KEY, keys::TEST_INTERNAL_SECRET_KEY)
    }

    /// Fresh random funding and internal keys
    pub fn generate() -> Self {
        Self::from_secret_keys(generate_secret_key(), &generate_secret_key())
    }

    /// Load keys from the environment (and `.env`), falling back to the test keys
    pub fn from_env() -> CovenantResult<Self> {
        dotenv::dotenv().ok();

        let funding = env::var(config_env::FUNDING_KEY).unwrap_or_else(|_| {
            warn!("{} not set, using the test funding key", config_env::FUNDING_KEY);
            keys::TEST_FUNDING_SECRET_KEY.to_string()
        });
        let internal = env::var(config_env::INTERNAL_KEY).unwrap_or_else(|_| {
            warn!("{} not set, using the test internal key", config_env::INTERNAL_KEY);
            keys::TEST_INTERNAL_SECRET_KEY.to_string()
        });

        Self::from_secret_hex(funding.trim(), internal.trim())
            .map_err(|e| CovenantError::config(format!("invalid signing key: {e}")))
    }

    pub fn funding_secret_key(&self) -> &SecretKey {
        &self.funding_secret
    }

    pub fn funding_public_key(&self) -> PublicKey {
        self.funding_public
    }

    /// Full internal key; its compressed form starts the default destination script
    pub fn internal_public_key(&self) -> PublicKey {
        self.internal_public
    }

    pub fn internal_x_only(&self) -> XOnlyPublicKey {
        self.internal_public.x_only_public_key().0
    }

    /// P2WPKH output script of the funding key
    pub fn funding_script_pubkey(&self) -> Script {
        Script::new_v0_wpkh(&WPubkeyHash::hash(&self.funding_public.serialize()))
    }

    /// BIP-143 script code for spending the funding output
    pub fn funding_script_code(&self) -> Script {
        Script::new_p2pkh(&PubkeyHash::hash(&self.funding_public.serialize()))
    }

    pub fn funding_address(&self, network: &NetworkParams) -> CovenantResult<String> {
        taproot::address(&self.funding_script_pubkey(), network)
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("funding_public", &self.funding_public)
            .field("internal_public", &self.internal_public)
            .finish_non_exhaustive()
    }
}

pub fn parse_secret_key(secret_hex: &str) -> CovenantResult<SecretKey> {
    let bytes = hex::decode(secret_hex)
        .map_err(|e| CovenantError::encoding(format!("secret key is not hex: {e}")))?;
    SecretKey::from_slice(&bytes)
        .map_err(|e| CovenantError::crypto(format!("invalid secret key: {e}")))
}

/// Fresh random secret key
pub fn generate_secret_key() -> SecretKey {
    let mut rng = rand::rng();
    loop {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        // zero or not below the curve order
        if let Ok(secret) = SecretKey::from_slice(&bytes) {
            return secret;
        }
    }
}
