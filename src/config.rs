//! # Configuration Constants
//!
//! Configuration values used by the covenant toolkit: node connection
//! defaults, the amounts moved by the covenant flow, throwaway test keys and
//! the environment variables that override them.

/// Node and RPC configuration
pub mod network {
    use std::time::Duration;

    /// Default Elements RPC host
    pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";

    /// Default Elements regtest RPC port
    pub const DEFAULT_RPC_PORT: &str = "18884";

    /// Default RPC username
    pub const DEFAULT_RPC_USER: &str = "admin1";

    /// Default RPC password
    pub const DEFAULT_RPC_PASSWORD: &str = "123";

    /// Default network parameter set name
    pub const DEFAULT_NETWORK: &str = "regtest";

    /// Blocks mined after a successful broadcast so the spend confirms.
    ///
    /// Generation is best-effort: a node that refuses `generatetoaddress`
    /// (anything but regtest) only produces a warning.
    pub const BLOCKS_AFTER_BROADCAST: u64 = 10;

    /// Deadline the CLI imposes on the whole issue/lock/fund/spend sequence.
    ///
    /// The flow checks it before every node call; a single call in flight
    /// still blocks until the node answers.
    pub const DEFAULT_FLOW_DEADLINE: Duration = Duration::from_secs(60);

    /// Extra time the CLI waits past the deadline for a blocked node call
    pub const DEADLINE_GRACE: Duration = Duration::from_secs(5);
}

/// Covenant flow constants
///
/// These values define the amounts moved by the demonstration flow and the
/// shape of the spending transaction.
pub mod covenant {
    /// Amount of the freshly issued asset, in satoshi units.
    ///
    /// The full issuance is locked into the covenant and later moved to the
    /// destination output, so the covenant output and the destination output
    /// carry exactly this value.
    pub const ISSUANCE_AMOUNT_SATS: u64 = 1;

    /// Reissuance tokens requested alongside the issuance.
    pub const REISSUANCE_TOKEN_AMOUNT: f64 = 0.0;

    /// Explicit fee paid by the covenant spend, in policy-asset satoshis.
    ///
    /// Elements transactions carry their fee as an explicit output with an
    /// empty script, so this value is also the value of output 1.
    pub const TRANSACTION_FEE_SATS: u64 = 500;

    /// Policy-asset amount sent to the signing identity's P2WPKH address.
    ///
    /// Consumed entirely by the fee output; the spend has no change output.
    pub const FUNDING_AMOUNT_SATS: u64 = 500;

    /// Version of the covenant spending transaction
    pub const TRANSACTION_VERSION: u32 = 2;

    /// Position of the output whose script the covenant inspects
    pub const DESTINATION_OUTPUT_INDEX: u32 = 0;

    /// Standardness limit on a single witness stack element.
    ///
    /// The destination script start is pushed as one witness element, so
    /// long destination prefixes will be refused by relay policy.
    pub const MAX_STANDARD_WITNESS_ELEMENT_SIZE: usize = 80;
}

/// Test key material
///
/// TEST PRIVATE KEYS. NEVER USE FOR SERIOUS PURPOSES.
pub mod keys {
    /// Secret key controlling the fee-funding P2WPKH output
    pub const TEST_FUNDING_SECRET_KEY: &str =
        "968f91395a8d682e5e3dd4a4f19465f1d9122cbbe82a5a624d863c39513a4eed";

    /// Secret key of an alternative recipient, used to build foreign destinations
    pub const TEST_RECIPIENT_SECRET_KEY: &str =
        "e30fe5eaa2a46119b706d5ffa974549c9a19a832ace7438112d20f452e3376fa";

    /// Secret key whose public key is the Taproot internal key
    pub const TEST_INTERNAL_SECRET_KEY: &str =
        "06f4f2c32662bb1638b7764a6f9dac5e647a66ffad1cbeec9edaf2564b0c024e";
}

/// Environment variable names
pub mod env {
    /// RPC host override
    pub const RPC_URL: &str = "RPC_URL";

    /// RPC port override
    pub const RPC_PORT: &str = "RPC_PORT";

    /// RPC username override
    pub const RPC_USER: &str = "RPC_USER";

    /// RPC password override
    pub const RPC_PASSWORD: &str = "RPC_PASSWORD";

    /// Optional wallet name; when set, calls go to `/wallet/<name>`
    pub const RPC_WALLET: &str = "RPC_WALLET";

    /// Network parameter set (`regtest`, `liquidtestnet`, `liquid`)
    pub const NETWORK: &str = "COVENANT_NETWORK";

    /// Hex secret key for the fee-funding input
    pub const FUNDING_KEY: &str = "COVENANT_FUNDING_KEY";

    /// Hex secret key whose public key becomes the internal key
    pub const INTERNAL_KEY: &str = "COVENANT_INTERNAL_KEY";
}
