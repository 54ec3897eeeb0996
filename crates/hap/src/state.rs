//! Persisted server identity and pairing records
//!
//! The state file is JSON with hex-encoded key material. Saving writes a
//! uniquely named temporary file next to the target and renames it over
//! the target, so a crash never leaves a truncated state file behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use ed25519_dalek::{SigningKey, VerifyingKey};
use hap_types::Category;
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::StateError;

/// Public key of a paired controller
pub type ClientPublicKey = [u8; 32];

const SETUP_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Identity and pairing state of an accessory server
#[derive(Clone)]
pub struct State {
    /// Stable server identifier, `XX:XX:XX:XX:XX:XX`
    pub mac: String,

    /// Setup code, `DDD-DD-DDD`
    pub pincode: String,

    /// Four character setup id used in the setup URI
    pub setup_id: String,

    /// Configuration number, bumped whenever the accessory database changes
    pub config_version: u32,

    signing_key: SigningKey,
    paired_clients: BTreeMap<Uuid, ClientPublicKey>,
}

impl State {
    /// Generate a fresh identity
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let mut mac = [0u8; 6];
        rng.fill(&mut mac);
        let mac = mac.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(":");

        let digits: Vec<u8> = (0..8).map(|_| rng.gen_range(0..10u8)).collect();
        let d = |r: std::ops::Range<usize>| digits[r].iter().map(|d| d.to_string()).collect::<String>();
        let pincode = format!("{}-{}-{}", d(0..3), d(3..5), d(5..8));

        let setup_id = (0..4)
            .map(|_| SETUP_ID_ALPHABET[rng.gen_range(0..SETUP_ID_ALPHABET.len())] as char)
            .collect();

        Self {
            mac,
            pincode,
            setup_id,
            config_version: 1,
            signing_key: SigningKey::generate(&mut OsRng),
            paired_clients: BTreeMap::new(),
        }
    }

    /// Use a fixed server identifier
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = mac.into();
        self
    }

    /// Use a fixed setup code
    pub fn with_pincode(mut self, pincode: impl Into<String>) -> Self {
        self.pincode = pincode.into();
        self
    }

    /// Long-term signing key
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Long-term public key
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn is_paired(&self) -> bool {
        !self.paired_clients.is_empty()
    }

    /// Record a paired controller, replacing any previous key for it
    pub fn add_paired_client(&mut self, client_id: Uuid, public_key: ClientPublicKey) {
        self.paired_clients.insert(client_id, public_key);
    }

    /// Forget a paired controller; returns whether it was known
    pub fn remove_paired_client(&mut self, client_id: &Uuid) -> bool {
        self.paired_clients.remove(client_id).is_some()
    }

    pub fn paired_clients(&self) -> &BTreeMap<Uuid, ClientPublicKey> {
        &self.paired_clients
    }

    /// Setup URI encoded in the QR code shown to users
    pub fn setup_uri(&self, category: Category) -> String {
        let code: u64 = self
            .pincode
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .unwrap_or(0);

        // version(3) | reserved(4) | category(8) | flags(4) | setup code(27)
        let mut payload: u64 = 0;
        payload |= category.id() as u64;
        payload <<= 4;
        payload |= 2; // IP transport
        payload <<= 27;
        payload |= code & 0x07FF_FFFF;

        format!("X-HM://{}{}", base36(payload, 9), self.setup_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the state to `path`
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let file = StateFile {
            mac: self.mac.clone(),
            pincode: self.pincode.clone(),
            setup_id: self.setup_id.clone(),
            config_version: self.config_version,
            private_key: hex::encode(self.signing_key.to_bytes()),
            public_key: hex::encode(self.public_key()),
            paired_clients: self
                .paired_clients
                .iter()
                .map(|(id, key)| (*id, hex::encode(key)))
                .collect(),
        };

        let json = serde_json::to_vec_pretty(&file)?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(path).map_err(|e| e.error)?;

        tracing::debug!(path = %path.display(), "State saved");
        Ok(())
    }

    /// Read a state previously written by [`State::save`]
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let bytes = std::fs::read(path)?;
        let file: StateFile = serde_json::from_slice(&bytes)?;

        let signing_key = SigningKey::from_bytes(&decode_key(&file.private_key, "private_key")?);
        let public_key = VerifyingKey::from_bytes(&decode_key(&file.public_key, "public_key")?)
            .map_err(|_| StateError::InvalidKey { field: "public_key" })?;
        if signing_key.verifying_key() != public_key {
            return Err(StateError::KeyMismatch);
        }

        let paired_clients = file
            .paired_clients
            .iter()
            .map(|(id, key)| Ok((*id, decode_key(key, "paired_clients")?)))
            .collect::<Result<_, StateError>>()?;

        tracing::debug!(path = %path.display(), "State loaded");
        Ok(Self {
            mac: file.mac,
            pincode: file.pincode,
            setup_id: file.setup_id,
            config_version: file.config_version,
            signing_key,
            paired_clients,
        })
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("mac", &self.mac)
            .field("setup_id", &self.setup_id)
            .field("config_version", &self.config_version)
            .field("public_key", &hex::encode(self.public_key()))
            .field("paired_clients", &self.paired_clients.len())
            .finish_non_exhaustive()
    }
}

/// On-disk layout
#[derive(Serialize, Deserialize)]
struct StateFile {
    mac: String,
    pincode: String,
    setup_id: String,
    config_version: u32,
    private_key: String,
    public_key: String,
    #[serde(default)]
    paired_clients: BTreeMap<Uuid, String>,
}

fn decode_key(encoded: &str, field: &'static str) -> Result<[u8; 32], StateError> {
    hex::decode(encoded)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or(StateError::InvalidKey { field })
}

fn base36(mut n: u64, width: usize) -> String {
    let mut out = Vec::new();
    while n > 0 {
        out.push(SETUP_ID_ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    while out.len() < width {
        out.push(b'0');
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}
