// Identity generation: every run gets a fresh random machine id and a UID
// derived from it. Nothing here is persisted, so restarting the program
// always presents a new client instance to the backend.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Characters a machine id is drawn from (64 symbols).
pub const MACHINE_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_";

/// Length of a generated machine id.
pub const MACHINE_ID_LEN: usize = 128;

const UID_PREFIX: &str = "AdminConsole-";

/// Machine id plus the UID derived from it.
#[derive(Debug, Clone)]
pub struct Identity {
    pub machine_id: String,
    pub uid: String,
}

impl Identity {
    pub fn generate() -> Self {
        let machine_id = generate_machine_id();
        let uid = generate_uid(&machine_id);
        Identity { machine_id, uid }
    }
}

/// Random 128 character id over `A-Za-z0-9_`. Not meant to be secret.
pub fn generate_machine_id() -> String {
    let mut rng = rand::thread_rng();
    (0..MACHINE_ID_LEN)
        .map(|_| MACHINE_ID_ALPHABET[rng.gen_range(0..MACHINE_ID_ALPHABET.len())] as char)
        .collect()
}

/// Uppercase hex SHA-256 of `"AdminConsole-" + machine_id`.
pub fn generate_uid(machine_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(UID_PREFIX.as_bytes());
    hasher.update(machine_id.as_bytes());
    hex::encode_upper(hasher.finalize())
}
