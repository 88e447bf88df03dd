use std::fmt::Write;

use rand::{rngs::OsRng, RngCore};

const TOKEN_BYTES: usize = 8;

/// Random activation token: 8 bytes from the OS CSPRNG as 16 lowercase hex chars.
pub fn generate_activation_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(TOKEN_BYTES * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
