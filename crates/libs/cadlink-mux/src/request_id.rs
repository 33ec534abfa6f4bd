use rand_core::{OsRng, RngCore};

/// Random correlation id bytes. 128 bits keeps collisions out of reach for any realistic
/// number of outstanding requests.
pub const REQUEST_ID_BYTES: usize = 16;

/// A fresh lowercase-hex correlation id.
pub fn generate() -> String {
    let mut bytes = [0u8; REQUEST_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates ids until one is not rejected by `in_use`.
pub fn generate_unique(mut in_use: impl FnMut(&str) -> bool) -> String {
    loop {
        let id = generate();
        if !in_use(&id) {
            return id;
        }
    }
}
