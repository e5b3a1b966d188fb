use rand::Rng;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LOWER_ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of every record, job and batch id.
pub const ID_LENGTH: usize = 18;

/// Generate an 18-character id: the 3-character prefix followed by random
/// upper-case alphanumerics. Uniqueness relies on the 36^15 space, not on
/// a lookup.
pub fn generate_id(prefix: &str) -> String {
    let mut id = String::with_capacity(ID_LENGTH);
    id.push_str(prefix);
    let remaining = ID_LENGTH.saturating_sub(prefix.len());
    id.push_str(&random_from(ID_ALPHABET, remaining));
    id
}

/// Random lower-case alphanumeric string, used for tokens and signatures.
pub fn random_token(len: usize) -> String {
    random_from(LOWER_ALPHANUMERIC, len)
}

fn random_from(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}
