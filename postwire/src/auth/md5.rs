//! MD5 password hashing.
use md5::{Digest, Md5};
use std::fmt::Write;

/// Compute `"md5" || hex(md5(hex(md5(password || user)) || salt))`.
pub fn encode(user: &str, password: &str, salt: [u8; 4]) -> String {
    let mut md5 = Md5::new();
    md5.update(password.as_bytes());
    md5.update(user.as_bytes());
    let inner = hex(&md5.finalize_reset());

    md5.update(inner.as_bytes());
    md5.update(salt);

    let mut output = String::with_capacity(35);
    output.push_str("md5");
    output.push_str(&hex(&md5.finalize()));
    output
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn md5_password() {
        // rolpassword of user `postgres` with password `postgres`
        assert_eq!(hex(&Md5::digest(b"postgrespostgres")), "3175bce1d3201d16594cebf9d7eb3f9d");

        let hashed = encode("postgres", "postgres", [1, 2, 3, 4]);
        assert_eq!(hashed, "md568be9ed08db75f318087ab337aaea044");
        assert_ne!(hashed, encode("postgres", "postgres", [4, 3, 2, 1]));
    }
}
