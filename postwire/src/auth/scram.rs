//! SCRAM-SHA-256 client, RFC 5802 and RFC 7677.
//!
//! ```text
//! client-first  n,,n=<user>,r=<client nonce>
//! server-first  r=<combined nonce>,s=<salt>,i=<iterations>
//! client-final  c=biws,r=<combined nonce>,p=<proof>
//! server-final  v=<server signature>
//! ```
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac_array;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::{AuthError, StringPreparation};

type HmacSha256 = Hmac<Sha256>;

/// SASL mechanism name.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// SASL mechanism name with channel binding.
pub const SCRAM_SHA_256_PLUS: &str = "SCRAM-SHA-256-PLUS";

/// `base64("n,,")`, no channel binding.
const CHANNEL_BINDING: &str = "biws";

/// State of one SCRAM exchange.
///
/// Derived key material is zeroed when the session is dropped.
pub struct ScramSession {
    client_nonce: String,
    client_first_bare: String,
    /// Whether channel binding is used, always `false` without TLS.
    channel_binding: bool,
    combined_nonce: String,
    salt: Vec<u8>,
    iterations: u32,
    salted_password: [u8; 32],
    auth_message: String,
}

impl ScramSession {
    /// Start a session with a random 18 bytes nonce.
    pub fn new(user: &str) -> ScramSession {
        let mut nonce = [0u8; 18];
        rand::rng().fill_bytes(&mut nonce);
        Self::with_nonce(user, &B64.encode(nonce))
    }

    pub(crate) fn with_nonce(user: &str, nonce: &str) -> ScramSession {
        ScramSession {
            client_nonce: nonce.to_owned(),
            client_first_bare: format!("n={},r={nonce}", sasl_escape(user)),
            channel_binding: false,
            combined_nonce: String::new(),
            salt: Vec::new(),
            iterations: 0,
            salted_password: [0; 32],
            auth_message: String::new(),
        }
    }

    /// `client-first-message`, sent in `SASLInitialResponse`.
    pub fn client_first(&self) -> String {
        let gs2 = if self.channel_binding { "p=tls-server-end-point" } else { "n" };
        format!("{gs2},,{}", self.client_first_bare)
    }

    /// Consume `server-first-message` and produce `client-final-message`.
    pub fn client_final(
        &mut self,
        server_first: &str,
        password: &str,
        prep: StringPreparation,
    ) -> Result<String, AuthError> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in server_first.split(',') {
            if let Some(v) = part.strip_prefix("r=") {
                nonce = Some(v);
            } else if let Some(v) = part.strip_prefix("s=") {
                salt = Some(v);
            } else if let Some(v) = part.strip_prefix("i=") {
                iterations = Some(v);
            } else if part.starts_with("m=") {
                return Err(AuthError::Scram("mandatory extension not supported"));
            }
        }

        let nonce = nonce.ok_or(AuthError::Scram("server-first missing nonce"))?;
        let salt = salt.ok_or(AuthError::Scram("server-first missing salt"))?;
        let iterations = iterations.ok_or(AuthError::Scram("server-first missing iteration count"))?;

        if !nonce.starts_with(&self.client_nonce) {
            return Err(AuthError::Scram("server nonce does not extend client nonce"));
        }

        self.iterations = match iterations.parse() {
            Ok(i) if i >= 1 => i,
            _ => return Err(AuthError::Scram("invalid iteration count")),
        };
        self.salt = B64.decode(salt).map_err(|_| AuthError::Scram("salt is not valid base64"))?;
        self.combined_nonce = nonce.to_owned();

        let password = prep.normalize(password)?;
        // `Hi()` is PBKDF2 with HMAC-SHA-256
        self.salted_password = pbkdf2_hmac_array::<Sha256, 32>(password.as_bytes(), &self.salt, self.iterations);

        let client_final_without_proof = format!("c={CHANNEL_BINDING},r={}", self.combined_nonce);
        self.auth_message = format!(
            "{},{server_first},{client_final_without_proof}",
            self.client_first_bare,
        );

        let mut client_key = hmac(&self.salted_password, b"Client Key");
        let stored_key = Sha256::digest(client_key);
        let client_signature = hmac(&stored_key, self.auth_message.as_bytes());

        for (k, s) in client_key.iter_mut().zip(client_signature) {
            *k ^= s;
        }
        let proof = B64.encode(client_key);
        client_key.fill(0);

        Ok(format!("{client_final_without_proof},p={proof}"))
    }

    /// Verify the server signature in `server-final-message`.
    pub fn verify_server_final(&self, server_final: &str) -> Result<(), AuthError> {
        if self.combined_nonce.is_empty() {
            return Err(AuthError::Scram("server-final before server-first"));
        }

        if let Some(e) = server_final.split(',').find_map(|p| p.strip_prefix("e=")) {
            return Err(AuthError::ServerRejected(e.to_owned()));
        }

        let verifier = server_final
            .split(',')
            .find_map(|p| p.strip_prefix("v="))
            .ok_or(AuthError::Scram("server-final missing verifier"))?;

        let signature = B64
            .decode(verifier.trim())
            .map_err(|_| AuthError::Scram("server signature is not valid base64"))?;

        let server_key = hmac(&self.salted_password, b"Server Key");
        let expected = hmac(&server_key, self.auth_message.as_bytes());

        if !constant_time_eq(&signature, &expected) {
            return Err(AuthError::SignatureMismatch);
        }

        Ok(())
    }
}

impl Drop for ScramSession {
    fn drop(&mut self) {
        for b in &mut self.salted_password {
            // SAFETY: `b` is a valid, aligned reference into our own buffer
            unsafe { std::ptr::write_volatile(b, 0) };
        }
        std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ScramSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramSession")
            .field("client_nonce", &self.client_nonce)
            .field("combined_nonce", &self.combined_nonce)
            .field("iterations", &self.iterations)
            .field("channel_binding", &self.channel_binding)
            .finish_non_exhaustive()
    }
}

/// Escape `=` and `,` in saslname.
fn sasl_escape(user: &str) -> String {
    user.replace('=', "=3D").replace(',', "=2C")
}

fn hmac(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = new_mac(key);
    mac.update(message);
    finalize(mac)
}

fn finalize(mac: HmacSha256) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accept any key length")
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod test {
    use super::*;

    const SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";

    fn rfc7677() -> ScramSession {
        ScramSession::with_nonce("user", "rOprNGfwEbeRWgbNEkqO")
    }

    #[test]
    fn rfc7677_exchange() {
        let mut scram = rfc7677();
        assert_eq!(scram.client_first(), "n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let client_final = scram.client_final(SERVER_FIRST, "pencil", StringPreparation::SaslPrep).unwrap();
        assert_eq!(
            client_final,
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
             p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );

        scram.verify_server_final("v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=").unwrap();
    }

    #[test]
    fn wrong_server_signature() {
        let mut scram = rfc7677();
        scram.client_final(SERVER_FIRST, "pencil", StringPreparation::SaslPrep).unwrap();
        let err = scram.verify_server_final("v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").unwrap_err();
        assert!(matches!(err, AuthError::SignatureMismatch));
    }

    #[test]
    fn server_error_final() {
        let mut scram = rfc7677();
        scram.client_final(SERVER_FIRST, "pencil", StringPreparation::SaslPrep).unwrap();
        let err = scram.verify_server_final("e=invalid-proof").unwrap_err();
        assert!(matches!(err, AuthError::ServerRejected(e) if e == "invalid-proof"));
    }

    #[test]
    fn rejects_bad_server_first() {
        let prep = StringPreparation::SaslPrep;
        let cases = [
            "r=someoneelse,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            "r=rOprNGfwEbeRWgbNEkqOxyz,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=0",
            "r=rOprNGfwEbeRWgbNEkqOxyz,s=!!!,i=4096",
            "r=rOprNGfwEbeRWgbNEkqOxyz,i=4096",
            "m=ext,r=rOprNGfwEbeRWgbNEkqOxyz,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
        ];
        for case in cases {
            let err = rfc7677().client_final(case, "pencil", prep).unwrap_err();
            assert!(matches!(err, AuthError::Scram(_)), "{case}: {err}");
        }
    }

    #[test]
    fn empty_password() {
        let err = rfc7677().client_final(SERVER_FIRST, "", StringPreparation::SaslPrep).unwrap_err();
        assert!(matches!(err, AuthError::StringPrep(_)));
    }

    #[test]
    fn escaped_user_and_random_nonce() {
        let a = ScramSession::new("a=b,c");
        let b = ScramSession::new("a=b,c");
        assert!(a.client_first().starts_with("n,,n=a=3Db=2Cc,r="));
        assert_ne!(a.client_first(), b.client_first());
    }
}
