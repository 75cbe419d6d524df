//! Authentication exchange.
//!
//! [`Authenticator`] turns each `Authentication` request from the backend into the
//! response the frontend should send. It performs no io, the startup phase drives it.
use crate::postgres::backend::Authentication;

mod md5;
mod scram;
mod stringprep;

pub use scram::{SCRAM_SHA_256, SCRAM_SHA_256_PLUS, ScramSession};
pub use stringprep::{StringPrepError, StringPreparation};

/// An error when authenticating.
///
/// Authentication failures are never retried.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(String),
    #[error("password required but not provided")]
    MissingPassword,
    #[error(transparent)]
    StringPrep(#[from] StringPrepError),
    #[error("SCRAM exchange failed: {0}")]
    Scram(&'static str),
    #[error("server rejected SCRAM proof: {0}")]
    ServerRejected(String),
    #[error("server signature mismatch")]
    SignatureMismatch,
    #[error("{0} before SASL exchange started")]
    OutOfOrder(&'static str),
}

/// Message the frontend must send back.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthResponse {
    /// `PasswordMessage`, cleartext or md5 hashed.
    Password(String),
    /// `SASLInitialResponse`.
    SaslInitial {
        mechanism: &'static str,
        data: String,
    },
    /// `SASLResponse`.
    Sasl(String),
}

/// Drives one authentication exchange.
pub struct Authenticator<'a> {
    user: &'a str,
    password: Option<&'a str>,
    prep: StringPreparation,
    scram: Option<ScramSession>,
}

impl<'a> Authenticator<'a> {
    pub fn new(user: &'a str, password: Option<&'a str>, prep: StringPreparation) -> Self {
        Self { user, password, prep, scram: None }
    }

    /// Respond to an authentication request.
    ///
    /// Returns [`None`] when nothing should be sent, either because authentication
    /// completed or the server final SASL message has been verified.
    pub fn respond(&mut self, request: Authentication) -> Result<Option<AuthResponse>, AuthError> {
        let response = match request {
            // a SASL exchange must end with a verified server signature
            Authentication::Ok if self.scram.is_some() => return Err(AuthError::Scram("missing server signature")),
            Authentication::Ok => return Ok(None),
            Authentication::CleartextPassword => AuthResponse::Password(self.password()?.to_owned()),
            Authentication::MD5Password { salt } => {
                AuthResponse::Password(md5::encode(self.user, self.password()?, salt))
            },
            Authentication::SASL { mechanisms } => {
                let mechanism = select_mechanism(mechanisms.iter().map(|m| m.as_str()))?;
                // fail before sending anything if there is no password to prove
                self.password()?;
                let scram = ScramSession::new(self.user);
                let data = scram.client_first();
                self.scram = Some(scram);
                AuthResponse::SaslInitial { mechanism, data }
            },
            Authentication::SASLContinue { data } => {
                let password = self.password()?;
                let prep = self.prep;
                let scram = self.scram.as_mut().ok_or(AuthError::OutOfOrder("SASLContinue"))?;
                let server_first = std::str::from_utf8(&data)
                    .map_err(|_| AuthError::Scram("server-first is not utf8"))?;
                AuthResponse::Sasl(scram.client_final(server_first, password, prep)?)
            },
            Authentication::SASLFinal { data } => {
                let scram = self.scram.take().ok_or(AuthError::OutOfOrder("SASLFinal"))?;
                let server_final = std::str::from_utf8(&data)
                    .map_err(|_| AuthError::Scram("server-final is not utf8"))?;
                scram.verify_server_final(server_final)?;
                return Ok(None);
            },
            Authentication::KerberosV5 => return Err(unsupported("KerberosV5")),
            Authentication::GSS | Authentication::GSSContinue { .. } => return Err(unsupported("GSS")),
            Authentication::SSPI => return Err(unsupported("SSPI")),
        };
        Ok(Some(response))
    }

    fn password(&self) -> Result<&'a str, AuthError> {
        self.password.ok_or(AuthError::MissingPassword)
    }
}

/// Pick `SCRAM-SHA-256` from the server list.
///
/// Channel binding requires TLS, so `SCRAM-SHA-256-PLUS` alone is not enough.
pub fn select_mechanism<'m>(mechanisms: impl IntoIterator<Item = &'m str>) -> Result<&'static str, AuthError> {
    let mut offered = vec![];
    for mechanism in mechanisms {
        if mechanism == SCRAM_SHA_256 {
            return Ok(SCRAM_SHA_256);
        }
        offered.push(mechanism);
    }
    Err(AuthError::UnsupportedMechanism(offered.join(",")))
}

fn unsupported(name: &str) -> AuthError {
    AuthError::UnsupportedMechanism(name.into())
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn mechanism_selection() {
        assert_eq!(select_mechanism([SCRAM_SHA_256_PLUS, SCRAM_SHA_256]).unwrap(), SCRAM_SHA_256);
        let err = select_mechanism([SCRAM_SHA_256_PLUS]).unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedMechanism(m) if m == SCRAM_SHA_256_PLUS));
    }

    #[test]
    fn cleartext_and_missing_password() {
        let mut auth = Authenticator::new("user", Some("secret"), StringPreparation::SaslPrep);
        let res = auth.respond(Authentication::CleartextPassword).unwrap();
        assert_eq!(res, Some(AuthResponse::Password("secret".into())));

        let mut auth = Authenticator::new("user", None, StringPreparation::SaslPrep);
        let err = auth.respond(Authentication::MD5Password { salt: [0; 4] }).unwrap_err();
        assert!(matches!(err, AuthError::MissingPassword));
    }

    #[test]
    fn sasl_final_out_of_order() {
        let mut auth = Authenticator::new("user", Some("pencil"), StringPreparation::SaslPrep);
        let err = auth
            .respond(Authentication::SASLFinal { data: Bytes::from_static(b"v=AAAA") })
            .unwrap_err();
        assert!(matches!(err, AuthError::OutOfOrder("SASLFinal")));
    }

    #[test]
    fn ok_without_server_final() {
        let mut auth = Authenticator::new("user", Some("pencil"), StringPreparation::SaslPrep);
        let sasl = Authentication::SASL { mechanisms: vec!["SCRAM-SHA-256".into()] };
        assert!(matches!(auth.respond(sasl), Ok(Some(AuthResponse::SaslInitial { .. }))));
        assert!(matches!(auth.respond(Authentication::Ok), Err(AuthError::Scram(_))));
    }

    #[test]
    fn unsupported_requests() {
        let mut auth = Authenticator::new("user", Some("pencil"), StringPreparation::SaslPrep);
        assert!(matches!(auth.respond(Authentication::KerberosV5), Err(AuthError::UnsupportedMechanism(_))));
        assert!(matches!(auth.respond(Authentication::SSPI), Err(AuthError::UnsupportedMechanism(_))));
    }
}
