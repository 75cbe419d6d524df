use crate::{
    Result,
    auth::{AuthResponse, Authenticator},
    common::{debug, warning},
    postgres::{
        BackendMessage,
        backend::{Authentication, BackendKeyData, TransactionStatus},
        frontend,
    },
    transport::{PgTransport, PgTransportExt},
};

use super::Config;

/// Startup phase successful response.
#[derive(Debug)]
pub(crate) struct StartupResponse {
    /// Required to issue cancel requests, not every server sends it.
    pub key_data: Option<BackendKeyData>,
    /// Minor protocol version in use.
    pub protocol_minor: u32,
    pub status: TransactionStatus,
}

/// Perform the startup phase.
///
/// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
pub(crate) async fn startup<IO: PgTransport>(config: &Config, mut io: IO) -> Result<StartupResponse> {
    let params = config.startup_params();
    io.send_startup(frontend::Startup {
        user: &config.user,
        database: Some(config.get_dbname()),
        params: &params,
    });
    io.flush().await?;

    let mut protocol_minor = 0;
    let mut auth = Authenticator::new(&config.user, config.pass.as_deref(), config.string_prep);

    // For GSSAPI, SSPI and SASL, multiple exchanges of packets may be needed to complete the
    // authentication, every other method has at most one request and one response.
    loop {
        let request = match io.recv::<BackendMessage>().await? {
            BackendMessage::Authentication(request) => request,
            BackendMessage::NegotiateProtocolVersion(v) => {
                warning!("server negotiated protocol version 3.{}, unsupported options: {:?}", v.minor, v.options);
                protocol_minor = v.minor;
                continue;
            },
            f => Err(f.unexpected("authentication"))?,
        };
        let done = matches!(request, Authentication::Ok);

        match auth.respond(request)? {
            Some(AuthResponse::Password(password)) => {
                io.send(frontend::PasswordMessage { password: &password });
            },
            Some(AuthResponse::SaslInitial { mechanism, data }) => {
                io.send(frontend::SASLInitialResponse { mechanism, data: data.as_bytes() });
            },
            Some(AuthResponse::Sasl(data)) => {
                io.send(frontend::SASLResponse { data: data.as_bytes() });
            },
            None if done => break,
            None => continue,
        }
        io.flush().await?;
    }

    // The backend is being started, it is still possible for the startup attempt to fail
    // (ErrorResponse), in the normal case it sends ParameterStatus, BackendKeyData, and
    // finally ReadyForQuery.
    let mut key_data = None;

    let status = loop {
        use BackendMessage::*;
        match io.recv::<BackendMessage>().await? {
            ReadyForQuery(ready) => break ready.status,
            BackendKeyData(new_key_data) => key_data = Some(new_key_data),
            NegotiateProtocolVersion(v) => {
                warning!("server negotiated protocol version 3.{}", v.minor);
                protocol_minor = v.minor;
            },
            f => Err(f.unexpected("startup phase"))?,
        }
    };

    if key_data.is_none() {
        debug!("server sent no backend key data, cancellation unavailable");
    }
    debug!("startup complete, server version {}", io.parameter("server_version").unwrap_or("unknown"));

    Ok(StartupResponse { key_data, protocol_minor, status })
}

#[cfg(test)]
mod test {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::{ErrorKind, auth::AuthError, stream::PgStream};

    fn frame(msgtype: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![msgtype];
        buf.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[tokio::test]
    async fn trust_startup() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);
        let config = Config::new("alice").dbname("shop");

        let mut script = vec![];
        script.extend(frame(b'R', &0i32.to_be_bytes()));
        script.extend(frame(b'S', b"server_version\x0016.2\0"));
        script.extend(frame(b'K', &[0, 0, 0, 9, 0, 0, 0, 3]));
        script.extend(frame(b'Z', b"I"));
        server.write_all(&script).await.unwrap();

        let response = startup(&config, &mut stream).await.unwrap();
        let key = response.key_data.unwrap();
        assert_eq!((key.process_id, key.secret_key), (9, 3));
        assert_eq!(response.status, TransactionStatus::Idle);
        assert_eq!(stream.parameter("server_version"), Some("16.2"));

        // length, protocol 3.0, then nul terminated pairs
        let mut head = [0u8; 8];
        server.read_exact(&mut head).await.unwrap();
        assert_eq!(&head[4..], &196_608i32.to_be_bytes());
        let len = i32::from_be_bytes(head[..4].try_into().unwrap()) as usize;
        let mut body = vec![0u8; len - 8];
        server.read_exact(&mut body).await.unwrap();
        assert_eq!(
            body,
            b"user\0alice\0database\0shop\0client_encoding\0UTF8\0DateStyle\0ISO\0IntervalStyle\0postgres\0\0",
        );
    }

    #[tokio::test]
    async fn cleartext_password() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);
        let config = Config::new("alice").password("secret");

        let mut script = vec![];
        script.extend(frame(b'R', &3i32.to_be_bytes()));
        script.extend(frame(b'R', &0i32.to_be_bytes()));
        script.extend(frame(b'Z', b"I"));
        server.write_all(&script).await.unwrap();

        let response = startup(&config, &mut stream).await.unwrap();
        assert!(response.key_data.is_none());

        let mut startup_len = [0u8; 4];
        server.read_exact(&mut startup_len).await.unwrap();
        let mut rest = vec![0u8; u32::from_be_bytes(startup_len) as usize - 4];
        server.read_exact(&mut rest).await.unwrap();

        let mut password = [0u8; 12];
        server.read_exact(&mut password).await.unwrap();
        assert_eq!(&password, b"p\0\0\0\x0bsecret\0");
    }

    #[tokio::test]
    async fn missing_password() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);
        server.write_all(&frame(b'R', &3i32.to_be_bytes())).await.unwrap();

        let err = startup(&Config::new("alice"), &mut stream).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Auth(AuthError::MissingPassword)));
    }

    #[tokio::test]
    async fn startup_rejected() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);
        let body = b"SFATAL\0C3D000\0Mdatabase \"nope\" does not exist\0\0";
        server.write_all(&frame(b'E', body)).await.unwrap();

        let err = startup(&Config::new("alice"), &mut stream).await.unwrap_err();
        assert_eq!(err.as_database().unwrap().code(), "3D000");
        assert!(err.is_fatal());
    }
}
