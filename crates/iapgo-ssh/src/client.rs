//! russh-backed SSH dialer

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{cipher, client, kex, mac, Disconnect, Preferred};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::session::{BoxedStream, ClientConfig, HostKeyCheck, SshDialer, SshSession};

/// Port the instance host key is recorded under in known_hosts.
const KNOWN_HOSTS_PORT: u16 = 22;

/// Dials nested sessions with russh.
#[derive(Debug, Clone, Default)]
pub struct RusshDialer;

impl RusshDialer {
    pub fn new() -> Self {
        Self
    }
}

/// Every algorithm russh implements, preferring its own defaults. `none` is
/// never offered.
fn all_algorithms() -> Preferred {
    let defaults = Preferred::default();

    Preferred {
        kex: Cow::Owned(merge(&defaults.kex, kex::ALL_KEX_ALGORITHMS, kex::NONE)),
        cipher: Cow::Owned(merge(&defaults.cipher, cipher::ALL_CIPHERS, cipher::NONE)),
        mac: Cow::Owned(merge(&defaults.mac, mac::ALL_MAC_ALGORITHMS, mac::NONE)),
        ..defaults
    }
}

fn merge<N: Copy + PartialEq>(defaults: &[N], all: &[&N], none: N) -> Vec<N> {
    let mut merged: Vec<N> = defaults.iter().copied().filter(|n| *n != none).collect();
    for name in all {
        if **name != none && !merged.contains(*name) {
            merged.push(**name);
        }
    }
    merged
}

struct ClientHandler {
    host_key: HostKeyCheck,
}

impl client::Handler for ClientHandler {
    type Error = SessionError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.host_key {
            HostKeyCheck::AcceptAny => {
                debug!("accepting host key without verification");
                Ok(true)
            }
            HostKeyCheck::KnownHosts { path, host } => {
                match russh::keys::check_known_hosts_path(
                    host,
                    KNOWN_HOSTS_PORT,
                    server_public_key,
                    path,
                ) {
                    Ok(true) => {
                        debug!(host = %host, "host key matches known_hosts");
                        Ok(true)
                    }
                    Ok(false) => Err(SessionError::UnknownHostKey {
                        host: host.clone(),
                        path: path.clone(),
                    }),
                    Err(russh::keys::Error::KeyChanged { line }) => {
                        warn!(host = %host, line, "host key changed");
                        Err(SessionError::HostKeyMismatch {
                            host: host.clone(),
                            line,
                        })
                    }
                    Err(source) => Err(SessionError::KnownHosts {
                        path: path.clone(),
                        source,
                    }),
                }
            }
        }
    }
}

#[async_trait]
impl SshDialer for RusshDialer {
    async fn dial(
        &self,
        addr: SocketAddr,
        config: ClientConfig,
    ) -> Result<Box<dyn SshSession>, SessionError> {
        let russh_config = Arc::new(client::Config {
            preferred: all_algorithms(),
            inactivity_timeout: None,
            ..Default::default()
        });

        let handler = ClientHandler {
            host_key: config.host_key.clone(),
        };

        debug!(%addr, user = %config.user, "dialling nested SSH session");
        let mut handle = client::connect(russh_config, addr, handler).await?;

        // RSA keys sign with whichever SHA-2 variant the server accepts.
        let hash = handle
            .best_supported_rsa_hash()
            .await
            .map_err(SessionError::Authentication)?
            .flatten();

        let auth = handle
            .authenticate_publickey(
                config.user.clone(),
                PrivateKeyWithHashAlg::new(Arc::clone(&config.key), hash),
            )
            .await
            .map_err(SessionError::Authentication)?;

        if !auth.success() {
            return Err(SessionError::AuthenticationRejected { user: config.user });
        }

        info!(user = %config.user, "SSH authentication successful");
        Ok(Box::new(RusshSession { handle }))
    }
}

struct RusshSession {
    handle: client::Handle<ClientHandler>,
}

#[async_trait]
impl SshSession for RusshSession {
    async fn dial_tcp(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<BoxedStream, SessionError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                host,
                u32::from(port),
                originator.ip().to_string(),
                u32::from(originator.port()),
            )
            .await
            .map_err(SessionError::Channel)?;

        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(error = %e, "SSH disconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_algorithms_extend_defaults() {
        let defaults = Preferred::default();
        let all = all_algorithms();

        assert_eq!(&all.kex[..defaults.kex.len()], &defaults.kex[..]);
        assert!(all.kex.len() >= defaults.kex.len());
        assert!(all.cipher.len() >= defaults.cipher.len());
        assert!(all.mac.len() >= defaults.mac.len());

        assert!(!all.kex.contains(&kex::NONE));
        assert!(!all.cipher.contains(&cipher::NONE));
        assert!(!all.mac.contains(&mac::NONE));
    }

    #[test]
    fn test_merge_skips_duplicates_and_none() {
        let a = 1u8;
        let b = 2u8;
        let none = 0u8;
        let merged = merge(&[2, 0], &[&a, &b, &none], none);
        assert_eq!(merged, vec![2, 1]);
    }
}
