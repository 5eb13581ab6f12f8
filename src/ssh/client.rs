use crate::config::EffectiveConfig;
use async_trait::async_trait;
use russh::client;
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{cipher, kex, Preferred};
use std::borrow::Cow;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("SSH connection failed: {0}")]
    ConnectionFailed(String),
    #[error("SSH authentication failed")]
    AuthenticationFailed,
    #[error("no SSH credentials configured")]
    NoCredentials,
    #[error("failed to load SSH key {path}: {reason}")]
    KeyFile { path: PathBuf, reason: String },
    #[error("SSH command execution failed: {0}")]
    CommandFailed(String),
    #[error("SSH operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

pub type SshResult<T> = Result<T, SshError>;

/// Something that executes a CLI command on a device and returns its output
#[async_trait]
pub trait CommandRunner: Send {
    async fn run(&mut self, command: &str) -> SshResult<String>;

    /// End the session
    async fn close(&mut self) -> SshResult<()> {
        Ok(())
    }
}

struct Client;

impl client::Handler for Client {
    type Error = russh::Error;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        // Network gear regenerates host keys freely; accept any key
        let _ = server_public_key;
        async { Ok(true) }
    }
}

/// Algorithm preferences, extended with CBC ciphers and SHA-1 key exchange
/// for older IOS releases when `legacy_ciphers` is set
fn preferred_algorithms(legacy_ciphers: bool) -> Preferred {
    let mut preferred = Preferred::default();
    if legacy_ciphers {
        let mut kex_algs = preferred.kex.to_vec();
        kex_algs.extend([kex::DH_G14_SHA1, kex::DH_G1_SHA1]);
        preferred.kex = Cow::Owned(kex_algs);

        let mut ciphers = preferred.cipher.to_vec();
        ciphers.extend([cipher::AES_128_CBC, cipher::AES_192_CBC, cipher::AES_256_CBC]);
        preferred.cipher = Cow::Owned(ciphers);
    }
    preferred
}

pub struct SshClient {
    session: client::Handle<Client>,
    target: String,
    timeout: Duration,
    batch_size: usize,
    debug: bool,
}

impl SshClient {
    /// Connect and authenticate, all within the configured timeout. A key
    /// file is tried first, then the password.
    pub async fn connect(host: &str, port: u16, config: &EffectiveConfig) -> SshResult<Self> {
        let limit = config.timeout;
        let session = timeout(limit, Self::establish(host, port, config))
            .await
            .map_err(|_| SshError::Timeout(limit))??;

        Ok(Self {
            session,
            target: format!("{}:{}", host, port),
            timeout: limit,
            batch_size: config.batch_size,
            debug: config.debug,
        })
    }

    async fn establish(
        host: &str,
        port: u16,
        config: &EffectiveConfig,
    ) -> SshResult<client::Handle<Client>> {
        let ssh_config = client::Config {
            preferred: preferred_algorithms(config.legacy_ciphers),
            inactivity_timeout: Some(config.timeout),
            ..Default::default()
        };

        tracing::debug!("Connecting to {}:{} as {}", host, port, config.username);

        let mut session = client::connect(Arc::new(ssh_config), (host, port), Client)
            .await
            .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

        let mut tried = false;

        if let Some(path) = &config.key_file {
            tried = true;
            let key = russh::keys::load_secret_key(path, None).map_err(|e| SshError::KeyFile {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let hash_alg = session.best_supported_rsa_hash().await?.flatten();
            let auth_result = session
                .authenticate_publickey(
                    &config.username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await?;
            if auth_result.success() {
                tracing::debug!("SSH key authentication successful for {}", host);
                return Ok(session);
            }
            tracing::debug!("SSH key rejected by {}", host);
        }

        if let Some(password) = config.password.as_ref().filter(|p| !p.is_empty()) {
            tried = true;
            let auth_result = session
                .authenticate_password(&config.username, password.expose())
                .await?;
            if auth_result.success() {
                tracing::debug!("SSH password authentication successful for {}", host);
                return Ok(session);
            }
        }

        if tried {
            Err(SshError::AuthenticationFailed)
        } else {
            Err(SshError::NoCredentials)
        }
    }

    /// Execute a command and return the output as a String
    async fn execute_command(&mut self, command: &str) -> SshResult<String> {
        if self.debug {
            tracing::debug!("Running command on {}: {}", self.target, command);
        }

        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| SshError::CommandFailed(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::CommandFailed(e.to_string()))?;

        let mut output = Vec::with_capacity(self.batch_size);
        let mut stderr_output = Vec::new();

        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };

            match msg {
                russh::ChannelMsg::Data { ref data } => {
                    output.extend_from_slice(data);
                }
                russh::ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr_output.extend_from_slice(data);
                }
                russh::ChannelMsg::ExitStatus { exit_status } if exit_status != 0 => {
                    let stderr_str = String::from_utf8_lossy(&stderr_output);
                    return Err(SshError::CommandFailed(format!(
                        "{:?} exited with status {}: {}",
                        command, exit_status, stderr_str
                    )));
                }
                russh::ChannelMsg::Eof | russh::ChannelMsg::Close => {
                    break;
                }
                _ => {}
            }
        }

        // The device may already have closed the channel
        let _ = channel.close().await;

        let output_str = String::from_utf8_lossy(&output).into_owned();
        if self.debug {
            tracing::debug!(
                "Output of {:?} on {}: {} bytes, {} lines",
                command,
                self.target,
                output_str.len(),
                output_str.lines().count()
            );
        }

        Ok(output_str)
    }
}

#[async_trait]
impl CommandRunner for SshClient {
    async fn run(&mut self, command: &str) -> SshResult<String> {
        let limit = self.timeout;
        timeout(limit, self.execute_command(command))
            .await
            .map_err(|_| SshError::Timeout(limit))?
    }

    async fn close(&mut self) -> SshResult<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await?;
        Ok(())
    }
}
