mod client;

pub use client::{CommandRunner, SshClient, SshError, SshResult};
