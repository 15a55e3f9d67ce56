// Configuration keys recognized by the runtime, per [6. EXTERNAL
// INTERFACES]. This crate only models the shapes; reading them from a file
// or environment is a concern of the embedding application, which is out of
// scope here (see [1. PURPOSE & SCOPE]).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketType {
    Nio,
    Epoll,
    Kqueue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub enabled: bool,
    pub key_store: Option<PathBuf>,
    pub ks_password_file: Option<PathBuf>,
    pub trust_store: Option<PathBuf>,
    pub ts_password_file: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            enabled: false,
            key_store: None,
            ks_password_file: None,
            trust_store: None,
            ts_password_file: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaslConfig {
    pub plain_text_enabled: bool,
    pub username_file: Option<PathBuf>,
    pub password_file: Option<PathBuf>,
}

impl Default for SaslConfig {
    fn default() -> Self {
        SaslConfig { plain_text_enabled: false, username_file: None, password_file: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub tls: TlsConfig,
    pub sasl: SaslConfig,
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
    pub idle_connection_timeout: Duration,
    pub keep_alive_period: Duration,
    pub connection_timeout: Duration,
    pub connection_retry_rate: Duration,
    pub client_id: String,
    pub socket_type: SocketType,
    pub event_loop_thread_format: String,
    pub event_loop_threads: usize,
    pub shutdown_event_loop: bool,
    pub channel_options: BTreeMap<String, String>,
    pub workflow_timeout: Duration,
    pub workflow_retry_rate: Duration,
    pub workflow_retry: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            tls: TlsConfig::default(),
            sasl: SaslConfig::default(),
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            idle_connection_timeout: Duration::from_secs(30),
            keep_alive_period: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            connection_retry_rate: Duration::from_millis(500),
            client_id: String::new(),
            socket_type: SocketType::Epoll,
            event_loop_thread_format: "logrt-eventloop-%d".to_string(),
            event_loop_threads: 1,
            shutdown_event_loop: true,
            channel_options: BTreeMap::new(),
            workflow_timeout: Duration::from_secs(120),
            workflow_retry_rate: Duration::from_secs(1),
            workflow_retry: 3,
        }
    }
}
