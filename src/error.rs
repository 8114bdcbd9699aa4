use std::fmt;
use std::io;
use std::net::Ipv4Addr;

use crate::dataplane::SwitchId;

/// Registry key that failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKey {
    Switch(SwitchId),
    Ip(Ipv4Addr),
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKey::Switch(id) => write!(f, "switch {:016}", id),
            BindingKey::Ip(ip) => write!(f, "ip {}", ip),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cannot classify {layer} layer: {reason}")]
    Classification { layer: &'static str, reason: String },

    #[error("no binding for {0}")]
    BindingNotFound(BindingKey),

    #[error("channel error: {0}")]
    Channel(String),
}

impl Error {
    pub(crate) fn classification(layer: &'static str, reason: impl Into<String>) -> Self {
        Error::Classification {
            layer,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
