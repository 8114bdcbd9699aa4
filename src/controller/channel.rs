//! Outbound seam towards the switches

use super::Directive;
use crate::Result;
use std::future::Future;
use tracing::info;

/// Delivers directives to switches.
///
/// Implemented by whatever speaks the switch protocol; the controller
/// only ever hands over finished directives.
pub trait SwitchChannel: Send {
    fn send(&mut self, directive: Directive) -> impl Future<Output = Result<()>> + Send;
}

/// Channel that logs every directive instead of delivering it
#[derive(Debug, Default)]
pub struct TracingChannel {
    delivered: u64,
}

impl TracingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl SwitchChannel for TracingChannel {
    async fn send(&mut self, directive: Directive) -> Result<()> {
        self.delivered += 1;
        info!(directive = %directive, "directive");
        Ok(())
    }
}
