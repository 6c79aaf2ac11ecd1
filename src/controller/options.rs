use crate::replication::LinkOptions;
use std::convert::TryFrom;
use tokio::time::Duration;

/// Tunables for a replica set. Every field is optional; `None` takes the default.
#[derive(Clone, Debug, Default)]
pub struct ReplSetOptions {
    /// First retry delay after a replication link fails. Default 50ms.
    pub link_initial_backoff: Option<Duration>,
    /// Cap on the retry delay. Default 1s.
    pub link_max_backoff: Option<Duration>,
    /// Consecutive link failures before the upstream is reported unreachable. Default 5.
    pub link_unreachable_after: Option<u32>,
    /// Deadline for every unary RPC, and for opening a replication stream. Default 500ms.
    pub rpc_timeout: Option<Duration>,
    /// Promote the most caught-up secondary when the primary is reported unreachable.
    /// Default off.
    pub automatic_failover: Option<bool>,
}

#[derive(Clone, Debug)]
pub(crate) struct ReplSetOptionsValidated {
    pub(crate) link_initial_backoff: Duration,
    pub(crate) link_max_backoff: Duration,
    pub(crate) link_unreachable_after: u32,
    pub(crate) rpc_timeout: Duration,
    pub(crate) automatic_failover: bool,
}

impl ReplSetOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.link_initial_backoff > self.link_max_backoff {
            return Err("Link initial backoff must not exceed the maximum backoff");
        }
        if self.link_initial_backoff == Duration::from_millis(0) {
            return Err("Link initial backoff must be non-zero");
        }
        if self.link_unreachable_after == 0 {
            return Err("Link unreachable threshold must be at least 1");
        }
        if self.rpc_timeout == Duration::from_millis(0) {
            return Err("RPC timeout must be non-zero");
        }

        Ok(())
    }

    pub(crate) fn link_options(&self) -> LinkOptions {
        LinkOptions {
            initial_backoff: self.link_initial_backoff,
            max_backoff: self.link_max_backoff,
            unreachable_after: self.link_unreachable_after,
            rpc_timeout: self.rpc_timeout,
        }
    }
}

impl TryFrom<ReplSetOptions> for ReplSetOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ReplSetOptions) -> Result<Self, Self::Error> {
        let values = ReplSetOptionsValidated {
            link_initial_backoff: options.link_initial_backoff.unwrap_or(Duration::from_millis(50)),
            link_max_backoff: options.link_max_backoff.unwrap_or(Duration::from_secs(1)),
            link_unreachable_after: options.link_unreachable_after.unwrap_or(5),
            rpc_timeout: options.rpc_timeout.unwrap_or(Duration::from_millis(500)),
            automatic_failover: options.automatic_failover.unwrap_or(false),
        };

        values.validate()?;
        Ok(values)
    }
}
