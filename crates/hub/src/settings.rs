use std::time::Duration;

use parlor_config::ChatConfig;

use crate::error::{HubError, HubResult};
use crate::mailbox::MailboxPolicy;

/// Validated runtime form of [`ChatConfig`].
#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
    pub max_message_size: usize,
    pub mailbox: MailboxPolicy,
}

impl HubSettings {
    pub fn from_config(config: &ChatConfig) -> HubResult<Self> {
        config
            .validate()
            .map_err(|error| HubError::InvalidSettings(error.to_string()))?;

        Ok(Self {
            ping_interval: config.ping_interval(),
            pong_wait: config.pong_wait(),
            write_wait: config.write_wait(),
            max_message_size: config.max_message_size,
            mailbox: MailboxPolicy::from_config(config),
        })
    }
}
