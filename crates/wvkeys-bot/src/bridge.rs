//! Bridge between Discord (serenity) and the account service
//!
//! Owns the RPC client and the gateway, and wires membership events,
//! commands and service pushes to the code that handles them.

#[path = "bridge_tests.rs"]
mod bridge_tests;

use std::sync::Arc;

use serenity::prelude::TypeMapKey;
use wvkeys_rpc::{AnyTransport, RpcClient};
use wvkeys_types::OpCode;

use crate::commands::{CommandRunner, Invocation, ParseError};
use crate::config::DiscordBotConfig;
use crate::gateway::ModerationGateway;
use crate::moderation::{MembershipEvent, Moderator};
use crate::quarantine::QuarantineHandler;

/// The RPC client over whichever transport was configured.
pub type Rpc = RpcClient<AnyTransport>;

/// Discord → account service bridge
pub struct ModerationBridge {
    config: Arc<DiscordBotConfig>,
    rpc: Rpc,
    moderator: Moderator,
    commands: CommandRunner,
}

impl TypeMapKey for ModerationBridge {
    type Value = Arc<ModerationBridge>;
}

impl ModerationBridge {
    pub fn new(config: DiscordBotConfig, rpc: Rpc, gateway: Arc<dyn ModerationGateway>) -> Self {
        let config = Arc::new(config);
        rpc.router().register(
            OpCode::Quarantine,
            QuarantineHandler::new(Arc::clone(&gateway), Arc::clone(&config)),
        );
        Self {
            moderator: Moderator::new(Arc::clone(&gateway), rpc.clone(), Arc::clone(&config)),
            commands: CommandRunner::new(gateway, rpc.clone(), Arc::clone(&config)),
            config,
            rpc,
        }
    }

    pub fn config(&self) -> &DiscordBotConfig {
        &self.config
    }

    pub fn rpc(&self) -> &Rpc {
        &self.rpc
    }

    pub async fn on_membership(&self, event: MembershipEvent) {
        self.moderator.handle(event).await;
    }

    /// Run `content` as a command when it carries the configured prefix.
    /// Returns `false` for messages that are not commands.
    pub async fn on_message(&self, invocation: Invocation<'_>) -> bool {
        match self.commands.parse(invocation.content) {
            None => false,
            Some(Err(ParseError::Unknown(_))) => false,
            Some(parsed) => {
                self.commands.run(&invocation, parsed).await;
                true
            }
        }
    }
}
