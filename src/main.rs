use clap::Parser;
use serenity::{
    async_trait,
    client::{bridge::gateway::GatewayIntents, Client, Context, EventHandler},
    model::{
        channel::{Message, Reaction},
        gateway::{Activity, Ready},
    },
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;
mod mention;
mod platform;

use commands::CommandRouter;
use config::ConfigStore;
use platform::{Discord, MessageEvent, ReactionEvent};

#[derive(Debug, Parser)]
#[command(about = "Grants roles to users who react to a message")]
struct Args {
    /// JSON configuration file, rewritten whenever a command changes it
    #[arg(default_value = "rbot.json")]
    config: PathBuf,
}

struct Handler {
    router: CommandRouter,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if let Some(event) = MessageEvent::from_message(&msg) {
            let discord = Discord::new(ctx.http.clone());
            self.router.on_message(&discord, &event).await;
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        if let Some(event) = ReactionEvent::from_reaction(&reaction, true) {
            let discord = Discord::new(ctx.http.clone());
            self.router.on_reaction(&discord, &event).await;
        }
    }

    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        if let Some(event) = ReactionEvent::from_reaction(&reaction, false) {
            let discord = Discord::new(ctx.http.clone());
            self.router.on_reaction(&discord, &event).await;
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        if let Some(game) = self.router.presence_text().await {
            ctx.set_activity(Activity::playing(&game)).await;
        }
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Bot is ready");
    }
}

/// Resolves on SIGINT, or SIGTERM where the platform has it.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let store = ConfigStore::load(&args.config).map_err(|e| {
        error!(path = %args.config.display(), error = %e, "Failed to load config");
        e
    })?;
    let token = store.config().token.clone();
    let router = CommandRouter::new(store);

    let mut client = Client::builder(&token)
        .event_handler(Handler { router })
        .intents(
            GatewayIntents::GUILDS
                | GatewayIntents::GUILD_MESSAGES
                | GatewayIntents::GUILD_MESSAGE_REACTIONS,
        )
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping shards");
        shard_manager.lock().await.shutdown_all().await;
    });

    client.start().await?;
    Ok(())
}
