//! Text command and reaction dispatch.

use crate::{
    config::{ConfigStore, Registration},
    error::{Error, Result},
    mention,
    platform::{MessageEvent, Platform, ReactionEvent},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    AddServer,
    AddRole,
    RemoveRole,
    AddAdmin,
    RemoveAdmin,
}

impl Command {
    pub fn parse(content: &str) -> Option<Self> {
        if content == "ping" {
            return Some(Command::Ping);
        }
        if content == "!addserver" {
            return Some(Command::AddServer);
        }

        let prefixes = [
            ("!addrole", Command::AddRole),
            ("!remrole", Command::RemoveRole),
            ("!addadmin", Command::AddAdmin),
            ("!remadmin", Command::RemoveAdmin),
        ];
        prefixes
            .iter()
            .find(|(prefix, _)| content.starts_with(prefix))
            .map(|(_, command)| *command)
    }
}

/// Routes events into the store. Owns the store; the lock is released
/// before anything is sent to the platform.
pub struct CommandRouter {
    store: Mutex<ConfigStore>,
}

impl CommandRouter {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    pub async fn presence_text(&self) -> Option<String> {
        let store = self.store.lock().await;
        store
            .config()
            .presence_text
            .clone()
            .filter(|text| !text.is_empty())
    }

    pub async fn on_message(&self, platform: &dyn Platform, event: &MessageEvent) {
        let command = match Command::parse(&event.content) {
            Some(command) => command,
            None => return,
        };

        let reply = match self.apply(command, event).await {
            Ok(reply) => reply,
            Err(err @ Error::MissingToken(_)) => {
                debug!(?command, author = %event.author_id, error = %err, "Ignoring malformed command");
                return;
            }
            Err(err) => {
                warn!(
                    ?command,
                    guild = %event.guild_id,
                    author = %event.author_id,
                    kind = err.kind(),
                    error = %err,
                    "Command rejected"
                );
                err.to_string()
            }
        };

        if let Err(err) = platform.send_message(&event.channel_id, &reply).await {
            warn!(channel = %event.channel_id, error = %err, "Failed to send reply");
        }
    }

    async fn apply(&self, command: Command, event: &MessageEvent) -> Result<String> {
        let guild = event.guild_id.as_str();
        let author = event.author_id.as_str();

        // Tokens are parsed before locking so malformed commands never touch the store.
        match command {
            Command::Ping => Ok("Pong!".to_string()),
            Command::AddServer => {
                let mut store = self.store.lock().await;
                Ok(match store.register_server(guild, &event.channel_id, author) {
                    Registration::Created => {
                        "Server registered, reactions in this channel now assign roles.".into()
                    }
                    Registration::AlreadyExists => "This server is already registered.".into(),
                })
            }
            Command::AddRole => {
                let role = mention::role_id(&event.content)?;
                let emoji = mention::emoji(&event.content)?;
                self.store
                    .lock()
                    .await
                    .add_role_mapping(guild, &emoji, &role, author)?;
                Ok(format!("Reacting with {} now grants <@&{}>.", emoji, role))
            }
            Command::RemoveRole => {
                let role = mention::role_id(&event.content)?;
                self.store
                    .lock()
                    .await
                    .remove_role_mapping(guild, &role, author)?;
                Ok(format!("Removed the mapping for <@&{}>.", role))
            }
            Command::AddAdmin => {
                let user = mention::user_id(&event.content)?;
                self.store
                    .lock()
                    .await
                    .add_secondary_admin(guild, &user, author)?;
                Ok(format!("<@{}> can now manage role mappings.", user))
            }
            Command::RemoveAdmin => {
                let user = mention::user_id(&event.content)?;
                self.store
                    .lock()
                    .await
                    .remove_secondary_admin(guild, &user, author)?;
                Ok(format!("<@{}> is no longer an admin.", user))
            }
        }
    }

    /// Grants or revokes the role mapped to the first matching emoji.
    pub async fn on_reaction(&self, platform: &dyn Platform, event: &ReactionEvent) {
        let role = {
            let store = self.store.lock().await;
            let server = match store.find_server(&event.guild_id) {
                Some(server) => server,
                None => return,
            };
            if server.channel_id != event.channel_id {
                return;
            }
            match server.role_for_emoji(&event.emoji) {
                Some(mapping) => mapping.role.clone(),
                None => return,
            }
        };

        let result = if event.added {
            info!(guild = %event.guild_id, user = %event.user_id, role = %role, "Granting role");
            platform
                .grant_role(&event.guild_id, &event.user_id, &role)
                .await
        } else {
            info!(guild = %event.guild_id, user = %event.user_id, role = %role, "Revoking role");
            platform
                .revoke_role(&event.guild_id, &event.user_id, &role)
                .await
        };

        if let Err(err) = result {
            warn!(
                guild = %event.guild_id,
                user = %event.user_id,
                role = %role,
                error = %err,
                "Role update failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ServerEntry};
    use serenity::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Send(String, String),
        Grant(String, String, String),
        Revoke(String, String, String),
    }

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<Call>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn grants(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| !matches!(call, Call::Send(..)))
                .collect()
        }
    }

    #[async_trait]
    impl Platform for Recorder {
        async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
            let call = Call::Send(channel_id.into(), text.into());
            self.calls.lock().unwrap().push(call);
            Ok(())
        }

        async fn grant_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<()> {
            let call = Call::Grant(guild_id.into(), user_id.into(), role_id.into());
            self.calls.lock().unwrap().push(call);
            Ok(())
        }

        async fn revoke_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<()> {
            let call = Call::Revoke(guild_id.into(), user_id.into(), role_id.into());
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    fn router() -> (TempDir, CommandRouter) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            token: "secret".into(),
            presence_text: None,
            servers: vec![ServerEntry {
                server_id: "G1".into(),
                channel_id: "C1".into(),
                admin_id: "U1".into(),
                secondary_admins: Vec::new(),
                roles: Vec::new(),
            }],
        };
        let store = ConfigStore::new(dir.path().join("rbot.json"), config);
        (dir, CommandRouter::new(store))
    }

    fn message(author: &str, content: &str) -> MessageEvent {
        MessageEvent {
            guild_id: "G1".into(),
            channel_id: "C1".into(),
            author_id: author.into(),
            content: content.into(),
        }
    }

    fn reaction(channel: &str, emoji: &str, added: bool) -> ReactionEvent {
        ReactionEvent {
            guild_id: "G1".into(),
            channel_id: channel.into(),
            user_id: "U9".into(),
            emoji: emoji.into(),
            added,
        }
    }

    async fn roles(router: &CommandRouter) -> Vec<(String, String)> {
        let store = router.store.lock().await;
        store
            .find_server("G1")
            .unwrap()
            .roles
            .iter()
            .map(|mapping| (mapping.emoji.clone(), mapping.role.clone()))
            .collect()
    }

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(Command::parse("!addrole <@&1> :x:"), Some(Command::AddRole));
        assert_eq!(Command::parse("!remadmin <@1>"), Some(Command::RemoveAdmin));
        assert_eq!(Command::parse("!addserver"), Some(Command::AddServer));
        assert_eq!(Command::parse("!addserver now"), None);
        assert_eq!(Command::parse("ping"), Some(Command::Ping));
        assert_eq!(Command::parse("please !addrole"), None);
        assert_eq!(Command::parse("hello"), None);
    }

    #[tokio::test]
    async fn admin_maps_emoji_and_first_mapping_wins() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U1", "!addrole <@&R1> :smile:")).await;
        assert_eq!(roles(&router).await, [("smile".to_string(), "R1".to_string())]);

        router.on_message(&platform, &message("U2", "!addrole <@&R2> :smile:")).await;
        assert_eq!(roles(&router).await.len(), 1);

        router.on_reaction(&platform, &reaction("C1", "smile", true)).await;
        assert_eq!(
            platform.grants(),
            [Call::Grant("G1".into(), "U9".into(), "R1".into())]
        );
    }

    #[tokio::test]
    async fn duplicate_emoji_grants_once() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U1", "!addrole <@&R1> :smile:")).await;
        router.on_message(&platform, &message("U1", "!addrole <@&R2> :smile:")).await;
        router.on_reaction(&platform, &reaction("C1", "smile", true)).await;

        assert_eq!(
            platform.grants(),
            [Call::Grant("G1".into(), "U9".into(), "R1".into())]
        );
    }

    #[tokio::test]
    async fn reaction_removed_revokes() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U1", "!addrole <@&R1> 🎮")).await;
        router.on_reaction(&platform, &reaction("C1", "🎮", false)).await;

        assert_eq!(
            platform.grants(),
            [Call::Revoke("G1".into(), "U9".into(), "R1".into())]
        );
    }

    #[tokio::test]
    async fn reactions_elsewhere_are_ignored() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U1", "!addrole <@&R1> :smile:")).await;
        router.on_reaction(&platform, &reaction("C2", "smile", true)).await;
        router.on_reaction(&platform, &reaction("C1", "frown", true)).await;

        let mut unknown_guild = reaction("C1", "smile", true);
        unknown_guild.guild_id = "G2".into();
        router.on_reaction(&platform, &unknown_guild).await;

        assert!(platform.grants().is_empty());
    }

    #[tokio::test]
    async fn remove_role_then_not_found() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U1", "!addrole <@&R1> :smile:")).await;
        router.on_message(&platform, &message("U1", "!remrole <@&R1>")).await;
        assert!(roles(&router).await.is_empty());

        let err = router
            .apply(Command::RemoveRole, &message("U1", "!remrole <@&R1>"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RoleNotFound(_)));
    }

    #[tokio::test]
    async fn missing_role_mention_is_silent() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U1", "!addrole :smile:")).await;

        assert!(roles(&router).await.is_empty());
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn permission_denied_is_reported() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U2", "!remrole <@&R1>")).await;

        assert_eq!(
            platform.calls(),
            [Call::Send("C1".into(), "user U2 may not change this server".into())]
        );
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        let mut event = message("U7", "!addserver");
        event.guild_id = "G2".into();
        event.channel_id = "C7".into();
        router.on_message(&platform, &event).await;
        router.on_message(&platform, &event).await;

        let store = router.store.lock().await;
        assert_eq!(store.config().servers.len(), 2);
        assert_eq!(store.find_server("G2").unwrap().admin_id, "U7");
        assert_eq!(store.find_server("G2").unwrap().channel_id, "C7");
    }

    #[tokio::test]
    async fn owner_manages_secondary_admins() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U1", "!addadmin <@!U2>")).await;
        router.on_message(&platform, &message("U2", "!addrole <@&R2> :tada:")).await;
        assert_eq!(roles(&router).await, [("tada".to_string(), "R2".to_string())]);

        router.on_message(&platform, &message("U2", "!addadmin <@U3>")).await;
        router.on_message(&platform, &message("U1", "!remadmin <@U2>")).await;
        router.on_message(&platform, &message("U2", "!remrole <@&R2>")).await;

        assert_eq!(roles(&router).await.len(), 1);
        let store = router.store.lock().await;
        assert!(store.find_server("G1").unwrap().secondary_admins.is_empty());
    }

    #[tokio::test]
    async fn presence_text_skips_empty_game() {
        let (_dir, router) = router();
        assert_eq!(router.presence_text().await, None);

        let with_game = |game: &str| {
            let config = Config {
                token: "secret".into(),
                presence_text: Some(game.into()),
                servers: Vec::new(),
            };
            CommandRouter::new(ConfigStore::new("unused.json", config))
        };
        assert_eq!(with_game("").presence_text().await, None);
        assert_eq!(
            with_game("chess").presence_text().await.as_deref(),
            Some("chess")
        );
    }

    #[tokio::test]
    async fn ping_replies() {
        let (_dir, router) = router();
        let platform = Recorder::default();

        router.on_message(&platform, &message("U5", "ping")).await;

        assert_eq!(platform.calls(), [Call::Send("C1".into(), "Pong!".into())]);
    }
}
