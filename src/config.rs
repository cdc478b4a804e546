use crate::error::{Error, Result};
use serde::Deserializer;
use serde_derive::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info};

/// Older writers emitted `null` for empty lists.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    let list: Option<Vec<T>> = serde::Deserialize::deserialize(deserializer)?;
    Ok(list.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    pub emoji: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(rename = "serverid")]
    pub server_id: String,
    #[serde(rename = "channelid")]
    pub channel_id: String,
    #[serde(rename = "adminid", default)]
    pub admin_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub secondary_admins: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub roles: Vec<RoleMapping>,
}

impl ServerEntry {
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.secondary_admins.iter().any(|id| id == user_id)
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        !self.admin_id.is_empty() && self.admin_id == user_id
    }

    /// First mapping for `emoji`. Duplicates registered later are never reached.
    pub fn role_for_emoji(&self, emoji: &str) -> Option<&RoleMapping> {
        self.roles.iter().find(|mapping| mapping.emoji == emoji)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub token: String,

    #[serde(rename = "game", default, skip_serializing_if = "Option::is_none")]
    pub presence_text: Option<String>,

    #[serde(rename = "server", default, deserialize_with = "null_as_empty")]
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    AlreadyExists,
}

/// Sole owner of the bot configuration and of the file backing it.
///
/// Every successful mutation rewrites the whole file before returning.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let reader = BufReader::new(File::open(&path)?);
        let config: Config = serde_json::from_reader(reader)?;

        info!(
            path = %path.display(),
            servers = config.servers.len(),
            "Loaded configuration"
        );
        Ok(Self::new(path, config))
    }

    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes to a sibling temp file, then renames it over the config.
    /// The temp file is removed again if any step fails.
    pub fn persist(&self) -> Result<()> {
        let temp_path = self.path.with_extension("json.tmp");
        if let Err(err) = self.write_through(&temp_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err);
        }

        debug!(path = %self.path.display(), "Configuration saved");
        Ok(())
    }

    fn write_through(&self, temp_path: &Path) -> Result<()> {
        {
            let mut writer = BufWriter::new(File::create(temp_path)?);
            serde_json::to_writer_pretty(&mut writer, &self.config)?;
            writer.flush()?;
        }
        fs::rename(temp_path, &self.path)?;
        Ok(())
    }

    /// The in-memory change stands even when the write fails.
    fn commit(&self) {
        if let Err(err) = self.persist() {
            error!(path = %self.path().display(), error = %err, "Failed to save configuration");
        }
    }

    pub fn find_server(&self, server_id: &str) -> Option<&ServerEntry> {
        self.config
            .servers
            .iter()
            .find(|server| server.server_id == server_id)
    }

    fn find_server_mut(&mut self, server_id: &str) -> Result<&mut ServerEntry> {
        self.config
            .servers
            .iter_mut()
            .find(|server| server.server_id == server_id)
            .ok_or_else(|| Error::ServerNotFound(server_id.to_string()))
    }

    pub fn register_server(
        &mut self,
        server_id: &str,
        channel_id: &str,
        requesting_user_id: &str,
    ) -> Registration {
        if self.find_server(server_id).is_some() {
            return Registration::AlreadyExists;
        }

        self.config.servers.push(ServerEntry {
            server_id: server_id.to_string(),
            channel_id: channel_id.to_string(),
            admin_id: requesting_user_id.to_string(),
            secondary_admins: Vec::new(),
            roles: Vec::new(),
        });
        self.commit();

        info!(
            server = server_id,
            channel = channel_id,
            owner = requesting_user_id,
            "Server registered"
        );
        Registration::Created
    }

    /// Appends without deduplication.
    pub fn add_role_mapping(
        &mut self,
        server_id: &str,
        emoji: &str,
        role_id: &str,
        requesting_user_id: &str,
    ) -> Result<()> {
        let server = self.find_server_mut(server_id)?;
        if !server.is_admin(requesting_user_id) {
            return Err(Error::PermissionDenied(requesting_user_id.to_string()));
        }

        server.roles.push(RoleMapping {
            emoji: emoji.to_string(),
            role: role_id.to_string(),
        });
        self.commit();

        info!(server = server_id, emoji, role = role_id, "Role mapping added");
        Ok(())
    }

    /// Removes the first mapping for `role_id`, keeping the order of the rest.
    pub fn remove_role_mapping(
        &mut self,
        server_id: &str,
        role_id: &str,
        requesting_user_id: &str,
    ) -> Result<()> {
        let server = self.find_server_mut(server_id)?;
        if !server.is_admin(requesting_user_id) {
            return Err(Error::PermissionDenied(requesting_user_id.to_string()));
        }

        let index = server
            .roles
            .iter()
            .position(|mapping| mapping.role == role_id)
            .ok_or_else(|| Error::RoleNotFound(role_id.to_string()))?;
        server.roles.remove(index);
        self.commit();

        info!(server = server_id, role = role_id, "Role mapping removed");
        Ok(())
    }

    /// Only the owner may grant admin rights.
    pub fn add_secondary_admin(
        &mut self,
        server_id: &str,
        user_id: &str,
        requesting_user_id: &str,
    ) -> Result<()> {
        let server = self.find_server_mut(server_id)?;
        if !server.is_owner(requesting_user_id) {
            return Err(Error::PermissionDenied(requesting_user_id.to_string()));
        }
        if server.is_admin(user_id) {
            return Ok(());
        }

        server.secondary_admins.push(user_id.to_string());
        self.commit();

        info!(server = server_id, user = user_id, "Secondary admin added");
        Ok(())
    }

    /// Removing a user who is not a secondary admin is a no-op.
    pub fn remove_secondary_admin(
        &mut self,
        server_id: &str,
        user_id: &str,
        requesting_user_id: &str,
    ) -> Result<()> {
        let server = self.find_server_mut(server_id)?;
        if !server.is_owner(requesting_user_id) {
            return Err(Error::PermissionDenied(requesting_user_id.to_string()));
        }

        let before = server.secondary_admins.len();
        server.secondary_admins.retain(|id| id != user_id);
        if server.secondary_admins.len() == before {
            debug!(server = server_id, user = user_id, "Not a secondary admin, nothing to remove");
            return Ok(());
        }
        self.commit();

        info!(server = server_id, user = user_id, "Secondary admin removed");
        Ok(())
    }
}
