//! Static mapping from channel identifiers to their backing message tables.
//!
//! A channel is addressed either by its canonical UUID or by a legacy slug
//! (e.g. `"canarana"`). Anything that matches neither resolves to the
//! configured default channel, so a misrouted id never fails loudly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    pub table_name: String,
    pub display_name: String,
}

/// One entry of the `[channels]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    #[serde(default)]
    pub slugs: Vec<String>,
    pub table: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Id of the general/AI channel used for unknown identifiers.
    pub default_channel: String,
    pub channels: Vec<ChannelConfig>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            default_channel: "6f1c2d9e-3b4a-4c5d-8e7f-0a1b2c3d4e5f".to_string(),
            channels: vec![
                ChannelConfig {
                    id: "6f1c2d9e-3b4a-4c5d-8e7f-0a1b2c3d4e5f".to_string(),
                    slugs: vec!["geral".to_string(), "ia".to_string()],
                    table: "chat_geral".to_string(),
                    display_name: "Atendimento Geral (IA)".to_string(),
                },
                ChannelConfig {
                    id: "b2e8f4a1-7c3d-4e9f-a6b5-1d2c3e4f5a6b".to_string(),
                    slugs: vec!["canarana".to_string()],
                    table: "chat_canarana".to_string(),
                    display_name: "Loja Canarana".to_string(),
                },
                ChannelConfig {
                    id: "d4a7c1e9-2f6b-4b8d-9c3e-5a7f1b2d4c6e".to_string(),
                    slugs: vec!["centro".to_string()],
                    table: "chat_centro".to_string(),
                    display_name: "Loja Centro".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelMap {
    channels: Vec<ChannelRef>,
    by_id: HashMap<String, usize>,
    by_slug: HashMap<String, usize>,
    default: usize,
}

impl ChannelMap {
    pub fn from_settings(settings: &ChannelSettings) -> Result<Self> {
        let mut channels = Vec::with_capacity(settings.channels.len());
        let mut by_id = HashMap::new();
        let mut by_slug = HashMap::new();

        for (idx, channel) in settings.channels.iter().enumerate() {
            if !is_valid_table_name(&channel.table) {
                return Err(CoreError::InvalidTableName(channel.table.clone()));
            }

            let id = normalize_id(&channel.id);
            if by_id.insert(id.clone(), idx).is_some() {
                return Err(CoreError::InvalidChannelMap(format!(
                    "duplicate channel id {}",
                    channel.id
                )));
            }

            for slug in &channel.slugs {
                if by_slug.insert(slug.clone(), idx).is_some() {
                    return Err(CoreError::InvalidChannelMap(format!(
                        "slug {} is mapped more than once",
                        slug
                    )));
                }
            }

            channels.push(ChannelRef {
                id,
                table_name: channel.table.clone(),
                display_name: channel.display_name.clone(),
            });
        }

        let default = *by_id
            .get(&normalize_id(&settings.default_channel))
            .ok_or_else(|| {
                CoreError::InvalidChannelMap(format!(
                    "default channel {} is not configured",
                    settings.default_channel
                ))
            })?;

        Ok(Self {
            channels,
            by_id,
            by_slug,
            default,
        })
    }

    /// Exact lookup by id or slug, without the default fallback.
    pub fn lookup(&self, channel_id: &str) -> Option<&ChannelRef> {
        let channel_id = channel_id.trim();
        self.by_id
            .get(&normalize_id(channel_id))
            .or_else(|| self.by_slug.get(channel_id))
            .map(|&idx| &self.channels[idx])
    }

    pub fn resolve(&self, channel_id: &str) -> &ChannelRef {
        match self.lookup(channel_id) {
            Some(channel) => channel,
            None => {
                tracing::debug!(channel_id, "Unknown channel, using default");
                self.default_channel()
            }
        }
    }

    pub fn resolve_table(&self, channel_id: &str) -> &str {
        &self.resolve(channel_id).table_name
    }

    pub fn default_channel(&self) -> &ChannelRef {
        &self.channels[self.default]
    }

    pub fn channels(&self) -> &[ChannelRef] {
        &self.channels
    }

    /// Distinct backing tables, in configuration order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for channel in &self.channels {
            if !tables.contains(&channel.table_name.as_str()) {
                tables.push(&channel.table_name);
            }
        }
        tables
    }
}

/// Table names end up inside SQL text, so only plain identifiers are allowed.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn normalize_id(id: &str) -> String {
    match Uuid::parse_str(id.trim()) {
        Ok(uuid) => uuid.to_string(),
        Err(_) => id.trim().to_string(),
    }
}
