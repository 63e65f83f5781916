//! Status command reporting uptime, connection and loaded extensions.

use crate::framework::{Context, Data, Error};
use chrono::{DateTime, Duration, Utc};
use commander_common::format_timestamp;
use poise::serenity_prelude::CreateEmbed;
use poise::CreateReply;

/// Snapshot of what the status command shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Time since the process started.
    pub uptime: Duration,
    /// When the gateway connection became ready, if it has.
    pub connected_since: Option<DateTime<Utc>>,
    /// Guilds currently known.
    pub guilds: usize,
    /// Loaded extensions, in load order.
    pub extensions: Vec<String>,
}

impl StatusReport {
    /// Collects the report from shared data.
    pub fn collect(data: &Data, now: DateTime<Utc>) -> Self {
        Self {
            uptime: now - data.started_at,
            connected_since: *data.connected_since.read(),
            guilds: data.guilds.len(),
            extensions: data.loaded_extensions.clone(),
        }
    }

    /// Field name and value pairs, in display order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let extensions = if self.extensions.is_empty() {
            "none".to_string()
        } else {
            self.extensions
                .iter()
                .map(|name| format!("`{name}`"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        vec![
            ("Uptime", format_duration(self.uptime)),
            (
                "Connected since",
                self.connected_since
                    .map_or_else(|| "not connected".to_string(), format_timestamp),
            ),
            ("Guilds", self.guilds.to_string()),
            ("Extensions", extensions),
        ]
    }
}

/// Renders a duration as `1d 2h 3m 4s`, dropping leading zero units.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if days > 0 || hours > 0 || minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

/// Shows uptime, connection state and loaded extensions.
#[poise::command(slash_command, prefix_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let report = StatusReport::collect(ctx.data(), Utc::now());
    let embed = report
        .fields()
        .into_iter()
        .fold(CreateEmbed::new().title("Status"), |embed, (name, value)| {
            embed.field(name, value, name != "Extensions")
        });

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
