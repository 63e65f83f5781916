//! Integration tests for commander-ext crate.
//!
//! Extensions are loaded the way the bot loads them and then driven through
//! their guild states and the error pipeline.

use commander_common::test_utils::{create_temp_dir, discord_fixtures, init_test_logging};
use commander_common::{BoxError, ResponsiveError};
use commander_config::{ConfiguredExtension, ExtensionRegistry};
use commander_core::test_utils::{RecordingResponder, Sent};
use commander_core::{
    CommandErrorContext, CommandInvocation, ErrorHandling, EventData, GuildDirectory, GuildInfo,
};
use commander_ext::{
    loader, ErrorLogOptions, InviteError, InviteState, StacktracerError, StacktracerState,
    INVITE_EXTENSION, STACKTRACER_EXTENSION,
};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

const LOG_CHANNEL: u64 = 900;
const GLOBAL_CHANNEL: u64 = 901;

fn guild() -> GuildInfo {
    GuildInfo::new(GuildId::new(discord_fixtures::test_guild_id()), "Test Guild")
}

fn directory() -> Arc<GuildDirectory> {
    let directory = GuildDirectory::new();
    directory.insert(guild());
    Arc::new(directory)
}

fn json_file(path: &Path, no_init: bool) -> serde_json::Value {
    json!({
        "database": { "type": "json_file", "path": path, "no_init": no_init, "indent": 2 }
    })
}

fn command_context(responder: &Arc<RecordingResponder>, guild_id: Option<GuildId>) -> CommandErrorContext {
    CommandErrorContext {
        invocation: CommandInvocation {
            command: "invite get".to_string(),
            author_id: UserId::new(discord_fixtures::test_user_id()),
            channel_id: ChannelId::new(discord_fixtures::test_channel_id()),
            guild_id,
        },
        message_id: MessageId::new(55),
        responder: Arc::clone(responder) as _,
    }
}

#[tokio::test]
async fn test_loader_registers_commands_handlers_and_state() {
    init_test_logging();
    let registry = ExtensionRegistry::from_entries([
        ConfiguredExtension::new(INVITE_EXTENSION),
        ConfiguredExtension::new(STACKTRACER_EXTENSION),
    ])
    .unwrap();

    let (loaded, report) = loader().load_enabled(&registry, &directory()).await;
    assert!(report.failed.is_empty());
    assert_eq!(loaded.names(), [INVITE_EXTENSION, STACKTRACER_EXTENSION]);
    assert_eq!(loaded.command_count(), 3);

    assert_eq!(loaded.listener_count(), 1);

    let errors = ErrorHandling::new();
    let installed = loaded.install(&errors);
    let names: Vec<&str> = installed
        .commands
        .iter()
        .map(|command| command.name.as_str())
        .collect();
    assert_eq!(names, ["invite", "invites", "stacktracer"]);
    assert_eq!(errors.event_handler_count(), 1);
    assert_eq!(errors.command_handler_count(), 1);
    assert_eq!(errors.app_command_handler_count(), 1);
    assert!(installed.states.get::<InviteState>().is_some());
    assert!(installed.states.get::<StacktracerState>().is_some());
    assert_eq!(installed.listeners.len(), 1);

    let stacktracer = installed
        .commands
        .iter()
        .find(|command| command.name == "stacktracer")
        .unwrap();
    let global = stacktracer
        .subcommands
        .iter()
        .find(|command| command.name == "global")
        .unwrap();
    assert!(global.owners_only);
    let global_names: Vec<&str> = global
        .subcommands
        .iter()
        .map(|command| command.name.as_str())
        .collect();
    assert_eq!(global_names, ["set", "clear", "show"]);
}

#[tokio::test]
async fn test_invites_persist_across_loads() {
    let dir = create_temp_dir();
    let path = dir.path().join("invites.json");
    let registry = ExtensionRegistry::from_entries([
        ConfiguredExtension::new(INVITE_EXTENSION).with_options(json_file(&path, false))
    ])
    .unwrap();

    {
        let (loaded, _) = loader().load_enabled(&registry, &directory()).await;
        let state = loaded.states().get::<InviteState>().unwrap();
        let invites = state.guild(guild()).await.unwrap();

        invites
            .add_invite("mcc", "minecraft, events", "https://discord.gg/mcc", None)
            .await
            .unwrap();
        invites.set_guild_invite("mcc").await.unwrap();
        assert_eq!(invites.get_invite("events").await.unwrap(), "https://discord.gg/mcc");
    }

    let (loaded, _) = loader().load_enabled(&registry, &directory()).await;
    let state = loaded.states().get::<InviteState>().unwrap();
    let invites = state.guild(guild().id).await.unwrap();

    let entry = invites.show_guild_invite().await.unwrap();
    assert_eq!(entry.key, "mcc");
    assert_eq!(entry.hits, 1);
    assert_eq!(invites.get_invite("minecraft").await.unwrap(), "https://discord.gg/mcc");
    assert!(matches!(
        invites.get_invite("nothing").await,
        Err(InviteError::NoResults(_))
    ));
}

#[tokio::test]
async fn test_missing_store_without_init_fails_the_extension_only() {
    let dir = create_temp_dir();
    let registry = ExtensionRegistry::from_entries([
        ConfiguredExtension::new(INVITE_EXTENSION)
            .with_options(json_file(&dir.path().join("missing.json"), true)),
        ConfiguredExtension::new(STACKTRACER_EXTENSION),
    ])
    .unwrap();

    let (loaded, report) = loader().load_enabled(&registry, &directory()).await;

    assert_eq!(loaded.names(), [STACKTRACER_EXTENSION]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, INVITE_EXTENSION);
    assert!(!report.is_fatal());
}

#[tokio::test]
async fn test_bad_options_fail_setup() {
    let registry = ExtensionRegistry::from_entries([ConfiguredExtension::new(INVITE_EXTENSION)
        .required(true)
        .with_options(json!({ "database": { "type": "sqlite" } }))])
    .unwrap();

    let (loaded, report) = loader().load_enabled(&registry, &directory()).await;

    assert!(loaded.names().is_empty());
    assert!(report.is_fatal());
}

async fn pipeline_with_stacktracer(options: serde_json::Value) -> (ErrorHandling, Arc<StacktracerState>) {
    let registry = ExtensionRegistry::from_entries([
        ConfiguredExtension::new(STACKTRACER_EXTENSION).with_options(options)
    ])
    .unwrap();
    let (loaded, _) = loader().load_enabled(&registry, &directory()).await;
    let errors = ErrorHandling::new();
    let installed = loaded.install(&errors);
    (errors, installed.states.get::<StacktracerState>().unwrap())
}

#[tokio::test]
async fn test_stacktracer_reports_and_user_still_gets_reply() {
    let (errors, state) = pipeline_with_stacktracer(json!({})).await;
    state
        .guild(guild())
        .await
        .unwrap()
        .set_log(ErrorLogOptions::new(ChannelId::new(LOG_CHANNEL)))
        .await
        .unwrap();

    let responder = Arc::new(RecordingResponder::new());
    let error: BoxError = Box::new(ResponsiveError::new("Invite `x` does not exist"));
    let handled = errors
        .dispatch_command_error(error.as_ref(), &command_context(&responder, Some(guild().id)))
        .await;

    assert!(!handled);
    let sent = responder.sent();
    assert_eq!(sent.len(), 2);
    match &sent[0] {
        Sent::Message {
            channel_id,
            content,
        } => {
            assert_eq!(*channel_id, ChannelId::new(LOG_CHANNEL));
            assert!(content.contains("Invite `x` does not exist"));
            assert!(content.starts_with("**Unhandled error**"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(
        &sent[1],
        Sent::Reply { content, .. } if content == "Invite `x` does not exist"
    ));
}

#[tokio::test]
async fn test_stacktracer_falls_back_to_global_channel() {
    let dir = create_temp_dir();
    let path = dir.path().join("stacktracer.json");
    {
        let (_, state) = pipeline_with_stacktracer(json_file(&path, false)).await;
        state
            .shared()
            .set_global(ErrorLogOptions::new(ChannelId::new(GLOBAL_CHANNEL)))
            .await
            .unwrap();
    }

    let (errors, _) = pipeline_with_stacktracer(json_file(&path, true)).await;
    let responder = Arc::new(RecordingResponder::new());

    let event = EventData::new(
        "message_delete",
        "MessageDelete { .. }",
        None,
        Arc::clone(&responder) as _,
    );
    let error: BoxError = "gateway hiccup".into();
    errors.dispatch_event_error(error.as_ref(), &event).await;

    let sent = responder.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        Sent::Message { channel_id, content }
            if *channel_id == ChannelId::new(GLOBAL_CHANNEL)
                && content.contains("event `message_delete`")
                && content.contains("gateway hiccup")
    ));
}

#[tokio::test]
async fn test_event_chain_test_error_is_reported() {
    let (errors, state) = pipeline_with_stacktracer(json!({})).await;
    state
        .shared()
        .set_global(ErrorLogOptions {
            stacktrace: false,
            ..ErrorLogOptions::new(ChannelId::new(GLOBAL_CHANNEL))
        })
        .await
        .unwrap();
    let responder = Arc::new(RecordingResponder::new());

    let event = EventData::new("message", "Message { .. }", None, Arc::clone(&responder) as _);
    let error: BoxError = Box::new(StacktracerError::TestEvent);
    let handled = errors.dispatch_event_error(error.as_ref(), &event).await;

    assert!(!handled);
    let sent = responder.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        Sent::Message { channel_id, content }
            if *channel_id == ChannelId::new(GLOBAL_CHANNEL)
                && content.contains("on the event error chain")
    ));
}
