//! Integration tests for commander-core crate.

use commander_common::test_utils::{discord_fixtures, init_test_logging};
use commander_common::{BoxError, ResponsiveError};
use commander_core::test_utils::{FakeRegistrar, RecordingResponder, Sent};
use commander_core::{
    handler_fn, make_database, Acknowledgement, AppCommandErrorContext, CommandCache,
    CommandCacheError, CommandErrorContext, CommandInvocation, Database, DatabaseError,
    DatabaseOptions, DynError, ErrorHandler, ErrorHandling, EventData, GuildDirectory, GuildInfo,
    GuildPartitionedState, GuildStateManager, JsonFileDatabase, JsonFileDatabaseOptions,
    RegisteredCommand,
};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, InteractionId, MessageId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn guild_id() -> GuildId {
    GuildId::new(discord_fixtures::test_guild_id())
}

// ---------------------------------------------------------------------------
// Guild state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CounterState {
    guild: GuildInfo,
}

fn directory() -> Arc<GuildDirectory> {
    let directory = GuildDirectory::new();
    for id in discord_fixtures::test_guild_ids(3) {
        directory.insert(GuildInfo::new(id, format!("guild {id}")));
    }
    Arc::new(directory)
}

fn slow_manager(calls: Arc<AtomicUsize>) -> GuildStateManager<CounterState> {
    GuildStateManager::new("counter", directory(), move |guild: GuildInfo| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            CounterState { guild }
        }
    })
}

#[tokio::test]
async fn test_concurrent_first_access_creates_once() {
    init_test_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let manager = slow_manager(Arc::clone(&calls));

    let lookups = (0..16).map(|_| manager.get_or_create(guild_id()));
    let states = futures::future::join_all(lookups).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = states[0].as_ref().unwrap();
    for state in &states {
        assert!(Arc::ptr_eq(first, state.as_ref().unwrap()));
    }
    assert_eq!(first.guild.id, guild_id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_across_tasks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let manager = Arc::new(slow_manager(Arc::clone(&calls)));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_or_create(guild_id()).await.unwrap() })
        })
        .collect();

    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.await.unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(states.iter().all(|s| Arc::ptr_eq(s, &states[0])));
}

#[tokio::test]
async fn test_guilds_are_isolated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let manager = slow_manager(Arc::clone(&calls));
    let ids = discord_fixtures::test_guild_ids(3);

    for id in &ids {
        manager.get_or_create(GuildId::new(*id)).await.unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(manager.available().len(), 3);
}

#[tokio::test]
async fn test_partitioned_state_shares_global_objects() {
    let partitioned = GuildPartitionedState::new(
        slow_manager(Arc::new(AtomicUsize::new(0))),
        String::from("shared store"),
    );

    let state = partitioned.guild(guild_id()).await.unwrap();
    assert_eq!(state.guild.id, guild_id());
    assert_eq!(partitioned.shared(), "shared store");
    assert_eq!(partitioned.available().len(), 1);
    assert!(partitioned.guild(GuildId::new(1)).await.is_err());
}

// ---------------------------------------------------------------------------
// Command cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_build_global_cache_replaces_wholesale() {
    let registrar = FakeRegistrar::new();
    registrar.set_global(vec![
        RegisteredCommand::global("old", 1_u64),
        RegisteredCommand::global("older", 2_u64),
    ]);
    let cache = CommandCache::new(registrar);
    cache.build_global_cache().await.unwrap();
    assert!(cache.get_command("old", None).is_some());

    cache.registrar().set_global(vec![
        RegisteredCommand::global("new", 3_u64),
        RegisteredCommand::global("newer", 4_u64),
    ]);
    let set = cache.build_global_cache().await.unwrap();

    assert_eq!(set.names(), vec!["new", "newer"]);
    assert!(cache.get_command("old", None).is_none());
    assert!(cache.get_command("older", None).is_none());
    assert_eq!(cache.global_commands().len(), 2);
}

#[tokio::test]
async fn test_sync_captures_remote_ids() {
    let cache = CommandCache::new(FakeRegistrar::new());
    cache.set_commands(vec!["ping".to_string(), "status".to_string()]);

    let set = cache.sync().await.unwrap();

    assert_eq!(set.len(), 2);
    let ping = cache.get_command("ping", None).unwrap();
    assert_eq!(cache.get_command(ping.id, None), Some(ping.clone()));
    assert_eq!(ping.guild_id, None);
}

#[tokio::test]
async fn test_failed_sync_keeps_previous_snapshot() {
    let cache = CommandCache::new(FakeRegistrar::new());
    cache.set_commands(vec!["ping".to_string()]);
    cache.sync().await.unwrap();

    cache.set_commands(vec!["pong".to_string()]);
    cache.registrar().set_failing(true);
    let result = cache.sync().await;

    assert!(matches!(result, Err(CommandCacheError::Sync(_))));
    assert!(cache.get_command("ping", None).is_some());
    assert!(cache.get_command("pong", None).is_none());
}

#[tokio::test]
async fn test_guild_lookup_falls_back_to_global() {
    let guild = guild_id();
    let registrar = FakeRegistrar::new();
    registrar.set_global(vec![RegisteredCommand::global("ping", 10_u64)]);
    let cache = CommandCache::new(registrar);
    cache.build_global_cache().await.unwrap();
    cache.build_guild_cache([guild]).await.unwrap();

    let found = cache.get_command("ping", Some(guild)).unwrap();
    assert_eq!(found.id.get(), 10);
    assert_eq!(found.guild_id, None);

    cache
        .registrar()
        .set_guild(guild, vec![RegisteredCommand::guild("ping", 20_u64, guild)]);
    cache.build_guild_cache([guild]).await.unwrap();

    let found = cache.get_command("ping", Some(guild)).unwrap();
    assert_eq!(found.id.get(), 20);
    assert_eq!(found.guild_id, Some(guild));

    // Without a guild only the global scope is searched.
    assert_eq!(cache.get_command("ping", None).unwrap().id.get(), 10);
}

#[tokio::test]
async fn test_failed_guild_build_replaces_nothing() {
    let guilds: Vec<GuildId> = discord_fixtures::test_guild_ids(2)
        .into_iter()
        .map(GuildId::new)
        .collect();
    let registrar = FakeRegistrar::new();
    registrar.set_guild(guilds[0], vec![RegisteredCommand::guild("a", 1_u64, guilds[0])]);
    let cache = CommandCache::new(registrar);
    cache.build_guild_cache(guilds.clone()).await.unwrap();

    cache
        .registrar()
        .set_guild(guilds[0], vec![RegisteredCommand::guild("b", 2_u64, guilds[0])]);
    cache.registrar().set_failing(true);
    assert!(cache.build_guild_cache(guilds.clone()).await.is_err());

    let slice = cache.guild_commands(guilds[0]).unwrap();
    assert_eq!(slice.names(), vec!["a"]);
}

// ---------------------------------------------------------------------------
// Error pipeline
// ---------------------------------------------------------------------------

fn invocation() -> CommandInvocation {
    CommandInvocation {
        command: "invite add".to_string(),
        author_id: UserId::new(discord_fixtures::test_user_id()),
        channel_id: ChannelId::new(discord_fixtures::test_channel_id()),
        guild_id: Some(guild_id()),
    }
}

fn command_context(responder: &Arc<RecordingResponder>) -> CommandErrorContext {
    CommandErrorContext {
        invocation: invocation(),
        message_id: MessageId::new(55),
        responder: Arc::clone(responder) as _,
    }
}

fn app_context(
    responder: &Arc<RecordingResponder>,
    acknowledgement: Acknowledgement,
) -> AppCommandErrorContext {
    AppCommandErrorContext {
        invocation: invocation(),
        interaction_id: InteractionId::new(77),
        token: "token".to_string(),
        acknowledgement,
        responder: Arc::clone(responder) as _,
    }
}

fn responsive() -> BoxError {
    Box::new(ResponsiveError::new("That invite does not exist"))
}

fn fixed(result: Option<bool>) -> impl ErrorHandler<CommandErrorContext> {
    handler_fn(move |_: &DynError, _: &CommandErrorContext, _| Ok(result))
}

#[tokio::test]
async fn test_true_none_false_still_fires_terminal_action() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new();
    pipeline.add_command_error_handler(fixed(Some(true)));

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    pipeline.add_command_error_handler(handler_fn(
        move |_: &DynError, _: &CommandErrorContext, handled| {
            record.lock().push(handled);
            Ok(None)
        },
    ));
    pipeline.add_command_error_handler(fixed(Some(false)));

    let error = responsive();
    let handled = pipeline
        .dispatch_command_error(error.as_ref(), &command_context(&responder))
        .await;

    assert!(!handled);
    assert_eq!(*seen.lock(), vec![true]);
    assert_eq!(
        responder.sent(),
        vec![Sent::Reply {
            channel_id: ChannelId::new(discord_fixtures::test_channel_id()),
            message_id: MessageId::new(55),
            content: "That invite does not exist".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_single_true_suppresses_terminal_action() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new();
    pipeline.add_command_error_handler(fixed(Some(true)));

    let error = responsive();
    let handled = pipeline
        .dispatch_command_error(error.as_ref(), &command_context(&responder))
        .await;

    assert!(handled);
    assert!(responder.sent().is_empty());
}

struct FailingHandler;

#[async_trait::async_trait]
impl ErrorHandler<CommandErrorContext> for FailingHandler {
    async fn handle(
        &self,
        _error: &DynError,
        _context: &CommandErrorContext,
        _handled: bool,
    ) -> Result<Option<bool>, BoxError> {
        Err("handler is broken".into())
    }
}

struct PanickingHandler;

#[async_trait::async_trait]
impl ErrorHandler<CommandErrorContext> for PanickingHandler {
    async fn handle(
        &self,
        _error: &DynError,
        _context: &CommandErrorContext,
        _handled: bool,
    ) -> Result<Option<bool>, BoxError> {
        panic!("handler exploded");
    }
}

#[tokio::test]
async fn test_broken_handlers_do_not_stop_the_chain() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new();
    let after = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&after);

    pipeline.add_command_error_handler(fixed(Some(true)));
    pipeline.add_command_error_handler(FailingHandler);
    pipeline.add_command_error_handler(PanickingHandler);
    pipeline.add_command_error_handler(handler_fn(
        move |_: &DynError, _: &CommandErrorContext, handled| {
            assert!(handled);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        },
    ));

    let error = responsive();
    let handled = pipeline
        .dispatch_command_error(error.as_ref(), &command_context(&responder))
        .await;

    assert!(handled);
    assert_eq!(after.load(Ordering::SeqCst), 1);
    assert!(responder.sent().is_empty());
}

#[tokio::test]
async fn test_broken_handler_alone_leaves_error_unhandled() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new();
    pipeline.add_command_error_handler(FailingHandler);

    let error = responsive();
    let handled = pipeline
        .dispatch_command_error(error.as_ref(), &command_context(&responder))
        .await;

    assert!(!handled);
    assert_eq!(responder.sent().len(), 1);
}

#[tokio::test]
async fn test_non_responsive_error_is_only_logged() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new();

    let error: BoxError = "database on fire".into();
    let handled = pipeline
        .dispatch_command_error(error.as_ref(), &command_context(&responder))
        .await;

    assert!(!handled);
    assert!(responder.sent().is_empty());
}

#[tokio::test]
async fn test_unacknowledged_interaction_gets_initial_response() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new();

    let error = responsive();
    pipeline
        .dispatch_app_command_error(
            error.as_ref(),
            &app_context(&responder, Acknowledgement::None),
        )
        .await;

    assert_eq!(
        responder.sent(),
        vec![Sent::Response {
            interaction_id: InteractionId::new(77),
            content: "That invite does not exist".to_string(),
            ephemeral: true,
        }]
    );
}

#[tokio::test]
async fn test_acknowledged_interaction_gets_followup() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new().with_followup_grace(Duration::ZERO);

    let error = responsive();
    pipeline
        .dispatch_app_command_error(
            error.as_ref(),
            &app_context(&responder, Acknowledgement::Deferred { ephemeral: true }),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = responder.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], Sent::Followup { ephemeral: true, .. }));
}

#[tokio::test]
async fn test_public_defer_followup_is_deleted() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new().with_followup_grace(Duration::ZERO);

    let error = responsive();
    pipeline
        .dispatch_app_command_error(
            error.as_ref(),
            &app_context(&responder, Acknowledgement::Deferred { ephemeral: false }),
        )
        .await;

    let deleted = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let sent = responder.sent();
            if sent.iter().any(|s| matches!(s, Sent::DeletedFollowup(_))) {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("followup was not deleted");

    let Sent::Followup { message_id, .. } = deleted[0].clone() else {
        panic!("expected a followup first, got {:?}", deleted[0]);
    };
    assert_eq!(deleted[1], Sent::DeletedFollowup(message_id));
}

#[tokio::test]
async fn test_event_errors_are_never_answered() {
    let responder = Arc::new(RecordingResponder::new());
    let pipeline = ErrorHandling::new();
    let context = EventData::new("message_delete", "{}", None, Arc::clone(&responder) as _);

    let error = responsive();
    assert!(!pipeline.dispatch_event_error(error.as_ref(), &context).await);
    assert!(responder.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Notes {
    #[serde(default)]
    notes: HashMap<String, String>,
}

#[tokio::test]
async fn test_json_file_database_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("notes.json");
    let options = DatabaseOptions::JsonFile(JsonFileDatabaseOptions {
        path: path.clone(),
        no_init: false,
        indent: Some(2),
    });

    let db: Box<dyn Database<Notes>> = make_database(&options);
    {
        let mut data = db.cache().await.unwrap().lock().await;
        data.notes.insert("hello".to_string(), "world".to_string());
    }
    db.dirty().await.unwrap();

    let reopened = JsonFileDatabase::<Notes>::new(JsonFileDatabaseOptions {
        path,
        no_init: true,
        indent: None,
    });
    let data = reopened.cache().await.unwrap().lock().await;
    assert_eq!(data.notes.get("hello").map(String::as_str), Some("world"));
}

#[tokio::test]
async fn test_json_file_database_no_init() {
    let dir = tempfile::tempdir().unwrap();
    let db = JsonFileDatabase::<Notes>::new(JsonFileDatabaseOptions {
        path: dir.path().join("missing.json"),
        no_init: true,
        indent: None,
    });

    assert!(matches!(db.cache().await, Err(DatabaseError::Missing(_))));
}

#[tokio::test]
async fn test_json_file_database_initialises_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.json");
    tokio::fs::write(&path, r#"{"notes":{"a":"1"}}"#).await.unwrap();
    let db = JsonFileDatabase::<Notes>::new(JsonFileDatabaseOptions {
        path: path.clone(),
        no_init: false,
        indent: None,
    });

    let (first, second) = tokio::join!(db.cache(), db.cache());
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(std::ptr::eq(first, second));

    // Later edits to the file are not picked up by an initialised cache.
    tokio::fs::write(&path, r#"{"notes":{}}"#).await.unwrap();
    assert_eq!(db.cache().await.unwrap().lock().await.notes.len(), 1);
}
