//! Integration tests for commander-commands crate.
//!
//! These tests load extensions through the [`ExtensionLoader`] and check what
//! ends up registered with the framework and the error pipeline.

use async_trait::async_trait;
use commander_commands::{
    set_extension_enabled, Context, Data, Error, EventListener, Extension, ExtensionError,
    ExtensionHost, ExtensionLoader, ExtensionToggle,
};
use commander_common::test_utils::{config_fixtures, create_temp_dir, init_test_logging};
use commander_common::BoxError;
use commander_config::{ConfigCache, ConfigLoader, ConfiguredExtension, ExtensionRegistry};
use commander_core::{handler_fn, CommandErrorContext, DynError, ErrorHandling, GuildDirectory};
use parking_lot::RwLock;
use poise::serenity_prelude as serenity;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[poise::command(prefix_command, slash_command)]
async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("pong").await?;
    Ok(())
}

#[derive(Debug)]
struct Counter {
    extension: &'static str,
    hits: AtomicUsize,
}

struct Quiet;

#[async_trait]
impl EventListener for Quiet {
    async fn on_event(
        &self,
        _ctx: &serenity::Context,
        _event: &serenity::FullEvent,
        _framework: poise::FrameworkContext<'_, Data, Error>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Registers one command, one error handler, a listener and a state object.
struct Working {
    name: &'static str,
}

#[async_trait]
impl Extension for Working {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn setup(&self, host: &mut ExtensionHost, _options: Option<&Value>) -> Result<(), Error> {
        host.add_command(ping());
        host.add_command_error_handler(Arc::new(handler_fn(
            |_: &DynError, _: &CommandErrorContext, _| -> Result<Option<bool>, BoxError> {
                Ok(None)
            },
        )));
        host.add_event_listener(Arc::new(Quiet));
        host.insert_state(Arc::new(Counter {
            extension: self.name,
            hits: AtomicUsize::new(0),
        }));
        Ok(())
    }
}

/// Registers things, then fails.
struct Failing;

#[async_trait]
impl Extension for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn setup(&self, host: &mut ExtensionHost, _options: Option<&Value>) -> Result<(), Error> {
        host.add_command(ping());
        host.add_command_error_handler(Arc::new(handler_fn(
            |_: &DynError, _: &CommandErrorContext, _| -> Result<Option<bool>, BoxError> {
                Ok(Some(true))
            },
        )));
        host.add_event_listener(Arc::new(Quiet));
        Err("database unreachable".into())
    }
}

struct Panicking;

#[async_trait]
impl Extension for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn setup(&self, _host: &mut ExtensionHost, _options: Option<&Value>) -> Result<(), Error> {
        panic!("bad options");
    }
}

/// Records the options it was given.
struct OptionsProbe {
    seen: Arc<parking_lot::Mutex<Option<Value>>>,
}

#[async_trait]
impl Extension for OptionsProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn setup(&self, _host: &mut ExtensionHost, options: Option<&Value>) -> Result<(), Error> {
        *self.seen.lock() = options.cloned();
        Ok(())
    }
}

fn loader() -> ExtensionLoader {
    ExtensionLoader::new()
        .with(Working { name: "first" })
        .with(Failing)
        .with(Working { name: "third" })
        .with(Panicking)
}

fn registry(entries: Vec<ConfiguredExtension>) -> ExtensionRegistry {
    ExtensionRegistry::from_entries(entries).unwrap()
}

#[tokio::test]
async fn test_failing_extension_does_not_stop_the_others() {
    init_test_logging();
    let registry = registry(vec![
        ConfiguredExtension::new("first"),
        ConfiguredExtension::new("failing"),
        ConfiguredExtension::new("third"),
    ]);

    let (loaded, report) = loader()
        .load_enabled(&registry, &Arc::new(GuildDirectory::new()))
        .await;

    assert_eq!(loaded.names(), ["first", "third"]);
    assert_eq!(report.loaded, ["first", "third"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "failing");
    assert!(matches!(report.failed[0].error, ExtensionError::Setup { .. }));
    assert!(!report.is_fatal());

    // Only the two working extensions contributed anything.
    assert_eq!(loaded.command_count(), 2);
    assert_eq!(loaded.listener_count(), 2);
    let errors = ErrorHandling::new();
    let installed = loaded.install(&errors);
    assert_eq!(installed.commands.len(), 2);
    assert_eq!(installed.listeners.len(), 2);
    assert_eq!(errors.command_handler_count(), 2);
    assert_eq!(installed.names, ["first", "third"]);
    let states = installed.states;

    // Both registered the same state type; the later one wins.
    let counter = states.get::<Counter>().unwrap();
    assert_eq!(counter.extension, "third");
    counter.hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(states.get::<Counter>().unwrap().hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_required_failure_is_fatal() {
    let registry = registry(vec![
        ConfiguredExtension::new("first"),
        ConfiguredExtension::new("failing").required(true),
    ]);

    let (loaded, report) = loader()
        .load_enabled(&registry, &Arc::new(GuildDirectory::new()))
        .await;

    assert_eq!(loaded.names(), ["first"]);
    assert!(report.is_fatal());
    let required: Vec<&str> = report
        .required_failures()
        .map(|failure| failure.name.as_str())
        .collect();
    assert_eq!(required, ["failing"]);
}

#[tokio::test]
async fn test_panicking_setup_is_contained() {
    let registry = registry(vec![
        ConfiguredExtension::new("panicking"),
        ConfiguredExtension::new("first"),
    ]);

    let (loaded, report) = loader()
        .load_enabled(&registry, &Arc::new(GuildDirectory::new()))
        .await;

    assert_eq!(loaded.names(), ["first"]);
    match &report.failed[0].error {
        ExtensionError::Panicked { name, message } => {
            assert_eq!(name, "panicking");
            assert_eq!(message, "bad options");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_and_disabled_extensions() {
    let registry = registry(vec![
        ConfiguredExtension::new("missing"),
        ConfiguredExtension::new("first").disabled(true),
        ConfiguredExtension::new("third"),
    ]);

    let (loaded, report) = loader()
        .load_enabled(&registry, &Arc::new(GuildDirectory::new()))
        .await;

    assert_eq!(loaded.names(), ["third"]);
    assert_eq!(report.skipped, ["first"]);
    assert!(matches!(
        &report.failed[0].error,
        ExtensionError::Unknown(name) if name == "missing"
    ));
}

#[tokio::test]
async fn test_options_are_passed_through() {
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let loader = ExtensionLoader::new().with(OptionsProbe {
        seen: Arc::clone(&seen),
    });
    let options = json!({ "database": { "type": "in_memory" } });
    let registry = registry(vec![
        ConfiguredExtension::new("probe").with_options(options.clone())
    ]);

    let (loaded, report) = loader
        .load_enabled(&registry, &Arc::new(GuildDirectory::new()))
        .await;

    assert_eq!(loaded.names(), ["probe"]);
    assert!(report.failed.is_empty());
    assert_eq!(seen.lock().clone(), Some(options));
}

#[test]
fn test_available_is_sorted() {
    assert_eq!(
        loader().available(),
        ["failing", "first", "panicking", "third"]
    );
}

proptest! {
    #[test]
    fn prop_loaded_plus_failed_equals_enabled(
        picks in proptest::collection::vec((0usize..4, any::<bool>()), 0..8)
    ) {
        let names = ["first", "failing", "third", "panicking"];
        let mut seen = std::collections::HashSet::new();
        let entries: Vec<ConfiguredExtension> = picks
            .into_iter()
            .filter(|(i, _)| seen.insert(*i))
            .map(|(i, disabled)| ConfiguredExtension::new(names[i]).disabled(disabled))
            .collect();
        let enabled: Vec<String> = entries
            .iter()
            .filter(|ext| !ext.disabled)
            .map(|ext| ext.name.clone())
            .collect();
        let registry = registry(entries);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (loaded, report) = runtime.block_on(
            loader().load_enabled(&registry, &Arc::new(GuildDirectory::new())),
        );

        let mut accounted: Vec<String> = loaded.names().to_vec();
        accounted.extend(report.failed.iter().map(|failure| failure.name.clone()));
        accounted.sort();
        let mut expected = enabled;
        expected.sort();
        prop_assert_eq!(accounted, expected);
        prop_assert!(report
            .failed
            .iter()
            .all(|failure| failure.name == "failing" || failure.name == "panicking"));
    }
}

#[tokio::test]
async fn test_disabled_extension_stays_disabled_after_restart() {
    let dir = create_temp_dir();
    let path = dir.path().join("bot.json");
    std::fs::write(&path, config_fixtures::full_config_json()).unwrap();
    let loader = ConfigLoader::new(&path);
    let config = loader.load().await.unwrap();
    let registry = RwLock::new(config.extension_registry().unwrap());
    let cache = ConfigCache::persisted(config, loader.clone());

    let outcome = set_extension_enabled(&registry, &cache, "commander.ext.invite", false)
        .await
        .unwrap();
    assert_eq!(outcome, ExtensionToggle::Saved);
    let outcome = set_extension_enabled(&registry, &cache, "commander.ext.faq", true)
        .await
        .unwrap();
    assert_eq!(outcome, ExtensionToggle::Saved);

    let restarted = loader.load().await.unwrap().extension_registry().unwrap();
    let enabled: Vec<&str> = restarted.enabled().map(|ext| ext.name.as_str()).collect();
    assert_eq!(enabled, ["commander.ext.stacktracer", "commander.ext.faq"]);
}
