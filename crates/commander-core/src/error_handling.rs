//! Ordered error-handler chains with a shared "handled" flag.
//!
//! Each error walks the chain of its kind in registration order, starting
//! unhandled. A handler returns `Some(flag)` to set the flag for the rest of
//! the chain or `None` to leave it alone. If the flag is still `false` at
//! the end, the terminal action logs the error and, for commands, sends any
//! [`ResponsiveError`] back to the user.
//!
//! [`ResponsiveError`]: commander_common::ResponsiveError

use crate::error_context::{
    Acknowledgement, AppCommandErrorContext, CommandErrorContext, ErrorContext, EventData,
    Responder,
};
use async_trait::async_trait;
use commander_common::{find_responsive, format_error_report, sanitize_stacktrace, BoxError};
use futures::FutureExt;
use parking_lot::RwLock;
use serenity::model::id::MessageId;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Error type flowing through the pipeline.
pub type DynError = dyn Error + Send + Sync + 'static;

/// How long a followup sent after a public defer stays visible.
pub const DEFAULT_FOLLOWUP_GRACE: Duration = Duration::from_secs(10);

/// One link in an error chain.
#[async_trait]
pub trait ErrorHandler<C>: Send + Sync {
    /// Inspects an error.
    ///
    /// `handled` tells whether an earlier handler claimed the error. Return
    /// `Some` to change it for the handlers after this one.
    async fn handle(
        &self,
        error: &DynError,
        context: &C,
        handled: bool,
    ) -> Result<Option<bool>, BoxError>;
}

#[async_trait]
impl<C, H> ErrorHandler<C> for Arc<H>
where
    C: Send + Sync,
    H: ErrorHandler<C> + ?Sized,
{
    async fn handle(
        &self,
        error: &DynError,
        context: &C,
        handled: bool,
    ) -> Result<Option<bool>, BoxError> {
        (**self).handle(error, context, handled).await
    }
}

/// Adapts a synchronous closure into an [`ErrorHandler`].
pub struct FnHandler<C, F> {
    f: F,
    _context: PhantomData<fn(&C)>,
}

/// Wraps a closure as an error handler.
pub fn handler_fn<C, F>(f: F) -> FnHandler<C, F>
where
    F: Fn(&DynError, &C, bool) -> Result<Option<bool>, BoxError> + Send + Sync,
{
    FnHandler {
        f,
        _context: PhantomData,
    }
}

#[async_trait]
impl<C, F> ErrorHandler<C> for FnHandler<C, F>
where
    C: Send + Sync,
    F: Fn(&DynError, &C, bool) -> Result<Option<bool>, BoxError> + Send + Sync,
{
    async fn handle(
        &self,
        error: &DynError,
        context: &C,
        handled: bool,
    ) -> Result<Option<bool>, BoxError> {
        (self.f)(error, context, handled)
    }
}

/// An append-only, ordered list of handlers for one error kind.
pub struct ErrorChain<C> {
    kind: &'static str,
    handlers: RwLock<Vec<Arc<dyn ErrorHandler<C>>>>,
}

impl<C: ErrorContext> ErrorChain<C> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Appends a handler.
    pub fn add(&self, handler: Arc<dyn ErrorHandler<C>>) {
        self.handlers.write().push(handler);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Walks the chain and returns the final flag.
    ///
    /// A handler that fails or panics is logged and skipped; the flag keeps
    /// the last value set by a working handler.
    pub async fn run(&self, error: &DynError, context: &C) -> bool {
        let handlers = self.handlers.read().clone();
        let mut handled = false;

        for (position, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.handle(error, context, handled))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(Some(flag))) => handled = flag,
                Ok(Ok(None)) => {}
                Ok(Err(handler_error)) => {
                    error!(
                        kind = self.kind,
                        position,
                        context = %context.describe(),
                        "Error handler failed: {}",
                        format_error_report(handler_error.as_ref())
                    );
                }
                Err(payload) => {
                    error!(
                        kind = self.kind,
                        position,
                        context = %context.describe(),
                        "Error handler panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        handled
    }
}

impl<C> fmt::Debug for ErrorChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChain")
            .field("kind", &self.kind)
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// The three error chains and their terminal action.
#[derive(Debug)]
pub struct ErrorHandling {
    events: ErrorChain<EventData>,
    commands: ErrorChain<CommandErrorContext>,
    app_commands: ErrorChain<AppCommandErrorContext>,
    followup_grace: Duration,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandling {
    /// Creates empty chains.
    pub fn new() -> Self {
        Self {
            events: ErrorChain::new("event"),
            commands: ErrorChain::new("command"),
            app_commands: ErrorChain::new("app_command"),
            followup_grace: DEFAULT_FOLLOWUP_GRACE,
        }
    }

    /// Changes how long temporary followups stay visible.
    #[must_use]
    pub const fn with_followup_grace(mut self, grace: Duration) -> Self {
        self.followup_grace = grace;
        self
    }

    /// Appends a gateway event error handler.
    pub fn add_event_error_handler(&self, handler: impl ErrorHandler<EventData> + 'static) {
        self.events.add(Arc::new(handler));
    }

    /// Appends a prefix command error handler.
    pub fn add_command_error_handler(
        &self,
        handler: impl ErrorHandler<CommandErrorContext> + 'static,
    ) {
        self.commands.add(Arc::new(handler));
    }

    /// Appends an application command error handler.
    pub fn add_app_command_error_handler(
        &self,
        handler: impl ErrorHandler<AppCommandErrorContext> + 'static,
    ) {
        self.app_commands.add(Arc::new(handler));
    }

    /// Number of event error handlers.
    pub fn event_handler_count(&self) -> usize {
        self.events.len()
    }

    /// Number of prefix command error handlers.
    pub fn command_handler_count(&self) -> usize {
        self.commands.len()
    }

    /// Number of application command error handlers.
    pub fn app_command_handler_count(&self) -> usize {
        self.app_commands.len()
    }

    /// Routes a gateway event error. Returns whether a handler claimed it.
    pub async fn dispatch_event_error(&self, error: &DynError, context: &EventData) -> bool {
        let handled = self.events.run(error, context).await;
        if !handled {
            log_unhandled("event", error, context);
        }
        handled
    }

    /// Routes a prefix command error. Returns whether a handler claimed it.
    pub async fn dispatch_command_error(
        &self,
        error: &DynError,
        context: &CommandErrorContext,
    ) -> bool {
        let handled = self.commands.run(error, context).await;
        if !handled {
            log_unhandled("command", error, context);
            self.respond_to_command(error, context).await;
        }
        handled
    }

    /// Routes an application command error. Returns whether a handler
    /// claimed it.
    pub async fn dispatch_app_command_error(
        &self,
        error: &DynError,
        context: &AppCommandErrorContext,
    ) -> bool {
        let handled = self.app_commands.run(error, context).await;
        if !handled {
            log_unhandled("app_command", error, context);
            self.respond_to_interaction(error, context).await;
        }
        handled
    }

    async fn respond_to_command(&self, error: &DynError, context: &CommandErrorContext) {
        let Some(responsive) = find_responsive(error) else {
            return;
        };

        let result = context
            .responder
            .reply(
                context.invocation.channel_id,
                context.message_id,
                responsive.message(),
                responsive.allowed_mentions(),
            )
            .await;
        if let Err(e) = result {
            warn!(context = %context.describe(), "Failed to reply with error message: {}", e);
        }
    }

    async fn respond_to_interaction(&self, error: &DynError, context: &AppCommandErrorContext) {
        let Some(responsive) = find_responsive(error) else {
            return;
        };
        let content = responsive.message();
        let mentions = responsive.allowed_mentions();
        let responder = &context.responder;

        if !context.acknowledgement.is_acknowledged() {
            let result = responder
                .respond(context.interaction_id, &context.token, content, mentions, true)
                .await;
            if let Err(e) = result {
                warn!(context = %context.describe(), "Failed to respond with error message: {}", e);
            }
            return;
        }

        let message_id = match responder
            .followup(&context.token, content, mentions, true)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(context = %context.describe(), "Failed to send error followup: {}", e);
                return;
            }
        };

        // A public defer leaves a visible placeholder; the followup is only
        // there to explain it and goes away again.
        if context.acknowledgement == (Acknowledgement::Deferred { ephemeral: false }) {
            schedule_followup_deletion(
                Arc::clone(responder),
                context.token.clone(),
                message_id,
                self.followup_grace,
            );
        }
    }
}

fn schedule_followup_deletion(
    responder: Arc<dyn Responder>,
    token: String,
    message_id: MessageId,
    grace: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        match responder.delete_followup(&token, message_id).await {
            Ok(()) => debug!(%message_id, "Deleted temporary error followup"),
            Err(e) => warn!(%message_id, "Failed to delete error followup: {}", e),
        }
    });
}

fn log_unhandled(kind: &'static str, error: &DynError, context: &impl ErrorContext) {
    let dispatch_site = Backtrace::capture();
    let dispatch_site = (dispatch_site.status() == BacktraceStatus::Captured)
        .then(|| dispatch_site.to_string());
    error!(
        kind,
        context = %context.describe(),
        "{}",
        unhandled_report(error, dispatch_site.as_deref())
    );
}

/// The error carries no backtrace of its own, so any captured trace is
/// labelled as the point where the pipeline was entered.
fn unhandled_report(error: &DynError, dispatch_site: Option<&str>) -> String {
    let mut report = format!("Unhandled error: {}", format_error_report(error));
    if let Some(trace) = dispatch_site {
        let _ = write!(
            report,
            "\n\nDispatched from (not the error origin):\n{}",
            sanitize_stacktrace(trace)
        );
    }
    report
}
