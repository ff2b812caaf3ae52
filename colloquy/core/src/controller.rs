//! Session Controller
//!
//! Owns one conversation: the Message Log, the pending Attachment Store and
//! at most one in-flight request to the generative backend.
//!
//! # Design Philosophy
//!
//! - All session state sits behind a single lock that is never held across
//!   an `.await`. Every mutation, and the update it broadcasts, happens under
//!   that lock, so observers see updates in mutation order.
//! - Each send is one spawned task with its own [`CancellationToken`]. The
//!   previous token is cancelled under the same lock that registers the new
//!   request, so two requests are never active at once.
//! - A task races every backend await against its token and re-checks the
//!   token under the lock before touching the log. Results that arrive after
//!   cancellation are dropped.
//!
//! # Example
//!
//! ```ignore
//! let controller = SessionController::new(Arc::new(backend), SessionConfig::default());
//! let mut updates = controller.subscribe();
//! let handle = controller.send_message("Hello!", SendMode::Streaming)?;
//! while let Ok(update) = updates.recv().await { /* render */ }
//! ```

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::attachments::{Attachment, AttachmentId, AttachmentStore};
use crate::backend::{Content, GenerateRequest, GenerativeBackend, GroundingMetadata};
use crate::config::SessionConfig;
use crate::error::{SessionError, TransportError};
use crate::messages::{
    MessageId, RequestId, RequestOutcome, SessionId, SessionSnapshot, SessionUpdate,
};
use crate::presets::Preset;
use crate::session::{Message, MessageLog, MessageState};
use crate::validation::{InputValidator, ValidationResult};

/// How a response is requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendMode {
    /// Receive the response as a stream of chunks
    Streaming,
    /// Receive the whole response at once
    Single,
}

/// The request currently allowed to write to the log
#[derive(Debug)]
struct ActiveRequest {
    id: RequestId,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct SessionState {
    log: MessageLog,
    attachments: AttachmentStore,
    last_error: Option<SessionError>,
    active: Option<ActiveRequest>,
    title: String,
    initial_prompt: String,
}

/// State shared between the controller and its request tasks
struct Shared {
    state: Mutex<SessionState>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl Shared {
    /// Broadcast an update; having no subscribers is fine
    fn emit(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    /// Cancel and unregister the active request, if any
    fn cancel_active(&self, state: &mut SessionState) -> Option<RequestId> {
        let active = state.active.take()?;
        active.token.cancel();
        self.emit(SessionUpdate::RequestFinished {
            request_id: active.id,
            outcome: RequestOutcome::Cancelled,
        });
        Some(active.id)
    }
}

/// Handle to one `send_message` unit of work
///
/// Dropping the handle does not cancel the request.
#[derive(Debug)]
pub struct RequestHandle {
    id: RequestId,
    message_id: MessageId,
    join: JoinHandle<RequestOutcome>,
}

impl RequestHandle {
    /// Request ID
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// ID of the assistant message this request writes to
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Wait for the request to end
    pub async fn outcome(self) -> RequestOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(request_id = %self.id, error = %e, "Request task aborted");
                RequestOutcome::Cancelled
            }
        }
    }
}

/// Manages one conversation with a generative backend
pub struct SessionController<B: GenerativeBackend + ?Sized + 'static> {
    session_id: SessionId,
    backend: Arc<B>,
    config: SessionConfig,
    validator: InputValidator,
    shared: Arc<Shared>,
}

impl<B: GenerativeBackend + ?Sized + 'static> SessionController<B> {
    /// Create a controller with an empty conversation
    #[must_use]
    pub fn new(backend: Arc<B>, config: SessionConfig) -> Self {
        Self::with_state(backend, config, SessionState::default())
    }

    /// Create a controller seeded from a preset
    ///
    /// The preset's model and system instruction take precedence over
    /// `config`.
    #[must_use]
    pub fn with_preset(backend: Arc<B>, mut config: SessionConfig, preset: &Preset) -> Self {
        if let Some(ref model) = preset.model {
            config.model.clone_from(model);
        }
        if preset.system_instruction.is_some() {
            config
                .system_instruction
                .clone_from(&preset.system_instruction);
        }

        let mut attachments = AttachmentStore::new();
        for attachment in &preset.attachments {
            attachments.add(attachment.clone());
        }

        let state = SessionState {
            log: MessageLog::from_seed(&preset.history),
            attachments,
            title: preset.title.clone(),
            initial_prompt: preset.initial_prompt.clone().unwrap_or_default(),
            ..SessionState::default()
        };

        tracing::debug!(preset = %preset.name, "Seeding session from preset");
        Self::with_state(backend, config, state)
    }

    fn with_state(backend: Arc<B>, config: SessionConfig, state: SessionState) -> Self {
        let (updates, _) = broadcast::channel(config.update_buffer.max(1));
        Self {
            session_id: SessionId::new(),
            backend,
            validator: InputValidator::new(config.limits.clone()),
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                updates,
            }),
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send a user message and start producing the reply
    ///
    /// Cancels any in-flight request, binds every pending attachment to the
    /// new user message and appends a pending assistant message, all before
    /// returning. The reply is produced by a spawned task; follow it through
    /// [`subscribe`](Self::subscribe) or [`RequestHandle::outcome`].
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] if the input is rejected. Nothing
    /// is cancelled, drained or appended in that case.
    pub fn send_message(
        &self,
        text: impl Into<String>,
        mode: SendMode,
    ) -> Result<RequestHandle, SessionError> {
        let text = text.into();
        let mut state = self.shared.state.lock();

        if let ValidationResult::Invalid(reason) = self
            .validator
            .validate_message(&text, state.attachments.as_slice())
        {
            tracing::warn!(reason = %reason, "Rejected user message");
            return Err(SessionError::Validation(reason));
        }

        if let Some(previous) = self.shared.cancel_active(&mut state) {
            tracing::debug!(request_id = %previous, "Superseded in-flight request");
        }

        let attachments = state.attachments.drain_all();
        let attachment_count = attachments.len();
        let history = state.log.history_contents();

        let user = state.log.push_user(text, attachments).clone();
        let assistant = state.log.push_pending_assistant().clone();
        let request = self.build_request(history, &user);

        let request_id = RequestId::next();
        let token = CancellationToken::new();
        state.last_error = None;
        state.active = Some(ActiveRequest {
            id: request_id,
            token: token.clone(),
        });

        if attachment_count > 0 {
            self.shared
                .emit(SessionUpdate::AttachmentsChanged { count: 0 });
        }
        self.shared.emit(SessionUpdate::MessageAdded { message: user });
        self.shared.emit(SessionUpdate::MessageAdded {
            message: assistant.clone(),
        });
        self.shared
            .emit(SessionUpdate::RequestStarted { request_id });
        drop(state);

        tracing::info!(
            request_id = %request_id,
            message_id = %assistant.id,
            mode = ?mode,
            attachments = attachment_count,
            "Sending message"
        );

        let task = RequestTask {
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            request_id,
            message_id: assistant.id.clone(),
            token,
        };
        let join = tokio::spawn(task.run(request, mode));

        Ok(RequestHandle {
            id: request_id,
            message_id: assistant.id,
            join,
        })
    }

    fn build_request(&self, history: Vec<Content>, user: &Message) -> GenerateRequest {
        let mut request = GenerateRequest::new(self.config.model.clone())
            .with_contents(history)
            .with_turn(user.to_content());
        if let Some(ref system) = self.config.system_instruction {
            request = request.with_system(system.clone());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max) = self.config.max_output_tokens {
            request = request.with_max_output_tokens(max);
        }
        request
    }

    /// Mode used when the caller has no preference
    #[must_use]
    pub fn default_mode(&self) -> SendMode {
        if self.config.streaming {
            SendMode::Streaming
        } else {
            SendMode::Single
        }
    }

    /// Cancel the in-flight request, if any
    ///
    /// The assistant message keeps whatever it had received. Calling this
    /// with nothing in flight does nothing.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        if let Some(request_id) = self.shared.cancel_active(&mut state) {
            tracing::info!(request_id = %request_id, "Stopped request");
        }
    }

    /// Stop, then discard history, pending attachments, the last error and
    /// the initial prompt
    ///
    /// Model and system instruction are kept.
    pub fn start_new_chat(&self) {
        let mut state = self.shared.state.lock();
        self.shared.cancel_active(&mut state);
        state.log.clear();
        state.attachments.clear();
        state.last_error = None;
        state.initial_prompt.clear();
        self.shared.emit(SessionUpdate::Cleared);
        tracing::info!(session_id = %self.session_id.0, "Started new chat");
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Queue an attachment for the next send
    pub fn add_attachment(&self, attachment: Attachment) -> AttachmentId {
        let mut state = self.shared.state.lock();
        let id = attachment.id.clone();
        tracing::debug!(
            attachment_id = %id,
            mime_type = %attachment.mime_type,
            "Queued attachment"
        );
        state.attachments.add(attachment);
        self.shared.emit(SessionUpdate::AttachmentsChanged {
            count: state.attachments.len(),
        });
        id
    }

    /// Remove a queued attachment
    pub fn remove_attachment(&self, id: &AttachmentId) -> Option<Attachment> {
        let mut state = self.shared.state.lock();
        let removed = state.attachments.remove(id)?;
        self.shared.emit(SessionUpdate::AttachmentsChanged {
            count: state.attachments.len(),
        });
        Some(removed)
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Subscribe to session updates
    ///
    /// Receivers that fall behind see `Lagged` and can re-sync from
    /// [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.shared.updates.subscribe()
    }

    /// Consistent copy of the whole session
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.state.lock();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            model: self.config.model.clone(),
            title: state.title.clone(),
            initial_prompt: state.initial_prompt.clone(),
            messages: state.log.messages().to_vec(),
            pending_attachments: state.attachments.as_slice().to_vec(),
            last_error: state.last_error.clone(),
            in_progress: state.active.is_some(),
        }
    }

    /// Messages in insertion order
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.shared.state.lock().log.messages().to_vec()
    }

    /// Attachments queued for the next send
    #[must_use]
    pub fn pending_attachments(&self) -> Vec<Attachment> {
        self.shared.state.lock().attachments.as_slice().to_vec()
    }

    /// Last session-level error
    #[must_use]
    pub fn last_error(&self) -> Option<SessionError> {
        self.shared.state.lock().last_error.clone()
    }

    /// Whether a request is in flight
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.shared.state.lock().active.is_some()
    }

    /// ID of the in-flight request
    #[must_use]
    pub fn active_request(&self) -> Option<RequestId> {
        self.shared.state.lock().active.as_ref().map(|a| a.id)
    }

    /// Preset title, empty when none
    #[must_use]
    pub fn title(&self) -> String {
        self.shared.state.lock().title.clone()
    }

    /// Suggested first prompt, empty when none
    #[must_use]
    pub fn initial_prompt(&self) -> String {
        self.shared.state.lock().initial_prompt.clone()
    }

    /// Session ID
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Session settings
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

}

// ============================================================================
// Request task
// ============================================================================

/// How a backend exchange ended, before it is committed to the log
enum Flow {
    Done {
        content: Option<String>,
        grounding: Option<GroundingMetadata>,
    },
    Cancelled,
}

struct RequestTask<B: GenerativeBackend + ?Sized> {
    backend: Arc<B>,
    shared: Arc<Shared>,
    request_id: RequestId,
    message_id: MessageId,
    token: CancellationToken,
}

impl<B: GenerativeBackend + ?Sized> RequestTask<B> {
    async fn run(self, request: GenerateRequest, mode: SendMode) -> RequestOutcome {
        let result = match mode {
            SendMode::Streaming => self.stream(&request).await,
            SendMode::Single => self.single(&request).await,
        };
        self.finish(result)
    }

    async fn single(&self, request: &GenerateRequest) -> Result<Flow, TransportError> {
        let response = tokio::select! {
            biased;
            () = self.token.cancelled() => return Ok(Flow::Cancelled),
            response = self.backend.generate(request) => response?,
        };
        tracing::debug!(
            request_id = %self.request_id,
            tokens = ?response.tokens_used,
            duration_ms = ?response.duration_ms,
            "Received response"
        );
        Ok(Flow::Done {
            content: response.text,
            grounding: response.grounding,
        })
    }

    async fn stream(&self, request: &GenerateRequest) -> Result<Flow, TransportError> {
        let mut stream = tokio::select! {
            biased;
            () = self.token.cancelled() => return Ok(Flow::Cancelled),
            stream = self.backend.generate_stream(request) => stream?,
        };

        let mut chunks = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                () = self.token.cancelled() => return Ok(Flow::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    chunks += 1;
                    if !self.apply_chunk(chunk.text.as_deref(), chunk.grounding) {
                        return Ok(Flow::Cancelled);
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(request_id = %self.request_id, chunks, "Stream failed");
                    return Err(e);
                }
                None => {
                    tracing::debug!(request_id = %self.request_id, chunks, "Stream ended");
                    return Ok(Flow::Done {
                        content: None,
                        grounding: None,
                    });
                }
            }
        }
    }

    /// Apply one chunk; `false` once this request may no longer write
    fn apply_chunk(&self, text: Option<&str>, grounding: Option<GroundingMetadata>) -> bool {
        let mut state = self.shared.state.lock();
        if self.token.is_cancelled() {
            return false;
        }

        let was_pending = state
            .log
            .last()
            .is_some_and(|m| m.id == self.message_id && m.state == MessageState::Pending);
        if state.log.apply_delta(&self.message_id, text).is_none() {
            return false;
        }

        if was_pending {
            self.shared.emit(SessionUpdate::MessageState {
                message_id: self.message_id.clone(),
                state: MessageState::Streaming,
            });
        }
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            self.shared.emit(SessionUpdate::Delta {
                message_id: self.message_id.clone(),
                text: text.to_string(),
            });
        }
        if let Some(grounding) = grounding {
            self.record_grounding(&mut state, grounding);
        }
        true
    }

    fn record_grounding(&self, state: &mut SessionState, grounding: GroundingMetadata) {
        if state.log.set_grounding(&self.message_id, grounding.clone()) {
            self.shared.emit(SessionUpdate::Grounding {
                message_id: self.message_id.clone(),
                grounding,
            });
        }
    }

    /// Commit the result to the log and release the active slot
    fn finish(&self, result: Result<Flow, TransportError>) -> RequestOutcome {
        let mut state = self.shared.state.lock();
        if self.token.is_cancelled() {
            tracing::debug!(request_id = %self.request_id, "Discarding result of cancelled request");
            return RequestOutcome::Cancelled;
        }
        if state.active.as_ref().is_some_and(|a| a.id == self.request_id) {
            state.active = None;
        }

        let outcome = match result {
            Ok(Flow::Cancelled) => RequestOutcome::Cancelled,
            Ok(Flow::Done { content, grounding }) => {
                let content = content.filter(|c| !c.is_empty());
                if let Some(grounding) = grounding {
                    self.record_grounding(&mut state, grounding);
                }
                let content_set = content.clone();
                if state.log.complete(&self.message_id, content).is_some() {
                    if content_set.is_some() {
                        self.shared.emit(SessionUpdate::ContentSet {
                            message_id: self.message_id.clone(),
                            content: content_set,
                        });
                    }
                    self.shared.emit(SessionUpdate::MessageState {
                        message_id: self.message_id.clone(),
                        state: MessageState::Complete,
                    });
                    tracing::info!(
                        request_id = %self.request_id,
                        message_id = %self.message_id,
                        "Response complete"
                    );
                    RequestOutcome::Completed
                } else {
                    RequestOutcome::Cancelled
                }
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %self.request_id,
                    message_id = %self.message_id,
                    error = %error,
                    "Request failed"
                );
                if state.log.fail(&self.message_id, error.clone()).is_some() {
                    self.shared.emit(SessionUpdate::MessageState {
                        message_id: self.message_id.clone(),
                        state: MessageState::Failed(error.clone()),
                    });
                }
                let session_error = SessionError::Transport(error.clone());
                state.last_error = Some(session_error.clone());
                self.shared.emit(SessionUpdate::Error {
                    error: session_error,
                });
                RequestOutcome::Failed(error)
            }
        };

        self.shared.emit(SessionUpdate::RequestFinished {
            request_id: self.request_id,
            outcome: outcome.clone(),
        });
        outcome
    }
}
