// Session State Store - the only place the session is mutated

use super::{ChatEntry, ImageRef, Mode, Session};
use crate::error::Rejection;
use std::sync::Arc;
use tokio::sync::watch;

pub const UPLOAD_GREETING: &str = "Here's a description of your image. How can I help you edit it?";
pub const GENERATION_INVITE: &str = "Image generated! How would you like to modify it?";

/// A session together with the generation it belongs to.
///
/// The generation changes whenever the session is replaced wholesale
/// (reset, new upload), so a completion can tell whether the session it
/// started against still exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub generation: u64,
    /// Bumped every time an error is recorded, even a repeat of the same text
    pub errors_raised: u64,
    pub session: Session,
}

/// Owner of the single session; readers observe it through a watch channel
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current session
    pub fn session(&self) -> Session {
        self.tx.borrow().session.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Observe every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Replace the session with a fresh image-to-image session showing `image`.
    ///
    /// The image and mode are committed immediately; the description is
    /// added later by [`Flight::finish_upload`].
    pub fn start_upload(&self, image: ImageRef) -> Result<Flight, Rejection> {
        self.begin(|snapshot| {
            if snapshot.session.is_busy {
                return Err(Rejection::Busy);
            }
            snapshot.generation = snapshot.generation.wrapping_add(1);
            snapshot.session = Session {
                mode: Mode::ImageToImage,
                current_image: Some(image),
                is_busy: true,
                ..Session::default()
            };
            Ok(())
        })
    }

    /// Begin a text-to-image request from the initial screen
    pub fn start_text_generation(&self, prompt: String) -> Result<Flight, Rejection> {
        self.begin(|snapshot| {
            let session = &mut snapshot.session;
            if session.is_busy {
                return Err(Rejection::Busy);
            }
            if session.mode != Mode::Initial {
                return Err(Rejection::WrongMode(session.mode));
            }
            session.is_busy = true;
            session.last_error = None;
            session.pending_prompt = Some(prompt);
            Ok(())
        })
    }

    /// Begin a chat edit and hand back the image it applies to
    pub fn start_edit(&self) -> Result<(Flight, ImageRef), Rejection> {
        let mut target = None;
        let flight = self.begin(|snapshot| {
            let session = &mut snapshot.session;
            if session.is_busy {
                return Err(Rejection::Busy);
            }
            let image = session.current_image.clone().ok_or(Rejection::NoImage)?;
            session.is_busy = true;
            session.last_error = None;
            target = Some(image);
            Ok(())
        })?;
        let image = target.ok_or(Rejection::NoImage)?;
        Ok((flight, image))
    }

    /// Record an error that did not come from an in-flight operation
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|snapshot| record_error(snapshot, message));
    }

    /// Dismiss the error; mode, image and transcript are untouched
    pub fn clear_error(&self) {
        self.tx
            .send_if_modified(|snapshot| snapshot.session.last_error.take().is_some());
    }

    /// Return to the zero session, abandoning whatever is in flight
    pub fn reset(&self) {
        self.tx.send_modify(|snapshot| {
            snapshot.generation = snapshot.generation.wrapping_add(1);
            snapshot.session = Session::default();
        });
    }

    fn begin(
        &self,
        admit: impl FnOnce(&mut Snapshot) -> Result<(), Rejection>,
    ) -> Result<Flight, Rejection> {
        let mut outcome = Err(Rejection::Busy);
        self.tx.send_if_modified(|snapshot| match admit(snapshot) {
            Ok(()) => {
                outcome = Ok(snapshot.generation);
                true
            }
            Err(rejection) => {
                outcome = Err(rejection);
                false
            }
        });
        outcome.map(|generation| Flight {
            store: self.clone(),
            generation,
        })
    }

    /// Apply `mutate` only if the session still belongs to `generation`
    fn apply(&self, generation: u64, mutate: impl FnOnce(&mut Session)) -> bool {
        self.apply_if(generation, |snapshot| {
            mutate(&mut snapshot.session);
            true
        })
    }

    /// Like [`Self::apply`], but `mutate` reports whether it changed anything
    fn apply_if(&self, generation: u64, mutate: impl FnOnce(&mut Snapshot) -> bool) -> bool {
        self.tx
            .send_if_modified(|snapshot| snapshot.generation == generation && mutate(snapshot))
    }
}

fn record_error(snapshot: &mut Snapshot, message: String) {
    snapshot.errors_raised = snapshot.errors_raised.wrapping_add(1);
    snapshot.session.last_error = Some(message);
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for the one mutating operation in flight.
///
/// Every mutation through a flight is dropped silently once the session it
/// was started against has been superseded. Dropping the flight clears the
/// busy flag, whichever way the operation ended.
pub struct Flight {
    store: SessionStore,
    generation: u64,
}

impl Flight {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the session this flight started against is still live
    pub fn is_current(&self) -> bool {
        self.store.tx.borrow().generation == self.generation
    }

    /// Seed the transcript with the greeting and the image description
    pub fn finish_upload(&self, description: String) -> bool {
        self.store.apply(self.generation, |session| {
            session.transcript.push(ChatEntry::AiText(UPLOAD_GREETING.to_string()));
            session.transcript.push(ChatEntry::AiText(description));
        })
    }

    /// Commit a generated image: prompt, image and invitation, in that order
    pub fn finish_text_generation(&self, image: ImageRef) -> bool {
        self.store.apply(self.generation, |session| {
            let prompt = session.pending_prompt.take().unwrap_or_default();
            session.mode = Mode::TextToImage;
            session.transcript.push(ChatEntry::UserPrompt(prompt));
            session.current_image = Some(image.clone());
            session.transcript.push(ChatEntry::AiImage(image));
            session
                .transcript
                .push(ChatEntry::AiText(GENERATION_INVITE.to_string()));
        })
    }

    pub fn append_user_message(&self, text: String) -> bool {
        self.store.apply(self.generation, |session| {
            session.transcript.push(ChatEntry::UserPrompt(text));
        })
    }

    pub fn append_ai_text(&self, text: String) -> bool {
        self.store.apply(self.generation, |session| {
            session.transcript.push(ChatEntry::AiText(text));
        })
    }

    /// Append an AI image and make it the current image
    pub fn append_ai_image(&self, image: ImageRef) -> bool {
        self.store.apply_if(self.generation, |snapshot| {
            let session = &mut snapshot.session;
            if session.mode == Mode::Initial {
                return false;
            }
            session.current_image = Some(image.clone());
            session.transcript.push(ChatEntry::AiImage(image));
            true
        })
    }

    pub fn set_error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.store.apply_if(self.generation, |snapshot| {
            record_error(snapshot, message);
            true
        })
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        let settled = self.store.apply(self.generation, |session| {
            session.is_busy = false;
            session.pending_prompt = None;
        });
        if !settled {
            tracing::debug!(
                generation = self.generation,
                "session superseded, discarding in-flight result"
            );
        }
    }
}
