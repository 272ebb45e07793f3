//! Job progress registry
//!
//! Maps a client-chosen job id to the one push channel currently listening for it.
//! The HTTP layer registers a channel when a client opens the progress stream;
//! the downloader publishes into it by id without owning it. Publishing to an id
//! nobody listens on is a silent no-op: a download may run with no one watching.
//!
//! Registrations are numbered. The last registration for an id wins, and a stale
//! connection going away never removes a newer one.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::download::progress::{ProgressEvent, ProgressSink};

/// Frame pushed to a listening client
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Progress(ProgressEvent),
    /// Job finished, the stream closes after this
    Done,
}

struct Entry {
    generation: u64,
    sender: mpsc::UnboundedSender<PushMessage>,
}

#[derive(Default)]
struct Inner {
    channels: DashMap<String, Entry>,
    next_generation: AtomicU64,
}

/// Process-wide job id → push channel map.
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `sender` as the channel for `job_id`, replacing any previous one.
    ///
    /// Returns the registration number used by [`JobRegistry::unregister_registration`].
    pub fn register(&self, job_id: impl Into<String>, sender: mpsc::UnboundedSender<PushMessage>) -> u64 {
        let job_id = job_id.into();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        if self
            .inner
            .channels
            .insert(job_id.clone(), Entry { generation, sender })
            .is_some()
        {
            log::debug!("Progress channel for job {} replaced by a newer connection", job_id);
        }
        generation
    }

    /// Removes the channel for `job_id`. Safe to call when absent.
    pub fn unregister(&self, job_id: &str) {
        if self.inner.channels.remove(job_id).is_some() {
            log::debug!("Progress channel for job {} unregistered", job_id);
        }
    }

    /// Removes the channel for `job_id` only if it is still the given registration.
    pub fn unregister_registration(&self, job_id: &str, generation: u64) -> bool {
        self.inner
            .channels
            .remove_if(job_id, |_, entry| entry.generation == generation)
            .is_some()
    }

    /// Sends `event` to the channel registered for `job_id`, if any.
    pub fn publish(&self, job_id: &str, event: &ProgressEvent) {
        self.send(job_id, PushMessage::Progress(event.clone()));
    }

    fn send(&self, job_id: &str, message: PushMessage) {
        let closed = match self.inner.channels.get(job_id) {
            Some(entry) => entry.sender.send(message).is_err().then_some(entry.generation),
            None => {
                log::trace!("No listener for job {}, dropping event", job_id);
                return;
            }
        };

        // Receiver went away without unregistering (peer closed mid-write)
        if let Some(generation) = closed {
            self.unregister_registration(job_id, generation);
        }
    }

    /// Opens a new channel for `job_id` and registers it.
    ///
    /// Dropping the returned [`Subscription`] unregisters it.
    pub fn subscribe(&self, job_id: impl Into<String>) -> Subscription {
        let job_id = job_id.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let generation = self.register(job_id.clone(), sender);
        log::debug!("Progress listener attached for job {}", job_id);
        Subscription {
            job_id,
            generation,
            receiver,
            registry: self.clone(),
        }
    }

    /// Closes the current listener of `job_id` after `grace`.
    ///
    /// Sends [`PushMessage::Done`] and removes the entry, unless the id was
    /// re-registered by another connection in the meantime. Must be called
    /// from within a Tokio runtime.
    pub fn finish(&self, job_id: &str, grace: Duration) {
        let Some(generation) = self.inner.channels.get(job_id).map(|entry| entry.generation) else {
            return;
        };

        let registry = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some((_, entry)) = registry
                .inner
                .channels
                .remove_if(&job_id, |_, entry| entry.generation == generation)
            {
                let _ = entry.sender.send(PushMessage::Done);
                log::debug!("Progress channel for job {} closed after completion", job_id);
            }
        });
    }

    /// Sink publishing into this registry under `job_id`
    pub fn sink(&self, job_id: impl Into<String>) -> JobSink {
        JobSink {
            registry: self.clone(),
            job_id: job_id.into(),
        }
    }

    pub fn is_registered(&self, job_id: &str) -> bool {
        self.inner.channels.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.inner.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.channels.is_empty()
    }
}

/// Receiving end of a registered progress channel.
///
/// Yields frames until the job finishes or the registration is replaced/removed.
pub struct Subscription {
    job_id: String,
    generation: u64,
    receiver: mpsc::UnboundedReceiver<PushMessage>,
    registry: JobRegistry,
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = PushMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.registry.unregister_registration(&self.job_id, self.generation) {
            log::debug!("Progress listener for job {} disconnected", self.job_id);
        }
    }
}

/// [`ProgressSink`] that publishes every event under one job id
#[derive(Clone)]
pub struct JobSink {
    registry: JobRegistry,
    job_id: String,
}

impl ProgressSink for JobSink {
    fn on_progress(&self, event: &ProgressEvent) {
        self.registry.publish(&self.job_id, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    fn progress(percent: f64) -> PushMessage {
        PushMessage::Progress(ProgressEvent::percent_only(percent))
    }

    #[test]
    fn test_publish_without_listener_is_noop() {
        let registry = JobRegistry::new();
        registry.publish("ghost", &ProgressEvent::percent_only(10.0));
        assert!(registry.is_empty());
        assert!(!registry.is_registered("ghost"));
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let registry = JobRegistry::new();
        let mut sub = registry.subscribe("job-1");

        for p in [1.0, 1.0, 42.5, 100.0] {
            registry.publish("job-1", &ProgressEvent::percent_only(p));
        }

        assert_eq!(sub.recv().await, Some(progress(1.0)));
        assert_eq!(sub.recv().await, Some(progress(1.0)));
        assert_eq!(sub.recv().await, Some(progress(42.5)));
        assert_eq!(sub.recv().await, Some(progress(100.0)));
    }

    #[tokio::test]
    async fn test_unregister_then_publish_is_noop() {
        let registry = JobRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("job-2", tx);
        registry.unregister("job-2");
        registry.unregister("job-2");

        registry.publish("job-2", &ProgressEvent::percent_only(50.0));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = JobRegistry::new();
        let mut first = registry.subscribe("job-3");
        let mut second = registry.subscribe("job-3");
        assert_eq!(registry.len(), 1);

        registry.publish("job-3", &ProgressEvent::percent_only(5.0));
        assert_eq!(second.recv().await, Some(progress(5.0)));
        // first lost its sender when it was replaced
        assert_eq!(first.recv().await, None);

        drop(first);
        assert!(registry.is_registered("job-3"), "stale connection removed newer one");
        drop(second);
        assert!(!registry.is_registered("job-3"));
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned_on_publish() {
        let registry = JobRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("job-4", tx);
        drop(rx);

        registry.publish("job-4", &ProgressEvent::percent_only(1.0));
        assert!(!registry.is_registered("job-4"));
    }

    #[tokio::test]
    async fn test_finish_sends_done_and_removes() {
        let registry = JobRegistry::new();
        let sub = registry.subscribe("job-5");

        registry.publish("job-5", &ProgressEvent::complete());
        registry.finish("job-5", Duration::from_millis(20));

        let frames: Vec<PushMessage> = sub.collect().await;
        assert_eq!(frames, vec![progress(100.0), PushMessage::Done]);
        assert!(!registry.is_registered("job-5"));
    }

    #[tokio::test]
    async fn test_finish_keeps_newer_registration() {
        let registry = JobRegistry::new();
        let _old = registry.subscribe("job-6");
        registry.finish("job-6", Duration::from_millis(20));
        let _new = registry.subscribe("job-6");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(registry.is_registered("job-6"));
    }

    #[tokio::test]
    async fn test_job_sink_publishes() {
        let registry = JobRegistry::new();
        let mut sub = registry.subscribe("job-7");
        let sink = registry.sink("job-7");

        sink.on_progress(&ProgressEvent::percent_only(33.0));
        assert_eq!(sub.recv().await, Some(progress(33.0)));
        assert_eq!(sub.job_id(), "job-7");
    }
}
