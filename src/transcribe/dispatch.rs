//! Transcription dispatch and ordered transcript assembly.
//!
//! Streaming chunks are transcribed concurrently but their text must land in
//! the transcript in dispatch order. Each dispatch gets a sequence number and
//! every completion is funneled through a single writer task that holds
//! out-of-order results until the gap before them closes.
//!
//! The writer task owns its end of the completion channel and exits only
//! once every dispatched completion has landed, so dropping the dispatcher
//! while chunks are in flight lets them drain into the session's assembler
//! instead of cutting them off.

use crate::transcribe::provider::{TranscribeOptions, TranscriptionProvider};
use crate::transcribe::transcript::TranscriptAssembler;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::warn;

struct Completion {
    seq: u64,
    /// `None` marks a failed or empty slice; it advances the cursor without
    /// contributing text.
    text: Option<String>,
}

/// Dispatches encoded audio to a provider and assembles results in order.
pub struct TranscriptionDispatcher {
    provider: Arc<dyn TranscriptionProvider>,
    options: TranscribeOptions,
    assembler: TranscriptAssembler,
    completions: mpsc::UnboundedSender<Completion>,
    next_seq: u64,
    in_flight: Arc<AtomicUsize>,
    transcribing: Arc<watch::Sender<bool>>,
}

impl TranscriptionDispatcher {
    /// Creates a dispatcher writing into the given assembler.
    ///
    /// The dispatcher owns a busy signal, observable via [`signal`]: true
    /// while any dispatch is unresolved, false once the last one lands.
    ///
    /// [`signal`]: TranscriptionDispatcher::signal
    pub fn new(
        provider: Arc<dyn TranscriptionProvider>,
        options: TranscribeOptions,
        assembler: TranscriptAssembler,
    ) -> Self {
        let (completions, mut rx) = mpsc::unbounded_channel::<Completion>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let (transcribing_tx, _) = watch::channel(false);
        let transcribing = Arc::new(transcribing_tx);

        let writer_assembler = assembler.clone();
        let writer_in_flight = Arc::clone(&in_flight);
        let writer_transcribing = Arc::clone(&transcribing);
        tokio::spawn(async move {
            let mut pending: BTreeMap<u64, Option<String>> = BTreeMap::new();
            let mut cursor = 0u64;
            while let Some(completion) = rx.recv().await {
                pending.insert(completion.seq, completion.text);
                while let Some(text) = pending.remove(&cursor) {
                    if let Some(text) = text {
                        if !text.is_empty() {
                            writer_assembler.append(&text);
                        }
                    }
                    cursor += 1;
                    if writer_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                        writer_transcribing.send_replace(false);
                    }
                }
            }
        });

        Self {
            provider,
            options,
            assembler,
            completions,
            next_seq: 0,
            in_flight,
            transcribing,
        }
    }

    /// Subscribes to the busy signal: true while any dispatch is unresolved.
    ///
    /// The signal outlives the dispatcher; once the writer task drains the
    /// last completion the sender side is dropped and waiters observe false.
    pub fn signal(&self) -> watch::Receiver<bool> {
        self.transcribing.subscribe()
    }

    /// Dispatches one streaming chunk without waiting for the result.
    ///
    /// A failed chunk is logged and skipped; later chunks still land.
    pub fn dispatch_chunk(&mut self, audio: Vec<u8>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.transcribing.send_replace(true);

        let provider = Arc::clone(&self.provider);
        let options = self.options.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let text = match provider.transcribe(audio, &options).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("chunk {seq} transcription failed: {e}");
                    None
                }
            };
            let _ = completions.send(Completion { seq, text });
        });
    }

    /// Transcribes the whole session blob and replaces the transcript.
    ///
    /// The blob is stored on the transcript whether or not the provider
    /// succeeded; a failure leaves the text unset.
    pub async fn dispatch_batch(&mut self, audio: Vec<u8>) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.transcribing.send_replace(true);

        let result = self.provider.transcribe(audio.clone(), &self.options).await;
        match result {
            Ok(text) => self.assembler.replace(Some(audio), Some(text)),
            Err(e) => {
                warn!("batch transcription failed: {e}");
                self.assembler.replace(Some(audio), None);
            }
        }

        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.transcribing.send_replace(false);
        }
    }

    /// Number of dispatches not yet landed in the transcript.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of chunks dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::provider::MockProvider;
    use std::time::Duration;

    fn make_dispatcher(
        provider: Arc<MockProvider>,
    ) -> (TranscriptionDispatcher, TranscriptAssembler) {
        let assembler = TranscriptAssembler::new();
        let dispatcher =
            TranscriptionDispatcher::new(provider, TranscribeOptions::default(), assembler.clone());
        (dispatcher, assembler)
    }

    async fn wait_idle(dispatcher: &TranscriptionDispatcher) {
        let mut signal = dispatcher.signal();
        let _ = signal.wait_for(|busy| !*busy).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_land_in_dispatch_order() {
        let provider = MockProvider::new("")
            .with_response("one ")
            .with_response("two ")
            .with_response("three")
            .shared();
        let (mut dispatcher, assembler) = make_dispatcher(provider);

        dispatcher.dispatch_chunk(vec![1]);
        dispatcher.dispatch_chunk(vec![2]);
        dispatcher.dispatch_chunk(vec![3]);

        wait_idle(&dispatcher).await;
        assert_eq!(assembler.snapshot().text.as_deref(), Some("one two three"));
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(dispatcher.dispatched(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_is_skipped_not_blocking() {
        let provider = MockProvider::new("")
            .with_response("first ")
            .with_failure("provider down")
            .with_response("third")
            .shared();
        let (mut dispatcher, assembler) = make_dispatcher(provider);

        dispatcher.dispatch_chunk(vec![1]);
        dispatcher.dispatch_chunk(vec![2]);
        dispatcher.dispatch_chunk(vec![3]);

        wait_idle(&dispatcher).await;
        assert_eq!(assembler.snapshot().text.as_deref(), Some("first third"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_signal_tracks_in_flight() {
        let provider = MockProvider::new("text")
            .with_delay(Duration::from_millis(100))
            .shared();
        let (mut dispatcher, _assembler) = make_dispatcher(provider);

        assert!(!*dispatcher.signal().borrow());
        dispatcher.dispatch_chunk(vec![1]);
        assert!(*dispatcher.signal().borrow());

        wait_idle(&dispatcher).await;
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(!*dispatcher.signal().borrow());
    }

    #[tokio::test]
    async fn test_batch_replaces_transcript() {
        let provider = MockProvider::new("full transcript").shared();
        let (mut dispatcher, assembler) = make_dispatcher(provider);

        dispatcher.dispatch_batch(vec![9, 9, 9]).await;

        let snapshot = assembler.snapshot();
        assert_eq!(snapshot.text.as_deref(), Some("full transcript"));
        assert_eq!(snapshot.blob, Some(vec![9, 9, 9]));
        assert!(!*dispatcher.signal().borrow());
    }

    #[tokio::test]
    async fn test_batch_failure_keeps_blob() {
        let provider = MockProvider::new("").with_failure("quota exceeded").shared();
        let (mut dispatcher, assembler) = make_dispatcher(provider);

        dispatcher.dispatch_batch(vec![5, 5]).await;

        let snapshot = assembler.snapshot();
        assert_eq!(snapshot.text, None);
        assert_eq!(snapshot.blob, Some(vec![5, 5]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_chunk_text_advances_without_appending() {
        let provider = MockProvider::new("")
            .with_response("")
            .with_response("only")
            .shared();
        let (mut dispatcher, assembler) = make_dispatcher(provider);

        dispatcher.dispatch_chunk(vec![1]);
        dispatcher.dispatch_chunk(vec![2]);

        wait_idle(&dispatcher).await;
        assert_eq!(assembler.snapshot().text.as_deref(), Some("only"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_lets_pending_completions_drain() {
        let provider = MockProvider::new("tail")
            .with_delay(Duration::from_millis(100))
            .shared();
        let (mut dispatcher, assembler) = make_dispatcher(provider);

        dispatcher.dispatch_chunk(vec![1]);
        let mut signal = dispatcher.signal();
        drop(dispatcher);

        // The writer task outlives the dispatcher and still lands the text.
        let _ = signal.wait_for(|busy| !*busy).await;
        assert_eq!(assembler.snapshot().text.as_deref(), Some("tail"));
    }
}
