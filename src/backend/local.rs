//! Local-synthesis strategy: every sentence goes straight to the device voice.

use std::sync::Arc;

use tracing::debug;

use super::{EventSink, RequestId, SpeakRequest, SpeechBackend, Synthesizer, Utterance};

pub struct LocalSpeech {
    synth: Arc<dyn Synthesizer>,
    sink: EventSink,
    current: Option<RequestId>,
}

impl LocalSpeech {
    pub fn new(synth: Arc<dyn Synthesizer>, sink: EventSink) -> Self {
        Self { synth, sink, current: None }
    }
}

impl SpeechBackend for LocalSpeech {
    fn speak(&mut self, request: SpeakRequest) {
        debug!(id = ?request.id, index = request.index, "local speak");
        self.current = Some(request.id);
        self.synth.speak(Utterance::from(&request), self.sink.completion(request.id));
    }

    fn pause_current(&mut self) {
        if self.current.is_some() {
            self.synth.pause();
        }
    }

    fn resume_current(&mut self) {
        if self.current.is_some() {
            self.synth.resume();
        }
    }

    fn cancel_current(&mut self) {
        if let Some(id) = self.current.take() {
            debug!(?id, "local cancel");
            self.synth.stop();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
