//! Voice interaction: record, transcribe, answer, synthesize, save.
//!
//! The orchestrator sequences the steps and short-circuits on the first
//! failure; speech synthesis and saving are best-effort because the textual
//! contract is already satisfied once an answer exists. Audio stays opaque
//! bytes end to end.

use std::{path::PathBuf, time::Duration};

use tracing::{error, info, warn};

use crate::{chat::ChatEngine, error::Result};

pub const NO_AUDIO_MESSAGE: &str = "I'm sorry, I couldn't understand the \
     audio. Could you please try again?";

pub const NO_RESPONSE_MESSAGE: &str = "I apologize, but I couldn't generate \
     a response. Please try asking in a different way.";

pub const VOICE_ERROR_MESSAGE: &str = "I'm sorry, an error occurred. Please \
     try again or contact support if the issue persists.";

/// An opaque recorded or synthesized audio clip.
#[derive(Debug, Clone, Default)]
pub struct AudioClip {
    pub data: Vec<u8>,
}

impl AudioClip {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Captures a fixed-duration clip from the configured input source.
pub trait AudioInput: Send + Sync {
    fn record(&self, duration: Duration) -> Result<AudioClip>;
}

/// Voice-to-text provider.
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, clip: &AudioClip) -> Result<String>;
}

/// Text-to-voice provider.
pub trait TextToSpeech: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

#[derive(Debug, Clone)]
pub struct VoiceOptions {
    pub recording_duration: Duration,
    /// Where the synthesized response clip is saved.
    pub output_path: PathBuf,
}

/// Sequences one voice interaction against the chat engine.
pub struct VoiceChat {
    chat: ChatEngine,
    input: Box<dyn AudioInput>,
    speech_to_text: Box<dyn SpeechToText>,
    text_to_speech: Box<dyn TextToSpeech>,
    options: VoiceOptions,
}

impl VoiceChat {
    pub fn new(
        chat: ChatEngine,
        input: Box<dyn AudioInput>,
        speech_to_text: Box<dyn SpeechToText>,
        text_to_speech: Box<dyn TextToSpeech>,
        options: VoiceOptions,
    ) -> Self {
        Self {
            chat,
            input,
            speech_to_text,
            text_to_speech,
            options,
        }
    }

    /// Run one record → transcribe → answer → synthesize → save round.
    ///
    /// Returns the transcript (when one was obtained) and the response text.
    /// Unhandled errors are converted to `(None, <fixed apology>)`.
    pub fn run_voice_chat(&self) -> (Option<String>, String) {
        match self.run_inner() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "voice chat failed");
                (None, VOICE_ERROR_MESSAGE.to_string())
            }
        }
    }

    fn run_inner(&self) -> Result<(Option<String>, String)> {
        info!(
            duration_secs = self.options.recording_duration.as_secs(),
            "recording audio"
        );
        let clip = self.input.record(self.options.recording_duration)?;
        if clip.is_empty() {
            warn!("recording produced no audio");
            return Ok((None, NO_AUDIO_MESSAGE.to_string()));
        }

        let transcript = self.speech_to_text.transcribe(&clip)?;
        if transcript.trim().is_empty() {
            warn!("failed to transcribe audio");
            return Ok((None, NO_AUDIO_MESSAGE.to_string()));
        }
        info!(transcript = %transcript, "transcription complete");

        let response = self.chat.answer(&transcript);
        if response.trim().is_empty() {
            warn!("failed to generate chat response");
            return Ok((Some(transcript), NO_RESPONSE_MESSAGE.to_string()));
        }

        // Speech is best-effort: the textual contract is already met.
        match self.text_to_speech.synthesize(&response) {
            Ok(audio) if !audio.is_empty() => {
                if let Err(e) =
                    std::fs::write(&self.options.output_path, &audio.data)
                {
                    warn!(
                        error = %e,
                        path = %self.options.output_path.display(),
                        "could not save synthesized speech"
                    );
                }
            }
            Ok(_) => warn!("speech synthesis returned no audio"),
            Err(e) => warn!(error = %e, "speech synthesis failed"),
        }

        Ok((Some(transcript), response))
    }
}
