//! Production voice providers.
//!
//! Audio is handled as opaque bytes: the recorder hands the captured clip to
//! an OpenAI-compatible transcription endpoint, and synthesis returns
//! whatever encoded audio the speech endpoint produced. No codec work
//! happens here.

use std::{path::PathBuf, time::Duration};

use serde_json::json;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    voice::{AudioClip, AudioInput, SpeechToText, TextToSpeech},
};

/// Audio input that reads a pre-captured clip from a file.
///
/// Capture itself is an external concern (any recorder that drops a file
/// works); a missing or empty file is the "silent recording" case, not an
/// error. The fixed recording duration applies to device-backed recorders
/// and is ignored here.
pub struct FileAudioInput {
    path: PathBuf,
}

impl FileAudioInput {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AudioInput for FileAudioInput {
    fn record(&self, duration: Duration) -> Result<AudioClip> {
        debug!(
            path = %self.path.display(),
            duration_secs = duration.as_secs(),
            "reading pre-captured audio clip"
        );
        match std::fs::read(&self.path) {
            Ok(data) => Ok(AudioClip::new(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "no audio clip found");
                Ok(AudioClip::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn audio_endpoint(base_url: &str, operation: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with("/v1") {
        format!("{normalized}/audio/{operation}")
    } else {
        format!("{normalized}/v1/audio/{operation}")
    }
}

/// Voice-to-text over an OpenAI-compatible `/v1/audio/transcriptions`
/// endpoint (multipart upload).
pub struct HttpTranscriber {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl HttpTranscriber {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl SpeechToText for HttpTranscriber {
    fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        let part = reqwest::blocking::multipart::Part::bytes(clip.data.clone())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::provider("speech-to-text", e))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(audio_endpoint(&self.base_url, "transcriptions"))
            .multipart(form)
            .send()
            .map_err(|e| Error::provider("speech-to-text", e))?
            .error_for_status()
            .map_err(|e| Error::provider("speech-to-text", e))?
            .json::<TranscriptionResponse>()
            .map_err(|e| Error::provider("speech-to-text", e))?;

        Ok(response.text)
    }
}

/// Text-to-voice over an OpenAI-compatible `/v1/audio/speech` endpoint.
pub struct HttpSynthesizer {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    voice: String,
}

impl HttpSynthesizer {
    pub fn new(base_url: &str, model: &str, voice: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.to_string(),
            model: model.to_string(),
            voice: voice.to_string(),
        }
    }
}

impl TextToSpeech for HttpSynthesizer {
    fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let response = self
            .client
            .post(audio_endpoint(&self.base_url, "speech"))
            .json(&json!({
                "model": self.model,
                "input": text,
                "voice": self.voice,
            }))
            .send()
            .map_err(|e| Error::provider("text-to-speech", e))?
            .error_for_status()
            .map_err(|e| Error::provider("text-to-speech", e))?;

        let data = response
            .bytes()
            .map_err(|e| Error::provider("text-to-speech", e))?
            .to_vec();
        Ok(AudioClip::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_v1_when_missing() {
        assert_eq!(
            audio_endpoint("http://localhost:8880", "transcriptions"),
            "http://localhost:8880/v1/audio/transcriptions"
        );
    }

    #[test]
    fn endpoint_keeps_existing_v1_suffix() {
        assert_eq!(
            audio_endpoint("http://localhost:8880/v1/", "speech"),
            "http://localhost:8880/v1/audio/speech"
        );
    }

    #[test]
    fn file_input_reads_clip_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.wav");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let clip = FileAudioInput::new(path)
            .record(Duration::from_secs(5))
            .unwrap();
        assert_eq!(clip.data, vec![1, 2, 3]);
    }

    #[test]
    fn file_input_missing_file_is_silent_recording() {
        let tmp = tempfile::tempdir().unwrap();
        let clip = FileAudioInput::new(tmp.path().join("absent.wav"))
            .record(Duration::from_secs(5))
            .unwrap();
        assert!(clip.is_empty());
    }

    #[test]
    fn transcriber_parses_text() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/audio/transcriptions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text":"hello there"}"#)
            .create();

        let transcriber = HttpTranscriber::new(&server.url(), "whisper-1");
        let text = transcriber
            .transcribe(&AudioClip::new(vec![0u8; 16]))
            .unwrap();

        mock.assert();
        assert_eq!(text, "hello there");
    }

    #[test]
    fn transcriber_maps_http_errors_to_provider_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/audio/transcriptions")
            .with_status(500)
            .create();

        let transcriber = HttpTranscriber::new(&server.url(), "whisper-1");
        let err = transcriber
            .transcribe(&AudioClip::new(vec![0u8; 16]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Provider { provider: "speech-to-text", .. }
        ));
    }

    #[test]
    fn synthesizer_returns_audio_bytes() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/v1/audio/speech")
            .with_status(200)
            .with_header("content-type", "audio/wav")
            .with_body([7u8, 8, 9])
            .create();

        let synthesizer =
            HttpSynthesizer::new(&server.url(), "tts-1", "alloy");
        let clip = synthesizer.synthesize("hello").unwrap();
        assert_eq!(clip.data, vec![7, 8, 9]);
    }
}
