//! Cloud synthesizer backend (Amazon Polly)
//!
//! Requests are checked against the provider's per-request character limit
//! on the caller's thread, then handed to a worker that performs the HTTPS
//! call and plays the returned audio. A request cancelled while its HTTP
//! call is in flight is discarded when the call returns, so no audio is
//! heard after a cancel.

use super::sigv4::{self, SigningParams};
use crate::speech::playback::{AudioOutput, RodioOutput};
use crate::speech::{Backend, BackendKind, SpeechRequest, SpeechTicket};
use crate::state::CloudSettings;
use crate::voice::Gender;
use crate::BackendError;
use chrono::Utc;
use log::{debug, warn};
use serde::Serialize;
use std::io::Read;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

const SERVICE: &str = "polly";
const SPEECH_PATH: &str = "/v1/speech";
const OUTPUT_FORMAT: &str = "mp3";

/// Provider-ready synthesis request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloudRequest {
    pub engine: String,
    pub output_format: String,
    pub sample_rate: String,
    pub text: String,
    pub text_type: String,
    pub voice_id: String,
}

/// Performs the network call for one request
pub trait SpeechClient: Send {
    fn synthesize(&self, request: &CloudRequest) -> Result<Vec<u8>, BackendError>;
}

/// Escape text for inclusion in an SSML document
fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Wrap `text` in SSML carrying the playback rate
fn build_ssml(text: &str, playback_rate: u32) -> String {
    format!(
        "<speak><prosody rate=\"{}%\">{}</prosody></speak>",
        playback_rate,
        escape_xml(text)
    )
}

/// Amazon Polly `SynthesizeSpeech` over HTTPS
pub struct PollyClient {
    agent: ureq::Agent,
    region: String,
    access_key_id: String,
    secret_access_key: String,
}

impl PollyClient {
    /// Build a client from settings, falling back to the standard AWS
    /// environment variables for credentials
    pub fn new(settings: &CloudSettings) -> Result<Self, BackendError> {
        let access_key_id = non_empty(&settings.access_key_id)
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .ok_or_else(|| BackendError::Unavailable("no AWS access key configured".to_string()))?;
        let secret_access_key = non_empty(&settings.secret_access_key)
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .ok_or_else(|| BackendError::Unavailable("no AWS secret key configured".to_string()))?;

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build();

        Ok(Self {
            agent,
            region: settings.region.clone(),
            access_key_id,
            secret_access_key,
        })
    }

    fn host(&self) -> String {
        format!("polly.{}.amazonaws.com", self.region)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}

impl SpeechClient for PollyClient {
    fn synthesize(&self, request: &CloudRequest) -> Result<Vec<u8>, BackendError> {
        let body = serde_json::to_string(request)
            .map_err(|e| BackendError::Transport(format!("Failed to encode request: {}", e)))?;
        let host = self.host();

        let signed = sigv4::sign_post(&SigningParams {
            access_key_id: &self.access_key_id,
            secret_access_key: &self.secret_access_key,
            region: &self.region,
            service: SERVICE,
            host: &host,
            path: SPEECH_PATH,
            body: body.as_bytes(),
            time: Utc::now(),
        });

        let url = format!("https://{}{}", host, SPEECH_PATH);
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", sigv4::CONTENT_TYPE)
            .set("X-Amz-Date", &signed.amz_date)
            .set("Authorization", &signed.authorization)
            .send_string(&body)
            .map_err(|e| match e {
                ureq::Error::Status(code, response) => {
                    let detail = response.into_string().unwrap_or_default();
                    BackendError::Transport(format!("HTTP {}: {}", code, detail))
                }
                ureq::Error::Transport(t) => BackendError::Transport(t.to_string()),
            })?;

        let mut audio = Vec::new();
        response.into_reader().read_to_end(&mut audio)?;
        debug!("Received {} bytes of audio", audio.len());
        Ok(audio)
    }
}

struct CloudJob {
    request: CloudRequest,
    ticket: SpeechTicket,
}

/// Cloud synthesizer backend
pub struct CloudSynthesizer {
    settings: CloudSettings,
    jobs: Option<Sender<CloudJob>>,
}

impl CloudSynthesizer {
    /// Create a backend talking to Polly and playing through rodio
    pub fn new(settings: CloudSettings) -> Result<Self, BackendError> {
        let client = PollyClient::new(&settings)?;
        Self::with_parts(settings, Box::new(client), Box::new(RodioOutput))
    }

    /// Create a backend with explicit client and output
    pub fn with_parts(
        settings: CloudSettings,
        client: Box<dyn SpeechClient>,
        output: Box<dyn AudioOutput>,
    ) -> Result<Self, BackendError> {
        let (tx, rx) = mpsc::channel::<CloudJob>();
        let volume = settings.volume;

        thread::Builder::new()
            .name("chatspeak-cloud".to_string())
            .spawn(move || {
                for job in rx {
                    run_job(client.as_ref(), output.as_ref(), volume, job);
                }
                debug!("Cloud synthesizer worker exiting");
            })?;

        Ok(Self {
            settings,
            jobs: Some(tx),
        })
    }

    /// Polly voice id for `gender`, falling back to the ungendered voice
    fn voice_for(&self, gender: Gender) -> &str {
        let gendered = match gender {
            Gender::Male => &self.settings.voice_male,
            Gender::Female => &self.settings.voice_female,
            Gender::None => &self.settings.voice,
        };
        if gendered.is_empty() {
            &self.settings.voice
        } else {
            gendered
        }
    }

    /// Validate and translate a request for the provider
    pub fn build_request(&self, request: &SpeechRequest) -> Result<CloudRequest, BackendError> {
        let len = request.text.chars().count();
        if len > self.settings.char_limit {
            return Err(BackendError::RequestTooLarge {
                len,
                limit: self.settings.char_limit,
            });
        }

        Ok(CloudRequest {
            engine: self.settings.engine.clone(),
            output_format: OUTPUT_FORMAT.to_string(),
            sample_rate: self.settings.sample_rate.to_string(),
            text: build_ssml(&request.text, self.settings.playback_rate),
            text_type: "ssml".to_string(),
            voice_id: self.voice_for(request.gender).to_string(),
        })
    }
}

fn run_job(client: &dyn SpeechClient, output: &dyn AudioOutput, volume: f32, job: CloudJob) {
    let CloudJob { request, ticket } = job;

    if !ticket.is_current() {
        debug!("Skipping cancelled cloud request");
        return;
    }

    let audio = match client.synthesize(&request) {
        Ok(audio) => audio,
        Err(e) => {
            warn!("Cloud synthesis failed: {}", e);
            return;
        }
    };

    if !ticket.is_current() {
        debug!("Discarding audio for cancelled request");
        return;
    }

    if let Err(e) = output.play(audio, volume, &ticket) {
        warn!("{}", e);
    }
}

impl Backend for CloudSynthesizer {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn synthesize(
        &mut self,
        request: SpeechRequest,
        ticket: SpeechTicket,
    ) -> Result<(), BackendError> {
        let request = self.build_request(&request)?;
        match &self.jobs {
            Some(tx) => tx
                .send(CloudJob { request, ticket })
                .map_err(|_| BackendError::Unavailable("cloud worker has exited".to_string())),
            None => Err(BackendError::Unavailable("backend disposed".to_string())),
        }
    }

    fn cancel(&mut self) {
        // Outstanding tickets are already stale; the worker drops queued
        // jobs and the output stops playback on its next check.
        debug!("Cloud backend cancel");
    }

    fn dispose(&mut self) {
        self.jobs = None;
    }
}

impl Drop for CloudSynthesizer {
    fn drop(&mut self) {
        self.dispose();
    }
}
