//! Captcha-gated bridge acquisition state machine.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::transport::{Challenge, MoatChannel, MoatConnector, SubmitReply, TransportConfig};
use crate::error::{BridgeError, BridgeResult};

const EVENT_CAPACITY: usize = 16;

/// Where a session is in the challenge/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    RequestingChallenge,
    AwaitingSolution,
    Submitting,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::RequestingChallenge => write!(f, "requesting challenge"),
            SessionState::AwaitingSolution => write!(f, "awaiting solution"),
            SessionState::Submitting => write!(f, "submitting"),
        }
    }
}

/// Notifications for whoever renders the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ChallengeReady(Challenge),
    ResultReady(Vec<String>),
    Closed,
}

/// Client for one bridge request against the distribution service.
///
/// The session owns at most one transport channel. Every path that leaves
/// the channel unusable goes through [`Self::release_channel`], so a channel
/// is closed exactly once whether the session succeeds, fails, is closed, or
/// is restarted with a new challenge.
pub struct BridgeAcquisitionSession {
    connector: Arc<dyn MoatConnector>,
    state: SessionState,
    channel: Option<Box<dyn MoatChannel>>,
    challenge: Option<Challenge>,
    captcha_attempts: u64,
    events: broadcast::Sender<SessionEvent>,
}

impl BridgeAcquisitionSession {
    pub fn new(connector: Arc<dyn MoatConnector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connector,
            state: SessionState::Idle,
            channel: None,
            challenge: None,
            captcha_attempts: 0,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The challenge awaiting a solution, if any.
    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    /// Submissions that reached the service for the current challenge.
    pub fn captcha_attempts(&self) -> u64 {
        self.captcha_attempts
    }

    /// Open a channel and fetch a new captcha.
    ///
    /// Allowed from any state: a channel still held from an earlier request
    /// is closed first and its challenge discarded.
    pub async fn request_challenge(&mut self, config: &TransportConfig) -> BridgeResult<Challenge> {
        if self.release_channel().await {
            debug!("Closed previous moat channel before requesting a new challenge");
        }
        self.state = SessionState::RequestingChallenge;

        match self.connector.connect(config).await {
            Ok(channel) => self.channel = Some(channel),
            Err(e) => {
                self.state = SessionState::Idle;
                warn!("Moat transport failed to start: {}", e);
                return Err(BridgeError::TransportInit(e.to_string()));
            }
        }

        let bridge_types = [config.bridge_type.clone()];
        let fetched = match self.channel.as_mut() {
            Some(channel) => channel.fetch_challenge(&bridge_types).await,
            None => return Err(self.lost_channel().await),
        };

        match fetched {
            Ok(challenge) => {
                info!("Received {} captcha challenge", challenge.transport);
                self.challenge = Some(challenge.clone());
                self.captcha_attempts = 0;
                self.state = SessionState::AwaitingSolution;
                let _ = self
                    .events
                    .send(SessionEvent::ChallengeReady(challenge.clone()));
                Ok(challenge)
            }
            Err(e) => {
                self.release_channel().await;
                Err(BridgeError::ChallengeFetch(e.to_string()))
            }
        }
    }

    /// Submit a captcha answer for the current challenge.
    ///
    /// Blank input is ignored and returns `Ok(None)` without touching the
    /// network. A wrong answer keeps the challenge so the caller can try
    /// again; any other failure ends the session.
    pub async fn submit_solution(&mut self, text: &str) -> BridgeResult<Option<Vec<String>>> {
        if self.state != SessionState::AwaitingSolution {
            return Err(BridgeError::InvalidState(format!(
                "cannot submit a solution while {}",
                self.state
            )));
        }
        let solution = text.trim();
        if solution.is_empty() {
            return Ok(None);
        }
        let Some(challenge) = self.challenge.clone() else {
            return Err(self.lost_channel().await);
        };

        self.state = SessionState::Submitting;
        self.captcha_attempts = self.captcha_attempts.saturating_add(1);
        let reply = match self.channel.as_mut() {
            Some(channel) => channel.submit(&challenge, solution).await,
            None => return Err(self.lost_channel().await),
        };

        match reply {
            Ok(SubmitReply::Incorrect) => {
                info!("Captcha solution rejected (attempt {})", self.captcha_attempts);
                self.state = SessionState::AwaitingSolution;
                Err(BridgeError::CaptchaIncorrect)
            }
            Ok(SubmitReply::Bridges(lines)) => {
                self.release_channel().await;
                let lines: Vec<String> = lines
                    .iter()
                    .map(|line| line.trim())
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                if lines.is_empty() {
                    return Err(BridgeError::Submit(
                        "the service returned no bridges".to_string(),
                    ));
                }
                info!("Received {} bridges", lines.len());
                let _ = self.events.send(SessionEvent::ResultReady(lines.clone()));
                Ok(Some(lines))
            }
            Err(e) => {
                self.release_channel().await;
                Err(BridgeError::Submit(e.to_string()))
            }
        }
    }

    /// Release the channel and return to `Idle`. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.release_channel().await {
            info!("Bridge request closed");
            let _ = self.events.send(SessionEvent::Closed);
        }
    }

    /// Close the held channel, if any, and reset to `Idle`.
    ///
    /// Returns whether a channel was closed.
    async fn release_channel(&mut self) -> bool {
        self.challenge = None;
        self.state = SessionState::Idle;
        match self.channel.take() {
            Some(mut channel) => {
                channel.close().await;
                true
            }
            None => false,
        }
    }

    async fn lost_channel(&mut self) -> BridgeError {
        self.release_channel().await;
        BridgeError::InvalidState("no open channel".to_string())
    }
}
