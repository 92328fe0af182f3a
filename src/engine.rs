//! Engine supervisor: the caller-facing handle and the per-session
//! event loop tying transport, decode, buffering, and scheduling
//! together.
//!
//! One session task owns the whole signal path. Frame handling, decode,
//! and scheduling run synchronously inside the loop body; the task
//! suspends only waiting for the next network message or the next
//! scheduler deadline.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::audio::{
    AlsaOutput, AudioOutput, FrameDecoder, GainControl, JitterBuffer, LinearResampler,
    PlaybackScheduler,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::net_link::{NetCommand, NetEvent, NetLink};
use crate::protocol::{self, StreamInfo};
use crate::state_machine::SessionState;

/// Opens the playback device for a session. The default factory opens
/// ALSA; tests inject mocks here.
pub type OutputFactory =
    Arc<dyn Fn(&EngineConfig) -> anyhow::Result<Box<dyn AudioOutput>> + Send + Sync>;

#[derive(Debug)]
enum EngineCommand {
    Stop,
}

struct SessionHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    join: JoinHandle<()>,
}

/// Receive-and-playback engine.
///
/// Volume and mute are engine-level preferences and survive
/// connect/disconnect cycles; everything else lives and dies with a
/// session.
pub struct AudioEngine {
    config: EngineConfig,
    gain: GainControl,
    state_tx: watch::Sender<SessionState>,
    last_error: Arc<Mutex<Option<String>>>,
    session: tokio::sync::Mutex<Option<SessionHandle>>,
    output_factory: OutputFactory,
}

impl AudioEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_output_factory(
            config,
            Arc::new(|cfg: &EngineConfig| {
                let output = AlsaOutput::open(
                    &cfg.playback_device,
                    cfg.playback_sample_rate,
                    cfg.playback_channels,
                    cfg.playback_period_size,
                )?;
                Ok(Box::new(output) as Box<dyn AudioOutput>)
            }),
        )
    }

    /// Build an engine with a custom playback device factory.
    pub fn with_output_factory(config: EngineConfig, output_factory: OutputFactory) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            gain: GainControl::default(),
            state_tx,
            last_error: Arc::new(Mutex::new(None)),
            session: tokio::sync::Mutex::new(None),
            output_factory,
        }
    }

    /// Connect to `address` and start a session.
    ///
    /// A no-op unless the engine is Idle. The playback device is
    /// acquired here; acquisition failure surfaces immediately as an
    /// `Output` error, everything later (connect failures included)
    /// surfaces through the observable state.
    pub async fn start_streaming(&self, address: &str) -> Result<(), EngineError> {
        let mut session = self.session.lock().await;

        // Reap a session that ended on its own (server close or error).
        if session.as_ref().is_some_and(|h| h.join.is_finished()) {
            if let Some(handle) = session.take() {
                let _ = handle.join.await;
            }
        }

        let state = self.state();
        if !state.can_start() {
            log::debug!("start ignored in state '{}'", state);
            return Ok(());
        }

        *self.last_error.lock().unwrap() = None;

        let output = match (self.output_factory)(&self.config) {
            Ok(output) => output,
            Err(e) => {
                let err = EngineError::Output(e.to_string());
                *self.last_error.lock().unwrap() = Some(err.to_string());
                self.state_tx
                    .send_replace(SessionState::Error(err.to_string()));
                return Err(err);
            }
        };

        let (net_tx, net_rx) = mpsc::channel(self.config.event_capacity);
        let (net_cmd_tx, net_cmd_rx) = mpsc::channel(4);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        tokio::spawn(NetLink::new(address.to_string(), net_tx, net_cmd_rx).run());

        self.state_tx.send_replace(SessionState::Connecting);

        let scheduler = PlaybackScheduler::new(
            self.gain.clone(),
            output.sample_rate(),
            self.config.lookahead_ms,
            self.config.gain_ramp_ms,
        );

        let task = SessionTask {
            prebuffer: self.config.prebuffer_ms as f64 / 1000.0,
            state: self.state_tx.clone(),
            last_error: self.last_error.clone(),
            output,
            jitter: JitterBuffer::new(),
            scheduler,
            decoder: None,
            resampler: None,
            net_rx,
            cmd_rx,
            net_cmd: net_cmd_tx,
            underruns: 0,
        };
        let join = tokio::spawn(task.run());
        *session = Some(SessionHandle { cmd_tx, join });
        Ok(())
    }

    /// Stop the active session, if any. Idempotent, and also the
    /// `Error --stop--> Idle` edge.
    pub async fn stop_streaming(&self) {
        let mut session = self.session.lock().await;
        if let Some(handle) = session.take() {
            let _ = handle.cmd_tx.send(EngineCommand::Stop).await;
            let _ = handle.join.await;
        }
        if self.state() != SessionState::Idle {
            self.state_tx.send_replace(SessionState::Idle);
        }
    }

    /// Set playback volume (0-100). Accepted with or without a session.
    pub fn set_volume(&self, volume: u8) {
        self.gain.set_volume(volume);
    }

    /// Set mute state. Accepted with or without a session.
    pub fn set_muted(&self, muted: bool) {
        self.gain.set_muted(muted);
    }

    pub fn volume(&self) -> u8 {
        self.gain.volume()
    }

    pub fn is_muted(&self) -> bool {
        self.gain.is_muted()
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Watch session state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming()
    }

    /// Last fatal session error, cleared on the next start.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }
}

enum EventOutcome {
    Continue,
    /// Prebuffer threshold reached: run the scheduler now.
    StartPlayback,
    /// Server ended the stream after playback began; not an error.
    End,
}

struct SessionTask {
    /// Prebuffer threshold in seconds.
    prebuffer: f64,
    state: watch::Sender<SessionState>,
    last_error: Arc<Mutex<Option<String>>>,
    output: Box<dyn AudioOutput>,
    jitter: JitterBuffer,
    scheduler: PlaybackScheduler,
    decoder: Option<FrameDecoder>,
    resampler: Option<LinearResampler>,
    net_rx: mpsc::Receiver<NetEvent>,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    net_cmd: mpsc::Sender<NetCommand>,
    underruns: u64,
}

impl SessionTask {
    async fn run(mut self) {
        // One reusable timer for scheduler wakeups; armed only while
        // Streaming. Dropping it on return is the cancellation path.
        let timer = tokio::time::sleep(Duration::from_secs(3600));
        tokio::pin!(timer);
        let mut timer_armed = false;

        loop {
            tokio::select! {
                _ = &mut timer, if timer_armed => {
                    timer_armed = false;
                    match self.on_tick() {
                        Ok(Some(delay)) => {
                            timer.as_mut().reset(tokio::time::Instant::now() + delay);
                            timer_armed = true;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            self.fail(err).await;
                            return;
                        }
                    }
                }
                event = self.net_rx.recv() => {
                    // A dropped link without a final event counts as a close.
                    let event = event.unwrap_or(NetEvent::Closed);
                    match self.on_net_event(event) {
                        Ok(EventOutcome::Continue) => {}
                        Ok(EventOutcome::StartPlayback) => {
                            match self.on_tick() {
                                Ok(Some(delay)) => {
                                    timer.as_mut().reset(tokio::time::Instant::now() + delay);
                                    timer_armed = true;
                                }
                                Ok(None) => {}
                                Err(err) => {
                                    self.fail(err).await;
                                    return;
                                }
                            }
                        }
                        Ok(EventOutcome::End) => {
                            self.teardown().await;
                            self.state.send_replace(SessionState::Idle);
                            return;
                        }
                        Err(err) => {
                            self.fail(err).await;
                            return;
                        }
                    }
                }
                _ = self.cmd_rx.recv() => {
                    // Stop command, or the engine handle went away.
                    self.state.send_replace(SessionState::Stopping);
                    self.teardown().await;
                    self.state.send_replace(SessionState::Idle);
                    return;
                }
            }
        }
    }

    fn on_net_event(&mut self, event: NetEvent) -> Result<EventOutcome, EngineError> {
        match event {
            NetEvent::Connected => {
                log::info!("transport connected, waiting for handshake");
                Ok(EventOutcome::Continue)
            }
            NetEvent::Text(text) => self.on_text(&text),
            NetEvent::Binary(data) => self.on_frame(&data),
            NetEvent::Closed => {
                if self.decoder.is_some() {
                    // Unexpected close after playback began is an end of
                    // stream, not a failure.
                    log::info!("stream ended by server");
                    Ok(EventOutcome::End)
                } else {
                    Err(EngineError::Connection(
                        "connection closed before handshake".to_string(),
                    ))
                }
            }
            NetEvent::Failed(reason) => Err(EngineError::Connection(reason)),
        }
    }

    fn on_text(&mut self, text: &str) -> Result<EventOutcome, EngineError> {
        if self.decoder.is_some() {
            if protocol::is_audio_info(text) {
                log::warn!("duplicate audio_info ignored, keeping negotiated parameters");
            } else {
                log::debug!("ignoring text message after handshake: {}", text);
            }
            return Ok(EventOutcome::Continue);
        }

        let info = StreamInfo::parse_handshake(text)?;
        log::info!(
            "handshake: {:?}, {} Hz, {} ch -> device {} Hz, {} ch",
            info.codec,
            info.sample_rate,
            info.channels,
            self.output.sample_rate(),
            self.output.channels(),
        );

        self.decoder = Some(FrameDecoder::new(&info)?);
        self.resampler = Some(LinearResampler::new(
            info.sample_rate,
            self.output.sample_rate(),
            info.channels,
        ));
        self.state.send_replace(SessionState::Buffering);
        Ok(EventOutcome::Continue)
    }

    fn on_frame(&mut self, data: &[u8]) -> Result<EventOutcome, EngineError> {
        let (Some(decoder), Some(resampler)) = (self.decoder.as_mut(), self.resampler.as_mut())
        else {
            return Err(EngineError::Protocol(
                "binary frame before handshake".to_string(),
            ));
        };

        // A single corrupt frame is dropped, never fatal.
        let block = match decoder.decode(data) {
            Ok(block) => block,
            Err(e) => {
                log::warn!("dropping corrupt frame ({} bytes): {}", data.len(), e);
                return Ok(EventOutcome::Continue);
            }
        };
        if block.is_empty() {
            return Ok(EventOutcome::Continue);
        }

        let block = resampler.process(block).into_channels(self.output.channels());
        self.jitter.push(block);

        if *self.state.borrow() == SessionState::Buffering
            && self.jitter.queued_duration() >= self.prebuffer
        {
            log::info!(
                "prebuffer filled ({:.0} ms), starting playback",
                self.jitter.queued_duration() * 1000.0
            );
            self.state.send_replace(SessionState::Streaming);
            return Ok(EventOutcome::StartPlayback);
        }
        Ok(EventOutcome::Continue)
    }

    fn on_tick(&mut self) -> Result<Option<Duration>, EngineError> {
        match self
            .scheduler
            .schedule_pending(&mut self.jitter, self.output.as_mut())
        {
            Ok(Some(delay)) => Ok(Some(delay)),
            Ok(None) => {
                if *self.state.borrow() == SessionState::Streaming {
                    self.underruns += 1;
                    log::warn!("buffer underrun #{}, rebuffering", self.underruns);
                    self.state.send_replace(SessionState::Buffering);
                }
                Ok(None)
            }
            Err(e) => Err(EngineError::Output(e.to_string())),
        }
    }

    /// Close the link and drop buffered audio. The scheduler timer is
    /// gone the moment `run` returns; the device handle drops with the
    /// task, after this runs.
    async fn teardown(&mut self) {
        let _ = self.net_cmd.send(NetCommand::Close).await;
        self.jitter.clear();
        self.scheduler.reset();
    }

    async fn fail(&mut self, err: EngineError) {
        log::error!("session failed: {}", err);
        // Tear down before the Error state is observable.
        self.teardown().await;
        *self.last_error.lock().unwrap() = Some(err.to_string());
        self.state.send_replace(SessionState::Error(err.to_string()));
    }
}
