use super::{DataPacket, OutputBuffer, PacketMetadata, SessionError, SessionResult, SynthRequest};
use crate::event_bus::{EventBus, PackEvent};
use crate::language::{best_match, ModuleLanguage};
use std::collections::VecDeque;
use std::sync::Arc;

/// Produces the packets of one synthesis run.
///
/// Each step of the returned run yields one packet; the session pulls steps
/// from its `tick`, so a host loop decides how much work happens per frame.
pub trait Synthesizer {
    /// Sample type of the produced packets.
    type Sample;
    /// Lazy sequence of packets for one request.
    type Run: Iterator<Item = SessionResult<DataPacket<Self::Sample>>>;

    fn start(&mut self, request: &SynthRequest) -> SessionResult<Self::Run>;

    /// Releases whatever the synthesizer holds (e.g. runtime bindings).
    fn release(&mut self) {}
}

/// Admission state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// One run is in flight.
    Running,
}

/// Outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Became the in-flight run.
    Started,
    /// Waiting in a queue; `position` counts from 0 at the queue head.
    Queued { position: usize },
}

/// Session defaults applied to every run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub buffer_secs: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            buffer_secs: 0.5,
        }
    }
}

/// Counters over a session's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub warmups_completed: u64,
    pub flushes: u64,
    pub packets_delivered: u64,
    pub samples_delivered: u64,
}

type PacketCallback<T> = Arc<dyn Fn(&[DataPacket<T>]) + Send + Sync>;

struct ActiveRun<R, T> {
    session_id: String,
    warmup: bool,
    run: R,
    buffer: OutputBuffer<T>,
    last_metadata: Option<PacketMetadata>,
}

/// Single-flight synthesis session with a primary and a warmup queue.
///
/// # Example
///
/// ```ignore
/// let mut session = SynthesisSession::new(synthesizer, SessionConfig::default(), events);
/// session.on_packets(|packets| play(packets));
/// session.submit(SynthRequest::new("Hello there."))?;
/// while session.state() == SessionState::Running {
///     session.tick()?;
/// }
/// ```
pub struct SynthesisSession<S: Synthesizer> {
    synthesizer: S,
    config: SessionConfig,
    events: EventBus,
    queue: VecDeque<SynthRequest>,
    warmup_queue: VecDeque<SynthRequest>,
    current: Option<ActiveRun<S::Run, S::Sample>>,
    output: VecDeque<DataPacket<S::Sample>>,
    on_packets: Option<PacketCallback<S::Sample>>,
    languages: Vec<ModuleLanguage>,
    stats: SessionStats,
}

impl<S: Synthesizer> SynthesisSession<S> {
    pub fn new(synthesizer: S, config: SessionConfig, events: EventBus) -> Self {
        Self {
            synthesizer,
            config,
            events,
            queue: VecDeque::new(),
            warmup_queue: VecDeque::new(),
            current: None,
            output: VecDeque::new(),
            on_packets: None,
            languages: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    /// Languages that request overrides are resolved against, typically
    /// [`LoadedActor::languages`](crate::context::LoadedActor::languages).
    pub fn with_languages(mut self, languages: Vec<ModuleLanguage>) -> Self {
        self.languages = languages;
        self
    }

    pub fn languages(&self) -> &[ModuleLanguage] {
        &self.languages
    }

    /// Delivers flushed packets to `callback` instead of the output queue.
    pub fn on_packets<F>(&mut self, callback: F)
    where
        F: Fn(&[DataPacket<S::Sample>]) + Send + Sync + 'static,
    {
        self.on_packets = Some(Arc::new(callback));
    }

    pub fn state(&self) -> SessionState {
        if self.current.is_some() {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn synthesizer(&self) -> &S {
        &self.synthesizer
    }

    /// Session id of the in-flight run.
    pub fn in_flight(&self) -> Option<&str> {
        self.current.as_ref().map(|run| run.session_id.as_str())
    }

    /// Metadata of the last packet the in-flight run produced.
    pub fn in_flight_metadata(&self) -> Option<&PacketMetadata> {
        self.current.as_ref()?.last_metadata.as_ref()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn warmup_len(&self) -> usize {
        self.warmup_queue.len()
    }

    /// Starts `request` when idle, otherwise queues it.
    pub fn submit(&mut self, request: SynthRequest) -> SessionResult<Admission> {
        self.validate(&request)?;
        if self.current.is_some() {
            self.queue.push_back(request);
            log::debug!("Queued request ({} waiting)", self.queue.len());
            return Ok(Admission::Queued {
                position: self.queue.len() - 1,
            });
        }
        self.start(request, false)?;
        Ok(Admission::Started)
    }

    /// Queues a low-priority warmup run. Starts it right away only when the
    /// session is idle and nothing else waits.
    pub fn submit_warmup(&mut self, request: SynthRequest) -> SessionResult<Admission> {
        self.validate(&request)?;
        if self.current.is_some() || !self.queue.is_empty() {
            self.warmup_queue.push_back(request);
            return Ok(Admission::Queued {
                position: self.warmup_queue.len() - 1,
            });
        }
        self.start(request, true)?;
        Ok(Admission::Started)
    }

    /// Takes packets flushed since the last call. Empty when a callback is set.
    pub fn take_output(&mut self) -> Vec<DataPacket<S::Sample>> {
        self.output.drain(..).collect()
    }

    /// Advances the in-flight run by one packet.
    ///
    /// Returns the state after the step. A failed run is dropped, the next
    /// queued request starts, and the error is returned.
    pub fn tick(&mut self) -> SessionResult<SessionState> {
        let Some(active) = self.current.as_mut() else {
            return Ok(SessionState::Idle);
        };

        match active.run.next() {
            Some(Ok(packet)) => {
                let is_final = packet.is_final;
                active.last_metadata = Some(packet.metadata.clone());
                if let Some(batch) = active.buffer.push(packet) {
                    let warmup = active.warmup;
                    self.deliver(batch, warmup);
                }
                if is_final {
                    self.complete();
                }
            }
            Some(Err(err)) => {
                let session_id = active.session_id.clone();
                log::error!("Synthesis run {} failed: {}", session_id, err);
                self.stats.runs_failed += 1;
                self.current = None;
                self.start_next();
                return Err(err);
            }
            None => {
                log::warn!(
                    "Synthesis run {} ended without a final packet",
                    active.session_id
                );
                let batch = active.buffer.flush();
                let warmup = active.warmup;
                if !batch.is_empty() {
                    self.deliver(batch, warmup);
                }
                self.complete();
            }
        }
        Ok(self.state())
    }

    /// Ticks until every queued request has run.
    pub fn run_until_idle(&mut self) -> SessionResult<()> {
        while self.tick()? == SessionState::Running {}
        Ok(())
    }

    /// Drops the in-flight run and every queued request, then releases the
    /// synthesizer's resources.
    pub fn dispose(mut self) {
        let discarded = self.queue.len() + self.warmup_queue.len();
        if let Some(active) = self.current.take() {
            log::info!("Disposing session with run {} in flight", active.session_id);
        }
        if discarded > 0 {
            log::info!("Discarding {} queued requests", discarded);
        }
        self.queue.clear();
        self.warmup_queue.clear();
        self.synthesizer.release();
    }

    fn validate(&self, request: &SynthRequest) -> SessionResult<()> {
        let Some(config_override) = request.config_override.as_ref() else {
            return Ok(());
        };
        if let Some(secs) = config_override.buffer_secs {
            if !secs.is_finite() || secs < 0.0 {
                return Err(SessionError::InvalidRequest(format!(
                    "buffer_secs must be a non-negative number, got {}",
                    secs
                )));
            }
        }
        if config_override.language.is_some() && self.languages.is_empty() {
            return Err(SessionError::InvalidRequest(
                "language override given but the session has no languages".to_string(),
            ));
        }
        Ok(())
    }

    /// Best session language for the request's language override.
    fn resolve_language(&self, request: &SynthRequest) -> SessionResult<Option<ModuleLanguage>> {
        let Some(config_override) = request.config_override.as_ref() else {
            return Ok(None);
        };
        let Some(language) = config_override.language.as_deref() else {
            return Ok(None);
        };
        let resolved = best_match(&self.languages, language, config_override.dialect.as_deref())
            .map_err(|err| SessionError::InvalidRequest(err.to_string()))?;
        log::debug!(
            "Request {} resolved language '{}' to {}",
            request.session_id,
            language,
            resolved
        );
        Ok(Some(resolved.clone()))
    }

    fn start(&mut self, mut request: SynthRequest, warmup: bool) -> SessionResult<()> {
        request.language = self.resolve_language(&request)?;
        let buffer_secs = request
            .config_override
            .as_ref()
            .and_then(|o| o.buffer_secs)
            .unwrap_or(self.config.buffer_secs);

        let run = self.synthesizer.start(&request).map_err(|err| {
            self.stats.runs_failed += 1;
            err
        })?;

        log::info!(
            "Starting {} run {}",
            if warmup { "warmup" } else { "synthesis" },
            request.session_id
        );
        self.stats.runs_started += 1;
        self.events.publish(PackEvent::RunStarted {
            session_id: request.session_id.clone(),
            warmup,
        });
        self.current = Some(ActiveRun {
            session_id: request.session_id,
            warmup,
            run,
            buffer: OutputBuffer::new(self.config.sample_rate, buffer_secs),
            last_metadata: None,
        });
        Ok(())
    }

    fn start_next(&mut self) {
        while self.current.is_none() {
            let (request, warmup) = match self.queue.pop_front() {
                Some(request) => (request, false),
                None => match self.warmup_queue.pop_front() {
                    Some(request) => (request, true),
                    None => return,
                },
            };
            if let Err(err) = self.start(request, warmup) {
                log::error!("Failed to start queued run: {}", err);
            }
        }
    }

    fn complete(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };
        let metadata = active
            .last_metadata
            .unwrap_or_else(|| PacketMetadata::new(active.session_id.clone()));

        log::info!("Run {} completed", active.session_id);
        self.stats.runs_completed += 1;
        if active.warmup {
            self.stats.warmups_completed += 1;
        }
        self.events.publish(PackEvent::RunCompleted {
            metadata,
            warmup: active.warmup,
        });
        self.start_next();
    }

    fn deliver(&mut self, batch: Vec<DataPacket<S::Sample>>, warmup: bool) {
        self.stats.flushes += 1;
        if warmup {
            log::debug!("Dropping {} warmup packets", batch.len());
            return;
        }
        self.stats.packets_delivered += batch.len() as u64;
        self.stats.samples_delivered += batch.iter().map(|p| p.len() as u64).sum::<u64>();

        match &self.on_packets {
            Some(callback) => callback(&batch),
            None => self.output.extend(batch),
        }
    }
}

impl<S: Synthesizer> std::fmt::Debug for SynthesisSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisSession")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queue.len())
            .field("warmup_queued", &self.warmup_queue.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::RequestOverride;
    use crate::testing::mocks::ScriptedSynthesizer;
    use std::sync::Mutex;

    fn session(chunks: Vec<usize>) -> SynthesisSession<ScriptedSynthesizer> {
        let config = SessionConfig {
            sample_rate: 44100,
            buffer_secs: 0.5,
        };
        SynthesisSession::new(ScriptedSynthesizer::new(chunks), config, EventBus::new())
    }

    #[test]
    fn test_single_flight_fifo() {
        let mut session = session(vec![10, 10]);
        let r1 = SynthRequest::new("one").with_session_id("r1");
        let r2 = SynthRequest::new("two").with_session_id("r2");
        let r3 = SynthRequest::new("three").with_session_id("r3");

        assert_eq!(session.submit(r1).unwrap(), Admission::Started);
        assert_eq!(session.submit(r2).unwrap(), Admission::Queued { position: 0 });
        assert_eq!(session.submit(r3).unwrap(), Admission::Queued { position: 1 });

        let mut order = vec![];
        while session.state() == SessionState::Running {
            let id = session.in_flight().unwrap().to_string();
            if order.last() != Some(&id) {
                order.push(id);
            }
            session.tick().unwrap();
        }
        assert_eq!(order, vec!["r1", "r2", "r3"]);
        assert_eq!(session.synthesizer().started(), vec!["r1", "r2", "r3"]);
        assert_eq!(session.stats().runs_completed, 3);
    }

    #[test]
    fn test_warmup_runs_after_primary_and_is_not_delivered() {
        let mut session = session(vec![5]);
        session.submit(SynthRequest::new("a").with_session_id("a")).unwrap();
        session
            .submit_warmup(SynthRequest::new("w").with_session_id("w"))
            .unwrap();
        session.submit(SynthRequest::new("b").with_session_id("b")).unwrap();
        assert_eq!(session.warmup_len(), 1);

        session.run_until_idle().unwrap();
        assert_eq!(session.synthesizer().started(), vec!["a", "b", "w"]);

        let delivered = session.take_output();
        assert!(delivered.iter().all(|p| p.metadata.session_id != "w"));
        assert_eq!(session.stats().warmups_completed, 1);
    }

    #[test]
    fn test_negative_buffer_override_is_rejected() {
        let mut session = session(vec![5]);
        let bad = RequestOverride {
            buffer_secs: Some(-1.0),
            ..Default::default()
        };
        let result = session.submit(SynthRequest::new("x").with_override(bad));
        assert!(matches!(result, Err(SessionError::InvalidRequest(_))));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_language_override_is_resolved_on_start() {
        let en = ModuleLanguage::new("en").with_iso639_3("eng");
        let en_gb = en.clone().with_iso3166_1("GB");
        let mut session = session(vec![5]).with_languages(vec![en.clone(), en_gb.clone()]);

        let british = RequestOverride {
            language: Some("eng".to_string()),
            dialect: Some("GB".to_string()),
            ..Default::default()
        };
        session.submit(SynthRequest::new("a").with_override(british)).unwrap();
        session.submit(SynthRequest::new("b")).unwrap();
        session.run_until_idle().unwrap();

        assert_eq!(session.synthesizer().languages(), vec![Some(en_gb), None]);
    }

    #[test]
    fn test_language_override_needs_session_languages() {
        let mut session = session(vec![5]);
        let french = RequestOverride {
            language: Some("fr".to_string()),
            ..Default::default()
        };
        let result = session.submit(SynthRequest::new("x").with_override(french));
        assert!(matches!(result, Err(SessionError::InvalidRequest(_))));
    }

    #[test]
    fn test_idle_warmup_starts_immediately() {
        let mut session = session(vec![5]);
        let admission = session.submit_warmup(SynthRequest::new("w")).unwrap();
        assert_eq!(admission, Admission::Started);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_callback_receives_batches_in_order() {
        let mut session = session(vec![20000, 2000, 51, 7]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.on_packets(move |batch| {
            sink.lock()
                .unwrap()
                .push(batch.iter().map(|p| p.len()).collect::<Vec<_>>());
        });

        session.submit(SynthRequest::new("x")).unwrap();
        session.run_until_idle().unwrap();

        // 20000 + 2000 + 51 > 22050 flushes; the final packet flushes the rest
        assert_eq!(*seen.lock().unwrap(), vec![vec![20000, 2000, 51], vec![7]]);
        assert!(session.take_output().is_empty());
    }

    #[test]
    fn test_completion_event_carries_metadata() {
        let events = EventBus::new();
        let subscription = events.subscribe();
        let mut session = SynthesisSession::new(
            ScriptedSynthesizer::new(vec![3]),
            SessionConfig::default(),
            events,
        );
        session.submit(SynthRequest::new("x").with_session_id("s1")).unwrap();
        session.run_until_idle().unwrap();

        let completed: Vec<_> = subscription
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                PackEvent::RunCompleted { metadata, warmup } => Some((metadata, warmup)),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].0.session_id, "s1");
        assert!(!completed[0].1);
    }

    #[test]
    fn test_failed_run_moves_to_next_request() {
        let mut session = session(vec![5, 5]);
        session.synthesizer.fail_on("bad");
        session.submit(SynthRequest::new("bad").with_session_id("r1")).unwrap();
        session.submit(SynthRequest::new("ok").with_session_id("r2")).unwrap();

        assert!(matches!(session.tick(), Err(SessionError::Synthesis { .. })));
        assert_eq!(session.in_flight(), Some("r2"));
        session.run_until_idle().unwrap();
        assert_eq!(session.stats().runs_failed, 1);
        assert_eq!(session.stats().runs_completed, 1);
    }

    #[test]
    fn test_dispose_discards_queue_and_releases() {
        let mut session = session(vec![5]);
        session.submit(SynthRequest::new("a")).unwrap();
        session.submit(SynthRequest::new("b")).unwrap();
        let released = session.synthesizer().release_flag();
        session.dispose();
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }
}
