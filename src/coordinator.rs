//! Owns everything and drives the scheduler from one thread.

use std::{
    ops::ControlFlow,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use chrono::NaiveDateTime;
use log::{debug, error, info, trace, warn};

use crate::{
    alarm::AlarmId,
    arbiter::Arbiter,
    clock::{next_midnight, until_next_midnight, Clock, TimeSample},
    communication::{Alert, CoordinatorHandle, Message},
    config::{Config, Persistence},
    library::SoundLibrary,
    matcher::due_alarms,
    notify::Notifier,
    sound::{AudioBackend, SoundEngine},
};

pub struct Coordinator<B, C> {
    config: Config,
    persistence: Box<dyn Persistence>,
    arbiter: Arbiter<B>,
    clock: C,
    /// keeps the channel open until the first [`Coordinator::remote`] call
    unclaimed: Option<CoordinatorHandle>,
    remote: Weak<Sender<Message>>,
    receiver: Receiver<Message>,
    subscriber: Option<Sender<Alert>>,
    next_reset: NaiveDateTime,
}

impl<B, C> std::fmt::Debug for Coordinator<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("arbiter", &self.arbiter)
            .field("next_reset", &self.next_reset)
            .finish_non_exhaustive()
    }
}

impl<B: AudioBackend, C: Clock> Coordinator<B, C> {
    pub fn new(
        config: Config,
        persistence: Box<dyn Persistence>,
        backend: B,
        library: SoundLibrary,
        notifier: Box<dyn Notifier>,
        clock: C,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let unclaimed = CoordinatorHandle::new(sender);
        let remote = unclaimed.downgrade();
        let completions = remote.clone();
        let engine = SoundEngine::new(
            backend,
            library,
            Arc::new(move |handle| {
                // nobody is listening once every remote is gone
                if let Some(sender) = completions.upgrade() {
                    let _ = sender.send(Message::PlaybackFinished(handle));
                }
            }),
        );
        let next_reset = next_midnight(clock.now());
        Self {
            config,
            persistence,
            arbiter: Arbiter::new(engine, notifier),
            clock,
            unclaimed: Some(unclaimed),
            remote,
            receiver,
            subscriber: None,
            next_reset,
        }
    }

    /// A handle other threads can send commands through.
    ///
    /// [`run`](Self::run) returns once every handle is dropped. After that
    /// the returned handle is disconnected.
    pub fn remote(&mut self) -> CoordinatorHandle {
        self.unclaimed
            .take()
            .or_else(|| CoordinatorHandle::upgrade(&self.remote))
            .unwrap_or_else(|| {
                debug!("every remote was dropped before, this one goes nowhere");
                CoordinatorHandle::new(mpsc::channel().0)
            })
    }

    /// Alerts are sent to the returned receiver from now on, replacing any earlier one.
    pub fn subscribe(&mut self) -> Receiver<Alert> {
        let (sender, receiver) = mpsc::channel();
        self.subscriber = Some(sender);
        receiver
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn arbiter(&self) -> &Arbiter<B> {
        &self.arbiter
    }

    /// Forgets what rang before the scheduler started and arms the midnight reset.
    pub fn start(&mut self) {
        self.config.alarms.reset_played();
        let now = self.clock.now();
        self.next_reset = next_midnight(now);
        info!(
            "scheduler started at {now} with {} alarms, next reset at {}",
            self.config.alarms.len(),
            self.next_reset
        );
    }

    /// Samples the clock once and lets every due alarm compete for the slot.
    pub fn tick(&mut self) {
        self.sync();
        self.poll_daily_reset();
        let sample = TimeSample::from(self.clock.now());
        trace!("tick {} {:?}", sample.minute, sample.weekday);
        for alarm in due_alarms(sample, &self.config.alarms, self.config.all_enabled) {
            debug!("{} is due", alarm.id);
            self.arbiter.offer(alarm, &mut self.config.alarms);
        }
        self.publish();
    }

    /// Clears every played flag once the clock passes midnight. Returns `true` if it did.
    pub fn poll_daily_reset(&mut self) -> bool {
        let now = self.clock.now();
        if now < self.next_reset {
            return false;
        }
        self.config.alarms.reset_played();
        self.next_reset = next_midnight(now);
        info!("new day, played flags reset until {}", self.next_reset);
        self.emit(Alert::PlayedReset);
        true
    }

    /// Applies one command. Breaks when the scheduler should stop.
    pub fn handle(&mut self, message: Message) -> ControlFlow<()> {
        self.sync();
        let alarms = &mut self.config.alarms;
        match message {
            Message::PlaybackFinished(handle) => self.arbiter.playback_finished(handle, alarms),
            Message::Dismiss => {
                if !self.arbiter.dismiss(alarms) {
                    debug!("nothing to dismiss");
                }
            }
            Message::Snooze => {
                if self.arbiter.snooze(self.config.snooze_minutes, alarms).is_some() {
                    self.persist();
                }
            }
            Message::PlayPendingNow(id) => {
                if let Err(e) = self.arbiter.play_pending_now(id, alarms) {
                    warn!("{e}");
                }
            }
            Message::UpsertAlarm(alarm) => {
                for conflict in alarms.conflicts(alarm.time, alarm.weekdays, Some(alarm.id)) {
                    warn!("{} overlaps {} at {conflict}", alarm.id, conflict.id);
                }
                let id = alarm.id;
                if alarms.upsert(alarm) {
                    info!("updated alarm {id}");
                } else {
                    info!("added alarm {id}");
                }
                self.persist();
            }
            Message::RemoveAlarm(id) => {
                if alarms.remove(id).is_some() {
                    self.arbiter.forget(id, alarms);
                    info!("removed alarm {id}");
                    self.persist();
                } else {
                    warn!("no alarm {id} to remove");
                }
            }
            Message::SetAllEnabled(enabled) => {
                self.config.all_enabled = enabled;
                info!("all alarms {}", if enabled { "enabled" } else { "disabled" });
                self.persist();
            }
            Message::Preview { sound, volume } => {
                if let Err(e) = self.arbiter.preview(&sound, volume) {
                    warn!("couldn't preview {sound}: {e}");
                    self.emit(Alert::PlaybackFailed {
                        id: None,
                        message: e.to_string(),
                    });
                }
            }
            Message::Status(reply) => {
                // the asker may have given up waiting
                let _ = reply.send(self.arbiter.status(self.config.all_enabled));
            }
            Message::Shutdown => return ControlFlow::Break(()),
        }
        self.publish();
        ControlFlow::Continue(())
    }

    /// Runs until a [`Message::Shutdown`] arrives or every remote is dropped.
    pub fn run(&mut self) {
        self.start();
        let interval = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let mut next_tick = Instant::now();
        loop {
            if Instant::now() >= next_tick {
                self.tick();
                next_tick = Instant::now() + interval;
            }
            let timeout = next_tick
                .saturating_duration_since(Instant::now())
                .min(until_next_midnight(self.clock.now()));
            match self.receiver.recv_timeout(timeout) {
                Ok(message) => {
                    if self.handle(message).is_break() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.poll_daily_reset();
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shutdown();
    }

    /// Silences everything. Nothing is saved, every change already was.
    pub fn shutdown(&mut self) {
        self.arbiter.shutdown();
        self.publish();
        info!("scheduler stopped");
    }

    /// Picks up a config that was saved by someone else, the CLI usually.
    fn sync(&mut self) {
        match self.persistence.changes() {
            Ok(Some(saved)) => self.merge(saved),
            Ok(None) => {}
            Err(e) => warn!("couldn't reload the config: {e}"),
        }
    }

    /// Takes alarms and settings from `saved` while keeping what only the
    /// scheduler knows, which alarms already rang and what is playing.
    fn merge(&mut self, mut saved: Config) {
        let incoming = std::mem::take(&mut saved.alarms);
        let active = self.arbiter.slot().active.as_ref().map(|alarm| alarm.id);
        let mut gone: Vec<AlarmId> = self
            .config
            .alarms
            .iter()
            .map(|alarm| alarm.id)
            .filter(|id| incoming.get(*id).is_none())
            .collect();
        for id in &gone {
            self.config.alarms.remove(*id);
        }
        // the active alarm goes last so the queue never promotes a deleted alarm
        gone.sort_by_key(|id| Some(*id) == active);
        for id in gone {
            self.arbiter.forget(id, &mut self.config.alarms);
            info!("alarm {id} was deleted");
        }
        for alarm in Vec::from(incoming) {
            self.config.alarms.upsert(alarm);
        }
        saved.alarms = std::mem::take(&mut self.config.alarms);
        self.config = saved;
        info!(
            "reloaded the config, {} alarms, all {}",
            self.config.alarms.len(),
            if self.config.all_enabled { "enabled" } else { "disabled" }
        );
    }

    fn persist(&mut self) {
        if let Err(e) = self.persistence.save(&self.config) {
            error!("couldn't save alarms: {e}");
        }
    }

    fn publish(&mut self) {
        for alert in self.arbiter.drain_alerts() {
            self.emit(alert);
        }
    }

    fn emit(&mut self, alert: Alert) {
        debug!("{alert:?}");
        if let Some(subscriber) = &self.subscriber {
            if subscriber.send(alert).is_err() {
                debug!("alert subscriber went away");
                self.subscriber = None;
            }
        }
    }
}
