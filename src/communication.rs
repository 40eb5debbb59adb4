//! Messages between the scheduler thread and everything else.
//!
//! Commands from the user interface and completions from the audio thread
//! share one channel, so the scheduler sees them in the order they happened.

use std::{
    fmt,
    sync::{
        mpsc::{self, Sender},
        Arc, Weak,
    },
};

use crate::{
    alarm::{Alarm, AlarmId, SoundSpec, Volume},
    notify::Notification,
    sound::PlaybackHandle,
};

#[derive(Debug)]
pub enum Message {
    /// a playback ran out on its own
    PlaybackFinished(PlaybackHandle),
    /// stop the ringing alarm, the next queued one starts
    Dismiss,
    Snooze,
    PlayPendingNow(AlarmId),
    UpsertAlarm(Alarm),
    RemoveAlarm(AlarmId),
    SetAllEnabled(bool),
    Preview { sound: SoundSpec, volume: Volume },
    Status(Sender<Status>),
    Shutdown,
}

/// What the user interface is told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    Ringing { alarm: Alarm, interrupting: bool },
    Queued(Alarm),
    Stopped(AlarmId),
    Finished(AlarmId),
    Snoozed(Alarm),
    PlaybackFailed { id: Option<AlarmId>, message: String },
    PlayedReset,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ringing { alarm, interrupting } => {
                let notification = Notification::for_alarm(alarm, *interrupting);
                write!(f, "{notification}")
            }
            Self::Queued(alarm) => write!(f, "{} waits for the current alarm", alarm.describe()),
            Self::Stopped(id) => write!(f, "alarm {id} stopped"),
            Self::Finished(id) => write!(f, "alarm {id} finished"),
            Self::Snoozed(alarm) => write!(f, "{} snoozed until {}", alarm.display_name(), alarm.time),
            Self::PlaybackFailed { id: Some(id), message } => {
                write!(f, "alarm {id} couldn't play: {message}")
            }
            Self::PlaybackFailed { id: None, message } => write!(f, "couldn't play: {message}"),
            Self::PlayedReset => f.write_str("new day, every alarm may ring again"),
        }
    }
}

/// Snapshot of the playback slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub active: Option<Alarm>,
    pub pending: Vec<Alarm>,
    pub all_enabled: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("the scheduler is no longer running")]
pub struct Disconnected;

/// Cloneable sending side of a running [`Coordinator`](crate::coordinator::Coordinator).
///
/// Every clone shares one sender. Once the last clone is dropped the
/// channel disconnects and the scheduler stops.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    sender: Arc<Sender<Message>>,
}

impl CoordinatorHandle {
    #[must_use]
    pub fn new(sender: Sender<Message>) -> Self {
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A reference to the shared sender that doesn't keep the channel open.
    pub(crate) fn downgrade(&self) -> Weak<Sender<Message>> {
        Arc::downgrade(&self.sender)
    }

    pub(crate) fn upgrade(sender: &Weak<Sender<Message>>) -> Option<Self> {
        sender.upgrade().map(|sender| Self { sender })
    }

    pub fn send(&self, message: Message) -> Result<(), Disconnected> {
        self.sender.send(message).map_err(|_| Disconnected)
    }

    pub fn dismiss(&self) -> Result<(), Disconnected> {
        self.send(Message::Dismiss)
    }

    pub fn snooze(&self) -> Result<(), Disconnected> {
        self.send(Message::Snooze)
    }

    pub fn play_pending_now(&self, id: AlarmId) -> Result<(), Disconnected> {
        self.send(Message::PlayPendingNow(id))
    }

    pub fn upsert_alarm(&self, alarm: Alarm) -> Result<(), Disconnected> {
        self.send(Message::UpsertAlarm(alarm))
    }

    pub fn remove_alarm(&self, id: AlarmId) -> Result<(), Disconnected> {
        self.send(Message::RemoveAlarm(id))
    }

    pub fn set_all_enabled(&self, enabled: bool) -> Result<(), Disconnected> {
        self.send(Message::SetAllEnabled(enabled))
    }

    pub fn preview(&self, sound: SoundSpec, volume: Volume) -> Result<(), Disconnected> {
        self.send(Message::Preview { sound, volume })
    }

    /// Blocks until the scheduler answers.
    pub fn status(&self) -> Result<Status, Disconnected> {
        let (reply, answer) = mpsc::channel();
        self.send(Message::Status(reply))?;
        answer.recv().map_err(|_| Disconnected)
    }

    pub fn shutdown(&self) -> Result<(), Disconnected> {
        self.send(Message::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::alarm::AlarmBuilder;

    #[test]
    fn status_round_trip_through_the_channel() {
        let (sender, receiver) = mpsc::channel();
        let remote = CoordinatorHandle::new(sender);
        let answer = thread::spawn(move || remote.status().unwrap());
        match receiver.recv().unwrap() {
            Message::Status(reply) => reply
                .send(Status {
                    all_enabled: true,
                    ..Status::default()
                })
                .unwrap(),
            other => panic!("unexpected {other:?}"),
        }
        assert!(answer.join().unwrap().all_enabled);
    }

    #[test]
    fn dropping_every_clone_closes_the_channel() {
        let (sender, receiver) = mpsc::channel();
        let remote = CoordinatorHandle::new(sender);
        let weak = remote.downgrade();
        let clone = remote.clone();
        drop(remote);
        assert!(CoordinatorHandle::upgrade(&weak).is_some());
        drop(clone);
        assert!(CoordinatorHandle::upgrade(&weak).is_none());
        assert!(receiver.recv().is_err());
    }

    #[test]
    fn sending_after_the_scheduler_stopped_fails() {
        let (sender, receiver) = mpsc::channel();
        drop(receiver);
        assert!(CoordinatorHandle::new(sender).dismiss().is_err());
    }

    #[test]
    fn ringing_alert_reads_like_the_notification() {
        let alarm = AlarmBuilder::default().build(AlarmId(1)).unwrap();
        let alert = Alert::Ringing {
            alarm,
            interrupting: false,
        };
        assert_eq!(
            alert.to_string(),
            "🔔 Scheduled Audio: Morning Chime - 07:00 AM (🔉 Medium)"
        );
    }
}
