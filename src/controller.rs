// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::sampler::{SampleKey, Sampler};

pub mod chat;
pub mod keyboard;

/// Controller events that drive the sampler.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// A pad key was pressed.
    Trigger(SampleKey),

    /// Clears the recording and starts capturing key presses.
    StartRecording,

    /// Stops capturing. The recording is kept.
    StopRecording,

    /// Replays the recording.
    PlayRecording,

    /// Starts or stops the metronome.
    ToggleMetronome,

    /// Sets the metronome tempo.
    SetBpm(u32),

    /// Sets the reverb mix, from 0 (dry) to 1 (wet).
    SetReverb(f32),

    /// Ends the session.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Feeds driver events into a sampler.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(sampler: Arc<Sampler>, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(sampler, driver).instrument(info_span!("controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    async fn trigger_events(sampler: Arc<Sampler>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        info!(pads = sampler.store().catalogue().len(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            debug!(event = ?event, "Received event.");
            if event == Event::Quit {
                break;
            }
            Controller::apply(&sampler, event);
        }

        info!("Controller closing.");
        // The driver may be blocked on input; it is not waited for after a quit.
        join_handle.abort();
    }

    fn apply(sampler: &Sampler, event: Event) {
        match event {
            Event::Trigger(key) => {
                if sampler.press(&key).is_none() && !sampler.store().is_known(&key) {
                    debug!(key = %key, "No pad for key");
                }
            }
            Event::StartRecording => sampler.start_recording(),
            Event::StopRecording => sampler.stop_recording(),
            Event::PlayRecording => {
                let scheduled = sampler.play_recording();
                info!(events = scheduled, "Playing recording");
            }
            Event::ToggleMetronome => {
                let running = sampler.metronome().toggle();
                info!(running, bpm = sampler.metronome().bpm(), "Metronome toggled");
            }
            Event::SetBpm(bpm) => {
                let applied = sampler.metronome().set_bpm(bpm);
                info!(requested = bpm, bpm = applied, "Tempo set");
            }
            Event::SetReverb(mix) => {
                if !sampler.set_reverb_mix(mix) {
                    warn!("Reverb is unavailable without an impulse response");
                }
            }
            Event::Quit => {}
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::audio::{AudioSession, LoadedSample};
    use crate::sampler::{Sample, SampleKey, SampleStore, Sampler, SamplerOptions};
    use crate::scheduler::ManualScheduler;

    use super::{Controller, Driver, Event};

    /// Sends a fixed script of events, then closes.
    struct ScriptDriver {
        script: parking_lot::Mutex<Vec<Event>>,
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let script = std::mem::take(&mut *self.script.lock());
            tokio::spawn(async move {
                for event in script {
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    fn sampler() -> (Arc<Sampler>, Arc<ManualScheduler>) {
        let store = Arc::new(SampleStore::new(vec![Sample::new("A", "clap", "clap.wav")], 1000));
        store.insert(SampleKey::new("A"), LoadedSample::new(vec![0.5; 2000], 1, 1000));
        let scheduler = Arc::new(ManualScheduler::new());
        let sampler = Sampler::new(
            Arc::new(AudioSession::new(2, 1000)),
            store,
            scheduler.clone(),
            &SamplerOptions::default(),
        );
        (Arc::new(sampler), scheduler)
    }

    async fn run(sampler: &Arc<Sampler>, script: Vec<Event>) {
        let driver = Arc::new(ScriptDriver {
            script: parking_lot::Mutex::new(script),
        });
        let mut controller = Controller::new(sampler.clone(), driver);
        assert!(controller.join().await.is_ok(), "Error waiting for controller");
    }

    #[tokio::test]
    async fn test_controller() {
        let (sampler, scheduler) = sampler();
        run(
            &sampler,
            vec![
                Event::StartRecording,
                Event::Trigger(SampleKey::new("a")),
                Event::Trigger(SampleKey::new("z")),
                Event::StopRecording,
                Event::ToggleMetronome,
                Event::SetBpm(400),
                Event::SetReverb(0.5),
            ],
        )
        .await;

        assert_eq!(sampler.recorder().events().len(), 1);
        assert!(!sampler.recorder().is_recording());
        assert_eq!(sampler.engine().active_voice_count(), 1);
        assert!(sampler.metronome().is_running());
        assert_eq!(sampler.metronome().bpm(), 300);
        assert_eq!(sampler.session().graph().wet_gain(), 0.0);

        sampler.engine().stop_all();
        run(&sampler, vec![Event::PlayRecording]).await;
        scheduler.advance(Duration::ZERO);
        assert_eq!(sampler.engine().active_voice_count(), 1);
        sampler.shutdown();
    }

    #[tokio::test]
    async fn test_quit_ignores_later_events() {
        let (sampler, _) = sampler();
        run(&sampler, vec![Event::Quit, Event::ToggleMetronome]).await;
        assert!(!sampler.metronome().is_running());
    }
}
