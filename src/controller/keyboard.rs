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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::sampler::SampleKey;

const RECORD: &str = ":rec";
const STOP: &str = ":stop";
const PLAY: &str = ":play";
const METRONOME: &str = ":metro";
const BPM: &str = ":bpm";
const REVERB: &str = ":reverb";
const QUIT: &str = ":quit";

/// A line-driven drum pad: each letter on a line presses that pad, and lines
/// starting with `:` are commands.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Turns one line of input into events. Unrecognized commands yield nothing.
    fn parse_line(input: &str) -> Vec<Event> {
        let input = input.trim();
        if !input.starts_with(':') {
            return input
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| Event::Trigger(SampleKey::from(c)))
                .collect();
        }

        let mut words = input.split_whitespace();
        let command = words.next().unwrap_or_default().to_lowercase();
        let argument = words.next();
        let event = match (command.as_str(), argument) {
            (RECORD, None) => Some(Event::StartRecording),
            (STOP, None) => Some(Event::StopRecording),
            (PLAY, None) => Some(Event::PlayRecording),
            (METRONOME, None) => Some(Event::ToggleMetronome),
            (QUIT, None) => Some(Event::Quit),
            (BPM, Some(bpm)) => bpm.parse().ok().map(Event::SetBpm),
            (REVERB, Some(mix)) => mix.parse().ok().map(Event::SetReverb),
            _ => None,
        };
        match event {
            Some(event) => vec![event],
            None => {
                warn!(input, "Unrecognized command");
                Vec::new()
            }
        }
    }

    /// Reads and forwards one line. Returns false once input is exhausted or the user
    /// quits.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Pads or command ({}, {}, {}, {}, {} N, {} X, {}): ",
            RECORD, STOP, PLAY, METRONOME, BPM, REVERB, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        for event in Driver::parse_line(&input) {
            let quit = event == Event::Quit;
            events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            if quit {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}
