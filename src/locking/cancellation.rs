// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stop requests for long waits and holds.
//!
//! A [`StopToken`] remembers why it fired: an explicit [`StopToken::stop`] or
//! the number of the signal that arrived. [`signal_stop_token`] hands out
//! tokens that fire on SIGINT and SIGTERM (and SIGBREAK on Windows).

use log::{debug, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

#[cfg(windows)]
use signal_hook::consts::signal::SIGBREAK;

#[cfg(not(windows))]
const STOP_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];
#[cfg(windows)]
const STOP_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGBREAK];

const RUNNING: usize = 0;
const STOP_REQUESTED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Signal(i32),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => f.write_str("stop requested"),
            StopReason::Signal(SIGINT) => f.write_str("SIGINT"),
            StopReason::Signal(SIGTERM) => f.write_str("SIGTERM"),
            StopReason::Signal(other) => write!(f, "signal {other}"),
        }
    }
}

/// Shared, clonable stop flag. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    state: Arc<AtomicUsize>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::SeqCst) != RUNNING
    }

    /// Fires the token unless it already fired; the first reason is kept.
    pub fn stop(&self) {
        let _ = self.state.compare_exchange(
            RUNNING,
            STOP_REQUESTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => None,
            STOP_REQUESTED => Some(StopReason::Requested),
            signal => Some(
                i32::try_from(signal)
                    .map(StopReason::Signal)
                    .unwrap_or(StopReason::Requested),
            ),
        }
    }
}

static PROCESS_STOP: OnceLock<StopToken> = OnceLock::new();

/// Token fired by the process's termination signals.
///
/// Handlers are installed on first use and stay for the life of the process.
/// Each handler stores its own signal number, so [`StopToken::reason`] tells
/// which one arrived.
pub fn signal_stop_token() -> StopToken {
    PROCESS_STOP
        .get_or_init(|| {
            let token = StopToken::new();
            for signal in STOP_SIGNALS {
                // Signal numbers are small positive integers.
                let marker = signal as usize;
                match flag::register_usize(signal, Arc::clone(&token.state), marker) {
                    Ok(_) => debug!("Stop handler installed for signal {signal}"),
                    Err(err) => warn!("Could not install stop handler for signal {signal}: {err}"),
                }
            }
            token
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = StopToken::new();
        let other = token.clone();
        assert!(!other.is_stopped());
        assert_eq!(other.reason(), None);

        token.stop();
        assert!(other.is_stopped());
        assert_eq!(other.reason(), Some(StopReason::Requested));
    }

    #[test]
    fn first_reason_wins() {
        let token = StopToken::new();
        token.state.store(SIGTERM as usize, Ordering::SeqCst);
        token.stop();
        assert_eq!(token.reason(), Some(StopReason::Signal(SIGTERM)));
        assert_eq!(token.reason().unwrap().to_string(), "SIGTERM");
    }

    #[cfg(unix)]
    #[test]
    fn signal_token_records_the_signal() {
        let token = signal_stop_token();
        assert!(!token.is_stopped());

        signal_hook::low_level::raise(SIGINT).unwrap();

        assert!(token.is_stopped());
        assert_eq!(token.reason(), Some(StopReason::Signal(SIGINT)));
        assert!(signal_stop_token().is_stopped());
    }
}
