#![forbid(unsafe_code)]

//! Status line: transient messages with optional spinner and TTL.
//!
//! Producers hold a cloneable [`StatusSender`]; one [`run_status_line`] task
//! owns the line state and turns messages and spinner ticks into
//! `UiUpdate::StatusLine` renders.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::UiUpdate;

pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(10);
pub const SPINNER_TICK: Duration = Duration::from_millis(100);
pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
pub const STATUS_HISTORY_LINES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    /// Zero keeps the message until it is replaced or cleared.
    pub ttl: Duration,
    pub spinner: bool,
}

#[derive(Clone)]
pub struct StatusSender {
    tx: mpsc::UnboundedSender<StatusMessage>,
}

/// Sends never block and are never dropped while the line task runs.
pub fn status_channel() -> (StatusSender, mpsc::UnboundedReceiver<StatusMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusSender { tx }, rx)
}

impl StatusSender {
    pub fn send(&self, text: impl Into<String>, ttl: Duration, spinner: bool) {
        let msg = StatusMessage { text: text.into(), ttl, spinner };
        if self.tx.send(msg).is_err() {
            debug!("status line stopped; message discarded");
        }
    }

    pub fn send_default_ttl(&self, text: impl Into<String>) {
        self.send(text, DEFAULT_STATUS_TTL, true);
    }

    pub fn send_infinite(&self, text: impl Into<String>) {
        self.send(text, Duration::ZERO, true);
    }

    /// Default TTL, no spinner.
    pub fn error(&self, text: impl Into<String>) {
        self.send(text, DEFAULT_STATUS_TTL, false);
    }

    pub fn clear(&self) {
        self.send(String::new(), Duration::ZERO, false);
    }
}

/// Bounded, timestamped log of every non-empty status message.
#[derive(Debug, Default)]
pub struct StatusHistory {
    lines: VecDeque<String>,
}

impl StatusHistory {
    pub fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.lines.len() == STATUS_HISTORY_LINES {
            self.lines.pop_front();
        }
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.lines.push_back(format!("{ts} {text}"));
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
}

pub type SharedStatusHistory = Arc<Mutex<StatusHistory>>;

struct Line {
    text: String,
    spinner: bool,
    frame: usize,
    expires: Option<Instant>,
}

impl Line {
    fn render(&self) -> String {
        if self.text.is_empty() || !self.spinner {
            self.text.clone()
        } else {
            format!("{} {}", SPINNER_FRAMES[self.frame], self.text)
        }
    }

    fn clear(&mut self) {
        self.text.clear();
        self.spinner = false;
        self.expires = None;
    }
}

/// Owns the status line until `cancel` fires, the senders are gone or the UI
/// stops receiving.
pub async fn run_status_line(
    mut rx: mpsc::UnboundedReceiver<StatusMessage>,
    history: SharedStatusHistory,
    updates: Sender<UiUpdate>,
    cancel: CancellationToken,
) {
    let mut line = Line { text: String::new(), spinner: false, frame: 0, expires: None };
    let mut ticker = tokio::time::interval(SPINNER_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let expiry = line.expires;
        let changed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if msg.text.is_empty() {
                    line.clear();
                } else {
                    if let Ok(mut h) = history.lock() {
                        h.push(&msg.text);
                    }
                    line.text = msg.text;
                    line.spinner = msg.spinner;
                    line.expires = (!msg.ttl.is_zero()).then(|| Instant::now() + msg.ttl);
                }
                true
            }
            _ = tokio::time::sleep_until(expiry.unwrap_or_else(Instant::now)), if expiry.is_some() => {
                line.clear();
                true
            }
            _ = ticker.tick() => {
                if line.spinner && !line.text.is_empty() {
                    line.frame = (line.frame + 1) % SPINNER_FRAMES.len();
                    true
                } else {
                    false
                }
            }
        };
        if changed && updates.send(UiUpdate::StatusLine(line.render())).is_err() {
            break;
        }
    }
    debug!("status line stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(rx: &std::sync::mpsc::Receiver<UiUpdate>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|u| match u {
                UiUpdate::StatusLine(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_message_clears_itself() {
        let (status, rx) = status_channel();
        let (tx, ui) = std::sync::mpsc::channel();
        let history = SharedStatusHistory::default();
        let cancel = CancellationToken::new();
        tokio::spawn(run_status_line(rx, history.clone(), tx, cancel.clone()));

        status.send("topic created", Duration::from_secs(2), false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lines(&ui), vec!["topic created".to_string()]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(lines(&ui), vec![String::new()]);
        assert_eq!(history.lock().expect("lock").len(), 1);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn spinner_advances_until_cleared() {
        let (status, rx) = status_channel();
        let (tx, ui) = std::sync::mpsc::channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run_status_line(rx, SharedStatusHistory::default(), tx, cancel.clone()));

        status.send_infinite("getting topics...");
        tokio::time::sleep(Duration::from_millis(350)).await;
        let seen = lines(&ui);
        assert!(seen.len() >= 3, "{seen:?}");
        assert!(seen.iter().all(|l| l.ends_with(" getting topics...")));
        assert_ne!(seen[0], seen[1]);

        status.clear();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lines(&ui).last().map(String::as_str), Some(""));
        // Infinite messages do not expire on their own.
        status.send_infinite("still here");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(lines(&ui).iter().all(|l| !l.is_empty()));
        cancel.cancel();
    }

    #[test]
    fn history_is_bounded_and_skips_empty() {
        let mut h = StatusHistory::default();
        h.push("");
        assert!(h.is_empty());
        for i in 0..STATUS_HISTORY_LINES + 5 {
            h.push(&format!("msg {i}"));
        }
        assert_eq!(h.len(), STATUS_HISTORY_LINES);
        assert!(h.lines().next().is_some_and(|l| l.ends_with("msg 5")));
    }

    #[tokio::test(start_paused = true)]
    async fn error_after_a_burst_still_arrives() {
        let (status, rx) = status_channel();
        for i in 0..10 {
            status.send_infinite(format!("describing topic t{i}..."));
        }
        status.error("failed to describe topic t9: remote: boom");

        let (tx, ui) = std::sync::mpsc::channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run_status_line(rx, SharedStatusHistory::default(), tx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            lines(&ui).last().map(String::as_str),
            Some("failed to describe topic t9: remote: boom")
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(lines(&ui).last().map(String::as_str), Some(""));
        cancel.cancel();
    }

    #[test]
    fn clear_is_queued_behind_any_number_of_messages() {
        let (status, mut rx) = status_channel();
        for i in 0..100 {
            status.send_infinite(format!("m{i}"));
        }
        status.clear();
        let mut last = None;
        while let Ok(msg) = rx.try_recv() {
            last = Some(msg);
        }
        assert_eq!(last.map(|m| m.text), Some(String::new()));
    }
}
