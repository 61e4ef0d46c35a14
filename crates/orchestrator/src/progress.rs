//! Advisory progress reporting for running flows.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Upload,
    Decrypt,
    Delete,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Flow::Upload => "upload",
            Flow::Decrypt => "decrypt",
            Flow::Delete => "delete",
        })
    }
}

/// Steps a flow passes through. Used both for progress and to tag the step an
/// aborted flow was attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Started,
    Authorized,
    Uploaded,
    RegistryChecked,
    Committed,
    KeyFetched,
    MetadataFetched,
    Decrypted,
    Located,
    OffchainDeleted,
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowStep::Started => "started",
            FlowStep::Authorized => "authorized",
            FlowStep::Uploaded => "uploaded",
            FlowStep::RegistryChecked => "registry-checked",
            FlowStep::Committed => "committed",
            FlowStep::KeyFetched => "key-fetched",
            FlowStep::MetadataFetched => "metadata-fetched",
            FlowStep::Decrypted => "decrypted",
            FlowStep::Located => "located",
            FlowStep::OffchainDeleted => "offchain-deleted",
        })
    }
}

impl FlowStep {
    /// Percentage reported when `flow` reaches this step.
    pub fn percent(self, flow: Flow) -> u8 {
        use FlowStep::*;
        match (flow, self) {
            (_, Started) => 0,
            (Flow::Upload, Authorized) => 25,
            (Flow::Upload, Uploaded) => 50,
            (Flow::Upload, RegistryChecked) => 75,
            (Flow::Decrypt, Authorized) => 25,
            (Flow::Decrypt, KeyFetched) => 50,
            (Flow::Decrypt, MetadataFetched) => 75,
            (Flow::Delete, Authorized) => 20,
            (Flow::Delete, Located) => 40,
            (Flow::Delete, OffchainDeleted) => 60,
            (Flow::Delete, RegistryChecked) => 80,
            (_, Committed) | (_, Decrypted) => 100,
            // steps that do not belong to the flow do not move the bar
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub flow: Flow,
    pub step: FlowStep,
    pub percent: u8,
}

/// Receives progress updates. Reporting never fails a flow.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

impl ProgressSink for () {
    fn report(&self, _progress: Progress) {}
}

impl ProgressSink for mpsc::UnboundedSender<Progress> {
    fn report(&self, progress: Progress) {
        // receiver gone means nobody is watching
        let _ = self.send(progress);
    }
}

impl ProgressSink for watch::Sender<Progress> {
    fn report(&self, progress: Progress) {
        self.send_replace(progress);
    }
}

/// Per-flow reporter that keeps percentages non-decreasing.
pub(crate) struct Tracker<'a> {
    flow: Flow,
    sink: &'a dyn ProgressSink,
    last: u8,
}

impl<'a> Tracker<'a> {
    pub(crate) fn start(flow: Flow, sink: &'a dyn ProgressSink) -> Self {
        let tracker = Self {
            flow,
            sink,
            last: 0,
        };
        tracker.sink.report(Progress {
            flow,
            step: FlowStep::Started,
            percent: 0,
        });
        tracker
    }

    pub(crate) fn reached(&mut self, step: FlowStep) {
        self.last = self.last.max(step.percent(self.flow));
        self.sink.report(Progress {
            flow: self.flow,
            step,
            percent: self.last,
        });
    }

    /// Terminal report, whatever step the flow ended on.
    pub(crate) fn finish(&mut self, step: FlowStep) {
        self.last = 100;
        self.sink.report(Progress {
            flow: self.flow,
            step,
            percent: 100,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_never_goes_backwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker = Tracker::start(Flow::Upload, &tx);
        tracker.reached(FlowStep::Uploaded);
        tracker.reached(FlowStep::Authorized);
        tracker.finish(FlowStep::RegistryChecked);

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p.percent);
        }
        assert_eq!(seen, vec![0, 50, 50, 100]);
    }

    #[test]
    fn watch_sink_keeps_latest() {
        let (tx, rx) = watch::channel(Progress {
            flow: Flow::Delete,
            step: FlowStep::Started,
            percent: 0,
        });
        let mut tracker = Tracker::start(Flow::Delete, &tx);
        tracker.reached(FlowStep::Located);
        assert_eq!(rx.borrow().percent, 40);
        assert_eq!(rx.borrow().step, FlowStep::Located);
    }

    #[test]
    fn upload_percentages() {
        let steps = [
            FlowStep::Started,
            FlowStep::Authorized,
            FlowStep::Uploaded,
            FlowStep::RegistryChecked,
            FlowStep::Committed,
        ];
        let percents: Vec<u8> = steps.iter().map(|s| s.percent(Flow::Upload)).collect();
        assert_eq!(percents, vec![0, 25, 50, 75, 100]);
    }
}
