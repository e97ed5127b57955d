//! Tag polling state machine.
//!
//! Each poll cycle asks the reader for any tag. When one answers it is
//! selected and every data block of sectors 1-15 is read in order. A failed
//! block does not stop the scan; the remaining blocks are still read so the
//! LEDs show the whole extent of a damaged tag. Only a scan in which every
//! read succeeded is delivered.

use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::display::DeliverySink;
use crate::executor::ExecutionUnit;
use crate::nfc::{BlockAddress, RequestMode, ScanPlan, SectorReader, TagReader, Uid};
use crate::status::{ScanStatus, StatusSignaler};

/// State of one tag-present cycle.
#[derive(Debug)]
pub struct ScanSession {
    id: Uuid,
    uid: Uid,
    started_at: DateTime<Utc>,
    data: Vec<u8>,
    blocks_read: usize,
    failed: Vec<BlockAddress>,
}

impl ScanSession {
    pub fn new(uid: Uid) -> Self {
        Self {
            id: Uuid::new_v4(),
            uid,
            started_at: Utc::now(),
            data: Vec::new(),
            blocks_read: 0,
            failed: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn failed(&self) -> &[BlockAddress] {
        &self.failed
    }

    /// Only successful reads contribute bytes.
    pub fn record_block(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.blocks_read += 1;
    }

    pub fn record_failure(&mut self, address: BlockAddress) {
        self.failed.push(address);
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn into_report(self, poll: u64, elapsed: Duration) -> ScanReport {
        ScanReport {
            session_id: self.id,
            uid: self.uid.to_hex(),
            started_at: self.started_at,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            poll,
            blocks_read: self.blocks_read,
            data: self.data,
        }
    }
}

/// Debounce for error indications.
///
/// Armed by the first failure of a run of consecutive failures and disarmed
/// by the next success, so each run produces one error blink. The streak is
/// kept by the scanner, not the session: a run that spans two poll cycles is
/// still one run.
#[derive(Debug, Default)]
pub struct FailureStreak {
    active: bool,
}

impl FailureStreak {
    /// Returns true when this failure starts a new streak.
    pub fn fail(&mut self) -> bool {
        !std::mem::replace(&mut self.active, true)
    }

    pub fn clear(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Summary of a fully read tag.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub session_id: Uuid,
    pub uid: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Request counter value of the poll that completed the scan
    pub poll: u64,
    pub blocks_read: usize,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing answered the request.
    NoTag,
    /// A tag answered but at least one step failed.
    Incomplete {
        uid: Option<Uid>,
        failed: Vec<BlockAddress>,
    },
    /// Every block was read; the data has been delivered.
    Complete(ScanReport),
}

impl PollOutcome {
    fn label(&self) -> &'static str {
        match self {
            PollOutcome::NoTag => "no tag",
            PollOutcome::Incomplete { .. } => "incomplete",
            PollOutcome::Complete(_) => "complete",
        }
    }
}

pub struct TagScanner<R, U, S> {
    reader: R,
    sectors: SectorReader,
    plan: ScanPlan,
    signaler: StatusSignaler<U>,
    sink: S,
    poll_interval: Duration,
    requests: u64,
    streak: FailureStreak,
}

impl<R, U, S> TagScanner<R, U, S>
where
    R: TagReader,
    U: ExecutionUnit,
    S: DeliverySink,
{
    pub fn new(
        reader: R,
        sectors: SectorReader,
        signaler: StatusSignaler<U>,
        sink: S,
        poll_interval: Duration,
    ) -> Self {
        Self {
            reader,
            sectors,
            plan: ScanPlan::mifare_1k(),
            signaler,
            sink,
            poll_interval,
            requests: 0,
            streak: FailureStreak::default(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn signaler(&self) -> &StatusSignaler<U> {
        &self.signaler
    }

    /// Poll cycles issued so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn streak(&self) -> &FailureStreak {
        &self.streak
    }

    /// Poll until a tag has been read completely.
    pub fn run(&mut self) -> ScanReport {
        info!("waiting for tag");
        self.signaler.signal(ScanStatus::Idle);

        loop {
            if let PollOutcome::Complete(report) = self.poll_once() {
                return report;
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// One poll cycle.
    pub fn poll_once(&mut self) -> PollOutcome {
        let started = Instant::now();
        self.requests += 1;
        let request = self.requests;

        let outcome = self.scan(request, started);

        debug!(
            request,
            outcome = outcome.label(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "poll cycle"
        );
        outcome
    }

    fn scan(&mut self, request: u64, started: Instant) -> PollOutcome {
        let tag_type = match self.reader.request(RequestMode::All) {
            Ok(tag_type) => tag_type,
            Err(e) => {
                trace!(request, error = %e, "no tag");
                return PollOutcome::NoTag;
            }
        };

        self.signaler.signal(ScanStatus::InProgress);

        let uid = match self.reader.select_tag() {
            Ok(uid) => uid,
            Err(e) => {
                warn!(request, %tag_type, error = %e, "tag answered but select failed");
                self.note_failure();
                return PollOutcome::Incomplete {
                    uid: None,
                    failed: Vec::new(),
                };
            }
        };
        info!(request, %uid, %tag_type, family = tag_type.family(), "tag selected");

        let mut session = ScanSession::new(uid);
        for address in self.plan.iter() {
            match self.sectors.read(&mut self.reader, session.uid(), address) {
                Ok(bytes) => {
                    session.record_block(&bytes);
                    self.streak.clear();
                }
                Err(e) => {
                    debug!(request, error = %e, "block read failed");
                    session.record_failure(address);
                    self.note_failure();
                }
            }
        }

        if !session.is_clean() {
            warn!(
                request,
                session = %session.id(),
                failed = session.failed().len(),
                read = session.data().len(),
                "scan incomplete"
            );
            return PollOutcome::Incomplete {
                uid: Some(session.uid().clone()),
                failed: session.failed().to_vec(),
            };
        }

        let report = session.into_report(request, started.elapsed());

        self.signaler.signal(ScanStatus::Success);
        self.sink.deliver(&report.data);
        self.reader.release_crypto();

        PollOutcome::Complete(report)
    }

    fn note_failure(&mut self) {
        if self.streak.fail() {
            self.signaler.signal(ScanStatus::Error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streak_fires_once_per_run() {
        let mut streak = FailureStreak::default();

        assert!(streak.fail());
        assert!(!streak.fail());
        assert!(!streak.fail());
        assert!(streak.is_active());

        streak.clear();
        assert!(!streak.is_active());
        assert!(streak.fail());
    }

    #[test]
    fn session_appends_only_successful_blocks() {
        let uid = Uid::from_slice(&[9, 8, 7, 6]).unwrap();
        let mut session = ScanSession::new(uid.clone());

        session.record_block(&[1; 16]);
        session.record_failure(BlockAddress::new(1, 1));
        session.record_block(&[2; 4]);

        assert_eq!(session.data().len(), 20);
        assert_eq!(session.failed(), &[BlockAddress::new(1, 1)]);
        assert!(!session.is_clean());
        assert_eq!(session.uid(), &uid);

        let report = session.into_report(3, Duration::from_millis(12));
        assert_eq!(report.blocks_read, 2);
        assert_eq!(report.uid, "09080706");
        assert_eq!(report.poll, 3);
        assert_eq!(report.elapsed_ms, 12);
    }
}
