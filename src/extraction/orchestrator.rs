//! Extraction orchestrator — one bounded capability call per thread run.
//!
//! **Core invariant: a failing capability never raises.** Unavailability
//! and timeouts become a Failed run with no candidates; the thread stays
//! unprocessed and is retried on the next sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::threads::model::{CommunicationThread, Message};

use super::capability::{ExtractionCapability, ExtractionRequest, MessageExcerpt, RawCandidate};
use super::model::{
    CandidateExtraction, Confidence, ExtractionRun, ItemKind, ItemPayload, Priority, RunStatus,
};

/// Candidates plus the run record describing how they were produced.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub run: ExtractionRun,
    pub candidates: Vec<CandidateExtraction>,
}

impl ExtractionOutcome {
    fn empty(run: ExtractionRun) -> Self {
        Self {
            run,
            candidates: Vec::new(),
        }
    }
}

pub struct ExtractionOrchestrator {
    capability: Arc<dyn ExtractionCapability>,
    timeout: Duration,
}

impl ExtractionOrchestrator {
    pub fn new(capability: Arc<dyn ExtractionCapability>, timeout: Duration) -> Self {
        Self {
            capability,
            timeout,
        }
    }

    /// Run the capability over messages after `since_message_id` and return
    /// the validated candidates.
    pub async fn extract(
        &self,
        thread: &CommunicationThread,
        since_message_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> ExtractionOutcome {
        let run = ExtractionRun::start(&thread.id, since_message_id.map(String::from));
        let window = thread.messages_after(since_message_id);

        if window.is_empty() {
            debug!(thread_id = %thread.id, "No new messages since last run");
            return ExtractionOutcome::empty(run.finish(RunStatus::Succeeded, None));
        }

        info!(
            thread_id = %thread.id,
            capability = self.capability.name(),
            messages = window.len(),
            "Running extraction"
        );

        let request = build_request(thread, window);
        let call = tokio::time::timeout(self.timeout, self.capability.extract(request));

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = call => Some(res),
        };

        let raw = match result {
            None => return self.cancelled(thread, run),
            Some(Ok(Ok(raw))) => raw,
            Some(Ok(Err(e))) => {
                let err = ExtractionError::Unavailable {
                    capability: self.capability.name().to_string(),
                    reason: e.to_string(),
                };
                warn!(thread_id = %thread.id, error = %err, "Extraction failed, will retry");
                return ExtractionOutcome::empty(run.finish(RunStatus::Failed, Some(err.to_string())));
            }
            Some(Err(_)) => {
                let err = ExtractionError::Timeout {
                    capability: self.capability.name().to_string(),
                    timeout: self.timeout,
                };
                warn!(thread_id = %thread.id, error = %err, "Extraction timed out, will retry");
                return ExtractionOutcome::empty(run.finish(RunStatus::Failed, Some(err.to_string())));
            }
        };

        if cancel.is_cancelled() {
            return self.cancelled(thread, run);
        }

        let mut run = run;
        run.candidates_returned = raw.len();

        let mut candidates = Vec::with_capacity(raw.len());
        for candidate in raw {
            match validate_candidate(thread, &candidate) {
                Ok(valid) => candidates.push(valid),
                Err(reason) => {
                    warn!(
                        thread_id = %thread.id,
                        kind = %candidate.kind,
                        reason = %reason,
                        "Dropping invalid candidate"
                    );
                    run.candidates_dropped += 1;
                }
            }
        }

        info!(
            thread_id = %thread.id,
            returned = run.candidates_returned,
            dropped = run.candidates_dropped,
            "Extraction complete"
        );

        ExtractionOutcome {
            run: run.finish(RunStatus::Succeeded, None),
            candidates,
        }
    }

    fn cancelled(&self, thread: &CommunicationThread, run: ExtractionRun) -> ExtractionOutcome {
        let err = ExtractionError::Cancelled {
            thread_id: thread.id.clone(),
        };
        info!(thread_id = %thread.id, "Extraction cancelled, discarding candidates");
        ExtractionOutcome::empty(run.finish(RunStatus::Cancelled, Some(err.to_string())))
    }
}

fn build_request(thread: &CommunicationThread, window: &[Message]) -> ExtractionRequest {
    ExtractionRequest {
        thread_id: thread.id.clone(),
        matter_id: thread.matter_id.clone(),
        subject: thread.subject.clone(),
        participants: thread.participants.iter().cloned().collect(),
        messages: window
            .iter()
            .map(|m| MessageExcerpt {
                id: m.id.clone(),
                sender: m.sender.clone(),
                recipients: m.recipients.clone(),
                sent_date: m.sent_date,
                body: m.body.clone(),
            })
            .collect(),
    }
}

/// Check a raw candidate against its variant schema.
///
/// Confidence is parsed, never recomputed.
pub fn validate_candidate(
    thread: &CommunicationThread,
    raw: &RawCandidate,
) -> Result<CandidateExtraction, String> {
    let kind: ItemKind = raw.kind.parse()?;
    let confidence: Confidence = raw.confidence.parse()?;

    let source_message_id = non_empty(raw.source_message_id.as_deref())
        .ok_or("missing source_message_id")?
        .to_string();
    if !thread.contains_message(&source_message_id) {
        return Err(format!("source message {source_message_id} is not in the thread"));
    }

    let payload = match kind {
        ItemKind::Deadline => {
            let description = non_empty(raw.description.as_deref()).ok_or("deadline without description")?;
            let due_date = raw
                .due_date
                .as_deref()
                .and_then(parse_date)
                .ok_or("deadline without a parseable due_date")?;
            ItemPayload::Deadline {
                description: description.to_string(),
                due_date,
            }
        }
        ItemKind::Commitment => {
            let party = non_empty(raw.party.as_deref()).ok_or("commitment without party")?;
            let text = non_empty(raw.text.as_deref()).ok_or("commitment without text")?;
            ItemPayload::Commitment {
                party: party.to_string(),
                text: text.to_string(),
                date: raw.date.as_deref().and_then(parse_date),
            }
        }
        ItemKind::ActionItem => {
            let description = non_empty(raw.description.as_deref()).ok_or("action item without description")?;
            ItemPayload::ActionItem {
                description: description.to_string(),
                priority: raw
                    .priority
                    .as_deref()
                    .and_then(|p| p.parse::<Priority>().ok())
                    .unwrap_or_default(),
                suggested_assignee: non_empty(raw.suggested_assignee.as_deref()).map(String::from),
            }
        }
    };

    check_payload(thread, &payload)?;
    Ok(CandidateExtraction {
        source_message_id,
        confidence,
        payload,
    })
}

/// Rules a payload must satisfy against its thread, whatever its origin.
pub fn check_payload(thread: &CommunicationThread, payload: &ItemPayload) -> Result<(), String> {
    match payload {
        ItemPayload::Deadline {
            description,
            due_date,
        } => {
            if description.trim().is_empty() {
                return Err("deadline without description".into());
            }
            if *due_date <= thread.started_at() {
                return Err(format!("due date {due_date} is not after the thread start"));
            }
        }
        ItemPayload::Commitment { party, text, .. } => {
            if !thread.is_participant(party) {
                return Err(format!("party {party} is not a thread participant"));
            }
            if text.trim().is_empty() {
                return Err("commitment without text".into());
            }
        }
        ItemPayload::ActionItem { description, .. } => {
            if description.trim().is_empty() {
                return Err("action item without description".into());
            }
        }
    }
    Ok(())
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;

    fn day(n: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::days(n)
    }

    fn message(id: &str, sent: DateTime<Utc>) -> Message {
        Message {
            id: id.into(),
            thread_id: "t1".into(),
            sender: "alice@firm.com".into(),
            recipients: vec!["bob@client.com".into()],
            sent_date: sent,
            body: format!("body of {id}"),
            attachments: vec![],
        }
    }

    fn thread() -> CommunicationThread {
        CommunicationThread {
            id: "t1".into(),
            subject: Some("Smith v. Jones".into()),
            matter_id: "M-1".into(),
            participants: BTreeSet::from(["alice@firm.com".to_string(), "bob@client.com".to_string()]),
            messages: vec![message("m1", day(0)), message("m2", day(2))],
            is_processed: false,
            processed_at: None,
            last_message_date: day(2),
            last_processed_message_id: None,
            archived: false,
            created_at: day(0),
            updated_at: day(2),
        }
    }

    fn raw(kind: &str) -> RawCandidate {
        RawCandidate {
            kind: kind.into(),
            confidence: "high".into(),
            source_message_id: Some("m2".into()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_deadline() {
        let mut c = raw("deadline");
        c.description = Some("File reply".into());
        c.due_date = Some("2026-03-15".into());
        let valid = validate_candidate(&thread(), &c).unwrap();
        assert_eq!(valid.confidence, Confidence::High);
        assert!(matches!(valid.payload, ItemPayload::Deadline { due_date, .. } if due_date == day(14) - chrono::Duration::hours(9)));
    }

    #[test]
    fn deadline_before_thread_start_rejected() {
        let mut c = raw("deadline");
        c.description = Some("File reply".into());
        c.due_date = Some("2026-02-01T00:00:00Z".into());
        assert!(validate_candidate(&thread(), &c).is_err());
    }

    #[test]
    fn deadline_without_due_date_rejected() {
        let mut c = raw("deadline");
        c.description = Some("File reply".into());
        assert!(validate_candidate(&thread(), &c).is_err());
    }

    #[test]
    fn commitment_party_must_be_participant() {
        let mut c = raw("commitment");
        c.text = Some("Will send exhibits".into());
        c.party = Some("Bob@Client.com".into());
        assert!(validate_candidate(&thread(), &c).is_ok());

        c.party = Some("stranger@else.com".into());
        assert!(validate_candidate(&thread(), &c).is_err());
    }

    #[test]
    fn action_item_needs_description() {
        let mut c = raw("action_item");
        c.description = Some("   ".into());
        assert!(validate_candidate(&thread(), &c).is_err());

        c.description = Some("Pull exhibits".into());
        c.priority = Some("URGENT".into());
        let valid = validate_candidate(&thread(), &c).unwrap();
        assert!(matches!(valid.payload, ItemPayload::ActionItem { priority: Priority::Urgent, .. }));
    }

    #[test]
    fn check_payload_applies_to_built_payloads() {
        let t = thread();
        let early = ItemPayload::Deadline {
            description: "Serve discovery".into(),
            due_date: day(-3),
        };
        assert!(check_payload(&t, &early).is_err());

        let stranger = ItemPayload::Commitment {
            party: "stranger@else.com".into(),
            text: "Will call".into(),
            date: None,
        };
        assert!(check_payload(&t, &stranger).is_err());

        let blank = ItemPayload::Commitment {
            party: "alice@firm.com".into(),
            text: "  ".into(),
            date: None,
        };
        assert!(check_payload(&t, &blank).is_err());

        let fine = ItemPayload::Deadline {
            description: "Serve discovery".into(),
            due_date: day(10),
        };
        assert!(check_payload(&t, &fine).is_ok());
    }

    #[test]
    fn unknown_source_message_rejected() {
        let mut c = raw("action_item");
        c.description = Some("Pull exhibits".into());
        c.source_message_id = Some("m99".into());
        assert!(validate_candidate(&thread(), &c).is_err());
    }

    #[test]
    fn unknown_confidence_rejected() {
        let mut c = raw("action_item");
        c.description = Some("Pull exhibits".into());
        c.confidence = "very sure".into();
        assert!(validate_candidate(&thread(), &c).is_err());
    }

    #[test]
    fn parse_date_formats() {
        assert_eq!(parse_date("2026-03-01T09:00:00Z"), Some(day(0)));
        assert!(parse_date("2026-03-01").is_some());
        assert!(parse_date("next Tuesday").is_none());
    }

    // ── Orchestrator runs ──────────────────────────────────────────

    struct Canned {
        calls: AtomicUsize,
        result: Result<Vec<RawCandidate>, String>,
        delay: Duration,
    }

    impl Canned {
        fn ok(items: Vec<RawCandidate>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Ok(items),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ExtractionCapability for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn extract(&self, _request: ExtractionRequest) -> Result<Vec<RawCandidate>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone().map_err(|reason| LlmError::RequestFailed {
                provider: "canned".into(),
                reason,
            })
        }
    }

    #[tokio::test]
    async fn drops_invalid_and_counts() {
        let mut good = raw("action_item");
        good.description = Some("Pull exhibits".into());
        let bad = raw("action_item");
        let cap = Arc::new(Canned::ok(vec![good, bad]));
        let orch = ExtractionOrchestrator::new(cap, Duration::from_secs(30));

        let out = orch.extract(&thread(), None, &CancellationToken::new()).await;
        assert_eq!(out.run.status, RunStatus::Succeeded);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.run.candidates_returned, 2);
        assert_eq!(out.run.candidates_dropped, 1);
    }

    #[tokio::test]
    async fn no_new_messages_skips_capability() {
        let cap = Arc::new(Canned::ok(vec![]));
        let orch = ExtractionOrchestrator::new(cap.clone(), Duration::from_secs(30));
        let out = orch.extract(&thread(), Some("m2"), &CancellationToken::new()).await;
        assert_eq!(out.run.status, RunStatus::Succeeded);
        assert_eq!(cap.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn capability_error_marks_run_failed() {
        let cap = Arc::new(Canned {
            calls: AtomicUsize::new(0),
            result: Err("503 overloaded".into()),
            delay: Duration::ZERO,
        });
        let orch = ExtractionOrchestrator::new(cap, Duration::from_secs(30));
        let out = orch.extract(&thread(), None, &CancellationToken::new()).await;
        assert_eq!(out.run.status, RunStatus::Failed);
        assert!(out.candidates.is_empty());
        assert!(out.run.error.unwrap().contains("503 overloaded"));
    }

    #[tokio::test(start_paused = true)]
    async fn capability_timeout_marks_run_failed() {
        let cap = Arc::new(Canned {
            calls: AtomicUsize::new(0),
            result: Ok(vec![]),
            delay: Duration::from_secs(120),
        });
        let orch = ExtractionOrchestrator::new(cap, Duration::from_secs(30));
        let out = orch.extract(&thread(), None, &CancellationToken::new()).await;
        assert_eq!(out.run.status, RunStatus::Failed);
        assert!(out.run.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_token_discards_results() {
        let mut good = raw("action_item");
        good.description = Some("Pull exhibits".into());
        let orch = ExtractionOrchestrator::new(Arc::new(Canned::ok(vec![good])), Duration::from_secs(30));
        let token = CancellationToken::new();
        token.cancel();
        let out = orch.extract(&thread(), None, &token).await;
        assert_eq!(out.run.status, RunStatus::Cancelled);
        assert!(out.candidates.is_empty());
    }
}
