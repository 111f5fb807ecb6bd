use super::extract::{container_id, container_selector, container_visible, extract_comments};
use super::{Department, Record, Subject, TermRow};
use crate::dedup::{Deduplicator, Offer};
use crate::politeness::{Pause, Politeness};
use crate::{Fault, NavError, Navigator, RecordSink};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Everything a record of one term row carries.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub subject: &'a Subject,
    pub subject_id: Option<&'a str>,
    pub department: &'a Department,
    pub row: &'a TermRow,
}

impl RowContext<'_> {
    pub fn record(&self, comment_text: String) -> Record {
        Record {
            term_label: self.row.term_label.clone(),
            department_name: self.department.name.clone(),
            department_url: self.department.url.clone(),
            subject_name: self.subject.name.clone(),
            subject_url: self.subject.url.to_string(),
            row_id: self.row.row_id_or_empty().to_string(),
            comment_text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowOutcome {
    pub written: usize,
    pub duplicates: usize,
}

impl RowOutcome {
    fn count(&mut self, offer: Offer) {
        match offer {
            Offer::Written => self.written += 1,
            Offer::Duplicate => self.duplicates += 1,
        }
    }
}

/// The single empty-comment record of a row without reported comments.
pub async fn emit_placeholder<S: RecordSink>(
    dedup: &Deduplicator<S>,
    ctx: RowContext<'_>,
) -> Result<RowOutcome, Fault> {
    let mut outcome = RowOutcome::default();
    outcome.count(dedup.offer(ctx.record(String::new())).await?);
    Ok(outcome)
}

#[derive(Debug)]
enum State {
    Collapsed,
    Expanding,
    Verifying,
    Extracting(Vec<String>),
    Collapsing(RowOutcome),
    Done(RowOutcome),
    Faulted(Fault),
}

/// Discloses a row's comments, checks them against the reported count and
/// persists them. A row whose rendered count differs from the reported one
/// writes nothing.
pub struct CommentRevealer<'a, N, S> {
    pub nav: &'a mut N,
    pub dedup: &'a Deduplicator<S>,
    pub politeness: &'a Politeness,
    pub timeout: Duration,
}

impl<N: Navigator, S: RecordSink> CommentRevealer<'_, N, S> {
    pub async fn reveal(&mut self, ctx: RowContext<'_>) -> Result<RowOutcome, Fault> {
        let reported = ctx.row.reported_comments;
        let (Some(subject_id), Some(row_id)) = (ctx.subject_id, ctx.row.row_id.as_deref()) else {
            return Err(Fault::NotFound(format!(
                "comment container of {:?} (subject id {:?}, row id {:?})",
                ctx.row.term_label, ctx.subject_id, ctx.row.row_id
            )));
        };
        let container = container_id(subject_id, row_id);
        let selector = container_selector(&container)?;
        let action = ctx.row.action_selector();

        let mut state = State::Collapsed;
        loop {
            trace!(row_id, "Comment state {:?}", state);
            state = match state {
                State::Collapsed => self.expand(&action).await,
                State::Expanding => self.await_container(&container, &selector).await,
                State::Verifying => self.verify(&container, &selector, reported).await,
                State::Extracting(texts) => self.persist(ctx, texts).await,
                State::Collapsing(outcome) => {
                    self.politeness.throttle().await;
                    if let Err(e) = self.nav.invoke_action(&action).await {
                        warn!(row_id, "Failed to collapse comments: {}", e);
                    } else {
                        debug!(row_id, "Comments collapsed");
                    }
                    State::Done(outcome)
                }
                State::Done(outcome) => return Ok(outcome),
                State::Faulted(fault) => return Err(fault),
            };
        }
    }

    async fn expand(&mut self, action: &str) -> State {
        self.politeness.throttle().await;
        match self.nav.invoke_action(action).await {
            Ok(()) => {
                self.politeness.pause(Pause::Settle).await;
                State::Expanding
            }
            Err(e) => State::Faulted(e.into()),
        }
    }

    async fn await_container(&mut self, container: &str, selector: &Selector) -> State {
        let visible = {
            let selector = selector.clone();
            move |doc: &Html| container_visible(doc, &selector)
        };
        match self.nav.wait_until(visible, self.timeout).await {
            Ok(()) => {
                self.politeness.pause(Pause::Settle).await;
                State::Verifying
            }
            Err(NavError::TimedOut(after, _)) => State::Faulted(Fault::TimedOut(format!(
                "comment container {container} after {after:?}"
            ))),
            Err(e) => State::Faulted(e.into()),
        }
    }

    async fn verify(&mut self, container: &str, selector: &Selector, reported: usize) -> State {
        let html = match self.nav.snapshot().await {
            Ok(html) => html,
            Err(e) => return State::Faulted(e.into()),
        };
        let texts = {
            let doc = Html::parse_document(&html);
            extract_comments(&doc, selector)
        };
        let Some(texts) = texts else {
            return State::Faulted(Fault::NotFound(format!("comment container {container}")));
        };
        info!(container, "Found {} comments", texts.len());
        if texts.len() != reported {
            return State::Faulted(Fault::Consistency {
                reported,
                actual: texts.len(),
            });
        }
        State::Extracting(texts)
    }

    async fn persist(&mut self, ctx: RowContext<'_>, texts: Vec<String>) -> State {
        let mut outcome = RowOutcome::default();
        for text in texts {
            match self.dedup.offer(ctx.record(text)).await {
                Ok(offer) => outcome.count(offer),
                Err(e) => return State::Faulted(e.into()),
            }
        }
        State::Collapsing(outcome)
    }
}
