//! Confirmation handshake for low-confidence resolutions
//!
//! A resolution below the acceptance threshold becomes a pending prompt that
//! the user answers by picking one of the offered types. Prompts expire after
//! a fixed window and the pending set is bounded.

use crate::core::config::ConfirmationConfig;
use crate::core::types::{clamp_unit, normalize_command, Clock, Timestamp};
use crate::disambiguation::disambiguator::{current_state_relevance, ContextDisambiguator, DisambiguationResult};
use crate::task::context::TaskContext;
use crate::task::types::{TaskDraft, TaskType};
use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    /// The disambiguator's pick
    Resolved,
    /// A runner-up candidate from disambiguation
    Candidate,
    /// A type this command resolved to before
    Historical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationOption {
    pub task_type: TaskType,
    pub description: String,
    pub confidence: f64,
    pub source: OptionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
    pub command: String,
    pub player: Option<String>,
    /// Most confident first
    pub options: Vec<ConfirmationOption>,
    pub context: TaskContext,
    pub context_factors: BTreeMap<String, f64>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    /// Task as interpreted so far; completed once a type is picked
    pub draft: Option<TaskDraft>,
    seq: u64,
}

impl ConfirmationPrompt {
    pub fn offers(&self, task_type: TaskType) -> bool {
        self.options.iter().any(|o| o.task_type == task_type)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Chat text listing the options
    pub fn render(&self) -> String {
        let mut s = format!("Did you mean one of these for \"{}\"?\n", self.command);
        for (i, o) in self.options.iter().enumerate() {
            s.push_str(&format!(
                "  {}. {} - {} ({:.0}%)\n",
                i + 1,
                o.task_type,
                o.description,
                o.confidence * 100.0
            ));
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationDecision {
    /// Confident enough to proceed without asking
    Resolved { task_type: TaskType, confidence: f64 },
    /// Waiting for the user
    Prompt(ConfirmationPrompt),
}

pub struct UserConfirmationHandler {
    pending: Mutex<AHashMap<String, ConfirmationPrompt>>,
    next_seq: Mutex<u64>,
    disambiguator: Arc<ContextDisambiguator>,
    config: ConfirmationConfig,
    clock: Arc<dyn Clock>,
}

impl UserConfirmationHandler {
    pub fn new(
        disambiguator: Arc<ContextDisambiguator>,
        config: ConfirmationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pending: Mutex::new(AHashMap::new()),
            next_seq: Mutex::new(0),
            disambiguator,
            config,
            clock,
        }
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.config.acceptance_threshold
    }

    /// Proceed directly when confident, otherwise open a prompt
    pub fn handle_ambiguous_command(
        &self,
        command: &str,
        player: Option<&str>,
        context: &TaskContext,
        result: &DisambiguationResult,
        draft: Option<TaskDraft>,
    ) -> ConfirmationDecision {
        if result.confidence >= self.config.acceptance_threshold {
            return ConfirmationDecision::Resolved {
                task_type: result.resolved_type,
                confidence: result.confidence,
            };
        }

        let options = self.build_options(command, result, draft.as_ref());
        let now = self.clock.now();
        let seq = {
            let mut next = self.next_seq.lock();
            *next += 1;
            *next
        };

        let prompt = ConfirmationPrompt {
            command: command.trim().to_string(),
            player: player.map(str::to_string),
            options,
            context: context.clone(),
            context_factors: result.context_factors.clone(),
            created_at: now,
            expires_at: now.saturating_add(self.config.expiry_ms),
            draft,
            seq,
        };

        let key = normalize_command(command);
        let mut pending = self.pending.lock();
        Self::purge_locked(&mut pending, now);
        if !pending.contains_key(&key) {
            while pending.len() >= self.config.max_pending.max(1) {
                let oldest = pending
                    .iter()
                    .min_by_key(|(_, p)| (p.created_at, p.seq))
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        pending.remove(&k);
                        tracing::debug!(command = %k, "oldest pending confirmation evicted");
                    }
                    None => break,
                }
            }
        }
        pending.insert(key, prompt.clone());

        tracing::info!(
            command = %prompt.command,
            options = prompt.options.len(),
            confidence = result.confidence,
            "confirmation requested"
        );
        ConfirmationDecision::Prompt(prompt)
    }

    fn build_options(
        &self,
        command: &str,
        result: &DisambiguationResult,
        draft: Option<&TaskDraft>,
    ) -> Vec<ConfirmationOption> {
        let describe = |t: TaskType| match draft {
            Some(d) if d.declared() == Some(t) && !d.description.is_empty() => d.description.clone(),
            _ => format!("treat \"{}\" as a {} task", command.trim(), t),
        };

        let mut options = vec![ConfirmationOption {
            task_type: result.resolved_type,
            description: describe(result.resolved_type),
            confidence: result.confidence,
            source: OptionSource::Resolved,
        }];

        for c in &result.candidates {
            options.push(ConfirmationOption {
                task_type: c.task_type,
                description: describe(c.task_type),
                confidence: c.combined,
                source: OptionSource::Candidate,
            });
        }

        for m in self.disambiguator.matching_history(command) {
            if !m.pattern.success {
                continue;
            }
            options.push(ConfirmationOption {
                task_type: m.pattern.resolved_type,
                description: describe(m.pattern.resolved_type),
                confidence: clamp_unit(m.relevance * m.similarity * self.config.historical_discount),
                source: OptionSource::Historical,
            });
        }

        // One option per type, keeping the most confident
        let mut best: Vec<ConfirmationOption> = Vec::new();
        for o in options {
            match best.iter_mut().find(|b| b.task_type == o.task_type) {
                Some(existing) if existing.confidence >= o.confidence => {}
                Some(existing) => *existing = o,
                None => best.push(o),
            }
        }
        best.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        best
    }

    /// Answer a pending prompt; returns it when the answer was accepted
    ///
    /// Nothing happens for a missing prompt, an expired one (which is also
    /// dropped) or a type that was not offered (the prompt stays pending).
    /// An accepted answer removes the prompt and records a successful
    /// historical pattern.
    pub fn confirm(
        &self,
        command: &str,
        selected: TaskType,
        context: &TaskContext,
    ) -> Option<ConfirmationPrompt> {
        let key = normalize_command(command);
        let now = self.clock.now();

        let prompt = {
            let mut pending = self.pending.lock();
            let prompt = pending.get(&key)?;
            if prompt.is_expired(now) {
                pending.remove(&key);
                tracing::debug!(command = %key, "confirmation expired");
                return None;
            }
            if !prompt.offers(selected) {
                tracing::debug!(command = %key, %selected, "confirmation for a type that was not offered");
                return None;
            }
            pending.remove(&key)?
        };

        let mut factors = prompt.context_factors.clone();
        factors.insert("current_state_relevance".into(), current_state_relevance(context));
        self.disambiguator
            .add_historical_pattern(&prompt.command, selected, true, factors);

        tracing::info!(command = %prompt.command, %selected, "confirmation accepted");
        Some(prompt)
    }

    pub fn process_confirmation(&self, command: &str, selected: TaskType, context: &TaskContext) -> bool {
        self.confirm(command, selected, context).is_some()
    }

    pub fn pending(&self, command: &str) -> Option<ConfirmationPrompt> {
        let now = self.clock.now();
        self.pending
            .lock()
            .get(&normalize_command(command))
            .filter(|p| !p.is_expired(now))
            .cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop expired prompts; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        Self::purge_locked(&mut self.pending.lock(), now)
    }

    fn purge_locked(pending: &mut AHashMap<String, ConfirmationPrompt>, now: Timestamp) -> usize {
        let before = pending.len();
        pending.retain(|_, p| !p.is_expired(now));
        let removed = before - pending.len();
        if removed > 0 {
            tracing::debug!(removed, "expired confirmations purged");
        }
        removed
    }
}
