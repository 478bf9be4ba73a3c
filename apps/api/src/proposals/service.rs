//! Proposal orchestration.
//!
//! Flow for a topic request: resolve current subjects → cache lookup →
//! load config → generate → rank → drop acted-on proposals → cache → return.
//!
//! Same-session dismissals and shares are tracked in memory as well as in the
//! ledger, so they take effect even against a cache hit.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::interaction::InteractionAction;
use crate::models::proposal::{Candidate, ProposalConfig, ProposalConfigPatch, ProposalRef};
use crate::models::subject::{MessageExcerpt, Subject};
use crate::proposals::cache::{CacheKey, ProposalCache};
use crate::proposals::generator::{resolve_terms, ProposalGenerator};
use crate::proposals::ledger::InteractionLedger;
use crate::proposals::ranker::rank;
use crate::store::{load, persist, ObjectId, ObjectStore, StoreError, SubjectStore};

// ────────────────────────────────────────────────────────────────────────────
// Response models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TopicProposals {
    pub proposals: Vec<Candidate>,
    pub count: usize,
    pub cached: bool,
    pub compute_time_ms: u64,
}

impl TopicProposals {
    fn new(proposals: Vec<Candidate>, cached: bool, started: Instant) -> Self {
        Self {
            count: proposals.len(),
            proposals,
            cached,
            compute_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub config: ProposalConfig,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigUpdate {
    pub success: bool,
    pub config: ProposalConfig,
    pub version_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct DismissOutcome {
    pub success: bool,
    pub remaining_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedContent {
    pub subject_name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub messages: Option<Vec<MessageExcerpt>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareOutcome {
    pub success: bool,
    pub shared_content: Option<SharedContent>,
}

impl ShareOutcome {
    fn failed() -> Self {
        Self {
            success: false,
            shared_content: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewOutcome {
    pub success: bool,
    pub record_id: Option<ObjectId>,
}

// ────────────────────────────────────────────────────────────────────────────
// Session fast path
// ────────────────────────────────────────────────────────────────────────────

/// Proposals dismissed or shared during this process's lifetime.
#[derive(Default)]
struct SessionActions {
    hidden: Mutex<HashSet<(Uuid, ObjectId)>>,
}

impl SessionActions {
    fn insert(&self, user_id: Uuid, proposal_id: ObjectId) {
        self.hidden
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((user_id, proposal_id));
    }

    fn contains(&self, user_id: Uuid, proposal_id: &ObjectId) -> bool {
        self.hidden
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(user_id, proposal_id.clone()))
    }

    fn retain_visible(&self, user_id: Uuid, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let hidden = self.hidden.lock().unwrap_or_else(PoisonError::into_inner);
        candidates
            .into_iter()
            .filter(|c| !hidden.contains(&(user_id, c.proposal_id.clone())))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Service
// ────────────────────────────────────────────────────────────────────────────

pub struct ProposalService {
    subjects: Arc<dyn SubjectStore>,
    objects: Arc<dyn ObjectStore>,
    generator: ProposalGenerator,
    ledger: InteractionLedger,
    cache: ProposalCache,
    session: SessionActions,
}

impl ProposalService {
    pub fn new(
        subjects: Arc<dyn SubjectStore>,
        objects: Arc<dyn ObjectStore>,
        cache: ProposalCache,
    ) -> Self {
        Self {
            generator: ProposalGenerator::new(subjects.clone(), objects.clone()),
            ledger: InteractionLedger::new(objects.clone()),
            subjects,
            objects,
            cache,
            session: SessionActions::default(),
        }
    }

    pub async fn get_for_topic(
        &self,
        user_id: Uuid,
        conversation_id: &str,
        current_subject_ids: Option<Vec<ObjectId>>,
        force_refresh: bool,
    ) -> Result<TopicProposals, AppError> {
        require_id("conversation_id", conversation_id)?;
        let started = Instant::now();

        let subject_ids = match current_subject_ids {
            Some(ids) => ids,
            None => self
                .subjects
                .get_subjects(conversation_id)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect(),
        };
        if subject_ids.is_empty() {
            return Ok(TopicProposals::new(Vec::new(), false, started));
        }

        let key = CacheKey::new(user_id, conversation_id, &subject_ids);
        if !force_refresh {
            if let Some(cached) = self.cache.get(&key) {
                debug!("Proposal cache hit for conversation {conversation_id}");
                let proposals = self.session.retain_visible(user_id, cached);
                return Ok(TopicProposals::new(proposals, true, started));
            }
        }

        let config = self.effective_config(user_id).await;
        let current_terms = self.current_terms(&subject_ids).await;
        let candidates = self
            .generator
            .generate(conversation_id, &current_terms, &config, Utc::now())
            .await?;
        let ranked = rank(candidates, &config);
        let proposals = self.drop_acted_on(user_id, ranked).await;

        self.cache.set(key, proposals.clone());
        let result = TopicProposals::new(proposals, false, started);
        info!(
            "Computed {} proposals for conversation {conversation_id} in {}ms",
            result.count, result.compute_time_ms
        );
        Ok(result)
    }

    pub async fn get_config(&self, user_id: Uuid) -> Result<ConfigView, AppError> {
        Ok(match self.load_config(user_id).await? {
            Some(config) => ConfigView {
                config,
                is_default: false,
            },
            None => ConfigView {
                config: ProposalConfig::default_for(user_id),
                is_default: true,
            },
        })
    }

    /// Validates, persists a new config version and clears the whole cache.
    pub async fn update_config(
        &self,
        user_id: Uuid,
        patch: &ProposalConfigPatch,
    ) -> Result<ConfigUpdate, AppError> {
        let current = self
            .load_config(user_id)
            .await?
            .unwrap_or_else(|| ProposalConfig::default_for(user_id));
        let merged = current.merge(patch, Utc::now())?;

        let receipt = persist(
            self.objects.as_ref(),
            &ProposalConfig::identity(user_id),
            &merged,
        )
        .await?;
        self.cache.clear();

        info!(
            "Stored proposal config for user {user_id} version {}",
            receipt.version
        );
        Ok(ConfigUpdate {
            success: true,
            config: merged,
            version_id: receipt.version_id,
        })
    }

    pub async fn dismiss(
        &self,
        user_id: Uuid,
        proposal_id: &ObjectId,
        conversation_id: &str,
        past_subject_id: &ObjectId,
    ) -> Result<DismissOutcome, AppError> {
        check_proposal_ids(proposal_id, conversation_id, past_subject_id)?;

        let reference = self
            .proposal_reference(conversation_id, proposal_id, Some(past_subject_id))
            .await;
        let success = match self
            .commit_interaction(
                user_id,
                proposal_id,
                InteractionAction::Dismiss,
                conversation_id,
                reference,
                None,
            )
            .await
        {
            Ok(_) => {
                self.session.insert(user_id, proposal_id.clone());
                true
            }
            Err(e) => {
                warn!("Dismiss of {proposal_id} by user {user_id} not recorded: {e}");
                false
            }
        };

        let remaining_count = self.remaining_count(user_id, conversation_id).await;
        Ok(DismissOutcome {
            success,
            remaining_count,
        })
    }

    pub async fn share(
        &self,
        user_id: Uuid,
        proposal_id: &ObjectId,
        conversation_id: &str,
        past_subject_id: &ObjectId,
        include_messages: bool,
    ) -> Result<ShareOutcome, AppError> {
        check_proposal_ids(proposal_id, conversation_id, past_subject_id)?;

        let subject = match load::<Subject>(self.objects.as_ref(), past_subject_id).await {
            Ok(Some(subject)) => subject,
            Ok(None) => {
                return Err(AppError::SubjectNotFound(format!(
                    "Subject {past_subject_id} no longer exists"
                )))
            }
            Err(e) => {
                warn!("Share of {proposal_id} aborted: {e}");
                return Ok(ShareOutcome::failed());
            }
        };
        let resolved = match resolve_terms(self.objects.as_ref(), &subject).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Share of {proposal_id} aborted: {e}");
                return Ok(ShareOutcome::failed());
            }
        };
        if !resolved.missing.is_empty() {
            debug!(
                "Sharing subject {past_subject_id} with {} unresolved keyword(s)",
                resolved.missing.len()
            );
        }
        let keywords: Vec<String> = resolved.terms.into_iter().collect();

        let messages = if include_messages {
            match self
                .subjects
                .messages_in_ranges(&subject.conversation_id, &subject.time_ranges)
                .await
            {
                Ok(messages) => Some(messages),
                Err(e) => {
                    warn!("Sharing {past_subject_id} without messages: {e}");
                    None
                }
            }
        } else {
            None
        };

        let now = Utc::now();
        let reference = match self.cache.find_candidate(proposal_id) {
            Some(candidate) => ProposalRef::from_candidate(conversation_id, &candidate, now),
            None => fallback_reference(conversation_id, &subject, &keywords, now),
        };
        let metadata = json!({
            "keyword_count": keywords.len(),
            "include_messages": include_messages,
            "message_count": messages.as_ref().map_or(0, Vec::len),
        });

        if let Err(e) = self
            .commit_interaction(
                user_id,
                proposal_id,
                InteractionAction::Share,
                conversation_id,
                Some(reference),
                Some(metadata),
            )
            .await
        {
            warn!("Share of {proposal_id} by user {user_id} not recorded: {e}");
            return Ok(ShareOutcome::failed());
        }
        self.session.insert(user_id, proposal_id.clone());

        Ok(ShareOutcome {
            success: true,
            shared_content: Some(SharedContent {
                subject_name: subject.display_name(&keywords),
                description: subject.description.clone(),
                keywords,
                messages,
            }),
        })
    }

    /// Views are recorded for analytics only; they never hide a proposal.
    pub async fn view(
        &self,
        user_id: Uuid,
        proposal_id: &ObjectId,
        conversation_id: &str,
    ) -> Result<ViewOutcome, AppError> {
        require_id("proposal_id", proposal_id.as_str())?;
        require_id("conversation_id", conversation_id)?;

        let reference = self
            .proposal_reference(conversation_id, proposal_id, None)
            .await;
        match self
            .commit_interaction(
                user_id,
                proposal_id,
                InteractionAction::View,
                conversation_id,
                reference,
                None,
            )
            .await
        {
            Ok(record_id) => Ok(ViewOutcome {
                success: true,
                record_id: Some(record_id),
            }),
            Err(e) => {
                warn!("View of {proposal_id} by user {user_id} not recorded: {e}");
                Ok(ViewOutcome {
                    success: false,
                    record_id: None,
                })
            }
        }
    }

    // ── internals ───────────────────────────────────────────────────────────

    async fn load_config(&self, user_id: Uuid) -> Result<Option<ProposalConfig>, StoreError> {
        let id = self
            .objects
            .compute_deterministic_id(&ProposalConfig::identity(user_id));
        load(self.objects.as_ref(), &id).await
    }

    /// Stored config, or the defaults when none exists or the store is down.
    async fn effective_config(&self, user_id: Uuid) -> ProposalConfig {
        match self.load_config(user_id).await {
            Ok(Some(config)) => config,
            Ok(None) => ProposalConfig::default_for(user_id),
            Err(e) => {
                warn!("Using default proposal config for user {user_id}: {e}");
                ProposalConfig::default_for(user_id)
            }
        }
    }

    /// Union of the keyword terms of the given subjects. Unresolvable subjects
    /// are skipped.
    async fn current_terms(&self, subject_ids: &[ObjectId]) -> BTreeSet<String> {
        let mut terms = BTreeSet::new();
        for id in subject_ids {
            let subject = match load::<Subject>(self.objects.as_ref(), id).await {
                Ok(Some(subject)) => subject,
                Ok(None) => {
                    warn!("Current subject {id} not found");
                    continue;
                }
                Err(e) => {
                    warn!("Current subject {id} unavailable: {e}");
                    continue;
                }
            };
            match resolve_terms(self.objects.as_ref(), &subject).await {
                Ok(resolved) => terms.extend(resolved.terms),
                Err(e) => warn!("Keywords of current subject {id} unavailable: {e}"),
            }
        }
        terms
    }

    /// Session set first, then the persistent ledger. An unknown ledger answer
    /// keeps the proposal.
    async fn drop_acted_on(&self, user_id: Uuid, ranked: Vec<Candidate>) -> Vec<Candidate> {
        let mut visible = Vec::with_capacity(ranked.len());
        'candidates: for candidate in ranked {
            if self.session.contains(user_id, &candidate.proposal_id) {
                continue;
            }
            for action in InteractionAction::ALL.into_iter().filter(|a| a.hides_proposal()) {
                if self
                    .ledger
                    .has_action(user_id, &candidate.proposal_id, action)
                    .await
                    .is_performed()
                {
                    continue 'candidates;
                }
            }
            visible.push(candidate);
        }
        visible
    }

    async fn proposal_reference(
        &self,
        conversation_id: &str,
        proposal_id: &ObjectId,
        past_subject_id: Option<&ObjectId>,
    ) -> Option<ProposalRef> {
        let now = Utc::now();
        if let Some(candidate) = self.cache.find_candidate(proposal_id) {
            return Some(ProposalRef::from_candidate(conversation_id, &candidate, now));
        }
        let subject = load::<Subject>(self.objects.as_ref(), past_subject_id?)
            .await
            .ok()
            .flatten()?;
        let keywords: Vec<String> = resolve_terms(self.objects.as_ref(), &subject)
            .await
            .map(|r| r.terms.into_iter().collect())
            .unwrap_or_default();
        Some(fallback_reference(conversation_id, &subject, &keywords, now))
    }

    async fn commit_interaction(
        &self,
        user_id: Uuid,
        proposal_id: &ObjectId,
        action: InteractionAction,
        conversation_id: &str,
        reference: Option<ProposalRef>,
        metadata: Option<serde_json::Value>,
    ) -> Result<ObjectId, StoreError> {
        if let Some(reference) = reference {
            self.ledger.materialize_proposal(&reference).await?;
        }
        self.ledger
            .record_with_response(user_id, proposal_id, action, conversation_id, metadata)
            .await
    }

    async fn remaining_count(&self, user_id: Uuid, conversation_id: &str) -> usize {
        match self.get_for_topic(user_id, conversation_id, None, false).await {
            Ok(result) => result.count,
            Err(e) => {
                warn!("Could not count remaining proposals for {conversation_id}: {e}");
                0
            }
        }
    }
}

fn require_id(name: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} is required")));
    }
    Ok(())
}

/// The proposal id must be the one generation would have produced for this
/// conversation and past subject.
fn check_proposal_ids(
    proposal_id: &ObjectId,
    conversation_id: &str,
    past_subject_id: &ObjectId,
) -> Result<(), AppError> {
    require_id("proposal_id", proposal_id.as_str())?;
    require_id("conversation_id", conversation_id)?;
    require_id("past_subject_id", past_subject_id.as_str())?;

    let expected = ProposalRef::identity(conversation_id, past_subject_id, None).object_id();
    if &expected != proposal_id {
        return Err(AppError::Validation(format!(
            "proposal {proposal_id} does not match conversation {conversation_id} and subject {past_subject_id}"
        )));
    }
    Ok(())
}

fn fallback_reference(
    conversation_id: &str,
    subject: &Subject,
    keywords: &[String],
    now: DateTime<Utc>,
) -> ProposalRef {
    ProposalRef {
        conversation_id: conversation_id.to_string(),
        past_subject_id: subject.id.clone(),
        current_subject_id: None,
        matched_keywords: Vec::new(),
        relevance_score: 0.0,
        source_conversation_id: subject.conversation_id.clone(),
        past_subject_name: subject.display_name(keywords),
        created_at: now,
    }
}
