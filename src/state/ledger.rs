use std::time::Instant;

use indexmap::IndexSet;

/// Longest submission text accepted by the ledger, in characters.
pub const MAX_SUBMISSION_CHARS: usize = 200;

/// Voter bookkeeping for one submission.
///
/// The variant is chosen when the submission is created: normal cycles track
/// a deduplicated voter set, debug cycles keep a counter that may exceed the
/// set's cardinality so repeated votes remain visible in demos.
#[derive(Debug, Clone)]
pub enum VoteRecord {
    /// Deduplicated voter identities; the count is the set size.
    Tracked(IndexSet<String>),
    /// Voter identities plus an additive counter decoupled from the set.
    Counted {
        /// Every identity that voted at least once.
        voters: IndexSet<String>,
        /// Additive vote count, bumped on every vote including repeats.
        count: u32,
    },
}

impl VoteRecord {
    fn for_submitter(user_key: String, debug_mode: bool) -> Self {
        let mut voters = IndexSet::new();
        voters.insert(user_key);
        if debug_mode {
            VoteRecord::Counted { voters, count: 1 }
        } else {
            VoteRecord::Tracked(voters)
        }
    }

    /// Record one vote. Returns whether the record changed.
    fn add(&mut self, voter_key: String) -> bool {
        match self {
            VoteRecord::Tracked(voters) => voters.insert(voter_key),
            VoteRecord::Counted { voters, count } => {
                *count = (*count).max(voters.len() as u32) + 1;
                voters.insert(voter_key);
                true
            }
        }
    }

    /// Effective vote count for ranking and display.
    pub fn count(&self) -> u32 {
        match self {
            VoteRecord::Tracked(voters) => voters.len() as u32,
            VoteRecord::Counted { count, .. } => *count,
        }
    }

    /// Whether the given (already folded) identity is in the voter set.
    pub fn contains(&self, voter_key: &str) -> bool {
        match self {
            VoteRecord::Tracked(voters) | VoteRecord::Counted { voters, .. } => {
                voters.contains(voter_key)
            }
        }
    }
}

/// One accepted submission in the current cycle.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Display form of the submitter's name, as it arrived from chat.
    pub user: String,
    user_key: String,
    /// The suggested action text.
    pub text: String,
    /// Monotonic timestamp of the latest (re)submission.
    pub submitted_at: Instant,
    /// Recency ordinal: higher means more recently (re)submitted.
    pub seq: u64,
    /// Voter bookkeeping for this submission.
    pub votes: VoteRecord,
}

impl Submission {
    /// Effective vote count, honoring the debug counter when present.
    pub fn vote_count(&self) -> u32 {
        self.votes.count()
    }

    /// Case-folded identity of the submitter.
    pub fn user_key(&self) -> &str {
        &self.user_key
    }
}

/// In-memory collection of the current cycle's submissions and their voters.
///
/// Entries keep chat-arrival order; they are created while the phase is
/// `vote`, read during `combine`, and discarded when the next vote opens.
#[derive(Debug, Default)]
pub struct SubmissionLedger {
    entries: Vec<Submission>,
    next_seq: u64,
}

impl SubmissionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission. Returns whether the ledger changed.
    ///
    /// Empty and over-length texts are dropped silently. In normal mode a
    /// resubmission from the same user replaces the text and refreshes the
    /// recency while keeping the implicit self-vote; in debug mode every
    /// call appends a new entry.
    pub fn submit(&mut self, user: &str, text: &str, debug_mode: bool) -> bool {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_SUBMISSION_CHARS {
            return false;
        }

        let user_key = fold_user(user);
        if user_key.is_empty() {
            return false;
        }

        let seq = self.bump_seq();
        if !debug_mode
            && let Some(existing) = self
                .entries
                .iter_mut()
                .find(|entry| entry.user_key == user_key)
        {
            existing.text = text.to_string();
            existing.submitted_at = Instant::now();
            existing.seq = seq;
            existing.votes.add(user_key);
            return true;
        }

        self.entries.push(Submission {
            user: user.trim().to_string(),
            user_key: user_key.clone(),
            text: text.to_string(),
            submitted_at: Instant::now(),
            seq,
            votes: VoteRecord::for_submitter(user_key, debug_mode),
        });
        true
    }

    /// Record a vote for `target`'s submission. Returns whether anything
    /// changed: votes for unknown targets and duplicate votes in normal
    /// mode are no-ops.
    pub fn vote(&mut self, voter: &str, target: &str) -> bool {
        let target_key = fold_user(target);
        let voter_key = fold_user(voter);
        if voter_key.is_empty() {
            return false;
        }

        match self
            .entries
            .iter_mut()
            .find(|entry| entry.user_key == target_key)
        {
            Some(entry) => entry.votes.add(voter_key),
            None => false,
        }
    }

    /// Drop every entry, ready for the next cycle.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in chat-arrival order.
    pub fn entries(&self) -> &[Submission] {
        &self.entries
    }

    /// First `limit` entries in arrival order, for display purposes.
    pub fn snapshot(&self, limit: usize) -> &[Submission] {
        &self.entries[..limit.min(self.entries.len())]
    }

    /// Tally winner: highest vote count, ties broken by recency of
    /// submission.
    pub fn winner(&self) -> Option<&Submission> {
        self.entries
            .iter()
            .max_by_key(|entry| (entry.vote_count(), entry.seq))
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Case-fold a chat username into the ledger's identity key.
pub fn fold_user(user: &str) -> String {
    user.trim().to_lowercase()
}
