/// One token submitted for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    pub token: u32,
    pub pos: usize,
    /// Sequence slot the token belongs to.
    pub seq: usize,
    /// Whether logits are produced for this entry.
    pub logits: bool,
}

/// Ordered tokens for one `EvalContext::decode` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn new(capacity: usize) -> Self {
        Batch {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Prompt batch: `tokens` at consecutive positions from `start_pos`,
    /// logits requested for the last entry only.
    pub fn prefill(tokens: &[u32], start_pos: usize, seq: usize) -> Self {
        let mut batch = Batch::new(tokens.len());
        let last = tokens.len().saturating_sub(1);
        for (i, &token) in tokens.iter().enumerate() {
            batch.add(token, start_pos + i, seq, i == last);
        }
        batch
    }

    /// Single token requesting logits.
    pub fn single(token: u32, pos: usize, seq: usize) -> Self {
        let mut batch = Batch::new(1);
        batch.add(token, pos, seq, true);
        batch
    }

    pub fn add(&mut self, token: u32, pos: usize, seq: usize, logits: bool) {
        self.entries.push(BatchEntry {
            token,
            pos,
            seq,
            logits,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Number of entries requesting logits.
    pub fn n_outputs(&self) -> usize {
        self.entries.iter().filter(|e| e.logits).count()
    }
}
