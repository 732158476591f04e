/// Policy that picks the next token from a logit vector.
///
/// The generation loop calls `reset` once per request, `select` once per
/// step and `accept` with every token it keeps.
pub trait TokenSelector: Send {
    fn name(&self) -> &str;

    /// Choose a token id, or `None` when no candidate survives (empty or
    /// all-NaN logits).
    fn select(&mut self, logits: &[f32]) -> Option<u32>;

    /// Record a token that became part of the output.
    fn accept(&mut self, _token: u32) {}

    /// Forget per-request state.
    fn reset(&mut self) {}
}
