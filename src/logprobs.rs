use serde::{Deserialize, Serialize};

/// One candidate token as it appears on the wire: `[[token_id], [before, after]]`
/// where `before` is the log-probability prior to repetition penalties and
/// samplers, and `after` is the post-adjustment value. Either side may be null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenLogprob(pub (u32,), pub (Option<f64>, Option<f64>));

impl TokenLogprob {
    pub fn id(&self) -> u32 {
        self.0.0
    }

    pub fn before(&self) -> f64 {
        self.1.0.unwrap_or(f64::NEG_INFINITY)
    }

    pub fn after(&self) -> f64 {
        self.1.1.unwrap_or(f64::NEG_INFINITY)
    }
}

/// Per-token logprob payload from the provider: the chosen token (always one
/// entry), the top candidates before sampler adjustment, and the candidates
/// that survived adjustment (possibly fewer).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLogprobs {
    #[serde(default)]
    pub chosen: Vec<TokenLogprob>,
    #[serde(default)]
    pub before: Vec<TokenLogprob>,
    #[serde(default)]
    pub after: Vec<TokenLogprob>,
}

/// Merged logprob data for one generated token. Candidates are keyed by token
/// id; text decoding is the caller's business.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLogprobs {
    pub token: u32,
    pub top_logprobs: Vec<(u32, f64)>,
}

/// Reconciles the before/after candidate lists into one map of final
/// log-probabilities. Starts from the post-adjustment list; any candidate seen
/// before adjustment but missing afterwards was driven to zero probability by
/// a sampler and comes back as negative infinity. The chosen token is appended
/// when it was not among the top candidates at all. The chosen id is always
/// present in the result and no id appears twice.
pub fn merge_logprobs(raw: &RawLogprobs) -> Option<TokenLogprobs> {
    let chosen = raw.chosen.first()?;

    let mut merged: Vec<(u32, f64)> = Vec::with_capacity(raw.before.len() + 1);
    for candidate in &raw.after {
        if !merged.iter().any(|(id, _)| *id == candidate.id()) {
            merged.push((candidate.id(), candidate.after()));
        }
    }
    for candidate in &raw.before {
        if !merged.iter().any(|(id, _)| *id == candidate.id()) {
            merged.push((candidate.id(), f64::NEG_INFINITY));
        }
    }
    if !merged.iter().any(|(id, _)| *id == chosen.id()) {
        merged.push((chosen.id(), chosen.after()));
    }

    Some(TokenLogprobs {
        token: chosen.id(),
        top_logprobs: merged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, before: f64, after: f64) -> TokenLogprob {
        TokenLogprob((id,), (Some(before), Some(after)))
    }

    #[test]
    fn wire_format_round_trips() {
        let raw: RawLogprobs = serde_json::from_str(
            r#"{"chosen": [[[42], [-0.1, -0.2]]],
                "before": [[[42], [-0.1, -0.2]], [[7], [-1.5, null]]],
                "after": [[[42], [-0.1, -0.2]]]}"#,
        )
        .unwrap();
        assert_eq!(raw.chosen[0].id(), 42);
        assert_eq!(raw.before[1].id(), 7);
        assert_eq!(raw.before[1].after(), f64::NEG_INFINITY);
    }

    #[test]
    fn chosen_id_always_present() {
        // Chosen token outside the top candidates entirely.
        let raw = RawLogprobs {
            chosen: vec![entry(999, -8.0, -7.5)],
            before: vec![entry(1, -0.5, -0.4), entry(2, -1.0, -0.9)],
            after: vec![entry(1, -0.5, -0.4)],
        };
        let merged = merge_logprobs(&raw).unwrap();
        assert_eq!(merged.token, 999);
        assert!(merged.top_logprobs.contains(&(999, -7.5)));
    }

    #[test]
    fn before_only_ids_become_neg_infinity() {
        let raw = RawLogprobs {
            chosen: vec![entry(1, -0.5, -0.4)],
            before: vec![entry(1, -0.5, -0.4), entry(2, -1.0, -0.9), entry(3, -2.0, -1.8)],
            after: vec![entry(1, -0.5, -0.4)],
        };
        let merged = merge_logprobs(&raw).unwrap();
        assert!(merged.top_logprobs.contains(&(2, f64::NEG_INFINITY)));
        assert!(merged.top_logprobs.contains(&(3, f64::NEG_INFINITY)));
        // Survivors keep their post-adjustment value.
        assert!(merged.top_logprobs.contains(&(1, -0.4)));
    }

    #[test]
    fn no_duplicate_ids() {
        let raw = RawLogprobs {
            chosen: vec![entry(1, -0.5, -0.4)],
            before: vec![entry(1, -0.5, -0.4), entry(2, -1.0, -0.9)],
            after: vec![entry(1, -0.5, -0.4), entry(2, -1.0, -0.9)],
        };
        let merged = merge_logprobs(&raw).unwrap();
        let mut ids: Vec<u32> = merged.top_logprobs.iter().map(|(id, _)| *id).collect();
        let before_dedup = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before_dedup);
    }

    #[test]
    fn after_order_is_preserved() {
        let raw = RawLogprobs {
            chosen: vec![entry(2, -1.0, -0.9)],
            before: vec![entry(5, -3.0, -2.5), entry(1, -0.5, -0.4)],
            after: vec![entry(1, -0.5, -0.4), entry(2, -1.0, -0.9)],
        };
        let merged = merge_logprobs(&raw).unwrap();
        assert_eq!(
            merged.top_logprobs,
            vec![(1, -0.4), (2, -0.9), (5, f64::NEG_INFINITY)]
        );
    }

    #[test]
    fn empty_chosen_yields_nothing() {
        let raw = RawLogprobs::default();
        assert!(merge_logprobs(&raw).is_none());
    }
}
