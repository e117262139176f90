use std::collections::HashSet;

/// Minimum normalized-similarity score for a pairing to be proposed
/// automatically (§4.9). Below this, a remote driver is left unmapped and
/// logged for manual resolution.
pub const DEFAULT_MIN_SCORE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct ProposedPairing {
    pub remote_id: String,
    pub remote_name: String,
    pub local_id: String,
    pub local_name: String,
    pub score: f64,
}

fn normalize(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Greedily pairs each remote driver with its highest-scoring unclaimed local
/// candidate, provided the score clears `min_score`. Ties are broken by
/// whichever local candidate comes first in `local`; a local driver claimed
/// by one pairing is unavailable to later ones. Pure function — no I/O, no
/// persistence, so it can run deterministically in tests.
pub fn propose(
    remote: &[(String, String)],
    local: &[(String, String)],
    min_score: f64,
) -> Vec<ProposedPairing> {
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for (remote_id, remote_name) in remote {
        let norm_remote = normalize(remote_name);
        let mut best: Option<(f64, &(String, String))> = None;

        for candidate in local {
            if claimed.contains(candidate.0.as_str()) {
                continue;
            }
            let score = strsim::normalized_levenshtein(&norm_remote, &normalize(&candidate.1));
            if score < min_score {
                continue;
            }
            if best.as_ref().map(|(best_score, _)| score > *best_score).unwrap_or(true) {
                best = Some((score, candidate));
            }
        }

        if let Some((score, candidate)) = best {
            claimed.insert(candidate.0.as_str());
            out.push(ProposedPairing {
                remote_id: remote_id.clone(),
                remote_name: remote_name.clone(),
                local_id: candidate.0.clone(),
                local_name: candidate.1.clone(),
                score,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_exact_and_near_matches() {
        let remote = vec![
            ("r1".to_string(), "Joao Silva".to_string()),
            ("r2".to_string(), "Maria Souza".to_string()),
        ];
        let local = vec![
            ("l1".to_string(), "joao  silva".to_string()),
            ("l2".to_string(), "Maria Sousa".to_string()),
        ];
        let proposed = propose(&remote, &local, DEFAULT_MIN_SCORE);
        assert_eq!(proposed.len(), 2);
        assert_eq!(proposed[0].local_id, "l1");
        assert_eq!(proposed[1].local_id, "l2");
    }

    #[test]
    fn leaves_unmatched_below_threshold() {
        let remote = vec![("r1".to_string(), "Carlos Pereira".to_string())];
        let local = vec![("l1".to_string(), "Xyz Qrs".to_string())];
        assert!(propose(&remote, &local, DEFAULT_MIN_SCORE).is_empty());
    }

    #[test]
    fn does_not_claim_same_local_twice() {
        let remote = vec![
            ("r1".to_string(), "Ana Lima".to_string()),
            ("r2".to_string(), "Ana Lima".to_string()),
        ];
        let local = vec![("l1".to_string(), "Ana Lima".to_string())];
        let proposed = propose(&remote, &local, DEFAULT_MIN_SCORE);
        assert_eq!(proposed.len(), 1);
        assert_eq!(proposed[0].remote_id, "r1");
    }
}
