use std::collections::BTreeSet;

use casecast_core::{
    detect_evidence, detect_issues, EvidenceKeywords, IssueKeywords, IssueKind,
};

use crate::retriever::RetrievedChunk;

/// Weights over the rerank factors. Normalized to sum to 1 on construction.
#[derive(Debug, Clone, Copy)]
pub struct RerankWeights {
    pub issue_match: f32,
    pub temporal: f32,
    pub region: f32,
    pub evidence: f32,
    pub rrf: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            issue_match: 0.4,
            temporal: 0.2,
            region: 0.1,
            evidence: 0.2,
            rrf: 0.1,
        }
    }
}

impl RerankWeights {
    fn normalized(self) -> Self {
        let total = self.issue_match + self.temporal + self.region + self.evidence + self.rrf;
        if total <= 0.0 {
            return RerankWeights::default();
        }
        Self {
            issue_match: self.issue_match / total,
            temporal: self.temporal / total,
            region: self.region / total,
            evidence: self.evidence / total,
            rrf: self.rrf / total,
        }
    }
}

/// Domain-specific reranker for tribunal case retrieval.
///
/// Blends issue-type match, temporal recency, tribunal-region match and
/// evidence-type overlap with the fused retrieval score. Scores land in
/// [0,1]; ties break by higher year, then lower case reference.
pub struct Reranker {
    weights: RerankWeights,
    issue_keywords: IssueKeywords,
    evidence_keywords: EvidenceKeywords,
    current_year: i32,
}

impl Reranker {
    pub fn new(
        weights: RerankWeights,
        issue_keywords: IssueKeywords,
        evidence_keywords: EvidenceKeywords,
        current_year: i32,
    ) -> Self {
        Self {
            weights: weights.normalized(),
            issue_keywords,
            evidence_keywords,
            current_year,
        }
    }

    pub fn rerank(
        &self,
        mut candidates: Vec<RetrievedChunk>,
        query: &str,
        query_region: Option<&str>,
        top_k: usize,
    ) -> Vec<RetrievedChunk> {
        if candidates.is_empty() {
            return candidates;
        }

        let query_issues = detect_issues(query, &self.issue_keywords);
        let query_evidence = detect_evidence(query, &self.evidence_keywords);

        let (rrf_min, rrf_max) = candidates.iter().fold((f32::MAX, f32::MIN), |(lo, hi), c| {
            (lo.min(c.rrf_score), hi.max(c.rrf_score))
        });
        let rrf_span = rrf_max - rrf_min;

        for candidate in candidates.iter_mut() {
            let issue = self.issue_score(&query_issues, &candidate.text);
            let temporal = temporal_score(self.current_year, candidate.year);
            let region = region_score(query_region, candidate.region.as_deref());
            let evidence = self.evidence_score(&query_evidence, &candidate.text);
            let rrf_norm = if rrf_span > f32::EPSILON {
                (candidate.rrf_score - rrf_min) / rrf_span
            } else {
                1.0
            };

            let weights = &self.weights;
            candidate.final_score = (weights.issue_match * issue
                + weights.temporal * temporal
                + weights.region * region
                + weights.evidence * evidence
                + weights.rrf * rrf_norm)
                .clamp(0.0, 1.0);
            candidate.relevance = Some(self.explain(candidate, &query_issues, temporal, region));
        }

        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.year.cmp(&a.year))
                .then_with(|| a.case_reference.cmp(&b.case_reference))
        });
        candidates.truncate(top_k);
        candidates
    }

    /// Fraction of the query's detected issues whose keywords also appear in
    /// the chunk. Neutral 0.5 when the query carries no detectable issue.
    fn issue_score(&self, query_issues: &BTreeSet<IssueKind>, text: &str) -> f32 {
        if query_issues.is_empty() {
            return 0.5;
        }
        let chunk_issues = detect_issues(text, &self.issue_keywords);
        let matched = query_issues.intersection(&chunk_issues).count();
        matched as f32 / query_issues.len() as f32
    }

    /// Jaccard overlap of evidence-type mentions; neutral when neither side
    /// mentions evidence, partial credit when only one does.
    fn evidence_score(
        &self,
        query_evidence: &BTreeSet<casecast_core::EvidenceKind>,
        text: &str,
    ) -> f32 {
        let chunk_evidence = detect_evidence(text, &self.evidence_keywords);
        match (query_evidence.is_empty(), chunk_evidence.is_empty()) {
            (true, true) => 0.5,
            (true, false) | (false, true) => 0.3,
            (false, false) => {
                let intersection = query_evidence.intersection(&chunk_evidence).count();
                let union = query_evidence.union(&chunk_evidence).count();
                intersection as f32 / union as f32
            }
        }
    }

    fn explain(
        &self,
        candidate: &RetrievedChunk,
        query_issues: &BTreeSet<IssueKind>,
        temporal: f32,
        region: f32,
    ) -> String {
        let mut notes = Vec::new();
        let chunk_issues = detect_issues(&candidate.text, &self.issue_keywords);
        let matched: Vec<String> = query_issues
            .intersection(&chunk_issues)
            .map(|issue| issue.label())
            .collect();
        if !matched.is_empty() {
            notes.push(format!("Matches issues: {}", matched.join(", ")));
        }
        if temporal >= 0.9 {
            notes.push(format!("Recent case ({})", candidate.year));
        } else if temporal >= 0.7 {
            notes.push(format!("Relatively recent ({})", candidate.year));
        }
        if region >= 1.0 {
            if let Some(code) = candidate.region.as_deref() {
                notes.push(format!("Same region ({code})"));
            }
        }
        if candidate.semantic_score >= 0.7 {
            notes.push("Strong semantic similarity".to_string());
        } else if candidate.semantic_score >= 0.5 {
            notes.push("Good semantic match".to_string());
        }
        if candidate.bm25_rank.map(|r| r <= 5).unwrap_or(false) {
            notes.push("Strong keyword match".to_string());
        }
        if notes.is_empty() {
            notes.push("General relevance".to_string());
        }
        notes.join("; ")
    }
}

/// Recency decay by decision-year distance: flat for the newest cases, then
/// 0.05/year down to a 0.3 floor.
pub fn temporal_score(current_year: i32, year: i32) -> f32 {
    let diff = current_year - year;
    if diff <= 0 {
        1.0
    } else if diff <= 2 {
        0.9
    } else if diff <= 5 {
        0.7
    } else {
        (1.0 - diff as f32 * 0.05).max(0.3)
    }
}

/// 1.0 on exact region match, 0.0 otherwise.
pub fn region_score(query_region: Option<&str>, chunk_region: Option<&str>) -> f32 {
    match (query_region, chunk_region) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => 1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casecast_core::{default_evidence_keywords, default_issue_keywords, SectionKind};

    fn reranker() -> Reranker {
        Reranker::new(
            RerankWeights::default(),
            default_issue_keywords(),
            default_evidence_keywords(),
            2026,
        )
    }

    fn candidate(id: &str, text: &str, year: i32, region: &str, rrf: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.to_string(),
            case_reference: id.trim_end_matches("_0").to_string(),
            text: text.to_string(),
            section_kind: SectionKind::Reasoning,
            year,
            region: Some(region.to_string()),
            case_type: None,
            semantic_score: 0.5,
            semantic_rank: Some(1),
            bm25_score: 1.0,
            bm25_rank: Some(1),
            rrf_score: rrf,
            final_score: 0.0,
            relevance: None,
        }
    }

    #[test]
    fn issue_match_dominates() {
        let on_topic = candidate(
            "LON_00AA_HMF_2022_0001_0",
            "the deposit was not protected and section 213 applied",
            2022,
            "LON",
            0.01,
        );
        let off_topic = candidate(
            "LON_00AA_HMF_2022_0002_0",
            "the garden was overgrown at the end of the tenancy",
            2022,
            "LON",
            0.01,
        );
        let ranked = reranker().rerank(
            vec![off_topic, on_topic],
            "landlord failed deposit protection section 213",
            None,
            2,
        );
        assert_eq!(ranked[0].chunk_id, "LON_00AA_HMF_2022_0001_0");
        assert!(ranked[0].final_score > ranked[1].final_score);
    }

    #[test]
    fn same_region_breaks_equal_rrf() {
        let london = candidate("LON_00AA_HMF_2022_0001_0", "deposit case", 2022, "LON", 0.016);
        let chichester = candidate("CHI_00ML_HMF_2022_0002_0", "deposit case", 2022, "CHI", 0.016);
        let ranked = reranker().rerank(vec![chichester, london], "deposit", Some("LON"), 2);
        assert_eq!(ranked[0].region.as_deref(), Some("LON"));
    }

    #[test]
    fn newer_case_outranks_decade_old_tie() {
        let recent = candidate("LON_00AA_HMF_2023_0001_0", "deposit case", 2023, "LON", 0.016);
        let stale = candidate("LON_00AA_HMF_2013_0002_0", "deposit case", 2013, "LON", 0.016);
        let ranked = reranker().rerank(vec![stale, recent], "deposit", None, 2);
        assert_eq!(ranked[0].year, 2023);
    }

    #[test]
    fn near_recent_years_stay_close() {
        let a = candidate("LON_00AA_HMF_2023_0001_0", "deposit case", 2023, "LON", 0.016);
        let b = candidate("LON_00AA_HMF_2020_0002_0", "deposit case", 2020, "LON", 0.016);
        let ranked = reranker().rerank(vec![a, b], "deposit", None, 2);
        let gap = (ranked[0].final_score - ranked[1].final_score).abs();
        assert!(gap <= 0.04, "rerank gap {gap} too wide");
    }

    #[test]
    fn temporal_decay_shape() {
        assert_eq!(temporal_score(2026, 2026), 1.0);
        assert_eq!(temporal_score(2026, 2025), 0.9);
        assert_eq!(temporal_score(2026, 2022), 0.7);
        assert!((temporal_score(2026, 2018) - 0.6).abs() < 1e-6);
        assert_eq!(temporal_score(2026, 2000), 0.3);
    }

    #[test]
    fn region_score_is_binary() {
        assert_eq!(region_score(Some("LON"), Some("lon")), 1.0);
        assert_eq!(region_score(Some("LON"), Some("CHI")), 0.0);
        assert_eq!(region_score(None, Some("LON")), 0.0);
    }

    #[test]
    fn neutral_issue_score_without_query_issues() {
        let ranked = reranker().rerank(
            vec![candidate("a_0", "plain text", 2022, "LON", 0.01)],
            "no recognisable topic words",
            None,
            1,
        );
        // issue 0.5, temporal 0.7, region 0, evidence 0.5, rrf 1.0 (degenerate span)
        let expected = 0.4 * 0.5 + 0.2 * 0.7 + 0.0 + 0.2 * 0.5 + 0.1 * 1.0;
        assert!((ranked[0].final_score - expected).abs() < 1e-4);
    }

    #[test]
    fn explanations_name_matched_issues() {
        let ranked = reranker().rerank(
            vec![candidate(
                "a_0",
                "the unprotected deposit led to a section 214 penalty",
                2025,
                "LON",
                0.01,
            )],
            "deposit protection claim",
            Some("LON"),
            1,
        );
        let note = ranked[0].relevance.as_deref().unwrap();
        assert!(note.contains("deposit protection"));
        assert!(note.contains("Same region"));
    }
}
