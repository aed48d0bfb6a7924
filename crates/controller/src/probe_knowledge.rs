// SPDX-License-Identifier: MIT

//! Static probe-category knowledge base backing `GET /scan/{id}/probes`:
//! severity, CWE/OWASP-LLM mappings, and mitigation text keyed by the
//! top-level probe category (spec §4.5 "probe_stats... category").

use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ProbeKnowledge {
    pub severity: &'static str,
    pub cwe_ids: &'static [&'static str],
    pub owasp_llm_tags: &'static [&'static str],
    pub mitigation: &'static str,
}

const UNKNOWN: ProbeKnowledge = ProbeKnowledge {
    severity: "medium",
    cwe_ids: &[],
    owasp_llm_tags: &[],
    mitigation: "Review failing attempts manually; no category-specific guidance available.",
};

static KNOWLEDGE: Lazy<HashMap<&'static str, ProbeKnowledge>> = Lazy::new(|| {
    HashMap::from([
        (
            "dan",
            ProbeKnowledge {
                severity: "high",
                cwe_ids: &["CWE-693"],
                owasp_llm_tags: &["LLM01"],
                mitigation: "Strengthen system-prompt adherence and add output filtering for jailbreak patterns.",
            },
        ),
        (
            "promptinject",
            ProbeKnowledge {
                severity: "high",
                cwe_ids: &["CWE-77"],
                owasp_llm_tags: &["LLM01"],
                mitigation: "Sanitize and isolate untrusted input from system instructions.",
            },
        ),
        (
            "leakreplay",
            ProbeKnowledge {
                severity: "high",
                cwe_ids: &["CWE-200"],
                owasp_llm_tags: &["LLM06"],
                mitigation: "Audit training data and add output-side sensitive-data detectors.",
            },
        ),
        (
            "xss",
            ProbeKnowledge {
                severity: "high",
                cwe_ids: &["CWE-79"],
                owasp_llm_tags: &["LLM02"],
                mitigation: "Encode generated output before rendering it in any HTML context.",
            },
        ),
        (
            "malwaregen",
            ProbeKnowledge {
                severity: "high",
                cwe_ids: &["CWE-506"],
                owasp_llm_tags: &["LLM09"],
                mitigation: "Block code-generation requests matching known malware-authoring intents.",
            },
        ),
        (
            "toxicity",
            ProbeKnowledge {
                severity: "medium",
                cwe_ids: &[],
                owasp_llm_tags: &["LLM09"],
                mitigation: "Layer a moderation model over generated responses.",
            },
        ),
        (
            "encoding",
            ProbeKnowledge {
                severity: "medium",
                cwe_ids: &["CWE-77"],
                owasp_llm_tags: &["LLM01"],
                mitigation: "Decode and re-validate inputs before they reach the system prompt.",
            },
        ),
        (
            "continuation",
            ProbeKnowledge {
                severity: "medium",
                cwe_ids: &[],
                owasp_llm_tags: &["LLM09"],
                mitigation: "Add refusal-consistency checks across multi-turn continuations.",
            },
        ),
        (
            "misleading",
            ProbeKnowledge {
                severity: "medium",
                cwe_ids: &[],
                owasp_llm_tags: &["LLM09"],
                mitigation: "Cross-check factual claims against a trusted retrieval source.",
            },
        ),
        (
            "glitch",
            ProbeKnowledge {
                severity: "low",
                cwe_ids: &[],
                owasp_llm_tags: &["LLM05"],
                mitigation: "Normalize tokenizer edge cases and add anomalous-token filtering.",
            },
        ),
    ])
});

pub fn lookup(category: &str) -> ProbeKnowledge {
    KNOWLEDGE.get(category).copied().unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_category_resolves() {
        let k = lookup("dan");
        assert_eq!(k.severity, "high");
        assert!(k.owasp_llm_tags.contains(&"LLM01"));
    }

    #[test]
    fn unknown_category_falls_back() {
        let k = lookup("totally-unrecognized-probe-family");
        assert_eq!(k.severity, UNKNOWN.severity);
    }
}
