// Prompt templates for the LLM-backed generation steps.
// Placeholders in `{braces}` are substituted with `str::replace` before sending.

/// System role for job description analysis.
pub const ANALYSIS_SYSTEM: &str = "You are an expert job description analyst and resume \
    strategist. You read a job description and describe what the hiring team is really \
    looking for.";

/// Analysis prompt. Replace `{target_title}` and `{jd_text}`.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyse the job description below for the target title "{target_title}".

Return a JSON object with this EXACT schema:
{
  "role_profile": {
    "inferred_level": "Director",
    "must_haves": ["Workday", "HRIS administration"],
    "nice_to_haves": ["SQL"],
    "seniority_signals": ["owns vendor relationships", "reports to CHRO"],
    "keyword_clusters": {"systems": ["Workday", "HCM"]},
    "recommended_storylines": ["Modernised HR systems at scale"],
    "priority_sections": ["Experience"],
    "downplay_sections": ["Education"]
  },
  "requirements": [
    {"id": "req-1", "text": "Workday implementation experience", "priority": "high", "keywords": ["Workday"]}
  ]
}

Rules:
- One requirement per distinct demand. Ids are "req-1", "req-2", ... and must be unique.
- priority is "high" for explicit must-haves, "medium" for core responsibilities, "low" for nice-to-haves.
- keywords are the exact terms an applicant tracking system would scan for.

Job description:
{jd_text}
"#;

/// System role for evidence mapping.
pub const MAPPING_SYSTEM: &str = "You are a meticulous career evidence analyst. You match \
    job requirements to verified evidence cards and never invent evidence.";

/// Mapping prompt. Replace `{requirements_json}`, `{evidence_json}` and `{synonyms_json}`.
pub const MAPPING_PROMPT_TEMPLATE: &str = r#"Match each requirement to the evidence cards that support it.

Requirements:
{requirements_json}

Evidence cards:
{evidence_json}

Synonyms (canonical term -> equivalent terms):
{synonyms_json}

Return a JSON object with this EXACT schema:
{
  "evidence_map": [
    {"requirement_id": "req-1", "evidence_card_ids": ["card-1"], "confidence": "high", "notes": "direct Workday rollout"}
  ],
  "gaps": [
    {
      "id": "gap-req-2",
      "requirement_id": "req-2",
      "requirement_text": "HRIS administration",
      "kind": "terminology-gap",
      "adjacent_evidence_ids": ["card-1"],
      "adjacent_confidence": "medium"
    }
  ],
  "selected_evidence_ids": ["card-1"]
}

Rules:
- Every requirement appears either in evidence_map with at least one card id, or in gaps.
- kind is one of:
  "true-gap" (nothing related exists),
  "terminology-gap" (the candidate has it under another name; use the synonyms),
  "hidden-evidence" (it exists but only in a card's raw text or background).
- Use ONLY card ids from the list above.
- selected_evidence_ids lists the cards the resume should draw on, strongest first.
"#;

/// System role for resume writing.
pub const WRITER_SYSTEM: &str = "You are an expert resume writer. You write concise, \
    specific, human-sounding bullets and you never claim anything the evidence does not say.";

/// Writer prompt. Replace `{target_title}`, `{max_pages}`, `{template}`, `{role_profile_json}`,
/// `{evidence_json}`, `{gaps_json}`, `{revision_block}`.
pub const WRITER_PROMPT_TEMPLATE: &str = r#"Write a resume targeting "{target_title}" that fits in {max_pages} page(s).

Section structure to follow:
{template}

Role profile:
{role_profile_json}

Evidence cards you may use (ONLY these):
{evidence_json}

Gaps and how to treat them:
{gaps_json}
{revision_block}
Return a JSON object with this EXACT schema:
{
  "sections": [
    {"name": "Experience", "content": "- Cut payroll processing time 40% by leading the Workday migration"}
  ],
  "claim_index": [
    {"bullet_id": "experience-1", "bullet_text": "Cut payroll processing time 40% by leading the Workday migration", "evidence_card_ids": ["card-1"]}
  ],
  "change_log": ["Led with the Workday migration to match the must-haves"]
}

Rules:
- Every bullet in every section has exactly one claim_index entry with the same text.
- evidence_card_ids is never empty and uses only ids from the evidence cards above.
- Gaps marked "omit" or "ask-user" are not mentioned. Gaps marked "use-adjacent-evidence" may be
  addressed using their adjacent evidence only.
"#;

/// Inserted into the writer prompt when a revision round is in progress.
pub const REVISION_BLOCK_TEMPLATE: &str = r#"
The previous draft failed the truth audit. These fixes are HARD CONSTRAINTS:
{directives}

Advisory ATS feedback (apply only where the evidence allows):
{suggestions}
"#;

/// Fallback section structure when no template file is given.
pub const DEFAULT_TEMPLATE: &str = "Summary\nExperience\nSkills\nEducation";

/// System role for truth verification.
pub const TRUTH_SYSTEM: &str = "You are a strict fact-checker. You compare resume bullets \
    against the evidence they cite and report every claim the evidence does not support.";

/// Truth prompt. Replace `{claims_json}` and `{evidence_json}`.
pub const TRUTH_PROMPT_TEMPLATE: &str = r#"Check every claim against the evidence cards it cites.

Claims:
{claims_json}

Evidence cards:
{evidence_json}

Return a JSON object with this EXACT schema:
{
  "truth_violations": [
    {"bullet_id": "experience-1", "bullet_text": "...", "violation": "evidence states 40%, bullet says 45%"}
  ],
  "inconsistencies": ["Summary says 10 years, experience covers 8"]
}

A violation is any number, title, scope, date or outcome that the cited cards do not state.
Wording changes that keep the facts are NOT violations. Return empty lists when everything holds.
"#;
