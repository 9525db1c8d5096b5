//! Prompt templates for the four agents.
//!
//! Placeholders are written `{name}` and filled by [`render`]; JSON examples inside the templates
//! never match a placeholder name, so they pass through untouched.

pub const PLANNER_SYSTEM: &str =
    "You are a query analyzer for a legislative information service. Output valid JSON only.";

pub const PLANNER_PROMPT: &str = r#"Analyze the user question and classify it.

QUERY TYPES:
- factual: simple fact lookup (who, what, when)
- comparative: comparing parties, policies or positions
- timeline: chronological events or legislative history
- voting: parliamentary vote results or patterns
- analytical: analysis, explanation or "why" questions

RETRIEVAL STRATEGIES:
- single_focus: one search, for simple factual questions
- multi_entity: one search per entity, for comparisons
- chronological: date-filtered and time-ordered, for timelines
- broad: wider search with source diversity, for analysis

COMPONENT TYPES (pick the 1-4 that fit best):
text_block, chart, timeline, comparison, voting_breakdown, data_table, notice, member_profiles

RESPONSE DEPTH:
- brief: one or two sections
- standard: two to four sections
- comprehensive: four to eight sections

OUTPUT FORMAT:
{
  "query_type": "factual|comparative|timeline|voting|analytical",
  "entities": {
    "parties": ["party names mentioned or implied"],
    "members": ["member names"],
    "bills": ["bill or act names"],
    "topics": ["policy topics"],
    "date_from": "YYYY-MM-DD or null",
    "date_to": "YYYY-MM-DD or null",
    "document_types": ["bill", "hansard", "vote", "member", "report"]
  },
  "expected_components": ["text_block"],
  "retrieval_strategy": "single_focus|multi_entity|chronological|broad",
  "rewritten_queries": ["search-optimized query"],
  "confidence": 0.0,
  "response_depth": "brief|standard|comprehensive"
}

RULES:
1. Extract implicit entities too ("both major parties" names both parties).
2. Rewrite queries for vector search; one rewrite per entity for comparisons.
3. Lower the confidence (0.5-0.7) for ambiguous questions.
4. Always include text_block in expected_components.

Question: {query}

Respond with JSON only:"#;

pub const EXTRACTOR_SYSTEM: &str = "You are a data extractor. Extract only facts explicitly stated in the context. Output valid JSON only.";

pub const GROUNDING_RULES: &str = r#"GROUNDING RULES:
- Only extract values explicitly stated in the context.
- Use null for any field the text does not state.
- Never calculate, infer or estimate missing values.
- Do not use prior knowledge.
- Attach the exact source sentence for every extracted fact.
- When sources disagree, extract both values with their sources."#;

pub const VOTING_EXTRACTION: &str = r#"Extract voting data from the context below.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}

Extract JSON:
{
  "bill_name": "exact name or null",
  "vote_date": "YYYY-MM-DD or null",
  "result": "passed|rejected|tied or null",
  "votes_for": "number or null",
  "votes_against": "number or null",
  "total_abstentions": "number or null",
  "party_breakdown": [
    {"party": "exact party name", "votes_for": "number or null", "votes_against": "number or null", "abstentions": "number or null"}
  ],
  "source_quotes": ["exact sentence containing the data"],
  "completeness": 0.0,
  "warnings": ["missing critical fields"]
}

Respond with JSON only:"#;

pub const CHART_EXTRACTION: &str = r#"Extract numerical data suitable for a chart from the context.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}

Extract JSON:
{
  "chart_type": "bar|line|pie|horizontal_bar|stacked_bar",
  "title": "title describing the data",
  "series": [
    {"name": "series name", "data": [{"label": "category", "value": "number from text"}]}
  ],
  "x_axis_label": "label or null",
  "y_axis_label": "label or null",
  "source_quotes": ["sentences containing the numbers"],
  "completeness": 0.0,
  "warnings": ["data quality issues"]
}

Respond with JSON only:"#;

pub const TIMELINE_EXTRACTION: &str = r#"Extract chronological events from the context.

{grounding_rules}

ADDITIONAL RULES:
- Only include events with an explicit date in the text.
- Do not resolve relative phrases such as "last month".
- Order events oldest first.

Context:
{context}

Query focus: {query_focus}

Extract JSON:
{
  "title": "timeline title",
  "events": [
    {"date": "YYYY-MM-DD", "label": "short event name", "description": "wording from text", "source_quote": "exact sentence"}
  ],
  "source_quotes": ["sentences containing dates"],
  "completeness": 0.0,
  "warnings": ["events with unclear dates"]
}

Respond with JSON only:"#;

pub const COMPARISON_EXTRACTION: &str = r#"Extract comparison data for several entities from the context.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}
Entities to compare: {entities}

Extract JSON:
{
  "title": "comparison title",
  "items": [{"name": "entity name", "description": "short description or null"}],
  "attributes": [
    {"name": "attribute compared", "values": ["value for entity 1", "value for entity 2"]}
  ],
  "source_quotes": ["quotes supporting the comparison"],
  "completeness": 0.0,
  "warnings": ["entities with missing data"]
}

Respond with JSON only:"#;

pub const DATA_TABLE_EXTRACTION: &str = r#"Extract tabular data from the context.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}

Extract JSON:
{
  "title": "table title",
  "columns": [{"header": "column name", "key": "column_key"}],
  "rows": [{"column_key": "value from text"}],
  "source_quotes": ["sentences containing the rows"],
  "completeness": 0.0,
  "warnings": ["incomplete rows or columns"]
}

Respond with JSON only:"#;

pub const MEMBER_PROFILES_EXTRACTION: &str = r#"Extract information about members of parliament from the context.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}

Extract JSON:
{
  "title": "section title",
  "members": [
    {"name": "full name", "party": "party or null", "constituency": "electorate or null", "roles": ["role from text"], "source_quote": "sentence naming the member"}
  ],
  "source_quotes": ["key quotes about members"],
  "completeness": 0.0,
  "warnings": ["members with incomplete information"]
}

Respond with JSON only:"#;

pub const TEXT_BLOCK_EXTRACTION: &str = r#"Extract the key information for a short written summary from the context.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}

Extract JSON:
{
  "title": "section title or null",
  "key_points": [{"point": "key fact", "source_quote": "supporting quote"}],
  "summary_focus": "main topic of the text",
  "source_quotes": ["most relevant quotes"],
  "completeness": 0.0,
  "warnings": ["areas with too little information"]
}

Respond with JSON only:"#;

pub const NOTICE_EXTRACTION: &str = r#"Identify caveats, warnings or other important callouts in the context.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}

Extract JSON:
{
  "notices": [
    {"level": "info|warning|important", "title": "title or null", "message": "information from text", "source_quote": "exact sentence"}
  ],
  "completeness": 1.0,
  "warnings": []
}

Respond with JSON only:"#;

pub const GENERIC_EXTRACTION: &str = r#"Extract the information relevant to a "{component_type}" component from the context.

{grounding_rules}

Context:
{context}

Query focus: {query_focus}

Return one JSON object with the structured fields that component needs, plus:
- source_quotes: list of supporting quotes
- completeness: score between 0.0 and 1.0
- warnings: list of data issues

Respond with JSON only:"#;

pub const COMPOSER_SYSTEM: &str = "You are a response composer. You format extracted data into components and never add facts. Output valid JSON only.";

pub const COMPOSER_PROMPT: &str = r#"Format the pre-extracted data below into a structured response.

Every component value must come from the extracted data. Do not invent facts.

COMPONENT TYPES AND FIELDS:
- text_block: title, content (markdown)
- notice: level (info|warning|important), title, message
- chart: chart_type (bar|line|pie|doughnut|horizontal_bar|stacked_bar), title, series [{name, data [{label, value}]}], x_axis_label, y_axis_label
- timeline: title, events [{date, label, description}]
- comparison: title, items [{name, description}], attributes [{name, values}]
- data_table: title, columns [{header, key}], rows [{key: value}]
- member_profiles: title, members [{name, party, constituency, roles}]
- voting_breakdown: title, date, result (passed|rejected|tied), total_for, total_against, total_abstentions, party_breakdown [{party, votes_for, votes_against, abstentions}]
All counts and values must be JSON numbers, not strings.

LAYOUT RULES:
- Use "stack" by default; "grid" only for two complementary charts.
- Keep 1-3 components per section.
- Aim for {section_range} sections ({depth} response).

FORMATTING RULES:
1. Start with a text_block that gives context.
2. Use the source quotes to stay accurate.
3. Add a notice about limited data when an extraction has completeness below 0.5.
4. Consider an info notice when an extraction carries warnings.
5. Never add fields that are absent from the extracted data.

Question: {query}
Intent: {intent}
Extracted data:
{extracted_data}

OUTPUT FORMAT:
{
  "title": "title summarizing the answer",
  "subtitle": "one-line key finding",
  "sections": [
    {"title": "optional section title", "layout": "stack|grid", "components": [{"type": "text_block", "content": "..."}]}
  ]
}

Respond with JSON only:"#;

pub const VERIFIER_SYSTEM: &str =
    "You are a fact-checker. Compare every claim with the source context. Output valid JSON only.";

pub const VERIFIER_PROMPT: &str = r#"Check that the claims in the response are supported by the source context.

RULES:
1. Every factual claim needs supporting evidence in the context.
2. Numbers must match exactly; no rounding or estimation.
3. Dates must be stated explicitly, not inferred.
4. Party, member and bill names must match.
5. Flag opinions or characterizations the context does not support.

SEVERITY:
- error: numbers, vote counts or dates that do not match the context
- warning: characterizations, interpretations, minor discrepancies

SOURCE CONTEXT:
{context}

RESPONSE TO VERIFY:
{response}

OUTPUT FORMAT:
{
  "is_valid": true,
  "unsupported_claims": [
    {"claim_text": "the claim", "component_id": "id if known", "severity": "warning|error", "reason": "why it is unsupported"}
  ],
  "confidence_score": 0.0,
  "warnings": ["general remarks"]
}

Respond with JSON only:"#;

/// Joins retrieved chunks the way every agent sees them.
pub fn join_context(chunks: &[String]) -> String {
    chunks.join("\n\n---\n\n")
}

/// Replaces each `{key}` with its value.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |rendered, (key, value)| {
            rendered.replace(&format!("{{{key}}}"), value)
        })
}
