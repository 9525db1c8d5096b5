use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Component type tag as planned, extracted and rendered.
///
/// Tags outside the eight known variants are kept as `Other` so the extractor can still run its
/// generic template for them; the composer drops them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ComponentType {
    TextBlock,
    Notice,
    Chart,
    Timeline,
    Comparison,
    DataTable,
    MemberProfiles,
    VotingBreakdown,
    Other(String),
}

// Keys are already case-folded with hyphens turned into underscores.
const TYPE_ALIASES: &[(&str, &str)] = &[
    ("text", "text_block"),
    ("textblock", "text_block"),
    ("paragraph", "text_block"),
    ("voting", "voting_breakdown"),
    ("vote", "voting_breakdown"),
    ("vote_breakdown", "voting_breakdown"),
    ("votes", "voting_breakdown"),
    ("table", "data_table"),
    ("datatable", "data_table"),
    ("compare", "comparison"),
    ("members", "member_profiles"),
    ("member", "member_profiles"),
    ("profiles", "member_profiles"),
    ("memberprofiles", "member_profiles"),
    ("graph", "chart"),
    ("bar_chart", "chart"),
    ("pie_chart", "chart"),
    ("line_chart", "chart"),
    ("events", "timeline"),
    ("history", "timeline"),
    ("alert", "notice"),
    ("warning", "notice"),
    ("info", "notice"),
];

impl ComponentType {
    pub const KNOWN: [ComponentType; 8] = [
        ComponentType::TextBlock,
        ComponentType::Notice,
        ComponentType::Chart,
        ComponentType::Timeline,
        ComponentType::Comparison,
        ComponentType::DataTable,
        ComponentType::MemberProfiles,
        ComponentType::VotingBreakdown,
    ];

    /// Case-folds, maps hyphens to underscores and resolves aliases such as `vote` or `table`.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace('-', "_");
        let canonical = TYPE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map_or(normalized.as_str(), |(_, target)| *target);

        match canonical {
            "text_block" => Self::TextBlock,
            "notice" => Self::Notice,
            "chart" => Self::Chart,
            "timeline" => Self::Timeline,
            "comparison" => Self::Comparison,
            "data_table" => Self::DataTable,
            "member_profiles" => Self::MemberProfiles,
            "voting_breakdown" => Self::VotingBreakdown,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::TextBlock => "text_block",
            Self::Notice => "notice",
            Self::Chart => "chart",
            Self::Timeline => "timeline",
            Self::Comparison => "comparison",
            Self::DataTable => "data_table",
            Self::MemberProfiles => "member_profiles",
            Self::VotingBreakdown => "voting_breakdown",
            Self::Other(tag) => tag,
        }
    }

    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for ComponentType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ComponentType> for String {
    fn from(value: ComponentType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    #[default]
    Info,
    Warning,
    Important,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Pie,
    Doughnut,
    HorizontalBar,
    StackedBar,
}

impl ChartType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "bar" => Some(Self::Bar),
            "line" => Some(Self::Line),
            "pie" => Some(Self::Pie),
            "doughnut" => Some(Self::Doughnut),
            "horizontal_bar" => Some(Self::HorizontalBar),
            "stacked_bar" => Some(Self::StackedBar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteResult {
    Passed,
    Rejected,
    Tied,
}

impl VoteResult {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "passed" => Some(Self::Passed),
            "rejected" => Some(Self::Rejected),
            "tied" => Some(Self::Tied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub chart_type: ChartType,
    pub title: Option<String>,
    pub series: Vec<ChartSeries>,
    pub x_axis_label: Option<String>,
    pub y_axis_label: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: String,
    pub label: String,
    pub description: Option<String>,
    pub reference_url: Option<String>,
    /// 1 (minor) to 5 (major).
    pub significance: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub title: Option<String>,
    pub events: Vec<TimelineEvent>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonItem {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonAttribute {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub title: Option<String>,
    pub items: Vec<ComparisonItem>,
    pub attributes: Vec<ComparisonAttribute>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub header: String,
    pub key: String,
    pub sortable: bool,
    pub align: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub title: Option<String>,
    pub columns: Vec<TableColumn>,
    pub rows: Vec<BTreeMap<String, String>>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub member_id: String,
    pub name: String,
    pub party: String,
    pub constituency: Option<String>,
    pub roles: Vec<String>,
    pub photo_url: Option<String>,
    pub biography: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfiles {
    pub title: Option<String>,
    pub members: Vec<MemberProfile>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyVote {
    pub party: String,
    pub votes_for: u32,
    pub votes_against: u32,
    pub abstentions: u32,
    pub not_voting: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingBreakdown {
    pub title: Option<String>,
    pub date: Option<String>,
    pub result: Option<VoteResult>,
    pub total_for: u32,
    pub total_against: u32,
    pub total_abstentions: u32,
    pub party_breakdown: Vec<PartyVote>,
    pub caption: Option<String>,
}

/// Variant payloads, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentBody {
    TextBlock(TextBlock),
    Notice(Notice),
    Chart(Chart),
    Timeline(Timeline),
    Comparison(Comparison),
    DataTable(DataTable),
    MemberProfiles(MemberProfiles),
    VotingBreakdown(VotingBreakdown),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    #[serde(flatten)]
    pub body: ComponentBody,
}

impl Component {
    pub fn new(body: ComponentBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body,
        }
    }

    pub fn text_block(title: Option<String>, content: impl Into<String>) -> Self {
        Self::new(ComponentBody::TextBlock(TextBlock {
            title,
            content: content.into(),
        }))
    }

    pub fn notice(level: NoticeLevel, title: Option<String>, message: impl Into<String>) -> Self {
        Self::new(ComponentBody::Notice(Notice {
            level,
            title,
            message: message.into(),
        }))
    }

    pub fn component_type(&self) -> ComponentType {
        match &self.body {
            ComponentBody::TextBlock(_) => ComponentType::TextBlock,
            ComponentBody::Notice(_) => ComponentType::Notice,
            ComponentBody::Chart(_) => ComponentType::Chart,
            ComponentBody::Timeline(_) => ComponentType::Timeline,
            ComponentBody::Comparison(_) => ComponentType::Comparison,
            ComponentBody::DataTable(_) => ComponentType::DataTable,
            ComponentBody::MemberProfiles(_) => ComponentType::MemberProfiles,
            ComponentBody::VotingBreakdown(_) => ComponentType::VotingBreakdown,
        }
    }

    /// Builds a component from a loosely shaped model object.
    ///
    /// Returns `None` for unknown types. Numeric fields accept numbers or numeric strings and
    /// always come out as numbers.
    pub fn from_model_value(value: &Value) -> Option<Self> {
        let raw_type = text(value, "type").unwrap_or_default();
        let body = match ComponentType::parse(&raw_type) {
            ComponentType::TextBlock => ComponentBody::TextBlock(TextBlock {
                title: text(value, "title"),
                content: text(value, "content").unwrap_or_default(),
            }),
            ComponentType::Notice => ComponentBody::Notice(Notice {
                level: match text(value, "level").as_deref() {
                    Some("warning") => NoticeLevel::Warning,
                    Some("important") => NoticeLevel::Important,
                    _ => NoticeLevel::Info,
                },
                title: text(value, "title"),
                message: text(value, "message").unwrap_or_default(),
            }),
            ComponentType::Chart => ComponentBody::Chart(Chart {
                chart_type: text(value, "chart_type")
                    .and_then(|raw| ChartType::parse(&raw))
                    .unwrap_or_default(),
                title: text(value, "title"),
                series: objects(value, "series")
                    .map(|series| ChartSeries {
                        name: text(series, "name").unwrap_or_default(),
                        data: objects(series, "data")
                            .map(|point| ChartPoint {
                                label: text(point, "label").unwrap_or_default(),
                                value: number(point, "value").unwrap_or(0.0),
                                category: text(point, "category"),
                            })
                            .collect(),
                    })
                    .collect(),
                x_axis_label: text(value, "x_axis_label"),
                y_axis_label: text(value, "y_axis_label"),
                caption: text(value, "caption"),
            }),
            ComponentType::Timeline => ComponentBody::Timeline(Timeline {
                title: text(value, "title"),
                events: objects(value, "events")
                    .map(|event| TimelineEvent {
                        date: text(event, "date").unwrap_or_default(),
                        label: text(event, "label").unwrap_or_default(),
                        description: text(event, "description"),
                        reference_url: text(event, "reference_url"),
                        significance: number(event, "significance")
                            .map_or(3, |s| s.round().clamp(1.0, 5.0) as u8),
                    })
                    .collect(),
                caption: text(value, "caption"),
            }),
            ComponentType::Comparison => ComponentBody::Comparison(Comparison {
                title: text(value, "title"),
                items: objects(value, "items")
                    .map(|item| ComparisonItem {
                        name: text(item, "name").unwrap_or_default(),
                        description: text(item, "description"),
                    })
                    .collect(),
                attributes: objects(value, "attributes")
                    .map(|attribute| ComparisonAttribute {
                        name: text(attribute, "name").unwrap_or_default(),
                        values: texts(attribute, "values"),
                    })
                    .collect(),
                caption: text(value, "caption"),
            }),
            ComponentType::DataTable => ComponentBody::DataTable(DataTable {
                title: text(value, "title"),
                columns: objects(value, "columns")
                    .map(|column| TableColumn {
                        header: text(column, "header").unwrap_or_default(),
                        key: text(column, "key").unwrap_or_default(),
                        sortable: column
                            .get("sortable")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                        align: text(column, "align").unwrap_or_else(|| "left".to_string()),
                    })
                    .collect(),
                rows: objects(value, "rows")
                    .filter_map(Value::as_object)
                    .map(|row| {
                        row.iter()
                            .filter_map(|(key, cell)| scalar_text(cell).map(|v| (key.clone(), v)))
                            .collect()
                    })
                    .collect(),
                caption: text(value, "caption"),
            }),
            ComponentType::MemberProfiles => ComponentBody::MemberProfiles(MemberProfiles {
                title: text(value, "title"),
                members: objects(value, "members")
                    .map(|member| MemberProfile {
                        member_id: text(member, "member_id").unwrap_or_default(),
                        name: text(member, "name").unwrap_or_default(),
                        party: text(member, "party").unwrap_or_default(),
                        constituency: text(member, "constituency"),
                        roles: texts(member, "roles"),
                        photo_url: text(member, "photo_url"),
                        biography: text(member, "biography"),
                        profile_url: text(member, "profile_url"),
                    })
                    .collect(),
                caption: text(value, "caption"),
            }),
            ComponentType::VotingBreakdown => ComponentBody::VotingBreakdown(VotingBreakdown {
                title: text(value, "title"),
                date: text(value, "date").or_else(|| text(value, "vote_date")),
                result: text(value, "result").and_then(|raw| VoteResult::parse(&raw)),
                total_for: count(value, &["total_for", "votes_for"]),
                total_against: count(value, &["total_against", "votes_against"]),
                total_abstentions: count(value, &["total_abstentions"]),
                party_breakdown: objects(value, "party_breakdown")
                    .map(|party| PartyVote {
                        party: text(party, "party").unwrap_or_default(),
                        votes_for: count(party, &["votes_for"]),
                        votes_against: count(party, &["votes_against"]),
                        abstentions: count(party, &["abstentions"]),
                        not_voting: count(party, &["not_voting"]),
                    })
                    .collect(),
                caption: text(value, "caption"),
            }),
            ComponentType::Other(_) => return None,
        };
        Some(Self::new(body))
    }

    /// Every human-readable string the component displays, in reading order.
    pub fn claim_texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut push = |value: &str| {
            if !value.trim().is_empty() {
                out.push(value.to_string());
            }
        };
        match &self.body {
            ComponentBody::TextBlock(block) => push(&block.content),
            ComponentBody::Notice(notice) => push(&notice.message),
            ComponentBody::Chart(chart) => {
                for series in &chart.series {
                    for point in &series.data {
                        push(&format!(
                            "{} {}: {}",
                            series.name,
                            point.label,
                            format_number(point.value)
                        ));
                    }
                }
            }
            ComponentBody::Timeline(timeline) => {
                for event in &timeline.events {
                    push(&format!("{} {}", event.date, event.label));
                    if let Some(description) = &event.description {
                        push(description);
                    }
                }
            }
            ComponentBody::Comparison(comparison) => {
                for attribute in &comparison.attributes {
                    push(&format!(
                        "{}: {}",
                        attribute.name,
                        attribute.values.join(" | ")
                    ));
                }
            }
            ComponentBody::DataTable(table) => {
                for row in &table.rows {
                    push(&row.values().cloned().collect::<Vec<_>>().join(" | "));
                }
            }
            ComponentBody::MemberProfiles(profiles) => {
                for member in &profiles.members {
                    push(&format!("{} ({})", member.name, member.party));
                }
            }
            ComponentBody::VotingBreakdown(vote) => {
                push(&format!(
                    "{} votes for, {} votes against, {} abstentions",
                    vote.total_for, vote.total_against, vote.total_abstentions
                ));
                if let Some(date) = &vote.date {
                    push(date);
                }
                for party in &vote.party_breakdown {
                    push(&format!(
                        "{}: {} for, {} against",
                        party.party, party.votes_for, party.votes_against
                    ));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionLayout {
    #[default]
    Stack,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: Option<String>,
    pub component_ids: Vec<String>,
    pub layout: SectionLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub title: String,
    pub subtitle: Option<String>,
    pub sections: Vec<Section>,
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn texts(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(scalar_text).collect())
        .unwrap_or_default()
}

fn objects<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|item| item.is_object())
}

/// Reads a number, accepting numeric strings such as `"1,204"`.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(coerce_number)
}

fn count(value: &Value, keys: &[&str]) -> u32 {
    keys.iter()
        .find_map(|key| number(value, key))
        .map_or(0, |n| n.round().clamp(0.0, f64::from(u32::MAX)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aliases_and_spelling_variants_normalize() {
        assert_eq!(ComponentType::parse("Vote"), ComponentType::VotingBreakdown);
        assert_eq!(ComponentType::parse("data-table"), ComponentType::DataTable);
        assert_eq!(
            ComponentType::parse(" TEXT-BLOCK "),
            ComponentType::TextBlock
        );
        assert_eq!(ComponentType::parse("table"), ComponentType::DataTable);
        assert_eq!(
            ComponentType::parse("map"),
            ComponentType::Other("map".to_string())
        );
        assert!(!ComponentType::parse("map").is_known());
    }

    #[test]
    fn component_type_serializes_as_tag() {
        let encoded = serde_json::to_string(&vec![ComponentType::MemberProfiles]).unwrap();
        assert_eq!(encoded, r#"["member_profiles"]"#);
        let decoded: Vec<ComponentType> = serde_json::from_str(r#"["votes","chart"]"#).unwrap();
        assert_eq!(
            decoded,
            vec![ComponentType::VotingBreakdown, ComponentType::Chart]
        );
    }

    #[test]
    fn numeric_strings_become_numbers() {
        let component = Component::from_model_value(&json!({
            "type": "vote",
            "title": "Third reading",
            "result": "passed",
            "total_for": "310",
            "total_against": 1_204,
            "party_breakdown": [{"party": "Labor", "votes_for": "77", "votes_against": null}]
        }))
        .expect("known type");

        let ComponentBody::VotingBreakdown(vote) = &component.body else {
            panic!("expected a voting breakdown");
        };
        assert_eq!(vote.total_for, 310);
        assert_eq!(vote.total_against, 1204);
        assert_eq!(vote.result, Some(VoteResult::Passed));
        assert_eq!(vote.party_breakdown[0].votes_for, 77);
        assert_eq!(vote.party_breakdown[0].votes_against, 0);

        let encoded = serde_json::to_value(&component).unwrap();
        assert_eq!(encoded["type"], "voting_breakdown");
        assert_eq!(encoded["total_for"], 310);
        assert_eq!(encoded["id"], component.id);
    }

    #[test]
    fn chart_values_and_type_fall_back() {
        let component = Component::from_model_value(&json!({
            "type": "bar_chart",
            "chart_type": "radar",
            "series": [{"name": "Seats", "data": [{"label": "Labor", "value": "94"}, {"label": "Greens"}]}]
        }))
        .expect("known type");
        let ComponentBody::Chart(chart) = &component.body else {
            panic!("expected a chart");
        };
        assert_eq!(chart.chart_type, ChartType::Bar);
        assert_eq!(chart.series[0].data[0].value, 94.0);
        assert_eq!(chart.series[0].data[1].value, 0.0);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(Component::from_model_value(&json!({"type": "map"})).is_none());
        assert!(Component::from_model_value(&json!({"title": "untyped"})).is_none());
    }

    #[test]
    fn components_round_trip_through_the_wire_shape() {
        let component = Component::notice(NoticeLevel::Warning, None, "Limited data");
        let decoded: Component =
            serde_json::from_value(serde_json::to_value(&component).unwrap()).unwrap();
        assert_eq!(decoded, component);
    }

    #[test]
    fn claim_texts_render_numbers_plainly() {
        let component = Component::from_model_value(&json!({
            "type": "chart",
            "series": [{"name": "Votes", "data": [{"label": "For", "value": 310}]}]
        }))
        .expect("chart");
        assert_eq!(component.claim_texts(), vec!["Votes For: 310"]);
    }
}
