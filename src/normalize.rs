use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::{ConversationRecord, RawRow, Sentiment};

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Turns one raw row into a typed record. Malformed fields fall back to
/// empty/zero/`None` instead of rejecting the row.
pub fn normalize_row(raw: &RawRow) -> ConversationRecord {
    let agent_list = participant_list(field(raw, &["agent_authors", "agent_list"]));
    let customer_list = participant_list(field(raw, &["customer_authors", "customer_list"]));

    let escalated_flag = parse_bool(field(raw, &["escalated"]));
    let escalated = escalated_flag.unwrap_or(agent_list.len() > 1);

    let agent_score = parse_number(field(raw, &["agent_score"]));
    let customer_score = parse_number(field(raw, &["customer_score"]));

    let customer_abuse_count = parse_count(field(raw, &["customer_abuse_count"]));
    let agent_profanity_count = parse_count(field(raw, &["agent_profanity_count"]));

    ConversationRecord {
        issue_key: text(field(raw, &["issue_key", "id"])),
        resolved: parse_bool(field(raw, &["resolved", "is_resolved"])).unwrap_or(false),
        started_at: field(raw, &["conversation_start", "started_at"]).and_then(timestamp_value),
        ended_at: field(raw, &["conversation_end", "ended_at"]).and_then(timestamp_value),
        duration_minutes: parse_number(field(raw, &["duration_minutes"])),
        first_response_minutes: parse_number(field(raw, &["first_agent_response_minutes"])),
        avg_response_minutes: parse_number(field(raw, &["avg_agent_response_minutes"])),
        messages_total: parse_count(field(raw, &["messages_total"])),
        messages_agent: parse_count(field(raw, &["messages_agent"])),
        messages_customer: parse_count(field(raw, &["messages_customer"])),
        customer_abuse: parse_bool(field(raw, &["customer_abuse_detected"]))
            .unwrap_or(customer_abuse_count > 0),
        customer_abuse_count,
        agent_profanity: parse_bool(field(raw, &["agent_profanity_detected"]))
            .unwrap_or(agent_profanity_count > 0),
        agent_profanity_count,
        customer_toxicity: parse_toxicity(field(raw, &["customer_toxicity"])),
        agent_toxicity: parse_toxicity(field(raw, &["agent_toxicity"])),
        sentiment: field(raw, &["customer_sentiment_primary", "sentiment"])
            .map(|value| Sentiment::parse(&text(Some(value))))
            .unwrap_or_default(),
        escalated_flag,
        escalated,
        contact_reason: text(field(raw, &["contact_reason", "contact_reason_original"])),
        improvement_tip: text(field(raw, &["improvement_tip"])),
        agent_score,
        customer_score,
        total_score: combined_score(agent_score, customer_score),
        agent_list,
        customer_list,
        raw: raw.clone(),
    }
}

/// First non-blank value among `keys`.
fn field<'a>(raw: &'a RawRow, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !is_blank(value))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

fn parse_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => Some(number.as_f64().is_some_and(|n| n != 0.0)),
        Value::String(text) => {
            let lowered = text.trim().to_ascii_lowercase();
            Some(matches!(lowered.as_str(), "true" | "yes" | "1"))
        }
        _ => Some(false),
    }
}

fn parse_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn parse_count(value: Option<&Value>) -> u32 {
    parse_number(value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32)
        .unwrap_or(0)
}

fn parse_toxicity(value: Option<&Value>) -> Option<f64> {
    parse_number(value).map(|n| n.clamp(0.0, 1.0))
}

fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp(text),
        _ => None,
    }
}

/// Accepts RFC 3339 plus the common ISO-8601 variants found in exports.
/// Naive values are read as UTC.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Splits `a;b;a` style author cells into unique, trimmed, first-seen order.
fn participant_list(value: Option<&Value>) -> Vec<String> {
    let mut participants = Vec::new();
    match value {
        Some(Value::String(text)) => {
            for part in text.split(';') {
                push_unique(&mut participants, part);
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::String(part) = item {
                    push_unique(&mut participants, part);
                }
            }
        }
        _ => {}
    }
    participants
}

fn push_unique(participants: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if trimmed.is_empty() || participants.iter().any(|existing| existing == trimmed) {
        return;
    }
    participants.push(trimmed.to_string());
}

fn combined_score(agent: Option<f64>, customer: Option<f64>) -> Option<f64> {
    match (agent, customer) {
        (Some(agent), Some(customer)) => Some((agent + customer) / 2.0),
        (Some(score), None) | (None, Some(score)) => Some(score),
        (None, None) => None,
    }
}
