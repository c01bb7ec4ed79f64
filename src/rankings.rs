use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::escalation::classify_record;
use crate::models::{
    AgentPerformance, AgentRanking, ContactReasonSummary, ConversationRecord, EscalationStats,
    ImprovementTips, ResolvedStats, RoleMapping, Settings, TipSummary, ToxicParticipant,
    ToxicParticipants, WindowMetrics,
};
use crate::window::{
    bucket_index, build_series, filter_by_window, hourly_horizon_start, hours_before, since, Window,
    WindowValue,
};

pub const TOP_AGENT_WINDOW: Window = Window::Days7;
pub const UNSPECIFIED_REASON: &str = "Unspecified";
const IMPROVEMENT_EXAMPLES: usize = 3;

fn mean(total: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| total / count as f64)
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[derive(Default)]
struct ScoreAccumulator {
    total: f64,
    scored: usize,
    conversations: usize,
    daily: Vec<(f64, usize)>,
}

/// Best agents over the trailing seven days by mean total score.
/// A conversation counts toward every agent who took part in it.
pub fn top_agents(
    records: &[ConversationRecord],
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<AgentRanking> {
    let days = (TOP_AGENT_WINDOW.hours() / 24) as usize;
    let start = TOP_AGENT_WINDOW.cutoff(now);
    let mut by_agent: HashMap<&str, ScoreAccumulator> = HashMap::new();

    for record in filter_by_window(records, TOP_AGENT_WINDOW, now) {
        let day = record
            .reference_time()
            .and_then(|ts| bucket_index(ts, start, Duration::days(1), days))
            .unwrap_or(0);
        for agent in &record.agent_list {
            let entry = by_agent
                .entry(agent.as_str())
                .or_insert_with(|| ScoreAccumulator {
                    daily: vec![(0.0, 0); days],
                    ..ScoreAccumulator::default()
                });
            entry.conversations += 1;
            if let Some(score) = record.total_score {
                entry.total += score;
                entry.scored += 1;
                entry.daily[day].0 += score;
                entry.daily[day].1 += 1;
            }
        }
    }

    let mut rankings: Vec<AgentRanking> = by_agent
        .into_iter()
        .filter_map(|(agent, acc)| {
            Some(AgentRanking {
                agent: agent.to_string(),
                mean_score: mean(acc.total, acc.scored)?,
                conversations: acc.conversations,
                sparkline: acc
                    .daily
                    .iter()
                    .map(|(total, count)| mean(*total, *count))
                    .collect(),
            })
        })
        .collect();

    rankings.sort_by(|a, b| {
        descending(a.mean_score, b.mean_score)
            .then_with(|| b.conversations.cmp(&a.conversations))
            .then_with(|| a.agent.cmp(&b.agent))
    });
    rankings.truncate(limit);
    rankings
}

/// Abuse heuristic for one side of a conversation.
fn derived_toxicity(count: u32, messages: u32, settings: &Settings) -> Option<f64> {
    if count > 0 && count >= settings.abusive_caps_trigger {
        return Some(1.0);
    }
    if messages > 0 && messages >= settings.min_messages_for_toxicity {
        return Some((f64::from(count) / f64::from(messages)).min(1.0));
    }
    None
}

fn side_toxicity(
    explicit: Option<f64>,
    count: u32,
    messages: u32,
    settings: &Settings,
) -> Option<f64> {
    match (explicit, derived_toxicity(count, messages, settings)) {
        (Some(explicit), Some(derived)) => Some((explicit + derived) / 2.0),
        (Some(score), None) | (None, Some(score)) => Some(score),
        (None, None) => None,
    }
}

#[derive(Default)]
struct ToxicityAccumulator {
    total: f64,
    scored: usize,
    flagged: usize,
    conversations: usize,
}

fn record_toxicity<'a>(
    accumulators: &mut HashMap<&'a str, ToxicityAccumulator>,
    participants: &'a [String],
    score: Option<f64>,
    threshold: f64,
) {
    for participant in participants {
        let entry = accumulators.entry(participant.as_str()).or_default();
        entry.conversations += 1;
        if let Some(score) = score {
            entry.total += score;
            entry.scored += 1;
            if score >= threshold {
                entry.flagged += 1;
            }
        }
    }
}

fn rank_toxic(
    accumulators: HashMap<&str, ToxicityAccumulator>,
    threshold: f64,
    limit: usize,
) -> Vec<ToxicParticipant> {
    let mut ranked: Vec<ToxicParticipant> = accumulators
        .into_iter()
        .filter_map(|(participant, acc)| {
            let mean_score = mean(acc.total, acc.scored)?;
            (mean_score >= threshold).then(|| ToxicParticipant {
                participant: participant.to_string(),
                mean_score,
                flagged: acc.flagged,
                conversations: acc.conversations,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        descending(a.mean_score, b.mean_score)
            .then_with(|| b.flagged.cmp(&a.flagged))
            .then_with(|| a.participant.cmp(&b.participant))
    });
    ranked.truncate(limit);
    ranked
}

/// Customers and agents whose mean toxicity reaches the configured threshold.
pub fn toxic_participants(
    records: &[ConversationRecord],
    window: Window,
    now: DateTime<Utc>,
    settings: &Settings,
    limit: usize,
) -> ToxicParticipants {
    let threshold = settings.toxicity_threshold;
    let mut customers = HashMap::new();
    let mut agents = HashMap::new();

    for record in filter_by_window(records, window, now) {
        let customer_score = side_toxicity(
            record.customer_toxicity,
            record.customer_abuse_count,
            record.messages_customer,
            settings,
        );
        let agent_score = side_toxicity(
            record.agent_toxicity,
            record.agent_profanity_count,
            record.messages_agent,
            settings,
        );
        record_toxicity(&mut customers, &record.customer_list, customer_score, threshold);
        record_toxicity(&mut agents, &record.agent_list, agent_score, threshold);
    }

    ToxicParticipants {
        customers: rank_toxic(customers, threshold, limit),
        agents: rank_toxic(agents, threshold, limit),
    }
}

impl ResolvedStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ConversationRecord>) -> Self {
        let (count, total) = records
            .into_iter()
            .fold((0, 0), |(count, total), record| {
                (count + usize::from(record.resolved), total + 1)
            });
        Self {
            count,
            total,
            percentage: percentage(count, total),
        }
    }
}

pub fn resolved_stats(
    records: &[ConversationRecord],
    window: Window,
    now: DateTime<Utc>,
) -> ResolvedStats {
    ResolvedStats::from_records(filter_by_window(records, window, now))
}

pub fn resolved_series(
    records: &[ConversationRecord],
    now: DateTime<Utc>,
) -> Vec<WindowValue<ResolvedStats>> {
    build_series(|window| resolved_stats(records, window, now))
}

/// Contact reasons in the window, most frequent first, each with its most
/// recent issue keys and an hourly volume sparkline.
pub fn contact_reason_summary(
    records: &[ConversationRecord],
    window: Window,
    now: DateTime<Utc>,
    recent_limit: usize,
) -> Vec<ContactReasonSummary> {
    let hours = window.hours();
    let start = hourly_horizon_start(now, hours);
    let mut groups: HashMap<&str, Vec<&ConversationRecord>> = HashMap::new();

    for record in filter_by_window(records, window, now) {
        let reason = if record.contact_reason.is_empty() {
            UNSPECIFIED_REASON
        } else {
            record.contact_reason.as_str()
        };
        groups.entry(reason).or_default().push(record);
    }

    let mut summaries: Vec<ContactReasonSummary> = groups
        .into_iter()
        .map(|(reason, mut members)| {
            let mut sparkline = vec![0u32; hours as usize];
            for member in &members {
                let index = member
                    .reference_time()
                    .and_then(|ts| bucket_index(ts, start, Duration::hours(1), sparkline.len()));
                if let Some(index) = index {
                    sparkline[index] += 1;
                }
            }

            members.sort_by(|a, b| {
                b.reference_time()
                    .cmp(&a.reference_time())
                    .then_with(|| a.issue_key.cmp(&b.issue_key))
            });

            ContactReasonSummary {
                reason: reason.to_string(),
                count: members.len(),
                recent_issues: members
                    .iter()
                    .take(recent_limit)
                    .map(|member| member.issue_key.clone())
                    .collect(),
                sparkline,
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    summaries
}

/// Groups identical improvement tips over the trailing `horizon_hours`.
pub fn improvement_tips(
    records: &[ConversationRecord],
    now: DateTime<Utc>,
    horizon_hours: u32,
    top_n: usize,
) -> ImprovementTips {
    let cutoff = hours_before(now, horizon_hours);
    let mut groups: HashMap<&str, (usize, HashSet<&str>)> = HashMap::new();

    for record in since(records, cutoff) {
        let tip = record.improvement_tip.trim();
        if tip.is_empty() {
            continue;
        }
        let entry = groups.entry(tip).or_default();
        entry.0 += 1;
        entry.1.insert(record.issue_key.as_str());
    }

    let mut entries: Vec<TipSummary> = groups
        .into_iter()
        .map(|(tip, (count, issues))| TipSummary {
            tip: tip.to_string(),
            count,
            unique_issues: issues.len(),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tip.cmp(&b.tip)));

    let top = entries.iter().take(top_n).cloned().collect();
    ImprovementTips { entries, top }
}

#[derive(Default)]
struct PerformanceAccumulator {
    conversations: usize,
    resolved: usize,
    score_total: f64,
    scored: usize,
    response_total: f64,
    responses: usize,
    owned: usize,
    tier_escalations: usize,
    handoffs: usize,
    customer_abuse_received: u32,
    profanity_count: u32,
}

/// Per-agent performance matrix for one window.
pub fn agent_performance(
    records: &[ConversationRecord],
    roles: &RoleMapping,
    window: Window,
    now: DateTime<Utc>,
) -> Vec<AgentPerformance> {
    let mut by_agent: HashMap<&str, PerformanceAccumulator> = HashMap::new();

    for record in filter_by_window(records, window, now) {
        let details = classify_record(record, roles);
        for agent in &record.agent_list {
            let entry = by_agent.entry(agent.as_str()).or_default();
            entry.conversations += 1;
            entry.resolved += usize::from(record.resolved);
            if let Some(score) = record.total_score {
                entry.score_total += score;
                entry.scored += 1;
            }
            if let Some(minutes) = record.first_response_minutes {
                entry.response_total += minutes;
                entry.responses += 1;
            }
            if details.owner.as_deref() == Some(agent.as_str()) {
                entry.owned += 1;
                entry.tier_escalations += usize::from(details.tier_handoff);
                entry.handoffs += usize::from(details.handoff_any);
            }
            entry.customer_abuse_received += record.customer_abuse_count;
            entry.profanity_count += record.agent_profanity_count;
        }
    }

    let mut rows: Vec<AgentPerformance> = by_agent
        .into_iter()
        .map(|(agent, acc)| AgentPerformance {
            agent: agent.to_string(),
            role: roles.role_of(agent),
            conversations: acc.conversations,
            resolved: acc.resolved,
            resolution_rate: percentage(acc.resolved, acc.conversations),
            mean_score: mean(acc.score_total, acc.scored),
            mean_first_response_minutes: mean(acc.response_total, acc.responses),
            owned: acc.owned,
            tier_escalations: acc.tier_escalations,
            handoffs: acc.handoffs,
            customer_abuse_received: acc.customer_abuse_received,
            profanity_count: acc.profanity_count,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.conversations
            .cmp(&a.conversations)
            .then_with(|| a.agent.cmp(&b.agent))
    });
    rows
}

/// Tier escalation and hand-off rates, as percentages of the window's conversations.
pub fn escalation_stats(
    records: &[ConversationRecord],
    roles: &RoleMapping,
    window: Window,
    now: DateTime<Utc>,
) -> EscalationStats {
    let mut stats = EscalationStats::default();
    for record in filter_by_window(records, window, now) {
        let details = classify_record(record, roles);
        stats.total += 1;
        stats.owned += usize::from(details.owner.is_some());
        stats.tier_escalations += usize::from(details.tier_handoff);
        stats.handoffs += usize::from(details.handoff_any);
        stats.legacy += usize::from(details.legacy);
    }
    stats.escalation_rate = percentage(stats.tier_escalations, stats.total);
    stats.handoff_rate = percentage(stats.handoffs, stats.total);
    stats
}

pub fn escalation_series(
    records: &[ConversationRecord],
    roles: &RoleMapping,
    now: DateTime<Utc>,
) -> Vec<WindowValue<EscalationStats>> {
    build_series(|window| escalation_stats(records, roles, window, now))
}

/// Headline numbers for one window.
pub fn window_metrics(
    records: &[ConversationRecord],
    window: Window,
    now: DateTime<Utc>,
) -> WindowMetrics {
    let recent = filter_by_window(records, window, now);
    if recent.is_empty() {
        return WindowMetrics::default();
    }

    let scores: Vec<f64> = recent.iter().filter_map(|r| r.total_score).collect();
    let agent_scores: Vec<f64> = recent.iter().filter_map(|r| r.agent_score).collect();

    WindowMetrics {
        total_conversations: recent.len(),
        avg_total_score: mean(scores.iter().sum(), scores.len()),
        avg_agent_score: mean(agent_scores.iter().sum(), agent_scores.len()),
        resolved: recent.iter().filter(|r| r.resolved).count(),
        escalated: recent.iter().filter(|r| r.escalated).count(),
        abusive_count: recent
            .iter()
            .filter(|r| r.customer_abuse || r.agent_profanity)
            .count(),
        improvement_examples: recent
            .iter()
            .filter(|r| !r.improvement_tip.is_empty())
            .take(IMPROVEMENT_EXAMPLES)
            .map(|r| r.improvement_tip.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawRow, Role};
    use crate::normalize::normalize_row;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    }

    fn hours_ago(hours: i64) -> Value {
        json!((now() - Duration::hours(hours)).to_rfc3339())
    }

    fn record(pairs: &[(&str, Value)]) -> ConversationRecord {
        let raw: RawRow = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        normalize_row(&raw)
    }

    #[test]
    fn top_agent_by_mean_score() {
        let records = vec![
            record(&[
                ("agent_authors", json!("A")),
                ("agent_score", json!("4.8")),
                ("conversation_end", hours_ago(2)),
            ]),
            record(&[
                ("agent_authors", json!("A")),
                ("agent_score", json!("4.4")),
                ("conversation_end", hours_ago(50)),
            ]),
            record(&[
                ("agent_authors", json!("B")),
                ("agent_score", json!("3.2")),
                ("conversation_end", hours_ago(5)),
            ]),
            record(&[
                ("agent_authors", json!("C")),
                ("agent_score", json!("5")),
                ("conversation_end", hours_ago(24 * 8)),
            ]),
        ];

        let ranking = top_agents(&records, now(), 5);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].agent, "A");
        assert!((ranking[0].mean_score - 4.6).abs() < 1e-9);
        assert_eq!(ranking[0].conversations, 2);
        assert_eq!(ranking[0].sparkline.len(), 7);
        assert_eq!(ranking[0].sparkline[6], Some(4.8));
        assert_eq!(ranking[0].sparkline[4], Some(4.4));
        assert_eq!(ranking[1].agent, "B");
    }

    #[test]
    fn top_agents_break_ties_by_volume_then_name() {
        let records = vec![
            record(&[
                ("agent_authors", json!("Zed;Amy")),
                ("agent_score", json!("4")),
                ("conversation_end", hours_ago(1)),
            ]),
            record(&[
                ("agent_authors", json!("Zed")),
                ("agent_score", json!("4")),
                ("conversation_end", hours_ago(1)),
            ]),
            record(&[
                ("agent_authors", json!("Bob")),
                ("agent_score", json!("4")),
                ("conversation_end", hours_ago(1)),
            ]),
        ];
        let ranking = top_agents(&records, now(), 2);
        let names: Vec<&str> = ranking.iter().map(|r| r.agent.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Amy"]);
    }

    #[test]
    fn resolved_stats_percentage() {
        let records = vec![
            record(&[("resolved", json!("true")), ("conversation_end", hours_ago(1))]),
            record(&[("resolved", json!("false")), ("conversation_end", hours_ago(2))]),
        ];
        let stats = resolved_stats(&records, Window::Hours24, now());
        assert_eq!(
            stats,
            ResolvedStats {
                count: 1,
                total: 2,
                percentage: 50.0
            }
        );

        let empty = resolved_stats(&[], Window::Days30, now());
        assert_eq!(empty.percentage, 0.0);

        let series = resolved_series(&records, now());
        assert_eq!(series.len(), 3);
        assert!(series.iter().all(|point| point.value.total == 2));
    }

    #[test]
    fn toxic_participants_combine_signals() {
        let settings = Settings::default();
        let records = vec![
            record(&[
                ("customer_authors", json!("qm:angry")),
                ("agent_authors", json!("calm")),
                ("customer_toxicity", json!("0.9")),
                ("conversation_end", hours_ago(1)),
            ]),
            record(&[
                ("customer_authors", json!("qm:caps")),
                ("agent_authors", json!("rude")),
                ("customer_abuse_count", json!("3")),
                ("agent_profanity_count", json!("2")),
                ("messages_agent", json!("4")),
                ("conversation_end", hours_ago(2)),
            ]),
            record(&[
                ("customer_authors", json!("qm:mild")),
                ("customer_abuse_count", json!("1")),
                ("messages_customer", json!("10")),
                ("conversation_end", hours_ago(3)),
            ]),
        ];

        let toxic = toxic_participants(&records, Window::Hours24, now(), &settings, 10);
        let customers: Vec<&str> = toxic.customers.iter().map(|p| p.participant.as_str()).collect();
        assert_eq!(customers, vec!["qm:caps", "qm:angry"]);
        assert_eq!(toxic.customers[0].mean_score, 1.0);
        assert_eq!(toxic.customers[0].flagged, 1);

        assert_eq!(toxic.agents.len(), 1);
        assert_eq!(toxic.agents[0].participant, "rude");
        assert!((toxic.agents[0].mean_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn contact_reasons_sorted_with_recent_issues() {
        let records = vec![
            record(&[
                ("issue_key", json!("K-1")),
                ("contact_reason", json!("Refund")),
                ("conversation_end", hours_ago(5)),
            ]),
            record(&[
                ("issue_key", json!("K-2")),
                ("contact_reason", json!("Refund")),
                ("conversation_end", hours_ago(1)),
            ]),
            record(&[
                ("issue_key", json!("K-3")),
                ("contact_reason", json!("Refund")),
                ("conversation_end", hours_ago(3)),
            ]),
            record(&[
                ("issue_key", json!("K-4")),
                ("contact_reason", json!("Delivery")),
                ("conversation_end", hours_ago(2)),
            ]),
            record(&[("issue_key", json!("K-5")), ("conversation_end", hours_ago(2))]),
            record(&[
                ("issue_key", json!("K-6")),
                ("contact_reason", json!("Delivery")),
                ("conversation_end", hours_ago(48)),
            ]),
        ];

        let summary = contact_reason_summary(&records, Window::Hours24, now(), 2);
        let reasons: Vec<&str> = summary.iter().map(|s| s.reason.as_str()).collect();
        assert_eq!(reasons, vec!["Refund", "Delivery", UNSPECIFIED_REASON]);
        assert_eq!(summary[0].count, 3);
        assert_eq!(summary[0].recent_issues, vec!["K-2", "K-3"]);
        assert_eq!(summary[0].sparkline.len(), 24);
        assert_eq!(summary[0].sparkline.iter().sum::<u32>(), 3);
    }

    #[test]
    fn contact_sparkline_covers_whole_window() {
        let edge = now() - Duration::minutes(23 * 60 + 45);
        let records = vec![
            record(&[
                ("contact_reason", json!("Refund")),
                ("conversation_end", json!(edge.to_rfc3339())),
            ]),
            record(&[
                ("contact_reason", json!("Refund")),
                ("conversation_end", json!(now().to_rfc3339())),
            ]),
        ];

        let summary = contact_reason_summary(&records, Window::Hours24, now(), 5);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].sparkline[0], 1);
        assert_eq!(summary[0].sparkline[23], 1);
        assert_eq!(summary[0].sparkline.iter().sum::<u32>(), 2);
    }

    #[test]
    fn improvement_tips_grouped_by_text() {
        let records = vec![
            record(&[
                ("issue_key", json!("K-1")),
                ("improvement_tip", json!("Confirm the refund amount")),
                ("conversation_end", hours_ago(1)),
            ]),
            record(&[
                ("issue_key", json!("K-2")),
                ("improvement_tip", json!(" Confirm the refund amount ")),
                ("conversation_end", hours_ago(2)),
            ]),
            record(&[
                ("issue_key", json!("K-2")),
                ("improvement_tip", json!("Confirm the refund amount")),
                ("conversation_end", hours_ago(3)),
            ]),
            record(&[
                ("issue_key", json!("K-3")),
                ("improvement_tip", json!("Greet the customer")),
                ("conversation_end", hours_ago(4)),
            ]),
            record(&[
                ("issue_key", json!("K-4")),
                ("improvement_tip", json!("Old advice")),
                ("conversation_end", hours_ago(30)),
            ]),
            record(&[("issue_key", json!("K-5")), ("conversation_end", hours_ago(1))]),
        ];

        let tips = improvement_tips(&records, now(), 24, 1);
        assert_eq!(tips.entries.len(), 2);
        assert_eq!(tips.entries[0].tip, "Confirm the refund amount");
        assert_eq!(tips.entries[0].count, 3);
        assert_eq!(tips.entries[0].unique_issues, 2);
        assert_eq!(tips.top.len(), 1);
        assert_eq!(tips.top[0].tip, tips.entries[0].tip);
    }

    #[test]
    fn improvement_tips_accept_huge_horizon() {
        assert!(improvement_tips(&[], now(), u32::MAX, 3).entries.is_empty());

        let records = vec![record(&[
            ("improvement_tip", json!("Old advice")),
            ("conversation_end", hours_ago(24 * 365)),
        ])];
        let tips = improvement_tips(&records, now(), u32::MAX, 3);
        assert_eq!(tips.entries.len(), 1);
        assert_eq!(tips.entries[0].tip, "Old advice");
    }

    #[test]
    fn performance_and_escalation_stats() {
        let roles: RoleMapping = [
            ("t1".to_string(), Role::Tier1),
            ("t2".to_string(), Role::Tier2),
        ]
        .into_iter()
        .collect();
        let records = vec![
            record(&[
                ("agent_authors", json!("t1;t2")),
                ("resolved", json!("yes")),
                ("conversation_end", hours_ago(1)),
            ]),
            record(&[
                ("agent_authors", json!("t1")),
                ("first_agent_response_minutes", json!("4")),
                ("conversation_end", hours_ago(2)),
            ]),
            record(&[
                ("agent_authors", json!("t1;bot")),
                ("first_agent_response_minutes", json!("2")),
                ("conversation_end", hours_ago(3)),
            ]),
            record(&[("agent_authors", json!("")), ("conversation_end", hours_ago(4))]),
        ];

        let stats = escalation_stats(&records, &roles, Window::Hours24, now());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.owned, 3);
        assert_eq!(stats.tier_escalations, 1);
        assert_eq!(stats.handoffs, 2);
        assert_eq!(stats.legacy, 2);
        assert_eq!(stats.escalation_rate, 25.0);

        let matrix = agent_performance(&records, &roles, Window::Hours24, now());
        assert_eq!(matrix[0].agent, "t1");
        assert_eq!(matrix[0].role, Role::Tier1);
        assert_eq!(matrix[0].conversations, 3);
        assert_eq!(matrix[0].owned, 3);
        assert_eq!(matrix[0].tier_escalations, 1);
        assert_eq!(matrix[0].handoffs, 2);
        assert_eq!(matrix[0].mean_first_response_minutes, Some(3.0));
        assert!((matrix[0].resolution_rate - 100.0 / 3.0).abs() < 1e-9);
        let t2 = matrix.iter().find(|row| row.agent == "t2").unwrap();
        assert_eq!(t2.owned, 0);
        assert_eq!(t2.resolved, 1);
    }

    #[test]
    fn window_metrics_empty_and_populated() {
        assert_eq!(window_metrics(&[], Window::Days7, now()).total_conversations, 0);

        let records = vec![
            record(&[
                ("agent_score", json!("4")),
                ("customer_score", json!("2")),
                ("customer_abuse_detected", json!("true")),
                ("improvement_tip", json!("Apologise")),
                ("conversation_end", hours_ago(1)),
            ]),
            record(&[
                ("agent_score", json!("5")),
                ("resolved", json!("true")),
                ("conversation_end", hours_ago(2)),
            ]),
        ];
        let metrics = window_metrics(&records, Window::Hours24, now());
        assert_eq!(metrics.total_conversations, 2);
        assert_eq!(metrics.avg_total_score, Some(4.0));
        assert_eq!(metrics.avg_agent_score, Some(4.5));
        assert_eq!(metrics.resolved, 1);
        assert_eq!(metrics.abusive_count, 1);
        assert_eq!(metrics.improvement_examples, vec!["Apologise"]);
    }

    #[test]
    fn aggregators_do_not_mutate_input() {
        let records = vec![record(&[
            ("agent_authors", json!("A")),
            ("agent_score", json!("4")),
            ("conversation_end", hours_ago(1)),
        ])];
        let first = top_agents(&records, now(), 3);
        let second = top_agents(&records, now(), 3);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].mean_score, second[0].mean_score);
        assert_eq!(first[0].sparkline, second[0].sparkline);
    }
}
