use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    AgentPerformance, AgentRanking, ContactReasonSummary, EscalationStats, ImprovementTips,
    ResolvedStats, Sentiment, SentimentCounts, Settings, TimelineBucket, ToxicParticipant,
    ToxicParticipants, WindowMetrics,
};
use crate::rankings;
use crate::sentiment;
use crate::state::DashboardState;
use crate::window::{build_series, Window, WindowValue};

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub top_n: usize,
    pub recent_issue_limit: usize,
    pub tip_hours: u32,
    pub top_tips: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            recent_issue_limit: 5,
            tip_hours: 24,
            top_tips: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub generated_at: DateTime<Utc>,
    pub window: Window,
    pub dataset_id: Uuid,
    pub dataset_loaded_at: DateTime<Utc>,
    pub record_count: usize,
    pub timestamped_records: usize,
    pub settings: Settings,
    pub metrics: Vec<WindowValue<WindowMetrics>>,
    pub resolved: Vec<WindowValue<ResolvedStats>>,
    pub escalations: Vec<WindowValue<EscalationStats>>,
    pub top_agents: Vec<AgentRanking>,
    pub toxic: ToxicParticipants,
    pub contact_reasons: Vec<ContactReasonSummary>,
    pub improvement_tips: ImprovementTips,
    pub agent_performance: Vec<AgentPerformance>,
    pub recent_sentiment: SentimentCounts,
    pub sentiment_timeline: Vec<TimelineBucket>,
}

pub fn build_report(
    state: &DashboardState,
    window: Window,
    now: DateTime<Utc>,
    options: &ReportOptions,
) -> DashboardReport {
    let dataset = state.snapshot();
    let records = dataset.records.as_slice();
    let roles = state.roles();

    DashboardReport {
        generated_at: now,
        window,
        dataset_id: dataset.id,
        dataset_loaded_at: dataset.loaded_at,
        record_count: records.len(),
        timestamped_records: dataset.timestamped(),
        settings: *state.settings(),
        metrics: build_series(|w| rankings::window_metrics(records, w, now)),
        resolved: rankings::resolved_series(records, now),
        escalations: rankings::escalation_series(records, roles, now),
        top_agents: rankings::top_agents(records, now, options.top_n),
        toxic: rankings::toxic_participants(
            records,
            window,
            now,
            state.settings(),
            options.top_n,
        ),
        contact_reasons: rankings::contact_reason_summary(
            records,
            window,
            now,
            options.recent_issue_limit,
        ),
        improvement_tips: rankings::improvement_tips(
            records,
            now,
            options.tip_hours,
            options.top_tips,
        ),
        agent_performance: rankings::agent_performance(records, roles, window, now),
        recent_sentiment: sentiment::recent_sentiment_breakdown(records, now),
        sentiment_timeline: sentiment::sentiment_timeline(records, now, window.hours()),
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn write_toxic(output: &mut String, heading: &str, participants: &[ToxicParticipant]) {
    let _ = writeln!(output, "### {heading}");
    if participants.is_empty() {
        let _ = writeln!(output, "None above the toxicity threshold.");
        return;
    }
    for participant in participants {
        let _ = writeln!(
            output,
            "- {} mean {:.2} ({} flagged of {} conversations)",
            participant.participant,
            participant.mean_score,
            participant.flagged,
            participant.conversations
        );
    }
}

fn sparkline(points: &[Option<f64>]) -> String {
    points
        .iter()
        .map(|point| point.map_or_else(|| "-".to_string(), |v| format!("{v:.1}")))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_markdown(report: &DashboardReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Conversation Quality Report");
    let _ = writeln!(
        output,
        "Generated {} for the {} window (dataset {}, {} records, {} with timestamps)",
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.window,
        report.dataset_id,
        report.record_count,
        report.timestamped_records
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Headline Metrics");
    let _ = writeln!(
        output,
        "| Window | Conversations | Avg score | Avg agent score | Resolved | Tier escalations | Hand-offs | Abusive |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
    for ((metrics, resolved), escalations) in report
        .metrics
        .iter()
        .zip(report.resolved.iter())
        .zip(report.escalations.iter())
    {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {}/{} ({:.1}%) | {} ({:.1}%) | {} ({:.1}%) | {} |",
            metrics.window,
            metrics.value.total_conversations,
            format_optional(metrics.value.avg_total_score),
            format_optional(metrics.value.avg_agent_score),
            resolved.value.count,
            resolved.value.total,
            resolved.value.percentage,
            escalations.value.tier_escalations,
            escalations.value.escalation_rate,
            escalations.value.handoffs,
            escalations.value.handoff_rate,
            metrics.value.abusive_count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Agents (last 7 days)");
    if report.top_agents.is_empty() {
        let _ = writeln!(output, "No scored conversations in the last 7 days.");
    } else {
        for (rank, agent) in report.top_agents.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} mean {:.2} across {} conversations [{}]",
                rank + 1,
                agent.agent,
                agent.mean_score,
                agent.conversations,
                sparkline(&agent.sparkline)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Agent Performance ({})", report.window);
    if report.agent_performance.is_empty() {
        let _ = writeln!(output, "No agent activity in this window.");
    } else {
        let _ = writeln!(
            output,
            "| Agent | Role | Conversations | Resolved % | Mean score | First response (min) | Owned | Tier escalations | Hand-offs |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");
        for row in &report.agent_performance {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.1} | {} | {} | {} | {} | {} |",
                row.agent,
                row.role.path_label(),
                row.conversations,
                row.resolution_rate,
                format_optional(row.mean_score),
                format_optional(row.mean_first_response_minutes),
                row.owned,
                row.tier_escalations,
                row.handoffs
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Toxicity ({})", report.window);
    write_toxic(&mut output, "Customers", &report.toxic.customers);
    write_toxic(&mut output, "Agents", &report.toxic.agents);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Contact Reasons ({})", report.window);
    if report.contact_reasons.is_empty() {
        let _ = writeln!(output, "No conversations recorded for this window.");
    } else {
        for reason in &report.contact_reasons {
            let _ = writeln!(
                output,
                "- {}: {} conversations (recent: {})",
                reason.reason,
                reason.count,
                reason.recent_issues.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Improvement Tips");
    if report.improvement_tips.entries.is_empty() {
        let _ = writeln!(output, "No improvement tips recorded recently.");
    } else {
        for tip in &report.improvement_tips.top {
            let _ = writeln!(
                output,
                "- {}× {} ({} issues)",
                tip.count, tip.tip, tip.unique_issues
            );
        }
        let remaining = report
            .improvement_tips
            .entries
            .len()
            .saturating_sub(report.improvement_tips.top.len());
        if remaining > 0 {
            let _ = writeln!(output, "- … {remaining} more unique tips");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sentiment");
    let _ = writeln!(
        output,
        "Last hour: {}",
        sentiment_line(&report.recent_sentiment)
    );
    let active: Vec<&TimelineBucket> = report
        .sentiment_timeline
        .iter()
        .filter(|bucket| bucket.counts.total() > 0)
        .collect();
    if active.is_empty() {
        let _ = writeln!(output, "No sentiment data for this window.");
    } else {
        for bucket in active {
            let _ = writeln!(
                output,
                "- {}: {}",
                bucket.label,
                sentiment_line(&bucket.counts)
            );
        }
    }

    output
}

fn sentiment_line(counts: &SentimentCounts) -> String {
    if counts.total() == 0 {
        return "none".to_string();
    }
    Sentiment::ALL
        .into_iter()
        .filter(|sentiment| counts.get(*sentiment) > 0)
        .map(|sentiment| format!("{sentiment} {}", counts.get(sentiment)))
        .collect::<Vec<_>>()
        .join(", ")
}
