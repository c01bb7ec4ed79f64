use crate::models::{ConversationRecord, EscalationDetails, Role, RoleMapping};

/// Walks the agent sequence from the first tier-1 participant (the owner).
///
/// The first participant after the owner fixes `handoff_any` and `path`;
/// `tier_handoff` is set as soon as any later participant is tier-2.
/// `legacy` keeps the coarse signal: the explicit flag, else "more than one agent".
pub fn classify_escalation(
    agents: &[String],
    explicit_flag: Option<bool>,
    roles: &RoleMapping,
) -> EscalationDetails {
    let mut details = EscalationDetails {
        legacy: explicit_flag.unwrap_or(agents.len() > 1),
        tier_handoff: false,
        handoff_any: false,
        path: String::new(),
        owner: None,
    };

    let Some(owner_index) = agents
        .iter()
        .position(|agent| roles.role_of(agent) == Role::Tier1)
    else {
        return details;
    };
    details.owner = Some(agents[owner_index].clone());

    for participant in &agents[owner_index + 1..] {
        let role = roles.role_of(participant);
        if !details.handoff_any {
            details.handoff_any = true;
            details.path = format!("T1→{}", role.path_label());
        }
        if role == Role::Tier2 {
            details.tier_handoff = true;
            break;
        }
    }

    details
}

pub fn classify_record(record: &ConversationRecord, roles: &RoleMapping) -> EscalationDetails {
    classify_escalation(&record.agent_list, record.escalated_flag, roles)
}
