use civic_analysis::DepartmentReport;
use civic_core::{Category, Department, Issue};
use serde::Serialize;
use tracing::warn;

use crate::AssistantProvider;

pub const STATUS_REPLY_FALLBACK: &str = "I'm sorry, I'm having trouble connecting to my services right now. Please try again in a moment.";
pub const INSIGHTS_FALLBACK: &str = "Could not load AI insights at this time.";

const KEYWORD_ROUTES: &[(&[&str], Department)] = &[
    (&["water", "leak", "pipe"], Department::Water),
    (
        &["hospital", "medical", "ambulance", "clinic"],
        Department::Medical,
    ),
    (&["wire", "power", "electric"], Department::Electrical),
    (&["trash", "waste", "drain"], Department::Sanitation),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingSource {
    Assistant,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub department: Department,
    pub source: RoutingSource,
}

/// Chat-style answer to "what is the status of issue X".
pub async fn status_reply(
    provider: &dyn AssistantProvider,
    issue: Option<&Issue>,
    requested_id: &str,
) -> String {
    let prompt = match issue {
        Some(issue) => format!(
            "You are a friendly and helpful city service chatbot.\n\
             A citizen is asking for the status of their complaint with ID \"{requested_id}\".\n\
             The complaint is about \"{}\" and its current status is \"{}\".\n\
             If the status is 'Pending', mention it has been received and is in the queue. \
             If 'In Progress', say that our team is actively working on it. \
             If 'Resolved', thank them for their patience and confirm the issue is fixed.\n\
             Keep the response concise and positive.",
            issue.title, issue.status
        ),
        None => format!(
            "You are a friendly and helpful city service chatbot.\n\
             A citizen is asking for the status of their complaint with ID \"{requested_id}\", \
             but this ID was not found in our system.\n\
             Politely tell them the complaint ID is invalid, ask them to double-check it, \
             and suggest reporting a new issue if they cannot find their ID.\n\
             Keep the response short and polite."
        ),
    };

    match provider.complete(&prompt).await {
        Ok(reply) if !reply.trim().is_empty() => reply,
        Ok(_) => {
            warn!(issue_id = requested_id, "assistant returned an empty status reply");
            STATUS_REPLY_FALLBACK.to_owned()
        }
        Err(err) => {
            warn!(error = %err, issue_id = requested_id, "assistant status reply failed");
            STATUS_REPLY_FALLBACK.to_owned()
        }
    }
}

/// Picks the department for a report submitted without one.
pub async fn route_department(
    provider: &dyn AssistantProvider,
    title: &str,
    description: &str,
    category: Category,
) -> RoutingDecision {
    let departments = Department::ALL.map(Department::as_str).join(", ");
    let prompt = format!(
        "Route this civic issue report to the responsible city department.\n\
         Departments: {departments}.\n\
         Category: {category}\n\
         Title: {title}\n\
         Description: {description}\n\
         Answer with the single best department name only."
    );

    match provider.complete(&prompt).await {
        Ok(reply) => match first_department_mentioned(&reply) {
            Some(department) => RoutingDecision {
                department,
                source: RoutingSource::Assistant,
            },
            None => {
                warn!(reply = %reply, "assistant routing reply named no department");
                fallback_decision(title, description, category)
            }
        },
        Err(err) => {
            warn!(error = %err, "assistant routing failed");
            fallback_decision(title, description, category)
        }
    }
}

/// Rule-based routing used whenever the assistant gives no usable answer.
pub fn fallback_department(title: &str, description: &str, category: Category) -> Department {
    match category {
        Category::Pothole => Department::Roads,
        Category::Garbage => Department::Sanitation,
        Category::Streetlight => Department::Electrical,
        Category::Other => {
            let text = format!("{title} {description}").to_lowercase();
            KEYWORD_ROUTES
                .iter()
                .find(|(keywords, _)| keywords.iter().any(|keyword| text.contains(keyword)))
                .map(|(_, department)| *department)
                .unwrap_or(Department::Roads)
        }
    }
}

/// Short bullet-point observations about a department report.
pub async fn report_insights(
    provider: &dyn AssistantProvider,
    report: &DepartmentReport,
    department: Department,
) -> Vec<String> {
    let categories = report
        .category_distribution
        .iter()
        .map(|(category, count)| format!("{category}: {count}"))
        .collect::<Vec<_>>()
        .join(", ");
    let trends = report
        .weekly_trends
        .iter()
        .map(|trend| format!("{} {:.2}d", trend.period, trend.avg_resolution_time_days))
        .collect::<Vec<_>>()
        .join(", ");

    let prompt = format!(
        "You are an analyst for the {department} department of a city government.\n\
         Total requests: {}\n\
         Resolved: {}, pending: {}, in progress: {}, overdue: {}\n\
         Average resolution time: {:.1} hours\n\
         SLA compliance: {:.1}%\n\
         Average satisfaction: {:.2} / 5\n\
         Categories: {categories}\n\
         Weekly average resolution time (oldest first): {trends}\n\
         Give three to five short, actionable insights, one per line, each line starting with an asterisk bullet.",
        report.total_requests,
        report.resolved_requests,
        report.pending_requests,
        report.in_progress_requests,
        report.overdue_requests,
        report.avg_resolution_time_ms / 3_600_000.0,
        report.sla_compliance_rate,
        report.avg_satisfaction,
    );

    let reply = match provider.complete(&prompt).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(error = %err, department = %department, "assistant insights failed");
            return vec![INSIGHTS_FALLBACK.to_owned()];
        }
    };

    let insights = split_bullets(&reply);
    if insights.is_empty() {
        warn!(department = %department, "assistant returned no insights");
        return vec![INSIGHTS_FALLBACK.to_owned()];
    }
    insights
}

fn fallback_decision(title: &str, description: &str, category: Category) -> RoutingDecision {
    RoutingDecision {
        department: fallback_department(title, description, category),
        source: RoutingSource::Fallback,
    }
}

fn first_department_mentioned(reply: &str) -> Option<Department> {
    let reply = reply.to_lowercase();
    Department::ALL
        .into_iter()
        .filter_map(|department| {
            reply
                .find(&department.as_str().to_lowercase())
                .map(|position| (position, department))
        })
        .min_by_key(|(position, _)| *position)
        .map(|(_, department)| department)
}

fn split_bullets(reply: &str) -> Vec<String> {
    reply
        .split('\n')
        .flat_map(|line| line.split("* "))
        .map(|part| {
            let part = part.trim();
            part.strip_prefix("- ").unwrap_or(part).trim()
        })
        .filter(|part| !part.is_empty() && *part != "*")
        .map(str::to_owned)
        .collect()
}
