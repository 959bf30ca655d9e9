//! Human-readable output.

use console::style;
use esper_shared::evidence::Evidence;
use esper_shared::result::RuleResult;
use esper_shared::rule::{RuleDefinition, RuleSeverity};
use owo_colors::OwoColorize;

fn severity_label(severity: RuleSeverity) -> String {
    match severity {
        RuleSeverity::Low => "LOW".blue().to_string(),
        RuleSeverity::Medium => "MEDIUM".yellow().to_string(),
        RuleSeverity::High => "HIGH".red().to_string(),
        RuleSeverity::Critical => "CRITICAL".red().bold().to_string(),
    }
}

fn evidence_line(signal: &str, evidence: &Evidence) -> String {
    match evidence {
        Evidence::Event {
            event_type,
            match_count,
            field,
            value,
            ..
        } => match (field, value) {
            (Some(f), Some(v)) => format!("{}: {} with {} = {}", signal, event_type, f, v),
            _ => format!("{}: {} ({} seen)", signal, event_type, match_count),
        },
        Evidence::Count { event_type, count, .. } => {
            format!("{}: {} x{}", signal, event_type, count)
        }
        Evidence::Duration {
            label,
            duration_seconds,
            end_event_id,
            ..
        } => {
            let state = if end_event_id.is_none() { ", still open" } else { "" };
            format!("{}: {} ran {}s{}", signal, label, duration_seconds, state)
        }
        Evidence::Correlation {
            event_a_type,
            event_b_type,
            join_field,
            join_value,
            gap_seconds,
            ..
        } => format!(
            "{}: {} ~ {} on {}={} ({}s apart)",
            signal,
            event_a_type,
            event_b_type,
            join_field,
            join_value,
            gap_seconds.abs()
        ),
        Evidence::Factor { expression, weight } => {
            format!("{}: factor \"{}\" (+{})", signal, expression, weight)
        }
    }
}

pub fn print_results(session: &str, results: &[RuleResult], dry_run: bool) {
    if results.is_empty() {
        println!(
            "{} no diagnoses for session {}",
            style("-").dim(),
            style(session).bold()
        );
        return;
    }

    let suffix = if dry_run { " (dry run, not persisted)" } else { "" };
    println!(
        "{} diagnosis(es) for session {}{}",
        results.len(),
        style(session).bold(),
        suffix
    );
    println!();

    for result in results {
        println!(
            "[{}] {} {}",
            severity_label(result.severity),
            style(&result.rule_title).bold(),
            style(format!("({}% confidence)", result.confidence_score)).dim()
        );
        println!("  {}", result.explanation);
        if !result.matched_conditions.is_empty() {
            println!("  {}", style("evidence:").dim());
            for (signal, evidence) in &result.matched_conditions {
                println!("    - {}", evidence_line(signal, evidence));
            }
        }
        if !result.remediation_steps.is_empty() {
            println!("  {}", style("remediation:").dim());
            for step in &result.remediation_steps {
                println!("    - {}", step);
            }
        }
        println!();
    }
}

pub fn print_rules_table(tenant: &str, rules: &[RuleDefinition]) {
    println!(
        "{} rule(s) active for tenant {}",
        rules.len(),
        style(tenant).bold()
    );
    for rule in rules {
        let state = if rule.enabled {
            "enabled".green().to_string()
        } else {
            "disabled".dimmed().to_string()
        };
        println!(
            "  {:<32} [{}] {} threshold={} conditions={} ({})",
            rule.rule_id,
            severity_label(rule.severity),
            state,
            rule.confidence_threshold,
            rule.conditions.len(),
            rule.category
        );
    }
}

pub fn print_lint_problems(rule_id: &str, problems: &[String]) {
    println!("{}:", style(rule_id).bold());
    for problem in problems {
        println!("  {} {}", "!".red(), problem);
    }
}
