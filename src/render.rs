//! Console and markdown rendering for analysis reports.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use strata_agents::CascadeResult;
use strata_core::types::{AnalysisReport, DirectAnalysis};

/// Plain-text report for the terminal.
pub fn console_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let request = &report.request;

    let _ = writeln!(
        out,
        "Upgrade impact analysis: {} -> {} (workload: {})",
        request.from_version, request.to_version, request.workload
    );
    let _ = writeln!(
        out,
        "Run {} at {}{}",
        &report.run_id[..8.min(report.run_id.len())],
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        if report.cache_hit {
            "  [root analysis from cache]"
        } else {
            ""
        }
    );
    out.push_str(&"=".repeat(60));
    out.push('\n');

    push_direct(&mut out, &report.analysis);

    if !report.downstream_impacts.is_empty() {
        out.push_str("\nDownstream impact cascade:\n");
        push_cascade(&mut out, &report.downstream_impacts, 1);
    }

    if !report.document_sources.is_empty() {
        let names: Vec<String> = report
            .document_sources
            .iter()
            .map(|d| format!("{} [{}]", d.filename, d.category))
            .collect();
        let _ = writeln!(
            out,
            "\nGrounded in {} knowledge document(s): {}",
            report.document_sources.len(),
            names.join(", ")
        );
    }

    out
}

fn push_direct(out: &mut String, analysis: &DirectAnalysis) {
    if let Some(error) = &analysis.parse_error {
        let _ = writeln!(out, "\n! Root analysis reply could not be parsed: {}", error);
        if let Some(raw) = &analysis.raw_response {
            let _ = writeln!(out, "  Raw reply:\n  {}", raw.trim());
        }
        return;
    }

    if analysis.changes.is_empty() {
        out.push_str("\nNo breaking changes identified for this transition.\n");
    } else {
        let _ = writeln!(
            out,
            "\nBreaking changes ({}), highest severity {}:",
            analysis.changes.len(),
            analysis.max_severity()
        );
        for (i, change) in analysis.changes.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. [{}] {} ({})",
                i + 1,
                change.severity,
                change.component,
                change.change_type
            );
            let _ = writeln!(out, "     {}", change.description);
            if !change.metadata.affected_components.is_empty() {
                let _ = writeln!(
                    out,
                    "     Flags: {}",
                    change.metadata.affected_components.join(", ")
                );
            }
        }
    }

    if !analysis.mitigation_steps.is_empty() {
        out.push_str("\nMitigation steps:\n");
        for step in &analysis.mitigation_steps {
            let _ = writeln!(out, "  [{}] {}  {}", step.priority, step.timing, step.step);
            if !step.action.is_empty() {
                let _ = writeln!(out, "      {}", step.action);
            }
        }
    }

    if !analysis.recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        for rec in &analysis.recommendations {
            let _ = writeln!(out, "  - {}", rec);
        }
    }
}

fn push_cascade(out: &mut String, impacts: &CascadeResult, depth: usize) {
    let pad = "  ".repeat(depth);
    for (name, result) in impacts {
        if let Some(error) = &result.error {
            let _ = writeln!(out, "{}{}  FAILED: {}", pad, name, error);
        } else {
            let _ = writeln!(out, "{}{}  risk {}", pad, name, result.risk_level);
            for impact in &result.impacts {
                let _ = writeln!(
                    out,
                    "{}  - [{}] {}: {}",
                    pad, impact.severity, impact.component, impact.description
                );
                for action in &impact.required_actions {
                    let _ = writeln!(out, "{}    action: {}", pad, action);
                }
            }
        }
        if !result.downstream.is_empty() {
            push_cascade(out, &result.downstream, depth + 1);
        }
    }
}

/// Markdown rendering of the same report, for saving.
pub fn markdown_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let request = &report.request;

    let _ = writeln!(
        out,
        "# Upgrade impact analysis: {} -> {}\n",
        request.from_version, request.to_version
    );
    let _ = writeln!(out, "- Root layer: {}", request.layer);
    let _ = writeln!(out, "- Workload: {}", request.workload);
    let _ = writeln!(out, "- Run: `{}`", report.run_id);
    let _ = writeln!(out, "- Generated: {}", report.generated_at.to_rfc3339());
    let _ = writeln!(out, "- Root analysis from cache: {}", report.cache_hit);

    out.push_str("\n## Breaking changes\n\n");
    if let Some(error) = &report.analysis.parse_error {
        let _ = writeln!(out, "Reply could not be parsed: {}", error);
    } else if report.analysis.changes.is_empty() {
        out.push_str("None identified.\n");
    } else {
        for change in &report.analysis.changes {
            let _ = writeln!(
                out,
                "- **{}** `{}` ({}): {}",
                change.severity, change.component, change.change_type, change.description
            );
        }
    }

    if !report.analysis.mitigation_steps.is_empty() {
        out.push_str("\n## Mitigation steps\n\n");
        for step in &report.analysis.mitigation_steps {
            let _ = writeln!(
                out,
                "- **{}** ({}): {} - {}",
                step.priority, step.timing, step.step, step.action
            );
        }
    }

    if !report.analysis.recommendations.is_empty() {
        out.push_str("\n## Recommendations\n\n");
        for rec in &report.analysis.recommendations {
            let _ = writeln!(out, "- {}", rec);
        }
    }

    if !report.downstream_impacts.is_empty() {
        out.push_str("\n## Downstream impacts\n\n");
        markdown_cascade(&mut out, &report.downstream_impacts, 0);
    }

    if !report.dependency_graph.is_empty() {
        out.push_str("\n## Dependency graph\n\n");
        for (producer, consumers) in &report.dependency_graph {
            let edge = if consumers.is_empty() {
                "(leaf)".to_string()
            } else {
                consumers.join(", ")
            };
            let _ = writeln!(out, "- `{}` -> {}", producer, edge);
        }
    }

    if !report.document_sources.is_empty() {
        out.push_str("\n## Knowledge sources\n\n");
        for doc in &report.document_sources {
            let _ = writeln!(out, "- {} ({})", doc.filename, doc.category);
        }
    }

    out
}

fn markdown_cascade(out: &mut String, impacts: &CascadeResult, depth: usize) {
    let pad = "  ".repeat(depth);
    for (name, result) in impacts {
        if let Some(error) = &result.error {
            let _ = writeln!(out, "{}- `{}` failed: {}", pad, name, error);
        } else {
            let _ = writeln!(out, "{}- `{}` risk **{}**", pad, name, result.risk_level);
            for impact in &result.impacts {
                let _ = writeln!(
                    out,
                    "{}  - [{}] {}: {}",
                    pad, impact.severity, impact.component, impact.description
                );
            }
        }
        if !result.downstream.is_empty() {
            markdown_cascade(out, &result.downstream, depth + 1);
        }
    }
}

/// Write the markdown report into `dir` under a timestamped filename and
/// return the path.
pub fn save_report(report: &AnalysisReport, dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let filename = format!(
        "impact-{}-to-{}-{}.md",
        slug(&report.request.from_version),
        slug(&report.request.to_version),
        report.generated_at.format("%Y%m%d-%H%M%S")
    );
    let path = dir.join(filename);
    std::fs::write(&path, markdown_report(report))?;
    Ok(path)
}

/// Filename-safe rendition of a version string.
fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '.' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::types::{
        AnalysisRequest, ChangeRecord, Impact, ImpactResult, Severity,
    };

    fn sample_report() -> AnalysisReport {
        let mut analysis = DirectAnalysis::default();
        analysis.changes.push(ChangeRecord::new(
            "cgroup v1",
            "cgroup v1 removed",
            Severity::Critical,
        ));
        analysis.recommendations.push("Canary first".to_string());

        let mut db = ImpactResult::empty();
        db.risk_level = Severity::Medium;
        db.impacts.push(Impact {
            component: "etcd".to_string(),
            description: "mount options change".to_string(),
            severity: Severity::Medium,
            required_actions: vec![],
        });

        let mut k8s = ImpactResult::empty();
        k8s.risk_level = Severity::High;
        k8s.impacts.push(Impact {
            component: "kubelet".to_string(),
            description: "cgroup driver mismatch".to_string(),
            severity: Severity::High,
            required_actions: vec!["switch to systemd driver".to_string()],
        });
        k8s.downstream.insert("database-agent".to_string(), db);

        let mut report =
            AnalysisReport::new(AnalysisRequest::new("15-SP6", "15-SP7"), analysis);
        report
            .downstream_impacts
            .insert("kubernetes-agent".to_string(), k8s);
        report
    }

    #[test]
    fn test_console_report_nests_downstream_layers() {
        let text = console_report(&sample_report());

        assert!(text.contains("15-SP6 -> 15-SP7"));
        assert!(text.contains("[CRITICAL] cgroup v1"));
        assert!(text.contains("  kubernetes-agent  risk HIGH"));
        // One level deeper than kubernetes.
        assert!(text.contains("    database-agent  risk MEDIUM"));
        assert!(text.contains("action: switch to systemd driver"));
    }

    #[test]
    fn test_console_report_surfaces_branch_failures() {
        let mut report = sample_report();
        report.downstream_impacts.insert(
            "network-agent".to_string(),
            ImpactResult::from_error("HTTP 503"),
        );

        let text = console_report(&report);
        assert!(text.contains("network-agent  FAILED: HTTP 503"));
    }

    #[test]
    fn test_console_report_parse_failure_shows_raw_reply() {
        let mut report = sample_report();
        report.analysis = DirectAnalysis::parse_failure("no JSON object found", "model said no");

        let text = console_report(&report);
        assert!(text.contains("could not be parsed"));
        assert!(text.contains("model said no"));
    }

    #[test]
    fn test_markdown_report_has_expected_sections() {
        let md = markdown_report(&sample_report());

        assert!(md.starts_with("# Upgrade impact analysis: 15-SP6 -> 15-SP7"));
        assert!(md.contains("## Breaking changes"));
        assert!(md.contains("## Downstream impacts"));
        assert!(md.contains("- `kubernetes-agent` risk **HIGH**"));
        assert!(md.contains("  - `database-agent` risk **MEDIUM**"));
    }

    #[test]
    fn test_save_report_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_report(&sample_report(), dir.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("impact-15-SP6-to-15-SP7-"));
        assert!(name.ends_with(".md"));
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("## Breaking changes"));
    }

    #[test]
    fn test_slug_strips_awkward_characters() {
        assert_eq!(slug("15-SP6"), "15-SP6");
        assert_eq!(slug("v1.28 / eus"), "v1.28-eus");
        assert_eq!(slug("--odd--"), "odd");
    }
}
