//! Renders a terminal accumulator into the Markdown report.
//!
//! Pure: no I/O, no clock. The generation date is passed in and only appears
//! in the footer.

use chrono::NaiveDate;

use crate::accumulator::Accumulator;
use crate::pipeline::StageInfo;

/// Body of a section whose stage never committed.
pub const SECTION_PLACEHOLDER: &str = "Not completed";
/// Recommendation field value when nothing was determined.
pub const UNSET_FIELD: &str = "TBD";

const RULE: &str = "---";

/// Render the report for `acc`.
///
/// Sections follow `outline` order; stages without a heading are skipped.
/// Identical inputs give byte-identical output.
pub fn compile(acc: &Accumulator, outline: &[StageInfo], generated_on: NaiveDate) -> String {
    let mut blocks: Vec<String> = Vec::new();

    blocks.push(format!(
        "# INVESTMENT-GRADE SHALLOW DIVE ANALYSIS\n## {} ({})",
        acc.company_name(),
        acc.ticker()
    ));
    blocks.push(RULE.into());

    let rec = acc.recommendation();
    blocks.push(format!(
        "## INVESTMENT RECOMMENDATION\n\n**Rating:** {}\n\n**3-Year Price Target:** {}\n\n**Upside Potential:** {}",
        rec.rating.map_or(UNSET_FIELD, |r| r.as_str()),
        rec.target_price.as_deref().unwrap_or(UNSET_FIELD),
        rec.upside.as_deref().unwrap_or(UNSET_FIELD),
    ));
    blocks.push(RULE.into());

    let mut current_part: Option<&str> = None;
    let mut rendered_any = false;
    for info in outline {
        let Some(heading) = info.heading.as_deref() else {
            continue;
        };

        let part = info.part.as_deref();
        if part.is_some() && part != current_part {
            if rendered_any {
                blocks.push(RULE.into());
            }
            if let Some(p) = part {
                blocks.push(format!("## {p}"));
            }
            current_part = part;
        }

        blocks.push(format!("### {heading}"));
        blocks.push(section_body(acc, &info.name));
        rendered_any = true;
    }

    if rendered_any {
        blocks.push(RULE.into());
    }
    blocks.push("## References".into());
    blocks.extend(acc.registry().render_bibliography());
    blocks.push(RULE.into());
    blocks.push(footer(acc, outline.len(), generated_on));

    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

fn section_body(acc: &Accumulator, key: &str) -> String {
    match acc.section(key) {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => SECTION_PLACEHOLDER.to_string(),
    }
}

fn footer(acc: &Accumulator, total_stages: usize, generated_on: NaiveDate) -> String {
    let mut lines = vec![
        format!("*Report generated: {}*", generated_on.format("%Y-%m-%d")),
        format!(
            "*Stages completed: {}/{}*",
            acc.completed().len(),
            total_stages
        ),
        format!("*Total sources cited: {}*", acc.registry().len()),
    ];
    if !acc.errors().is_empty() {
        lines.push(format!("*Errors recorded: {}*", acc.errors().len()));
        lines.extend(acc.errors().iter().map(|e| format!("- {e}")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::Recommendation;
    use shallowdive_shared::{Company, Document};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn info(name: &str, heading: Option<&str>, part: Option<&str>) -> StageInfo {
        StageInfo {
            name: name.into(),
            heading: heading.map(Into::into),
            part: part.map(Into::into),
        }
    }

    fn outline() -> Vec<StageInfo> {
        vec![
            info("initialize", None, None),
            info("s1", Some("1.1 One"), Some("PART A")),
            info("s2", Some("1.2 Two"), Some("PART A")),
            info("s3", Some("2.1 Three"), Some("PART B")),
        ]
    }

    fn acme() -> Accumulator {
        Accumulator::new(Company::new("Acme Corp", "ACME"))
    }

    #[test]
    fn unset_sections_render_placeholder() {
        let mut acc = acme();
        acc.commit_section("s1", "first body".into()).unwrap();

        let report = compile(&acc, &outline(), date());

        assert!(report.contains("### 1.1 One\n\nfirst body"));
        assert!(report.contains("### 1.2 Two\n\nNot completed"));
        assert!(report.contains("### 2.1 Three\n\nNot completed"));
    }

    #[test]
    fn research_stages_are_not_rendered() {
        let mut acc = acme();
        acc.commit_section("initialize", "digest".into()).unwrap();

        let report = compile(&acc, &outline(), date());
        assert!(!report.contains("digest"));
    }

    #[test]
    fn parts_are_rendered_once_in_order() {
        let report = compile(&acme(), &outline(), date());

        assert_eq!(report.matches("## PART A").count(), 1);
        let a = report.find("## PART A").unwrap();
        let b = report.find("## PART B").unwrap();
        assert!(a < b);
    }

    #[test]
    fn unset_recommendation_shows_tbd() {
        let report = compile(&acme(), &outline(), date());
        assert!(report.contains("**Rating:** TBD"));
        assert!(report.contains("**3-Year Price Target:** TBD"));
        assert!(report.contains("**Upside Potential:** TBD"));
    }

    #[test]
    fn recommendation_fields_are_rendered() {
        let mut acc = acme();
        acc.commit_recommendation(Recommendation::extract(
            "Base Target: $150\nUpside: +25%\nRATING: BUY",
        ))
        .unwrap();

        let report = compile(&acc, &outline(), date());
        assert!(report.contains("**Rating:** BUY"));
        assert!(report.contains("**3-Year Price Target:** $150"));
        assert!(report.contains("**Upside Potential:** +25%"));
    }

    #[test]
    fn empty_registry_renders_no_sources_line() {
        let report = compile(&acme(), &outline(), date());
        assert!(report.contains("## References\n\nNo sources cited."));
    }

    #[test]
    fn footer_counts_completed_and_sources() {
        let mut acc = acme();
        acc.ingest(&[Document::new("http://a", "A"), Document::new("http://b", "B")]);
        acc.commit_section("s1", "x".into()).unwrap();
        acc.mark_completed("s1");

        let report = compile(&acc, &outline(), date());
        assert!(report.contains("*Stages completed: 1/4*"));
        assert!(report.contains("*Total sources cited: 2*"));
        assert!(report.contains("*Report generated: 2026-10-18*"));
    }

    #[test]
    fn output_is_deterministic() {
        let mut acc = acme();
        acc.ingest(&[Document::new("http://a", "A")]);
        acc.commit_section("s2", "body [1]".into()).unwrap();

        assert_eq!(
            compile(&acc, &outline(), date()),
            compile(&acc, &outline(), date())
        );
    }
}
