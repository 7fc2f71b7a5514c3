//! crates/rapid_review_core/src/export.rs
//!
//! CSV export of a project's papers with their scores and tallied decisions.

use tracing::info;
use uuid::Uuid;

use crate::access::require_member;
use crate::domain::{Decision, ExportRow};
use crate::error::CoreResult;
use crate::ports::DatabaseService;

pub const EXPORT_HEADER: [&str; 10] = [
    "paper_id",
    "title",
    "authors",
    "publication_date",
    "full_text_url",
    "relevancy_score",
    "accepts",
    "rejects",
    "skips",
    "resolution",
];

/// Renders export rows as CSV (RFC 4180 quoting, CRLF line endings).
pub fn render_csv(rows: &[ExportRow]) -> Vec<u8> {
    let mut out = String::new();
    push_record(&mut out, EXPORT_HEADER.iter().map(|h| h.to_string()));

    for row in rows {
        let paper = &row.entry.paper;
        let tally = |decision: Decision| {
            row.reviews
                .iter()
                .filter(|r| r.decision == decision)
                .count()
                .to_string()
        };

        push_record(
            &mut out,
            [
                paper.id.to_string(),
                paper.title.clone(),
                paper.authors.join("; "),
                paper
                    .publication_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                paper.full_text_url.clone().unwrap_or_default(),
                row.entry
                    .relevancy_score
                    .map(|s| format!("{:.4}", s))
                    .unwrap_or_default(),
                tally(Decision::Accept),
                tally(Decision::Reject),
                tally(Decision::Skip),
                row.resolution
                    .map(|d| d.as_str().to_string())
                    .unwrap_or_default(),
            ]
            .into_iter(),
        );
    }
    out.into_bytes()
}

fn push_record(out: &mut String, fields: impl Iterator<Item = String>) {
    let line: Vec<String> = fields.map(|f| escape_field(&f)).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Builds the CSV export for a project. Any member may export.
pub async fn export_project_papers(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
) -> CoreResult<Vec<u8>> {
    require_member(db, project_id, user_id).await?;
    let rows = db.fetch_export_rows(project_id).await?;
    info!(project_id = %project_id, rows = rows.len(), "Exporting project papers");
    Ok(render_csv(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Paper, ProjectPaper, Review};
    use chrono::{NaiveDate, Utc};
    use pretty_assertions::assert_eq;

    fn review(decision: Decision) -> Review {
        Review {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            paper_id: Uuid::nil(),
            reviewer_id: Uuid::new_v4(),
            decision,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn quotes_fields_that_need_it() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a, b"), "\"a, b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn renders_header_and_tallies() {
        let row = ExportRow {
            entry: ProjectPaper {
                project_id: Uuid::nil(),
                paper: Paper {
                    id: Uuid::nil(),
                    title: "Sleep, mood and screens".to_string(),
                    abstract_text: String::new(),
                    authors: vec!["Doe, J.".to_string(), "Roe, R.".to_string()],
                    publication_date: NaiveDate::from_ymd_opt(2021, 6, 30),
                    full_text_url: None,
                },
                relevancy_score: Some(0.5),
                imported_at: Utc::now(),
            },
            reviews: vec![
                review(Decision::Accept),
                review(Decision::Reject),
                review(Decision::Accept),
            ],
            resolution: Some(Decision::Accept),
        };

        let csv = String::from_utf8(render_csv(&[row])).unwrap();
        let lines: Vec<&str> = csv.split("\r\n").collect();

        assert_eq!(lines[0], EXPORT_HEADER.join(","));
        assert_eq!(
            lines[1],
            format!(
                "{},\"Sleep, mood and screens\",\"Doe, J.; Roe, R.\",2021-06-30,,0.5000,2,1,0,accept",
                Uuid::nil()
            )
        );
        assert_eq!(lines[2], "");
    }
}
