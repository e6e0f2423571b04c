//! Static HTML exports of the parts catalog and the idea book.
//!
//! Rendering is pure: the generation time is a parameter, so the same
//! collection and timestamp always produce the same bytes.

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::ideas::IdeaBook;
use crate::parts::PartsCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Parts,
    Ideas,
}

impl ReportKind {
    const fn file_prefix(self) -> &'static str {
        match self {
            Self::Parts => "parts_information",
            Self::Ideas => "ideas",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("No parts data to export!")]
    NoParts,
}

pub fn export_file_name(kind: ReportKind, generated_at: NaiveDateTime) -> String {
    format!(
        "{}_{}.html",
        kind.file_prefix(),
        generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// Escapes `&`, `<` and `>`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escaped free text with line breaks preserved as `<br>`.
pub fn escape_multiline(text: &str) -> String {
    escape_html(&text.replace("\r\n", "\n")).replace('\n', "<br>")
}

fn escape_attribute(text: &str) -> String {
    escape_html(text).replace('"', "&quot;")
}

const PARTS_STYLE: &str = r#"        body { font-family: Arial, sans-serif; margin: 20px; background-color: #f5f5f5; }
        .container { background-color: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
        h1 { color: #333; text-align: center; margin-bottom: 30px; }
        table { border-collapse: collapse; width: 100%; margin: 20px 0; }
        th, td { border: 1px solid #ddd; padding: 12px; text-align: left; vertical-align: top; }
        th { background-color: #4CAF50; color: white; font-weight: bold; }
        tr:nth-child(even) { background-color: #f9f9f9; }
        tr:hover { background-color: #f5f5f5; }
        .export-info { text-align: center; color: #666; margin-bottom: 20px; font-style: italic; }
"#;

const IDEAS_STYLE: &str = r#"        body { font-family: Arial, sans-serif; margin: 20px; }
        table { border-collapse: collapse; width: 100%; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        th { background-color: #f2f2f2; }
        .tag { background-color: #e7f3ff; padding: 2px 6px; border-radius: 3px; }
        .trained { color: green; }
        .pending { color: orange; }
"#;

fn document_head(out: &mut String, title: &str, style: &str) {
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("    <meta charset=\"UTF-8\">\n");
    out.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    let _ = writeln!(out, "    <title>{}</title>", escape_html(title));
    out.push_str("    <style>\n");
    out.push_str(style);
    out.push_str("    </style>\n</head>\n<body>\n");
}

fn header_row(out: &mut String, columns: &[&str]) {
    out.push_str("            <thead>\n                <tr>\n");
    for column in columns {
        let _ = writeln!(out, "                    <th>{column}</th>");
    }
    out.push_str("                </tr>\n            </thead>\n            <tbody>\n");
}

pub fn render_parts_report(catalog: &PartsCatalog, generated_at: NaiveDateTime) -> String {
    let stamp = generated_at.format("%Y%m%d_%H%M%S").to_string();
    let mut out = String::new();
    document_head(
        &mut out,
        &format!("Parts Information Export - {stamp}"),
        PARTS_STYLE,
    );
    out.push_str("    <div class=\"container\">\n");
    out.push_str("        <h1>Parts Information Export</h1>\n");
    out.push_str("        <div class=\"export-info\">\n");
    let _ = writeln!(
        out,
        "            Generated on: {}<br>",
        generated_at.format("%B %d, %Y at %I:%M %p")
    );
    let _ = writeln!(out, "            Total Parts: {}", catalog.len());
    out.push_str("        </div>\n        <table>\n");
    header_row(&mut out, &["Part Number", "Parent", "Known Issues", "Usage"]);

    for (number, part) in catalog.iter() {
        out.push_str("                <tr>\n");
        let _ = writeln!(
            out,
            "                    <td><strong>{}</strong></td>",
            escape_html(number)
        );
        let _ = writeln!(out, "                    <td>{}</td>", escape_html(&part.parent));
        let _ = writeln!(
            out,
            "                    <td>{}</td>",
            escape_multiline(&part.issues)
        );
        let _ = writeln!(
            out,
            "                    <td>{}</td>",
            escape_multiline(&part.usage)
        );
        out.push_str("                </tr>\n");
    }

    out.push_str("            </tbody>\n        </table>\n    </div>\n</body>\n</html>\n");
    out
}

pub fn render_ideas_report(book: &IdeaBook, generated_at: NaiveDateTime) -> String {
    let mut out = String::new();
    document_head(&mut out, "Tribal Ideas Report", IDEAS_STYLE);
    out.push_str("    <h1>Tribal Ideas Report</h1>\n");
    let _ = writeln!(
        out,
        "    <p>Generated on: {}</p>",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "    <p>Total Ideas: {}</p>", book.len());
    out.push_str("    <table>\n");
    header_row(
        &mut out,
        &[
            "ID",
            "Tag",
            "Idea",
            "Link",
            "Submitter",
            "Submitted",
            "Reviews",
            "Status",
        ],
    );

    for idea in book.ideas() {
        let tally = idea.tally();
        let mut reviews = format!("{} reviews", tally.total);
        if tally.total > 0 {
            let _ = write!(reviews, " ({} accurate)", tally.accurate);
        }
        let link = match idea.link.as_deref().filter(|link| !link.is_empty()) {
            Some(link) => format!(
                "<a href=\"{}\" target=\"_blank\">Link</a>",
                escape_attribute(link)
            ),
            None => "N/A".to_string(),
        };
        let (status, status_class) = if idea.trained {
            ("Trained", "trained")
        } else {
            ("Pending", "pending")
        };

        out.push_str("                <tr>\n");
        let _ = writeln!(out, "                    <td>{}</td>", idea.id);
        let _ = writeln!(
            out,
            "                    <td><span class=\"tag\">{}</span></td>",
            escape_html(&idea.tag)
        );
        let _ = writeln!(
            out,
            "                    <td>{}</td>",
            escape_multiline(&idea.text)
        );
        let _ = writeln!(out, "                    <td>{link}</td>");
        let _ = writeln!(
            out,
            "                    <td>{}</td>",
            escape_html(&idea.submitter)
        );
        let _ = writeln!(
            out,
            "                    <td>{}</td>",
            escape_html(idea.submitted_on())
        );
        let _ = writeln!(out, "                    <td>{reviews}</td>");
        let _ = writeln!(
            out,
            "                    <td class=\"{status_class}\">{status}</td>"
        );
        out.push_str("                </tr>\n");
    }

    out.push_str("            </tbody>\n    </table>\n</body>\n</html>\n");
    out
}

/// Refuses to render an empty catalog.
pub fn parts_report(
    catalog: &PartsCatalog,
    generated_at: NaiveDateTime,
) -> Result<String, ReportError> {
    if catalog.is_empty() {
        return Err(ReportError::NoParts);
    }
    Ok(render_parts_report(catalog, generated_at))
}
