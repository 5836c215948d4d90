//! Report rendering (HTML, Markdown, CSV) with optional upload to OneDrive.

use async_trait::async_trait;
use reqwest::Method;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ToolError;
use crate::graph_client::{seg, ApiRequest, GraphClient};
use crate::utils::{json_result, parse_args, text_result, tool, Hints};
use crate::Connector;

pub const TOOL_NAME: &str = "manage_document_generation";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub columns: Vec<String>,
    /// Row cells in column order.
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub heading: String,
    /// Plain text paragraphs separated by blank lines.
    pub body: Option<String>,
    pub table: Option<Table>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    /// OneDrive owner (object id or UPN).
    pub user_id: String,
    /// Path under the drive root, e.g. `Reports/2024/q2.html`.
    pub path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub title: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
    pub upload: Option<Upload>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsvExport {
    /// Column order. Defaults to the union of row keys: each row's keys sorted, rows in order.
    #[serde(default)]
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub upload: Option<Upload>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DocumentArgs {
    HtmlReport(Report),
    MarkdownReport(Report),
    CsvExport(CsvExport),
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_table(section: &Section) -> Result<(), ToolError> {
    if let Some(table) = &section.table {
        if let Some(i) = table.rows.iter().position(|r| r.len() != table.columns.len()) {
            return Err(ToolError::invalid(format!(
                "section '{}' row {} has {} cells, expected {}",
                section.heading,
                i,
                table.rows[i].len(),
                table.columns.len()
            )));
        }
    }
    Ok(())
}

fn check_report(report: &Report) -> Result<(), ToolError> {
    if report.title.trim().is_empty() {
        return Err(ToolError::invalid("title must not be empty"));
    }
    report.sections.iter().try_for_each(check_table)
}

pub fn render_html(report: &Report) -> Result<String, ToolError> {
    check_report(report)?;
    let esc = |s: &str| html_escape::encode_text(s).into_owned();
    let title = esc(&report.title);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", title));
    out.push_str(
        "<style>body{font-family:Segoe UI,Arial,sans-serif;margin:2em;}\
         table{border-collapse:collapse;}th,td{border:1px solid #ccc;padding:4px 8px;}\
         th{background:#f3f2f1;text-align:left;}</style>\n",
    );
    out.push_str("</head>\n<body>\n");
    out.push_str(&format!("<h1>{}</h1>\n", title));
    if let Some(summary) = &report.summary {
        out.push_str(&format!("<p class=\"summary\">{}</p>\n", esc(summary)));
    }
    for section in &report.sections {
        out.push_str(&format!("<h2>{}</h2>\n", esc(&section.heading)));
        if let Some(body) = &section.body {
            for para in body.split("\n\n").filter(|p| !p.trim().is_empty()) {
                out.push_str(&format!("<p>{}</p>\n", esc(para.trim())));
            }
        }
        if let Some(table) = &section.table {
            out.push_str("<table>\n<thead><tr>");
            for c in &table.columns {
                out.push_str(&format!("<th>{}</th>", esc(c)));
            }
            out.push_str("</tr></thead>\n<tbody>\n");
            for row in &table.rows {
                out.push_str("<tr>");
                for cell in row {
                    out.push_str(&format!("<td>{}</td>", esc(&cell_text(cell))));
                }
                out.push_str("</tr>\n");
            }
            out.push_str("</tbody>\n</table>\n");
        }
    }
    out.push_str("</body>\n</html>\n");
    Ok(out)
}

fn md_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn render_markdown(report: &Report) -> Result<String, ToolError> {
    check_report(report)?;
    let mut out = format!("# {}\n\n", report.title.trim());
    if let Some(summary) = &report.summary {
        out.push_str(summary.trim());
        out.push_str("\n\n");
    }
    for section in &report.sections {
        out.push_str(&format!("## {}\n\n", section.heading.trim()));
        if let Some(body) = &section.body {
            out.push_str(body.trim());
            out.push_str("\n\n");
        }
        if let Some(table) = &section.table {
            let header: Vec<String> = table.columns.iter().map(|c| md_cell(c)).collect();
            out.push_str(&format!("| {} |\n", header.join(" | ")));
            out.push_str(&format!("|{}\n", " --- |".repeat(table.columns.len())));
            for row in &table.rows {
                let cells: Vec<String> = row.iter().map(|c| md_cell(&cell_text(c))).collect();
                out.push_str(&format!("| {} |\n", cells.join(" | ")));
            }
            out.push('\n');
        }
    }
    Ok(out)
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// RFC 4180 CSV with CRLF line endings.
pub fn render_csv(export: &CsvExport) -> Result<String, ToolError> {
    let columns: Vec<String> = if export.columns.is_empty() {
        let mut seen = Vec::new();
        for row in &export.rows {
            for key in row.keys() {
                if !seen.contains(key) {
                    seen.push(key.clone());
                }
            }
        }
        seen
    } else {
        export.columns.clone()
    };
    if columns.is_empty() {
        return Err(ToolError::invalid(
            "csv_export needs columns or at least one non-empty row",
        ));
    }

    let mut out = String::new();
    let header: Vec<String> = columns.iter().map(|c| csv_field(c)).collect();
    out.push_str(&header.join(","));
    out.push_str("\r\n");
    for row in &export.rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| csv_field(&row.get(c).map(cell_text).unwrap_or_default()))
            .collect();
        out.push_str(&cells.join(","));
        out.push_str("\r\n");
    }
    Ok(out)
}

/// `root:/a/b.html:` addressing with each segment percent-encoded.
pub fn drive_item_path(upload: &Upload) -> Result<String, ToolError> {
    if upload.user_id.trim().is_empty() {
        return Err(ToolError::invalid("upload.userId must not be empty"));
    }
    let segments: Vec<&str> = upload
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() || segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(ToolError::invalid(
            "upload.path must be a relative file path without . or .. segments",
        ));
    }
    let encoded: Vec<String> = segments.iter().map(|s| seg(s)).collect();
    Ok(format!(
        "/users/{}/drive/root:/{}:/content",
        seg(upload.user_id.trim()),
        encoded.join("/")
    ))
}

pub struct DocumentConnector {
    client: Arc<GraphClient>,
}

impl DocumentConnector {
    pub fn new(client: Arc<GraphClient>) -> Self {
        Self { client }
    }

    async fn deliver(
        &self,
        content: String,
        content_type: &str,
        upload: Option<Upload>,
    ) -> Result<CallToolResult, ToolError> {
        let Some(upload) = upload else {
            return Ok(text_result(content));
        };
        let path = drive_item_path(&upload)?;
        let size = content.len();
        info!(user_id = %upload.user_id, path = %upload.path, size, "uploading generated document");
        let item = self
            .client
            .send_json(
                ApiRequest::graph(Method::PUT, path).bytes(content_type, content.into_bytes()),
            )
            .await?;
        json_result(&json!({
            "uploaded": true,
            "path": upload.path,
            "size": size,
            "id": item.get("id"),
            "webUrl": item.get("webUrl"),
        }))
    }
}

#[async_trait]
impl Connector for DocumentConnector {
    fn name(&self) -> &'static str {
        "documents"
    }

    fn description(&self) -> &'static str {
        "Render HTML, Markdown and CSV reports and optionally save them to OneDrive."
    }

    fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(vec![tool::<DocumentArgs>(
            TOOL_NAME,
            "Generate HTML or Markdown reports and CSV exports from structured data. \
             With `upload`, the file is written to the user's OneDrive instead of returned inline.",
            Hints::WRITE,
        )?])
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ToolError> {
        let name = request.name.as_ref();
        debug!(connector = self.name(), tool = name, "dispatching tool call");
        if name != TOOL_NAME {
            return Err(ToolError::ToolNotFound(name.to_string()));
        }
        match parse_args::<DocumentArgs>(name, request.arguments)? {
            DocumentArgs::HtmlReport(report) => {
                let html = render_html(&report)?;
                self.deliver(html, "text/html", report.upload).await
            }
            DocumentArgs::MarkdownReport(report) => {
                let md = render_markdown(&report)?;
                self.deliver(md, "text/markdown", report.upload).await
            }
            DocumentArgs::CsvExport(export) => {
                let csv = render_csv(&export)?;
                self.deliver(csv, "text/csv", export.upload).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report() -> Report {
        serde_json::from_value(json!({
            "title": "Access <review>",
            "summary": "Q2 & Q3",
            "sections": [{
                "heading": "Admins",
                "body": "First paragraph.\n\nSecond | paragraph.",
                "table": {"columns": ["User", "Role"], "rows": [["adele@contoso.com", "Global <Admin>"], ["megan", null]]}
            }]
        }))
        .unwrap()
    }

    #[test]
    fn html_escapes_text() {
        let html = render_html(&report()).unwrap();
        assert!(html.contains("<h1>Access &lt;review&gt;</h1>"));
        assert!(html.contains("<p class=\"summary\">Q2 &amp; Q3</p>"));
        assert!(html.contains("<td>Global &lt;Admin&gt;</td>"));
        assert!(html.contains("<p>Second | paragraph.</p>"));
        assert!(html.contains("<td></td>"));
    }

    #[test]
    fn markdown_tables() {
        let md = render_markdown(&report()).unwrap();
        assert!(md.starts_with("# Access <review>\n\nQ2 & Q3\n\n## Admins\n"));
        assert!(md.contains("| User | Role |\n| --- | --- |\n| adele@contoso.com | Global <Admin> |\n| megan |  |\n"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut r = report();
        if let Some(t) = r.sections[0].table.as_mut() {
            t.rows.push(vec![json!("only one")]);
        }
        assert!(matches!(render_html(&r), Err(ToolError::InvalidParams(_))));
    }

    #[test]
    fn csv_quotes_fields() {
        let export: CsvExport = serde_json::from_value(json!({
            "columns": ["name", "members", "owner"],
            "rows": [
                {"name": "Sales, EMEA", "members": 12},
                {"name": "Say \"hi\"", "owner": "megan"}
            ]
        }))
        .unwrap();
        assert_eq!(
            render_csv(&export).unwrap(),
            "name,members,owner\r\n\"Sales, EMEA\",12,\r\n\"Say \"\"hi\"\"\",,megan\r\n"
        );
    }

    #[test]
    fn csv_infers_columns_from_rows() {
        let export: CsvExport = serde_json::from_value(json!({
            "rows": [{"name": "a", "members": 1}, {"owner": "megan"}]
        }))
        .unwrap();
        let csv = render_csv(&export).unwrap();
        let header: Vec<&str> = csv.lines().next().unwrap().split(',').collect();
        assert_eq!(header, vec!["members", "name", "owner"]);
        let empty: CsvExport = serde_json::from_value(json!({"rows": []})).unwrap();
        assert!(render_csv(&empty).is_err());
    }

    #[test]
    fn upload_paths_are_encoded_and_confined() {
        let up = Upload {
            user_id: "adele@contoso.com".into(),
            path: "/Reports/Q2 review.html".into(),
        };
        assert_eq!(
            drive_item_path(&up).unwrap(),
            "/users/adele%40contoso.com/drive/root:/Reports/Q2%20review.html:/content"
        );
        let bad = Upload {
            user_id: "u".into(),
            path: "../secrets.txt".into(),
        };
        assert!(drive_item_path(&bad).is_err());
    }
}
