//! Plain-language descriptions of tool activity for progress events.

use serde_json::Value;

/// Keyword → activity phrase, matched in order against the lowercased tool name.
const ACTIVITIES: &[(&str, &str)] = &[
    ("query", "Querying data"),
    ("search", "Searching for information"),
    ("lookup", "Looking up information"),
    ("get", "Retrieving data"),
    ("fetch", "Fetching information"),
    ("list", "Listing available items"),
    ("read", "Reading data"),
    ("create", "Creating a new record"),
    ("insert", "Adding new data"),
    ("update", "Updating information"),
    ("delete", "Removing data"),
    ("write", "Writing data"),
    ("analyze", "Analyzing data"),
    ("calculate", "Running calculations"),
    ("aggregate", "Aggregating results"),
    ("summarize", "Summarizing information"),
    ("compare", "Comparing data"),
    ("database", "Querying the database"),
    ("table", "Accessing table data"),
    ("execute", "Executing operation"),
    ("run", "Running operation"),
    ("api", "Calling external service"),
    ("request", "Making a request"),
    ("call", "Making a call"),
    ("document", "Processing documents"),
    ("file", "Accessing files"),
    ("content", "Retrieving content"),
];

const QUERY_PREVIEW_CHARS: usize = 50;

/// Describe what a tool call is doing, e.g. `Querying data: "SELECT 1"`.
pub fn describe_tool_call(tool_name: &str, args: Option<&Value>) -> String {
    let lower = tool_name.to_lowercase();
    let Some((_, activity)) = ACTIVITIES.iter().find(|(kw, _)| lower.contains(kw)) else {
        return format!("Running {}", humanize(tool_name));
    };

    let Some(args) = args.and_then(Value::as_object) else {
        return (*activity).to_string();
    };
    if let Some(query) = args.get("query") {
        let query = display_value(query);
        return format!(
            "{activity}: \"{}\"",
            maestro_core::preview(&query, QUERY_PREVIEW_CHARS)
        );
    }
    if let Some(table) = args.get("table").or_else(|| args.get("table_name")) {
        return format!("{activity} from {}", display_value(table));
    }
    if let Some(db) = args.get("database").or_else(|| args.get("db")) {
        return format!("{activity} in {}", display_value(db));
    }
    (*activity).to_string()
}

/// Summarize a tool result by its shape.
pub fn summarize_result(result: &str) -> String {
    if result.is_empty() {
        return "Completed successfully".to_string();
    }
    let lines = result.trim().split('\n').count();
    if lines > 2 {
        return format!("Retrieved {lines} results");
    }
    let commas = result.matches(',').count();
    if result.contains('[') && result.contains(']') && commas > 0 {
        return format!("Retrieved approximately {} items", commas + 1);
    }
    let chars = result.chars().count();
    if chars < 100 {
        return "Completed".to_string();
    }
    format!("Retrieved {chars} characters of data")
}

/// `list_SQLTables` → `list sql tables`; `getUserName` → `get user name`.
fn humanize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' {
            out.push(' ');
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = c.is_lowercase();
        out.extend(c.to_lowercase());
    }
    out
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
