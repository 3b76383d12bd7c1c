use serde_json::Value;

/// Render a compact one-line-per-unit status table, the same fixed-width idiom the orchestration
/// tool's CLI used for IaC run listings.
pub fn render_unit_statuses(units: &Value) -> String {
    let Some(rows) = units.as_array() else {
        return "No units.\n".to_string();
    };
    if rows.is_empty() {
        return "No units.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("{:<24} {:<10} {:<12} {}\n", "UNIT", "STATE", "LAST RUN", "ERROR"));
    out.push_str(&"-".repeat(70));
    out.push('\n');
    for row in rows {
        let unit_id = row
            .get("unit")
            .and_then(|u| u.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let status = row.get("status");
        let state = status.and_then(|s| s.get("state")).and_then(|v| v.as_str()).unwrap_or("IDLE");
        let last_run = status
            .and_then(|s| s.get("last_run_at"))
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let error = status
            .and_then(|s| s.get("last_error"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        out.push_str(&format!("{:<24} {:<10} {:<12} {}\n", unit_id, state, last_run, error));
    }
    out
}

pub fn render_events(events: &Value) -> String {
    let Some(rows) = events.as_array() else {
        return "No events.\n".to_string();
    };
    if rows.is_empty() {
        return "No events.\n".to_string();
    }
    let mut out = String::new();
    for row in rows {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    out
}
