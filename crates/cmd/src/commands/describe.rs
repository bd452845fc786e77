// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use schedlog::{LogDescription, SchedLog};
use utilities::banner::format_banner_with_fields;

use crate::common::{LogContext, format_file_size};

/// Describe command - shows files, rows and time range per log type, then
/// the cells and UE groups seen in the capture directory
pub async fn describe_command<F>(ctx: &LogContext, mut handler: F) -> Result<()>
where
    F: FnMut(&str),
{
    diagnostics::debug!(
        "describe_command called for {dir}",
        dir: ctx.directory().display().to_string()
    );

    let log = ctx.open_log().await?;
    let mut output = String::new();
    for description in log.describe() {
        output.push_str(&format_description(&description));
    }
    output.push_str(&format_ids(&log));
    handler(&output);
    Ok(())
}

fn format_description(description: &LogDescription) -> String {
    let time = |t: Option<chrono::NaiveDateTime>| {
        t.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
    };
    let title = format!("{} ({})", description.log_type, description.log_type.tag());
    let mut lines = vec![
        (
            Some(format!("files: {}", description.files)),
            Some(format_file_size(description.size_bytes)),
        ),
        (Some(format!("rows: {}", description.rows)), None),
        (Some(format!("first: {}", time(description.first))), None),
        (Some(format!("last:  {}", time(description.last))), None),
    ];
    if description.skipped > 0 {
        lines.push((
            Some(format!("skipped names: {}", description.skipped)),
            None,
        ));
    }
    for failure in &description.failures {
        let name = failure
            .path
            .file_name()
            .map_or_else(|| failure.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        lines.push((Some(format!("unreadable: {name}")), None));
    }
    format_banner_with_fields(Some(&title), lines)
}

fn format_ids(log: &SchedLog) -> String {
    let pairs = log.cell_and_ue_ids();
    let mut output = String::new();
    for cell in log.cell_ids() {
        let ues: Vec<String> = pairs
            .iter()
            .filter(|(c, _)| *c == cell)
            .map(|(_, ue)| ue.to_string())
            .collect();
        output.push_str(&format!("cell {cell}: {} UE groups [{}]\n", ues.len(), ues.join(", ")));
    }
    output
}
