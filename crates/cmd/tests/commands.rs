// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Command output over the sample capture directory

use anyhow::Result;
use cmd::commands;
use cmd::common::{LogContext, Scope, parse_where};
use schedlog::{EngineConfig, EventKind, LogType, Reduction};
use utilities::test_helpers::sample_capture;

fn context(dir: &tempfile::TempDir) -> LogContext {
    LogContext::new(dir.path(), None, EngineConfig::default())
}

#[tokio::test]
async fn test_describe_lists_log_types_and_cells() -> Result<()> {
    let dir = sample_capture()?;
    let mut output = String::new();
    commands::describe_command(&context(&dir), |s| output.push_str(s)).await?;

    assert!(output.contains("downlink-scheduler (CMAC_dlUeTtiInfo)"));
    assert!(output.contains("uplink-scheduler (CMAC_ulUeTtiInfo)"));
    assert!(output.contains("rows: 16"));
    assert!(output.contains("rows: 12"));
    assert!(output.contains("skipped names: 1"));
    assert!(output.contains("first: 2024-03-11 10:00:00.000"));
    assert!(output.contains("cell 7: 2 UE groups [100, 102]"));
    assert!(output.contains("cell 8: 2 UE groups [101, 103]"));
    assert!(output.contains("cell 9: 2 UE groups [100, 102]"));
    Ok(())
}

#[tokio::test]
async fn test_bler_totals() -> Result<()> {
    let dir = sample_capture()?;
    let mut output = String::new();
    commands::bler_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope::default(),
        1.0,
        None,
        |s| output.push_str(s),
    )
    .await?;
    assert!(output.contains("bucket_start"));
    assert!(output.contains("total bler (ratio): 0.6875"));

    let mut output = String::new();
    commands::bler_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope {
            cell: Some(7),
            ue: None,
        },
        1.0,
        None,
        |s| output.push_str(s),
    )
    .await?;
    assert!(output.contains("total bler (ratio): 0.7500"));
    Ok(())
}

#[tokio::test]
async fn test_trend_with_where_clause() -> Result<()> {
    let dir = sample_capture()?;
    let filter = parse_where(&["CellId=7".to_string()])?;
    let mut output = String::new();
    commands::trend_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope::default(),
        &["ACK.u8AckInfo".to_string()],
        Reduction::Count,
        2.0,
        filter.as_ref(),
        |s| output.push_str(s),
    )
    .await?;
    assert!(output.contains("total ACK.u8AckInfo (count): 8.0000"));

    let unknown = commands::trend_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope::default(),
        &["No.SuchColumn".to_string()],
        Reduction::Mean,
        1.0,
        None,
        |_| {},
    )
    .await;
    assert!(unknown.is_err());
    Ok(())
}

#[tokio::test]
async fn test_hist_overall_and_bucketed() -> Result<()> {
    let dir = sample_capture()?;
    let mut output = String::new();
    commands::hist_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope::default(),
        "SCHD.u16RbNum",
        false,
        None,
        None,
        |s| output.push_str(s),
    )
    .await?;
    assert!(output.contains("SCHD.u16RbNum"));
    assert!(output.contains("total: 16"));

    let mut output = String::new();
    commands::hist_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope::default(),
        "SCHD.u8Layers",
        true,
        Some(4.0),
        None,
        |s| output.push_str(s),
    )
    .await?;
    assert!(output.contains("total SCHD.u8Layers=1 (ratio): 0.5000"));
    assert!(output.contains("total SCHD.u8Layers=2 (ratio): 0.5000"));
    Ok(())
}

#[tokio::test]
async fn test_fail_reasons_and_events() -> Result<()> {
    let dir = sample_capture()?;
    let mut output = String::new();
    commands::fail_reasons_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope::default(),
        |s| output.push_str(s),
    )
    .await?;
    assert!(output.contains("alloc_harqid_fail"));

    let mut output = String::new();
    commands::fail_reasons_command(
        &context(&dir),
        LogType::UplinkScheduler,
        Scope::default(),
        |s| output.push_str(s),
    )
    .await?;
    assert_eq!(output, "no scheduling failures for all cells\n");

    let mut output = String::new();
    commands::events_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope::default(),
        EventKind::Dtx,
        |s| output.push_str(s),
    )
    .await?;
    assert!(output.ends_with("5 dtx events\n"));
    Ok(())
}

#[tokio::test]
async fn test_scope_without_rows_in_direction() -> Result<()> {
    let dir = sample_capture()?;
    let result = commands::events_command(
        &context(&dir),
        LogType::DownlinkScheduler,
        Scope {
            cell: Some(9),
            ue: None,
        },
        EventKind::HarqFail,
        |_| {},
    )
    .await;
    let message = result.err().map(|e| e.to_string()).unwrap_or_default();
    assert_eq!(message, "no downlink-scheduler rows for cell 9");

    let unknown = commands::bler_command(
        &context(&dir),
        LogType::UplinkScheduler,
        Scope {
            cell: Some(42),
            ue: None,
        },
        1.0,
        None,
        |_| {},
    )
    .await;
    assert!(unknown.is_err());
    Ok(())
}
