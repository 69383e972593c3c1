use anyhow::{Context, Result};
use colored::Colorize;
use deepdip_core::{AttemptEvent, AttemptPivot, AttemptResult, FallCounter, PlayerScan, bool_label};
use log::info;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EVENT_LOG_FILE: &str = "result.csv";
pub const PIVOT_FILE: &str = "aggregated.csv";

/// Write the event log: a leading row index, then one row per event.
pub fn write_event_log<W: Write>(writer: W, events: &[AttemptEvent]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "",
        "user",
        "day",
        "floor",
        "floor_result",
        "timestamp",
        "on_stream",
    ])?;
    for (index, event) in events.iter().enumerate() {
        csv.write_record([
            index.to_string(),
            event.user.clone(),
            event.day.to_string(),
            event.floor.to_string(),
            event.result.code().to_string(),
            event.timestamp.clone(),
            bool_label(event.on_stream).to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write the success/fail pivot, one row per user, floor and stream flag.
pub fn write_pivot<W: Write>(writer: W, pivot: &AttemptPivot) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["", "helper", "user", "floor", "on_stream", "fail", "success"])?;
    for (index, row) in pivot.rows.iter().enumerate() {
        csv.write_record([
            index.to_string(),
            row.helper(),
            row.user.clone(),
            row.floor.to_string(),
            bool_label(row.on_stream).to_string(),
            row.fail.to_string(),
            row.success.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write both CSV files into `output_dir`, creating it if needed.
pub fn write_outputs(output_dir: &Path, events: &[AttemptEvent]) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let event_path = output_dir.join(EVENT_LOG_FILE);
    let file = File::create(&event_path)
        .with_context(|| format!("failed to create {}", event_path.display()))?;
    write_event_log(file, events)
        .with_context(|| format!("failed to write {}", event_path.display()))?;

    let pivot_path = output_dir.join(PIVOT_FILE);
    let file = File::create(&pivot_path)
        .with_context(|| format!("failed to create {}", pivot_path.display()))?;
    write_pivot(file, &AttemptPivot::from_events(events))
        .with_context(|| format!("failed to write {}", pivot_path.display()))?;

    Ok((event_path, pivot_path))
}

/// Log every fall transition, least frequent first.
pub fn log_fall_counter(falls: &FallCounter) {
    for (key, count) in falls.sorted_by_count() {
        info!("{key} -> {count}");
    }
}

pub fn print_player_summary(scan: &PlayerScan) {
    println!(
        "   {} {}: {} days, {} success, {} fail",
        "•".cyan(),
        scan.user.bold(),
        scan.days_scanned,
        scan.count(AttemptResult::Success).to_string().green(),
        scan.count(AttemptResult::Fail).to_string().red(),
    );
    if scan.skipped_readings > 0 {
        println!(
            "     {} readings skipped for malformed timestamps",
            scan.skipped_readings.to_string().yellow()
        );
    }
    if scan.unqualified_ascents > 0 {
        println!(
            "     {} ascents not credited",
            scan.unqualified_ascents.to_string().yellow()
        );
    }
}

pub fn print_run_summary(
    scans: &[PlayerScan],
    failures: &[(String, String)],
    falls: &FallCounter,
    total_duration: Duration,
) {
    println!();
    println!("{}", "📊 Attempt Summary".bright_cyan().bold());
    println!("{}", "==================".cyan());

    let events: usize = scans.iter().map(|s| s.events.len()).sum();
    let on_stream = scans
        .iter()
        .flat_map(|s| &s.events)
        .filter(|e| e.on_stream)
        .count();
    println!("Players scanned: {}", scans.len().to_string().green());
    println!("Players failed: {}", failures.len().to_string().red());
    println!("Events: {events} ({on_stream} on stream)");
    println!("Falls recorded: {}", falls.total());
    println!("Total time: {total_duration:?}");

    for (player, reason) in failures {
        println!("   {} {}: {}", "❌".red(), player.bold(), reason.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepdip_core::DayLabel;

    fn event(user: &str, floor: i32, result: AttemptResult, on_stream: bool) -> AttemptEvent {
        AttemptEvent {
            user: user.to_string(),
            day: DayLabel::new("Day 27"),
            floor,
            result,
            timestamp: "05/27, 10:15 PM".to_string(),
            on_stream,
        }
    }

    #[test]
    fn event_log_has_index_column_and_capitalized_booleans() {
        let mut out = Vec::new();
        write_event_log(
            &mut out,
            &[
                event("BrenTM", 3, AttemptResult::Success, true),
                event("BrenTM", 4, AttemptResult::Fail, false),
            ],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], ",user,day,floor,floor_result,timestamp,on_stream");
        assert_eq!(lines[1], "0,BrenTM,Day 27,3,1,\"05/27, 10:15 PM\",True");
        assert_eq!(lines[2], "1,BrenTM,Day 27,4,0,\"05/27, 10:15 PM\",False");
    }

    #[test]
    fn pivot_rows_carry_helper_key() {
        let events = [
            event("Larstm", 2, AttemptResult::Success, false),
            event("Larstm", 2, AttemptResult::Fail, false),
            event("Larstm", 2, AttemptResult::Fail, false),
        ];
        let mut out = Vec::new();
        write_pivot(&mut out, &AttemptPivot::from_events(&events)).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], ",helper,user,floor,on_stream,fail,success");
        assert_eq!(lines[1], "0,Larstm-2-False,Larstm,2,False,2,1");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn outputs_land_in_created_directory() {
        let dir = std::env::temp_dir().join(format!(
            "deepdip-reports-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let (events, pivot) = write_outputs(&dir, &[]).unwrap();
        assert!(events.ends_with(EVENT_LOG_FILE));
        assert_eq!(
            fs::read_to_string(pivot).unwrap().trim(),
            ",helper,user,floor,on_stream,fail,success"
        );
    }
}
