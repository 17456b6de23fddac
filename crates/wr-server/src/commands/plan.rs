//! Plan command: shows what a webhook event would be turned into.
//!
//! Runs the same normalization, allocation and target resolution as the
//! listener but prints the worklogs instead of sending them.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use wr_core::{AllocationKind, EventOutcome, InboundEvent, TimeAllocation, plan_event};

use crate::Config;
use crate::targets::build_dispatcher;

/// One planned worklog, printed as a JSON line.
#[derive(Debug, Serialize)]
struct PlannedWorklog<'a> {
    kind: AllocationKind,
    targets: Vec<&'a str>,
    #[serde(flatten)]
    worklog: &'a TimeAllocation,
}

/// Reads the event from `input` (`-` for stdin) and prints its plan.
pub fn run(input: &Path, config: &Config, out: &mut impl Write, err: &mut impl Write) -> Result<()> {
    let body = read_input(input)?;
    let value: serde_json::Value =
        serde_json::from_str(&body).context("event is not valid JSON")?;
    let event = InboundEvent::from_value(value);
    let dispatcher = build_dispatcher(config).context("failed to configure targets")?;

    match plan_event(&event, &config.allocation) {
        EventOutcome::Ignored(reason) => writeln!(err, "ignored: {reason}")?,
        EventOutcome::NoDuration(_) => writeln!(err, "nothing to log: no duration")?,
        EventOutcome::TooShort(_) => writeln!(err, "nothing to log: entry too short")?,
        EventOutcome::Allocated(allocations) => {
            for allocation in allocations {
                let resolved = dispatcher.resolve(allocation);
                let planned = PlannedWorklog {
                    kind: resolved.allocation.kind,
                    targets: resolved.targets.iter().map(|(name, _)| name.as_str()).collect(),
                    worklog: &resolved.allocation,
                };
                writeln!(out, "{}", serde_json::to_string(&planned)?)?;
            }
        }
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read event from stdin")?;
        Ok(body)
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plan(event: &serde_json::Value, config: &Config) -> (String, String) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("event.json");
        std::fs::write(&path, event.to_string()).unwrap();

        let (mut out, mut err) = (Vec::new(), Vec::new());
        run(&path, config, &mut out, &mut err).unwrap();
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    fn entry(description: &str, duration: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "metadata": {"action": "created"},
            "payload": {
                "description": description,
                "start": "2023-08-22T08:00:00+02:00",
                "stop": "2023-08-22T19:00:00+02:00",
                "duration": duration,
            },
        })
    }

    #[test]
    fn split_entry_prints_overtime_first() {
        let (out, err) = plan(&entry("ABC-1 release", serde_json::json!("PT10H")), &Config::default());
        assert!(err.is_empty());

        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "overtime");
        assert_eq!(lines[0]["description"], "ABC-1 release [OT]");
        assert_eq!(lines[0]["timeSpentMinutes"], 180);
        assert_eq!(lines[0]["started"], "2023-08-22T16:00:00+02:00");
        assert_eq!(lines[0]["targets"], serde_json::json!(["jira"]));
        assert_eq!(lines[1]["kind"], "regular");
        assert_eq!(lines[1]["timeSpentMinutes"], 480);
    }

    #[test]
    fn directive_is_resolved() {
        let (out, _) = plan(&entry("ABC-1 {jira, other}", serde_json::json!(1800)), &Config::default());
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["description"], "ABC-1");
        assert_eq!(line["targets"], serde_json::json!(["jira"]));
    }

    #[test]
    fn ignored_event_reports_reason() {
        let (out, err) = plan(&serde_json::json!({"payload": "ping"}), &Config::default());
        assert!(out.is_empty());
        assert_eq!(err, "ignored: ping event\n");
    }

    #[test]
    fn short_entry_is_reported() {
        let (out, err) = plan(&entry("ABC-1", serde_json::json!(20)), &Config::default());
        assert!(out.is_empty());
        assert_eq!(err, "nothing to log: entry too short\n");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("event.json");
        std::fs::write(&path, "{").unwrap();

        let result = run(&path, &Config::default(), &mut Vec::new(), &mut Vec::new());
        assert!(result.is_err());
    }
}
