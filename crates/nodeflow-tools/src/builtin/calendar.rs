use chrono::{Duration, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Value};

use nodeflow_core::types::ToolFailure;

use super::{arg_str, invalid_args, unknown_operation};
use crate::registry::SimProvider;

const TITLES: &[&str] = &[
    "Team standup",
    "Design review",
    "1:1 sync",
    "Customer call",
    "Planning",
    "Lunch",
];

/// Simulated calendar backend.
pub struct CalendarProvider;

fn day(args: &Value) -> std::result::Result<NaiveDate, ToolFailure> {
    match arg_str(args, "date") {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| invalid_args(format!("date '{}' is not YYYY-MM-DD", s))),
        None => NaiveDate::from_ymd_opt(2025, 1, 6).ok_or_else(|| invalid_args("bad default date")),
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> String {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    date.and_time(time).format("%Y-%m-%dT%H:%M:00").to_string()
}

fn list_events(args: &Value, rng: &mut StdRng) -> std::result::Result<Value, ToolFailure> {
    let date = day(args)?;
    let count = rng.gen_range(1..=4);
    let mut hour = 9;
    let events: Vec<Value> = (0..count)
        .map(|i| {
            let title = TITLES[rng.gen_range(0..TITLES.len())];
            let start = hour;
            hour += rng.gen_range(1..=2);
            json!({
                "id": format!("evt-{}-{}", date.format("%m%d"), i + 1),
                "title": title,
                "start": at(date, start, 0),
                "end": at(date, start, 45),
            })
        })
        .collect();
    Ok(json!({ "date": date.to_string(), "events": events }))
}

fn create_event(args: &Value, rng: &mut StdRng) -> std::result::Result<Value, ToolFailure> {
    let title = arg_str(args, "title").unwrap_or("New event");
    let date = day(args)?;
    let hour = rng.gen_range(9..17);
    Ok(json!({
        "id": format!("evt-{:04}", rng.gen_range(0..10_000)),
        "title": title,
        "start": at(date, hour, 0),
        "end": at(date, hour, 30),
        "created": true,
    }))
}

fn check_availability(args: &Value, rng: &mut StdRng) -> std::result::Result<Value, ToolFailure> {
    let date = day(args)?;
    let mut start = date.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default());
    let mut slots = Vec::new();
    for _ in 0..3 {
        start += Duration::minutes(30 * rng.gen_range(1..=4));
        let end = start + Duration::minutes(30);
        slots.push(json!({
            "start": start.format("%Y-%m-%dT%H:%M:00").to_string(),
            "end": end.format("%Y-%m-%dT%H:%M:00").to_string(),
        }));
        start = end;
    }
    Ok(json!({ "date": date.to_string(), "available": true, "slots": slots }))
}

fn delete_event(args: &Value) -> std::result::Result<Value, ToolFailure> {
    let id = arg_str(args, "id")
        .or_else(|| arg_str(args, "eventId"))
        .ok_or_else(|| invalid_args("delete_event requires 'id'"))?;
    Ok(json!({ "id": id, "deleted": true }))
}

impl SimProvider for CalendarProvider {
    fn name(&self) -> &str {
        "calendar"
    }

    fn operations(&self) -> &[&'static str] {
        &["list_events", "create_event", "check_availability", "delete_event"]
    }

    fn run(
        &self,
        operation: &str,
        args: &Value,
        rng: &mut StdRng,
    ) -> std::result::Result<Value, ToolFailure> {
        match operation {
            "list_events" => list_events(args, rng),
            "create_event" => create_event(args, rng),
            "check_availability" => check_availability(args, rng),
            "delete_event" => delete_event(args),
            other => Err(unknown_operation(self.name(), other)),
        }
    }
}
