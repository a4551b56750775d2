use crate::actions::{Action, ActionContext, ActionError, ActionOutput, str_field};
use crate::model::ActionKind;
use crate::utils::context_hub::ContextHub;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use google_calendar3::api::{Event, EventDateTime, EventReminder, EventReminders};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_DATE: &str = "2024-11-15";
pub const DEFAULT_TIME: &str = "14:30";
pub const DEFAULT_DURATION_MINUTES: i64 = 60;
const CALENDAR_ID: &str = "primary";

fn parse_date(date: &str) -> Result<NaiveDate, ActionError> {
    let invalid = || {
        ActionError::InvalidDateTime(format!(
            "Invalid date format: {date}. Expected format: YYYY-MM-DD or YYYY-M-D"
        ))
    };
    let parts: Vec<&str> = date.trim().split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return Err(invalid());
    };
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn parse_time(time: &str) -> Result<NaiveTime, ActionError> {
    let invalid = || {
        ActionError::InvalidDateTime(format!(
            "Invalid time format: {time}. Expected format: HH:MM or H:M"
        ))
    };
    let parts: Vec<u32> = time
        .trim()
        .split(':')
        .map(|p| p.parse().map_err(|_| invalid()))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [hour, minute] => NaiveTime::from_hms_opt(*hour, *minute, 0),
        [hour, minute, second] => NaiveTime::from_hms_opt(*hour, *minute, *second),
        _ => None,
    }
    .ok_or_else(invalid)
}

/// Combines the `dateField` and `timeField` of a calendar action into an instant.
///
/// A date containing `T` is taken as a full timestamp. Otherwise loose `Y-M-D`
/// and `H:M[:S]` forms are accepted. Values without an offset are UTC.
pub fn parse_date_time(date: &str, time: &str) -> Result<DateTime<Utc>, ActionError> {
    if date.contains('T') {
        if let Ok(instant) = DateTime::parse_from_rfc3339(date.trim()) {
            return Ok(instant.with_timezone(&Utc));
        }
        let trimmed = date.trim().trim_end_matches('Z');
        return ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
            .map(|naive| naive.and_utc())
            .ok_or_else(|| {
                ActionError::InvalidDateTime(format!("Invalid date format: {date}"))
            });
    }
    Ok(parse_date(date)?.and_time(parse_time(time)?).and_utc())
}

/// Start and end of the event described by `config`.
pub fn event_window(config: &Value) -> Result<(DateTime<Utc>, DateTime<Utc>), ActionError> {
    let start = parse_date_time(
        str_field(config, "dateField").unwrap_or(DEFAULT_DATE),
        str_field(config, "timeField").unwrap_or(DEFAULT_TIME),
    )?;
    let minutes = match config.get("duration") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|m| *m > 0)
    .unwrap_or(DEFAULT_DURATION_MINUTES);
    Ok((start, start + Duration::minutes(minutes)))
}

fn reminders(enabled: bool) -> EventReminders {
    let overrides = enabled.then(|| {
        vec![
            EventReminder {
                method: Some("email".to_string()),
                minutes: Some(24 * 60),
            },
            EventReminder {
                method: Some("popup".to_string()),
                minutes: Some(10),
            },
        ]
    });
    EventReminders {
        use_default: Some(false),
        overrides,
    }
}

fn utc_time(instant: DateTime<Utc>) -> EventDateTime {
    EventDateTime {
        date_time: Some(instant),
        time_zone: Some("UTC".to_string()),
        ..Default::default()
    }
}

/// Creates an event in the connected account's primary calendar.
pub struct CalendarAction {
    hubs: Arc<ContextHub>,
}

impl CalendarAction {
    pub fn new(hubs: Arc<ContextHub>) -> Self {
        Self { hubs }
    }
}

#[async_trait]
impl Action for CalendarAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Calendar
    }

    async fn execute(&self, ctx: &ActionContext, config: &Value) -> Result<ActionOutput, ActionError> {
        let account = ctx.google_account()?;
        let (start, end) = event_window(config)?;
        let title = str_field(config, "eventTitle").unwrap_or("Zap Event");
        let description = str_field(config, "eventDescription").unwrap_or("Created by an automated workflow");
        let notify = config
            .get("sendNotifications")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let event = Event {
            summary: Some(title.to_string()),
            description: Some(description.to_string()),
            start: Some(utc_time(start)),
            end: Some(utc_time(end)),
            reminders: Some(reminders(notify)),
            ..Default::default()
        };
        let hubs = self.hubs.hubs_for(account).await?;
        let (_, created) = hubs
            .calendar
            .events()
            .insert(event, CALENDAR_ID)
            .send_notifications(notify)
            .doit()
            .await
            .map_err(|e| ActionError::Google(e.to_string()))?;

        let start_time = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_time = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        info!(zap_id = %ctx.zap_id, start = %start_time, "Calendar event created");
        Ok(ActionOutput {
            message: format!("Calendar event '{title}' created for {start_time}"),
            details: json!({
                "eventId": created.id,
                "eventLink": created.html_link,
                "startTime": start_time,
                "endTime": end_time,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::google_auth::GConf;

    fn iso(instant: DateTime<Utc>) -> String {
        instant.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    #[test]
    fn loose_dates_and_times_are_padded() {
        let instant = parse_date_time("2025-3-7", "9:5").unwrap();
        assert_eq!(iso(instant), "2025-03-07T09:05:00Z");

        let with_seconds = parse_date_time("2025-12-31", "23:59:30").unwrap();
        assert_eq!(iso(with_seconds), "2025-12-31T23:59:30Z");
    }

    #[test]
    fn full_timestamps_are_used_as_is() {
        let offset = parse_date_time("2025-06-01T10:00:00+02:00", "ignored").unwrap();
        assert_eq!(iso(offset), "2025-06-01T08:00:00Z");

        let naive = parse_date_time("2025-06-01T10:00", "").unwrap();
        assert_eq!(iso(naive), "2025-06-01T10:00:00Z");
    }

    #[test]
    fn malformed_values_are_rejected_with_hints() {
        let bad_date = parse_date_time("15/11/2024", "10:00").unwrap_err();
        assert_eq!(
            bad_date.to_string(),
            "Invalid date format: 15/11/2024. Expected format: YYYY-MM-DD or YYYY-M-D"
        );
        let bad_time = parse_date_time("2024-11-15", "noon").unwrap_err();
        assert_eq!(
            bad_time.to_string(),
            "Invalid time format: noon. Expected format: HH:MM or H:M"
        );
        assert!(parse_date_time("2024-02-30", "10:00").is_err());
    }

    #[test]
    fn window_defaults_to_one_hour_at_default_slot() {
        let (start, end) = event_window(&json!({})).unwrap();
        assert_eq!(iso(start), "2024-11-15T14:30:00Z");
        assert_eq!(iso(end), "2024-11-15T15:30:00Z");

        let (_, custom) = event_window(&json!({ "duration": "15", "dateField": "2024-1-2", "timeField": "8:00" })).unwrap();
        assert_eq!(iso(custom), "2024-01-02T08:15:00Z");
    }

    #[test]
    fn reminders_follow_notification_flag() {
        let on = reminders(true);
        let overrides = on.overrides.unwrap();
        assert_eq!(overrides[0].minutes, Some(1440));
        assert_eq!(overrides[1].method.as_deref(), Some("popup"));
        assert!(reminders(false).overrides.is_none());
    }

    #[tokio::test]
    async fn requires_connected_google_account() {
        let action = CalendarAction::new(Arc::new(ContextHub::new(GConf::default())));
        let ctx = ActionContext {
            zap_id: "zap-1".to_string(),
            zap_name: "n".to_string(),
            trigger_data: json!({}),
            google: None,
        };

        let result = action.execute(&ctx, &json!({})).await;

        assert!(matches!(result, Err(ActionError::GoogleNotConnected)));
    }
}
