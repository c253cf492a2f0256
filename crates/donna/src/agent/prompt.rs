//! System prompt assembly.
//!
//! The base persona prompt is extended with a date/time context block
//! (so relative dates resolve against the user's calendar), the user's
//! stored preferences, and the rolling `current_context.md` summary.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone};
use log::debug;

use crate::config::PathSettings;
use crate::notes::markdown::parse_frontmatter;

const BASE_PROMPT: &str = include_str!("prompt.md");

/// Identity and preferences from `user_info_and_preferences.md` frontmatter.
#[derive(Debug, Clone, Default)]
pub struct UserPreferences {
    pub name: Option<String>,
    pub timezone: Option<String>,
}

impl UserPreferences {
    /// Load from the preferences file; missing or unparseable files give
    /// empty preferences.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        let (frontmatter, _) = parse_frontmatter(&content);
        let get = |key: &str| {
            frontmatter
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            name: get("name").filter(|n| !n.is_empty()),
            timezone: get("timezone").filter(|tz| tz != "TBD"),
        }
    }

    /// A fresh user has no stored name yet.
    pub fn is_new_user(&self) -> bool {
        self.name.is_none()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("there")
    }
}

/// Build the complete system prompt for a session.
///
/// `client_timezone` is the IANA name reported by the client; it falls
/// back to the stored preference, then the server's local zone. Date
/// arithmetic always uses the server clock; the zone name is included
/// in the context block so the model knows whose calendar it is.
pub fn build_system_prompt(paths: &PathSettings, client_timezone: Option<&str>) -> String {
    let prefs = UserPreferences::load(&paths.user_preferences_file());
    let tz_name = client_timezone
        .map(str::to_string)
        .or_else(|| prefs.timezone.clone())
        .unwrap_or_else(|| "server-local".to_string());

    let mut prompt = String::from(BASE_PROMPT);

    let _ = write!(
        prompt,
        "\n\n{}\n",
        generate_date_context(Local::now(), &tz_name)
    );

    match fs::read_to_string(paths.user_preferences_file()) {
        Ok(prefs_content) if !prefs_content.trim().is_empty() => {
            let _ = write!(
                prompt,
                "\n## User Info and Preferences\n\n\
                 Address the user by the `name` in the frontmatter and match\n\
                 their `communication_style`.\n\n{}\n",
                prefs_content
            );
        }
        _ => debug!("no user preferences file; skipping section"),
    }

    match fs::read_to_string(paths.current_context_file()) {
        Ok(context) if !context.trim().is_empty() => {
            let _ = write!(
                prompt,
                "\n## Current Active Context\n\n\
                 Topics the user is currently focused on. Reference these\n\
                 when relevant:\n\n{}\n",
                context
            );
        }
        _ => {
            prompt.push_str(
                "\n## Current Active Context\n\n\
                 No active context items. This may be a new user or a fresh start.\n",
            );
        }
    }

    prompt
}

/// Prompt that asks the agent to open the conversation.
///
/// New users (no stored name) get the onboarding flow; returning users
/// get a brief contextual greeting.
pub fn greeting_prompt(paths: &PathSettings) -> String {
    let prefs = UserPreferences::load(&paths.user_preferences_file());

    if prefs.is_new_user() {
        return "[SYSTEM - ONBOARDING]\n\
                This is a new user. Use the new-user-onboarding skill to guide\n\
                them through a natural introduction."
            .to_string();
    }

    format!(
        "[SYSTEM - GREETING]\n\
         Start this conversation by greeting {} naturally and asking what's\n\
         on their mind. Keep it conversational and brief - one or two\n\
         sentences, no bullet points. You can suggest things from their\n\
         active context, or offer a check-in, capturing something new, or\n\
         just chatting.",
        prefs.display_name()
    )
}

/// Render the date/time context block injected into the system prompt.
///
/// Lists today, the coming week, and a few reference points so the model
/// can resolve phrases like "Wednesday" or "end of the month" without
/// date arithmetic.
pub fn generate_date_context<Tz: TimeZone>(now: DateTime<Tz>, tz_name: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut lines: Vec<String> = Vec::new();
    lines.push("=== DATE & TIME CONTEXT ===".to_string());
    lines.push(format!("Today: {}", now.format("%A, %B %-d, %Y")));
    lines.push(format!(
        "Current time: {} ({}) [{}]",
        now.format("%-I:%M %p"),
        tz_name,
        now.to_rfc3339(),
    ));
    lines.push(String::new());
    lines.push("--- This Week ---".to_string());

    let days_left_in_week = 6 - now.weekday().num_days_from_monday() as i64;
    for i in 1..=7i64 {
        let future = now.clone() + Days::new(i as u64);
        let label = if i == 1 {
            format!("Tomorrow ({})", &future.format("%A").to_string()[..3])
        } else if i > days_left_in_week {
            format!("Next {}", future.format("%A"))
        } else {
            future.format("%A").to_string()
        };
        lines.push(format!(
            "{:<18} {} [{}]",
            format!("{}:", label),
            future.format("%B %-d, %Y"),
            future.format("%Y-%m-%d"),
        ));
    }

    lines.push(String::new());
    lines.push("--- Reference Points ---".to_string());
    for (label, days) in [("1 week from now:", 7u64), ("2 weeks from now:", 14u64)] {
        let future = now.clone() + Days::new(days);
        lines.push(format!(
            "{:<18} {} [{}]",
            label,
            future.format("%A, %B %-d, %Y"),
            future.format("%Y-%m-%d"),
        ));
    }
    if let Some(eom) = end_of_month(now.date_naive()) {
        lines.push(format!(
            "{:<18} {} [{}]",
            "End of month:",
            eom.format("%A, %B %-d, %Y"),
            eom.format("%Y-%m-%d"),
        ));
    }

    lines.join("\n")
}

fn end_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_now() -> DateTime<Utc> {
        // Wednesday, March 11, 2026, 14:30 UTC.
        Utc.with_ymd_and_hms(2026, 3, 11, 14, 30, 0).single().unwrap()
    }

    #[test]
    fn test_date_context_today_line() {
        let ctx = generate_date_context(fixed_now(), "America/New_York");
        assert!(ctx.contains("Today: Wednesday, March 11, 2026"));
        assert!(ctx.contains("America/New_York"));
    }

    #[test]
    fn test_date_context_marks_next_week() {
        let ctx = generate_date_context(fixed_now(), "UTC");
        // Sunday March 15 is still this week; Monday March 16 is next.
        assert!(ctx.contains("Sunday:"));
        assert!(ctx.contains("Next Monday:"));
        assert!(ctx.contains("Tomorrow (Thu):"));
    }

    #[test]
    fn test_date_context_end_of_month() {
        let ctx = generate_date_context(fixed_now(), "UTC");
        assert!(ctx.contains("End of month:"));
        assert!(ctx.contains("2026-03-31"));
    }

    #[test]
    fn test_end_of_month_december_rolls_year() {
        let date = NaiveDate::from_ymd_opt(2026, 12, 5).unwrap();
        assert_eq!(
            end_of_month(date),
            NaiveDate::from_ymd_opt(2026, 12, 31)
        );
    }

    #[test]
    fn test_preferences_from_missing_file_are_empty() {
        let prefs = UserPreferences::load(Path::new("/nonexistent/prefs.md"));
        assert!(prefs.is_new_user());
        assert_eq!(prefs.display_name(), "there");
    }

    #[test]
    fn test_preferences_parse_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_info_and_preferences.md");
        fs::write(
            &path,
            "---\nname: Alex\ntimezone: Europe/Berlin\n---\n\nNotes about Alex.\n",
        )
        .unwrap();
        let prefs = UserPreferences::load(&path);
        assert_eq!(prefs.name.as_deref(), Some("Alex"));
        assert_eq!(prefs.timezone.as_deref(), Some("Europe/Berlin"));
        assert!(!prefs.is_new_user());
    }

    #[test]
    fn test_tbd_timezone_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.md");
        fs::write(&path, "---\nname: Alex\ntimezone: TBD\n---\n").unwrap();
        let prefs = UserPreferences::load(&path);
        assert!(prefs.timezone.is_none());
    }
}
