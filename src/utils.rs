use chrono::{DateTime, FixedOffset};
use itertools::Itertools;
use sqlx::SqlitePool;
use std::time::Duration;

pub(crate) async fn is_table_exists(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?
            .is_some(),
    )
}

pub(crate) fn get_now() -> DateTime<FixedOffset> {
    chrono::offset::Local::now().fixed_offset()
}

/// Trims and collapses every whitespace run into a single space.
pub(crate) fn normalize_text<'a, I: IntoIterator<Item = &'a str>>(parts: I) -> String {
    parts
        .into_iter()
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}

/// `Hh Mm Ss`
pub fn fmt_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, rem) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{hours}h {minutes}m {seconds}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_text_nodes() {
        assert_eq!(normalize_text(["  Muy ", "\n buena\t", "materia  "]), "Muy buena materia");
        assert_eq!(normalize_text(["Gr", "eat"]), "Great");
        assert_eq!(normalize_text(["   "]), "");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(fmt_duration(Duration::from_secs(0)), "0h 0m 0s");
        assert_eq!(fmt_duration(Duration::from_millis(3_725_900)), "1h 2m 5s");
    }
}
