//! Console log file naming, rotation names and expiry.
//!
//! Files live directly in the log directory:
//! `<name> YY-MMDD.log` for the active file, `<name> YY-MMDD HH.log`
//! (or `HH.MM`, then `HH.MM.N`, when taken) once rotated.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SECS_PER_DAY: u64 = 86_400;

/// A UTC calendar timestamp with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
	pub year: u32,
	pub month: u32,
	pub day: u32,
	pub hour: u32,
	pub minute: u32,
}

impl Stamp {
	pub fn now() -> Self {
		let secs = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or(0);
		Self::from_unix(secs)
	}

	/// Civil date from seconds since the epoch (days-from-civil inverse).
	pub fn from_unix(secs: u64) -> Self {
		let days = (secs / SECS_PER_DAY) as i64 + 719_468;
		let rem = secs % SECS_PER_DAY;

		let era = days.div_euclid(146_097);
		let day_of_era = days.rem_euclid(146_097);
		let year_of_era =
			(day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
		let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
		let shifted_month = (5 * day_of_year + 2) / 153;
		let day = day_of_year - (153 * shifted_month + 2) / 5 + 1;
		let month = if shifted_month < 10 { shifted_month + 3 } else { shifted_month - 9 };
		let year = year_of_era + era * 400 + i64::from(month <= 2);

		Self {
			year: year as u32,
			month: month as u32,
			day: day as u32,
			hour: (rem / 3600) as u32,
			minute: ((rem % 3600) / 60) as u32,
		}
	}

	/// Seconds since the epoch at midnight of this stamp's date.
	pub fn midnight_unix(&self) -> u64 {
		days_from_civil(self.year, self.month, self.day).max(0) as u64 * SECS_PER_DAY
	}

	/// `YY-MMDD`
	pub fn date_tag(&self) -> String {
		format!("{:02}-{:02}{:02}", self.year % 100, self.month, self.day)
	}
}

fn days_from_civil(year: u32, month: u32, day: u32) -> i64 {
	let (y, m) = if month <= 2 {
		(i64::from(year) - 1, i64::from(month) + 9)
	} else {
		(i64::from(year), i64::from(month) - 3)
	};
	let era = y.div_euclid(400);
	let year_of_era = y.rem_euclid(400);
	let day_of_year = (153 * m + 2) / 5 + i64::from(day) - 1;
	let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
	era * 146_097 + day_of_era - 719_468
}

pub fn current_log_name(name: &str) -> String {
	format!("{} {}.log", name, Stamp::now().date_tag())
}

/// Name for a rotated-out log: hourly, then per minute, then numbered so an
/// existing segment is never overwritten.
pub fn rotated_log_name(log_dir: &Path, name: &str) -> String {
	rotated_log_name_at(log_dir, name, Stamp::now())
}

fn rotated_log_name_at(log_dir: &Path, name: &str, at: Stamp) -> String {
	let hourly = format!("{} {} {:02}.log", name, at.date_tag(), at.hour);
	if !log_dir.join(&hourly).exists() {
		return hourly;
	}
	let base = format!("{} {} {:02}.{:02}", name, at.date_tag(), at.hour, at.minute);
	let minutely = format!("{}.log", base);
	if !log_dir.join(&minutely).exists() {
		return minutely;
	}
	(2u32..)
		.map(|n| format!("{}.{}.log", base, n))
		.find(|candidate| !log_dir.join(candidate).exists())
		.unwrap_or(minutely)
}

/// Extract the date from a log file name, returning `(year, month, day)` with
/// a four-digit year.
pub fn parse_log_date(file_name: &str) -> Option<(u32, u32, u32)> {
	let stem = file_name.strip_suffix(".log")?;
	let tag = stem.split(' ').find(|part| is_date_tag(part))?;
	let (yy, mmdd) = tag.split_once('-')?;
	let year: u32 = yy.parse().ok()?;
	let month: u32 = mmdd[..2].parse().ok()?;
	let day: u32 = mmdd[2..].parse().ok()?;
	if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
		return None;
	}
	Some((2000 + year, month, day))
}

fn is_date_tag(part: &str) -> bool {
	let bytes = part.as_bytes();
	bytes.len() == 7
		&& bytes[2] == b'-'
		&& bytes.iter().enumerate().all(|(i, b)| i == 2 || b.is_ascii_digit())
}

/// Delete `<name> *.log` files older than `max_age_days`, then the oldest
/// beyond `max_files`. Zero disables either limit. Failures are ignored.
pub fn expire_logs(log_dir: &Path, name: &str, max_age_days: u32, max_files: u32) {
	let entries = match std::fs::read_dir(log_dir) {
		Ok(e) => e,
		Err(_) => return,
	};

	let prefix = format!("{} ", name);
	let mut files: Vec<(PathBuf, Option<(u32, u32, u32)>)> = entries
		.flatten()
		.map(|entry| entry.path())
		.filter_map(|path| {
			let file_name = path.file_name()?.to_str()?.to_string();
			if !file_name.starts_with(&prefix) || !file_name.ends_with(".log") {
				return None;
			}
			let date = parse_log_date(&file_name);
			Some((path, date))
		})
		.collect();

	if max_age_days > 0 {
		let cutoff = Stamp::now()
			.midnight_unix()
			.saturating_sub(u64::from(max_age_days) * SECS_PER_DAY);
		files.retain(|(path, date)| match date {
			Some((y, m, d)) if (days_from_civil(*y, *m, *d).max(0) as u64) * SECS_PER_DAY < cutoff => {
				let _ = std::fs::remove_file(path);
				false
			}
			_ => true,
		});
	}

	if max_files > 0 && files.len() > max_files as usize {
		files.sort_by_key(|(path, _)| path.metadata().and_then(|m| m.modified()).ok());
		let excess = files.len() - max_files as usize;
		for (path, _) in files.iter().take(excess) {
			let _ = std::fs::remove_file(path);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stamp_from_unix() {
		let s = Stamp::from_unix(1_771_027_200 + 9 * 3600 + 47 * 60);
		assert_eq!(
			s,
			Stamp {
				year: 2026,
				month: 2,
				day: 14,
				hour: 9,
				minute: 47
			}
		);
		assert_eq!(s.date_tag(), "26-0214");
	}

	#[test]
	fn stamp_leap_day() {
		let s = Stamp::from_unix(951_782_400);
		assert_eq!((s.year, s.month, s.day), (2000, 2, 29));
	}

	#[test]
	fn midnight_roundtrips_through_civil_days() {
		let s = Stamp::from_unix(1_771_027_200 + 12_345);
		assert_eq!(s.midnight_unix(), 1_771_027_200);
	}

	#[test]
	fn parse_dates_from_all_name_shapes() {
		assert_eq!(parse_log_date("survival 26-0214.log"), Some((2026, 2, 14)));
		assert_eq!(parse_log_date("survival 26-0214 09.log"), Some((2026, 2, 14)));
		assert_eq!(parse_log_date("survival 26-0214 09.47.log"), Some((2026, 2, 14)));
		assert_eq!(parse_log_date("survival.log"), None);
		assert_eq!(parse_log_date("survival 26-1399.log"), None);
	}

	#[test]
	fn rotated_names_never_collide() {
		let dir = std::env::temp_dir().join(format!("rengoku-rotate-names-{}", std::process::id()));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();
		let at = Stamp::from_unix(1_771_027_200 + 9 * 3600 + 47 * 60);

		let mut seen = Vec::new();
		for _ in 0..4 {
			let name = rotated_log_name_at(&dir, "srv", at);
			assert!(!dir.join(&name).exists(), "{} already exists", name);
			std::fs::write(dir.join(&name), "segment").unwrap();
			seen.push(name);
		}
		assert_eq!(
			seen,
			[
				"srv 26-0214 09.log",
				"srv 26-0214 09.47.log",
				"srv 26-0214 09.47.2.log",
				"srv 26-0214 09.47.3.log",
			]
		);
		assert!(seen.iter().all(|n| parse_log_date(n) == Some((2026, 2, 14))));

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn current_name_shape() {
		let name = current_log_name("survival");
		assert!(name.starts_with("survival "));
		assert!(name.ends_with(".log"));
		assert!(parse_log_date(&name).is_some());
	}

	#[test]
	fn expire_removes_old_and_excess_files() {
		let dir = std::env::temp_dir().join(format!("rengoku-expire-{}", std::process::id()));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();

		std::fs::write(dir.join("srv 01-0101.log"), "old").unwrap();
		std::fs::write(dir.join("other 01-0101.log"), "not ours").unwrap();
		let today = current_log_name("srv");
		std::fs::write(dir.join(&today), "fresh").unwrap();

		expire_logs(&dir, "srv", 7, 0);
		assert!(!dir.join("srv 01-0101.log").exists());
		assert!(dir.join("other 01-0101.log").exists());
		assert!(dir.join(&today).exists());

		std::fs::write(dir.join(rotated_log_name(&dir, "srv")), "rotated").unwrap();
		expire_logs(&dir, "srv", 0, 1);
		let remaining = std::fs::read_dir(&dir)
			.unwrap()
			.flatten()
			.filter(|e| e.file_name().to_string_lossy().starts_with("srv "))
			.count();
		assert_eq!(remaining, 1);

		let _ = std::fs::remove_dir_all(&dir);
	}
}
