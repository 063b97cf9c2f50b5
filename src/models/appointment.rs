use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shift {
    Morning,
    Afternoon,
}

impl Shift {
    /// Single-letter code the hospital backend uses everywhere.
    pub fn code(&self) -> &'static str {
        match self {
            Shift::Morning => "M",
            Shift::Afternoon => "T",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "M" => Some(Shift::Morning),
            "T" => Some(Shift::Afternoon),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Shift::Morning => "Mañana",
            Shift::Afternoon => "Tarde",
        }
    }

    /// One-hour buckets offered on the date-first path before a doctor
    /// is fixed.
    pub fn hour_ranges(&self) -> Vec<HourRange> {
        let hours: &[u32] = match self {
            Shift::Morning => &[8, 9, 10, 11, 12],
            Shift::Afternoon => &[14, 15, 16, 17],
        };
        hours.iter().filter_map(|h| HourRange::from_hour(*h)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMethod {
    ByDoctor,
    ByDatetime,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::ByDoctor => "by-doctor",
            SearchMethod::ByDatetime => "by-datetime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "by-doctor" => Some(SearchMethod::ByDoctor),
            "by-datetime" => Some(SearchMethod::ByDatetime),
            _ => None,
        }
    }
}

/// Half-open hour bucket, `from` inclusive, `to` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl HourRange {
    pub fn from_hour(hour: u32) -> Option<Self> {
        let from = NaiveTime::from_hms_opt(hour, 0, 0)?;
        let to = NaiveTime::from_hms_opt(hour + 1, 0, 0)?;
        Some(HourRange { from, to })
    }

    /// Parses the option value format, e.g. "09:00-10:00".
    pub fn parse(s: &str) -> Option<Self> {
        let (from, to) = s.trim().split_once('-')?;
        let from = NaiveTime::parse_from_str(from, "%H:%M").ok()?;
        let to = NaiveTime::parse_from_str(to, "%H:%M").ok()?;
        if from >= to {
            return None;
        }
        Some(HourRange { from, to })
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        self.from <= t && t < self.to
    }

    pub fn as_value(&self) -> String {
        format!("{}-{}", self.from.format("%H:%M"), self.to.format("%H:%M"))
    }

    pub fn label(&self) -> String {
        format!("{} a {}", self.from.format("%H:%M"), self.to.format("%H:%M"))
    }
}

/// Appointment selections accumulated across the flow. Everything starts
/// unset and is filled in step by step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentData {
    pub specialty_id: Option<String>,
    pub specialty_name: Option<String>,
    pub search_method: Option<SearchMethod>,
    pub doctor_code: Option<String>,
    pub doctor_name: Option<String>,
    pub shift: Option<Shift>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub hour_range: Option<HourRange>,
    pub room: Option<String>,
    pub slot_id: Option<String>,
    pub site_code: Option<String>,
}

impl AppointmentData {
    /// Submission precondition: specialty, doctor, date, time and the
    /// concrete slot must all be fixed. Missing any one of them means the
    /// request is not submittable.
    pub fn ready_for_submission(&self) -> bool {
        self.specialty_id.is_some()
            && self.doctor_code.is_some()
            && self.date.is_some()
            && self.time.is_some()
            && self.slot_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_codes() {
        assert_eq!(Shift::Morning.code(), "M");
        assert_eq!(Shift::Afternoon.code(), "T");
        assert_eq!(Shift::parse("t"), Some(Shift::Afternoon));
        assert_eq!(Shift::parse("X"), None);
    }

    #[test]
    fn test_hour_range_parse_and_contains() {
        let range = HourRange::parse("09:00-10:00").unwrap();
        assert!(range.contains(NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
        assert!(range.contains(NaiveTime::from_hms_opt(9, 59, 0).unwrap()));
        assert!(!range.contains(NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
        assert_eq!(range.as_value(), "09:00-10:00");
    }

    #[test]
    fn test_hour_range_rejects_inverted_bounds() {
        assert!(HourRange::parse("10:00-09:00").is_none());
        assert!(HourRange::parse("mediodia").is_none());
    }

    #[test]
    fn test_morning_buckets() {
        let ranges = Shift::Morning.hour_ranges();
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[0].as_value(), "08:00-09:00");
        assert_eq!(ranges[4].as_value(), "12:00-13:00");
    }

    #[test]
    fn test_ready_for_submission_requires_every_field() {
        let mut appt = AppointmentData {
            specialty_id: Some("0019".to_string()),
            specialty_name: Some("Cardiología".to_string()),
            doctor_code: Some("ABC".to_string()),
            doctor_name: Some("Dr. Prueba".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 10, 15),
            time: Some("09:00".to_string()),
            slot_id: Some("C-1".to_string()),
            ..Default::default()
        };
        assert!(appt.ready_for_submission());
        appt.doctor_code = None;
        assert!(!appt.ready_for_submission());
    }
}
