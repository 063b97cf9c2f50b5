use std::env;

use chrono::{Duration, NaiveDate, Utc};

/// Date range appointment requests may fall into. Catalog queries are
/// scoped to it so the portal never offers dates the hospital will not
/// take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BookingWindow {
    /// Reads BOOKING_WINDOW_START / BOOKING_WINDOW_END (YYYY-MM-DD). With
    /// either missing or malformed, falls back to today plus two weeks.
    pub fn from_env(today: NaiveDate) -> Self {
        let start = env::var("BOOKING_WINDOW_START")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(today);
        let end = env::var("BOOKING_WINDOW_END")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|end| *end >= start)
            .unwrap_or(start + Duration::days(14));
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub catalog_url: String,
    pub booking_url: String,
    pub intent_url: String,
    pub support_phone: String,
    pub window: BookingWindow,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            catalog_url: env::var("CATALOG_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            booking_url: env::var("BOOKING_URL")
                .unwrap_or_else(|_| "http://localhost:8082".to_string()),
            intent_url: env::var("INTENT_URL")
                .unwrap_or_else(|_| "http://localhost:8083".to_string()),
            support_phone: env::var("SUPPORT_PHONE")
                .unwrap_or_else(|_| "(01) 612-4000".to_string()),
            window: BookingWindow::from_env(Utc::now().date_naive()),
        }
    }
}
