use chrono::{DateTime, TimeZone, Utc};

/// Sekunder mellan 1970-01-01 och 2001-01-01 (referensepoken i äldre filer)
pub const REFERENCE_EPOCH_OFFSET: i64 = 978_307_200;

/// Nuvarande tid som sekunder sedan 2001-01-01 UTC
pub fn reference_timestamp_now() -> f64 {
    to_reference_timestamp(Utc::now())
}

/// Konvertera en tidpunkt till sekunder sedan 2001-01-01 UTC
pub fn to_reference_timestamp(time: DateTime<Utc>) -> f64 {
    let millis = time.timestamp_millis() - REFERENCE_EPOCH_OFFSET * 1000;
    millis as f64 / 1000.0
}

/// Tolka sekunder sedan 2001-01-01 UTC
pub fn from_reference_timestamp(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round() as i64 + REFERENCE_EPOCH_OFFSET * 1000;
    Utc.timestamp_millis_opt(millis).single()
}

/// Formatera för visning
pub fn format_timestamp(seconds: f64) -> String {
    from_reference_timestamp(seconds)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}
